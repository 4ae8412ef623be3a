//! Transcript aggregation.
//!
//! The transcript is an append-only, insertion-ordered list of [`ChatMessage`]s.
//! Messages are never mutated after creation; the only removal is an
//! application-initiated [`Transcript::clear`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// Author role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    HumanAgent,
    System,
}

impl MessageRole {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::ToolCall => "tool_call",
            MessageRole::ToolResult => "tool_result",
            MessageRole::HumanAgent => "human_agent",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the session transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message ID (UUID v4)
    pub id: String,
    /// Author role
    pub role: MessageRole,
    /// Text content
    pub content: String,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    /// Tool name for tool_call / tool_result entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Tool arguments for tool_call entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
    /// Recorded audio for the message, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

impl ChatMessage {
    /// Create a message with a fresh ID and the current time.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: now_millis(),
            tool_name: None,
            tool_args: None,
            audio_url: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// `tool_call` entry announcing a call before it runs.
    pub fn tool_call(name: &str, arguments: Value) -> Self {
        Self {
            tool_name: Some(name.to_string()),
            tool_args: Some(arguments),
            ..Self::new(MessageRole::ToolCall, format!("Calling {name}"))
        }
    }

    /// `tool_result` entry with the call's output (or error) text.
    pub fn tool_result(name: &str, content: impl Into<String>) -> Self {
        Self {
            tool_name: Some(name.to_string()),
            ..Self::new(MessageRole::ToolResult, content)
        }
    }
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Callback type for appended transcript messages.
pub type MessageCallback =
    Arc<dyn Fn(ChatMessage) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Append-only transcript shared between the reader, the dispatcher and the
/// application.
#[derive(Clone, Default)]
pub struct Transcript {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    on_message: Arc<RwLock<Option<MessageCallback>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback invoked after every append.
    pub fn set_on_message(&self, callback: MessageCallback) {
        *self.on_message.write() = Some(callback);
    }

    /// Append a message and notify the callback.
    pub async fn append(&self, message: ChatMessage) {
        tracing::debug!(
            "Transcript append: {} ({} chars)",
            message.role,
            message.content.len()
        );
        self.messages.write().push(message.clone());

        let callback = self.on_message.read().clone();
        if let Some(callback) = callback {
            callback(message).await;
        }
    }

    /// Copy of the transcript in append order.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Remove all messages (user "clear chat").
    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

impl fmt::Debug for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transcript")
            .field("len", &self.len())
            .finish()
    }
}
