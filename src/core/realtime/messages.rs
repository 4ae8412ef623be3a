//! Realtime protocol message types.
//!
//! Every message on the logical channel is a JSON object discriminated by its
//! `type` field.
//!
//! # Protocol Overview
//!
//! Client events (sent to the remote endpoint):
//! - session.update - Update session configuration
//! - conversation.item.create - Add a user message or a function_call_output
//! - response.create - Ask the assistant to (continue to) respond
//!
//! Server events (received from the remote endpoint):
//! - session.created / session.updated - Session configuration acknowledged
//! - session.error (or error) - Session-level error
//! - session.end - Session is ending
//! - input_audio_buffer.speech_started / speech_stopped - Server VAD
//! - conversation.item.input_audio_transcription.completed - User speech transcribed
//! - response.output_text.delta / response.output_text.done - Assistant text
//! - response.output_audio_transcript.delta / response.audio_transcript.done - Assistant speech transcript
//! - response.done - Response complete, may carry function calls
//!
//! Unknown event types decode to [`ServerEvent::Unknown`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::backend::ToolDefinition;

/// Output modalities when voice responses are disabled.
pub const TEXT_MODALITIES: &[&str] = &["text"];
/// Output modalities when voice responses are enabled.
pub const VOICE_MODALITIES: &[&str] = &["text", "audio"];

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration carried by `session.update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// System instructions, including any customer context block
    pub instructions: String,

    /// Output modalities (`["text"]` or `["text", "audio"]`)
    pub modalities: Vec<String>,

    /// Input audio transcription configuration
    pub input_audio_transcription: InputAudioTranscription,

    /// Tool definitions, omitted when the catalog is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Tool choice strategy, omitted when the catalog is empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl SessionConfig {
    /// Modalities for the given voice-response setting.
    pub fn modalities_for(voice_enabled: bool) -> Vec<String> {
        let set = if voice_enabled {
            VOICE_MODALITIES
        } else {
            TEXT_MODALITIES
        };
        set.iter().map(|m| (*m).to_string()).collect()
    }
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item created by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConversationItem {
    /// A user message
    #[serde(rename = "message")]
    Message {
        /// Role of the author (always "user" from this client)
        role: String,
        /// Message content parts
        content: Vec<ContentPart>,
    },

    /// Result of a function call, `output` is a JSON-encoded string
    #[serde(rename = "function_call_output")]
    FunctionCallOutput {
        /// Call this output answers
        call_id: String,
        /// JSON-encoded output document
        output: String,
    },
}

impl ConversationItem {
    /// User text message.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::Message {
            role: "user".to_string(),
            content: vec![ContentPart::InputText { text: text.into() }],
        }
    }

    /// Function call output with the value serialized to a JSON string.
    pub fn function_call_output(call_id: impl Into<String>, output: &Value) -> Self {
        Self::FunctionCallOutput {
            call_id: call_id.into(),
            output: output.to_string(),
        }
    }
}

/// Content part of a conversation item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    /// Text typed by the user
    #[serde(rename = "input_text")]
    InputText {
        /// Text content
        text: String,
    },
}

// =============================================================================
// Client Events
// =============================================================================

/// Events sent from the client over the logical channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Add an item to the conversation
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to add
        item: ConversationItem,
    },

    /// Request a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Protocol type string of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::SessionUpdate { .. } => "session.update",
            ClientEvent::ConversationItemCreate { .. } => "conversation.item.create",
            ClientEvent::ResponseCreate => "response.create",
        }
    }

    /// Encode as a channel text frame.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Events
// =============================================================================

/// Error details carried by `session.error`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorDetail {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Human readable message
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `response.done`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResponseBody {
    /// Response ID
    #[serde(default)]
    pub id: Option<String>,
    /// Final status (completed, cancelled, failed, ...)
    #[serde(default)]
    pub status: Option<String>,
    /// Output items, left untyped so unknown item kinds never fail decoding
    #[serde(default)]
    pub output: Value,
}

impl ResponseBody {
    /// Function call items in array order. Items of other kinds and
    /// malformed function calls are skipped.
    pub fn function_calls(&self) -> Vec<FunctionCallItem> {
        let Some(items) = self.output.as_array() else {
            return Vec::new();
        };

        items
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
            .filter_map(|item| match serde_json::from_value(item.clone()) {
                Ok(call) => Some(call),
                Err(e) => {
                    tracing::warn!("Skipping malformed function_call item: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// A function call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCallItem {
    /// Call ID echoed back in the function_call_output
    pub call_id: String,
    /// Function name
    pub name: String,
    /// Arguments, forwarded to the backend as received
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Events received from the remote endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        /// Session configuration echo
        #[serde(default)]
        session: Value,
    },

    /// Session configuration updated
    #[serde(rename = "session.updated")]
    SessionUpdated {
        /// Session configuration echo
        #[serde(default)]
        session: Value,
    },

    /// Session-level error
    #[serde(rename = "session.error", alias = "error")]
    SessionError {
        /// Error details
        #[serde(default)]
        error: ErrorDetail,
    },

    /// Session is ending
    #[serde(rename = "session.end")]
    SessionEnd,

    /// Server VAD detected speech start
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,

    /// Server VAD detected speech end
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped,

    /// User speech transcription completed
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        /// Item the transcript belongs to
        #[serde(default)]
        item_id: Option<String>,
        /// Transcribed text
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Partial assistant text
    #[serde(rename = "response.output_text.delta", alias = "response.text.delta")]
    TextDelta {
        /// Text chunk
        #[serde(default)]
        delta: String,
    },

    /// Assistant text completed
    #[serde(rename = "response.output_text.done", alias = "response.text.done")]
    TextDone {
        /// Completed text
        #[serde(default)]
        text: Option<String>,
        /// Completed text on older endpoints
        #[serde(default)]
        output: Option<Value>,
    },

    /// Partial assistant speech transcript
    #[serde(
        rename = "response.output_audio_transcript.delta",
        alias = "response.audio_transcript.delta"
    )]
    AudioTranscriptDelta {
        /// Transcript chunk
        #[serde(default)]
        delta: String,
    },

    /// Assistant speech transcript completed
    #[serde(
        rename = "response.audio_transcript.done",
        alias = "response.output_audio_transcript.done"
    )]
    AudioTranscriptDone {
        /// Full transcript
        #[serde(default)]
        transcript: Option<String>,
    },

    /// Response complete
    #[serde(rename = "response.done")]
    ResponseDone {
        /// Response body
        #[serde(default)]
        response: Option<ResponseBody>,
    },

    /// Any other event type
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Decode a channel text frame.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Completed assistant text of a `TextDone` event (`text`, falling back to `output`).
    pub fn completed_text(&self) -> Option<&str> {
        match self {
            ServerEvent::TextDone { text, output } => text
                .as_deref()
                .filter(|t| !t.is_empty())
                .or_else(|| output.as_ref().and_then(Value::as_str))
                .filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::SessionCreated { .. } => "session.created",
            ServerEvent::SessionUpdated { .. } => "session.updated",
            ServerEvent::SessionError { .. } => "session.error",
            ServerEvent::SessionEnd => "session.end",
            ServerEvent::SpeechStarted => "input_audio_buffer.speech_started",
            ServerEvent::SpeechStopped => "input_audio_buffer.speech_stopped",
            ServerEvent::InputTranscriptionCompleted { .. } => {
                "conversation.item.input_audio_transcription.completed"
            }
            ServerEvent::TextDelta { .. } => "response.output_text.delta",
            ServerEvent::TextDone { .. } => "response.output_text.done",
            ServerEvent::AudioTranscriptDelta { .. } => "response.output_audio_transcript.delta",
            ServerEvent::AudioTranscriptDone { .. } => "response.audio_transcript.done",
            ServerEvent::ResponseDone { .. } => "response.done",
            ServerEvent::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_create_serialization() {
        let json = ClientEvent::ResponseCreate.to_json().unwrap();
        assert_eq!(json, r#"{"type":"response.create"}"#);
    }

    #[test]
    fn test_function_call_output_serialization() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::function_call_output("call_1", &json!({"ok": true})),
        };
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "conversation.item.create");
        assert_eq!(value["item"]["type"], "function_call_output");
        assert_eq!(value["item"]["call_id"], "call_1");
        assert_eq!(value["item"]["output"], r#"{"ok":true}"#);
    }

    #[test]
    fn test_user_text_item_serialization() {
        let event = ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text("hello"),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_text");
        assert_eq!(value["item"]["content"][0]["text"], "hello");
    }

    #[test]
    fn test_session_update_omits_empty_tools() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: "be brief".to_string(),
                modalities: SessionConfig::modalities_for(false),
                input_audio_transcription: InputAudioTranscription {
                    model: "whisper-1".to_string(),
                },
                tools: None,
                tool_choice: None,
            },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["modalities"], json!(["text"]));
        assert_eq!(value["session"]["input_audio_transcription"]["model"], "whisper-1");
        assert!(value["session"].get("tools").is_none());
        assert!(value["session"].get("tool_choice").is_none());
    }

    #[test]
    fn test_modalities_for_voice() {
        assert_eq!(SessionConfig::modalities_for(true), vec!["text", "audio"]);
        assert_eq!(SessionConfig::modalities_for(false), vec!["text"]);
    }

    #[test]
    fn test_parse_session_error_and_alias() {
        let event =
            ServerEvent::parse(r#"{"type":"session.error","error":{"message":"bad"}}"#).unwrap();
        match event {
            ServerEvent::SessionError { error } => {
                assert_eq!(error.message.as_deref(), Some("bad"))
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let event = ServerEvent::parse(r#"{"type":"error","error":{"code":"x"}}"#).unwrap();
        assert!(matches!(event, ServerEvent::SessionError { .. }));
    }

    #[test]
    fn test_parse_text_done_variants() {
        let event =
            ServerEvent::parse(r#"{"type":"response.output_text.done","text":"Hi"}"#).unwrap();
        assert_eq!(event.completed_text(), Some("Hi"));

        let event =
            ServerEvent::parse(r#"{"type":"response.text.done","output":"Legacy"}"#).unwrap();
        assert_eq!(event.completed_text(), Some("Legacy"));

        let event = ServerEvent::parse(r#"{"type":"response.text.done"}"#).unwrap();
        assert_eq!(event.completed_text(), None);
    }

    #[test]
    fn test_parse_unknown_event() {
        let event = ServerEvent::parse(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_parse_session_end_with_extra_fields() {
        let event = ServerEvent::parse(r#"{"type":"session.end","event_id":"e1"}"#).unwrap();
        assert_eq!(event, ServerEvent::SessionEnd);
    }

    #[test]
    fn test_response_done_function_calls_in_order() {
        let event = ServerEvent::parse(
            r#"{"type":"response.done","response":{"id":"r1","output":[
                {"type":"function_call","call_id":"a","name":"first","arguments":"{}"},
                {"type":"message","content":[]},
                {"type":"function_call","call_id":"b","name":"second"}
            ]}}"#,
        )
        .unwrap();

        let ServerEvent::ResponseDone {
            response: Some(body),
        } = event
        else {
            panic!("expected response.done");
        };
        let calls = body.function_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "a");
        assert_eq!(calls[0].arguments, json!("{}"));
        assert_eq!(calls[1].name, "second");
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn test_response_done_without_output_array() {
        let event = ServerEvent::parse(r#"{"type":"response.done","response":{"output":null}}"#)
            .unwrap();
        let ServerEvent::ResponseDone {
            response: Some(body),
        } = event
        else {
            panic!("expected response.done");
        };
        assert!(body.function_calls().is_empty());
    }
}
