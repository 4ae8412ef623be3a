//! Error taxonomy for the realtime session client.
//!
//! Errors raised while starting a session (`Start`, `MediaAcquisition`,
//! `Negotiation`) revert the session to idle and are returned to the caller.
//! Tool failures (`ToolExecution`) are always resolved into a
//! `function_call_output` before they are surfaced, and remote `session.error`
//! events (`Protocol`) never close the channel.

use thiserror::Error;

/// Errors that can occur while running a realtime session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Tool catalog fetch or session creation failed
    #[error("Session start failed: {0}")]
    Start(String),

    /// Local audio capture could not be acquired (permission denied, no device)
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    /// SDP exchange with the signaling endpoint failed
    #[error("{}", negotiation_message(.status, .message))]
    Negotiation {
        /// HTTP status returned by the signaling endpoint, if any
        status: Option<u16>,
        /// Failure details
        message: String,
    },

    /// A single tool call failed
    #[error("Failed to execute {name}: {source}")]
    ToolExecution {
        /// Name of the tool that failed
        name: String,
        /// Underlying failure
        #[source]
        source: ToolExecutionError,
    },

    /// Remote endpoint reported a session error
    #[error("Session error: {0}")]
    Protocol(String),

    /// No open logical channel
    #[error("Data channel is not ready. Start the session first.")]
    NotConnected,

    /// Caller supplied unusable input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transport-level failure (peer connection or data channel)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn negotiation_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("WebRTC negotiation failed ({code}): {message}"),
        None => format!("WebRTC negotiation failed: {message}"),
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Failure of a single backend tool execution.
#[derive(Debug, Error)]
pub enum ToolExecutionError {
    /// Backend answered with a non-success status
    #[error("Backend error ({status}): {detail}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body
        detail: String,
    },

    /// Request could not be sent or the response could not be read
    #[error("Request failed: {0}")]
    Request(String),

    /// No response within the configured tool timeout
    #[error("Timed out after {0} ms")]
    Timeout(u64),

    /// Response body was not the expected `{output}` document
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}
