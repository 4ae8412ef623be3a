//! VoiceCare backend API.
//!
//! The backend issues session credentials, publishes the tool catalog and
//! executes tool calls on behalf of the assistant.

mod catalog;
mod client;
mod types;

pub use catalog::ToolCatalogCache;
pub use client::BackendClient;
pub use types::{
    EphemeralKey, FunctionCallRequest, FunctionCallResponse, Recommendation, SessionGrant,
    SessionRequest, ToolCatalog, ToolDefinition,
};
