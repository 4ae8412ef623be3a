pub mod backend;
pub mod realtime;

// Re-export commonly used types for convenience
pub use backend::{BackendClient, ToolCatalog, ToolCatalogCache, ToolDefinition};
pub use realtime::{
    ChatMessage, MessageRole, RealtimeSession, SessionState, SessionStatus, TransportStack,
    VisualConfig,
};
