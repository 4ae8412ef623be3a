//! Realtime session client.
//!
//! Establishes a live media + data connection with the conversational AI
//! endpoint, executes the tool calls it requests and reconciles the results
//! into a transcript, visual directives and session state.
//!
//! # Components
//!
//! - [`TransportNegotiator`] - peer connection and SDP exchange
//! - [`EventReader`] - decodes and routes inbound protocol events
//! - [`ToolDispatcher`] - executes function calls against the backend
//! - [`Transcript`] - append-only chat history
//! - [`visual`] - visual directive extraction
//! - [`RealtimeSession`] - session state machine
//!
//! The transport is reached through the traits in [`base`]; the `webrtc`
//! feature provides a WebRTC implementation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use voicecare_realtime::config::ClientConfig;
//! use voicecare_realtime::core::realtime::{
//!     ChannelAudioSource, ForwardingAudioOutput, RealtimeSession, TransportStack, WebRtcConnector,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (microphone, _frames_tx) = ChannelAudioSource::new();
//!     let (speaker, _playback_rx) = ForwardingAudioOutput::new();
//!     let stack = TransportStack::new(
//!         Arc::new(WebRtcConnector::new()),
//!         Arc::new(microphone),
//!         Arc::new(speaker),
//!     );
//!
//!     let session = RealtimeSession::new(ClientConfig::from_env()?, stack)?;
//!     session.on_message(Arc::new(|msg| Box::pin(async move {
//!         println!("[{}] {}", msg.role, msg.content);
//!     })));
//!
//!     session.start_session().await?;
//!     session.send_text_message("Which phones have the best camera?").await?;
//!     Ok(())
//! }
//! ```

pub mod base;
pub mod dispatcher;
pub mod media;
pub mod messages;
pub mod negotiator;
pub mod reader;
pub mod session;
pub mod transcript;
pub mod visual;
#[cfg(feature = "webrtc")]
pub mod webrtc;

pub use base::{
    AudioFrame, AudioOutput, CallbackFuture, CartCallback, ChannelEvent, DataChannel,
    ErrorCallback, LocalAudioTrack, LogicalChannel, MediaSource, PeerConnector, PeerTransport,
    PlaybackSink, ProductsCallback, RecommendationsCallback, RemoteAudioTrack,
    RemoteTrackHandler, SdpKind, SessionCallbacks, SessionDescription, StateCallback,
    TransportStack,
};
pub use dispatcher::ToolDispatcher;
pub use media::{CapturedAudioTrack, ChannelAudioSource, ForwardingAudioOutput, SinkGuard};
pub use messages::{ClientEvent, ServerEvent};
pub use negotiator::{NegotiatedTransport, TransportNegotiator};
pub use reader::EventReader;
pub use session::{
    CustomerContext, RealtimeSession, RealtimeSessionBuilder, SessionState, SessionStatus,
};
pub use transcript::{ChatMessage, MessageCallback, MessageRole, Transcript};
pub use visual::{Emphasis, VisualCallback, VisualConfig, VisualState};
#[cfg(feature = "webrtc")]
pub use webrtc::WebRtcConnector;
