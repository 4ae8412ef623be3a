//! Base traits and types for the realtime transport.
//!
//! The session state machine never talks to a concrete peer-connection stack.
//! It drives these traits instead:
//!
//! - [`PeerConnector`] / [`PeerTransport`] - the realtime peer connection
//! - [`DataChannel`] - the outbound half of the logical channel
//! - [`MediaSource`] / [`LocalAudioTrack`] - local microphone capture
//! - [`AudioOutput`] / [`PlaybackSink`] - playback of the remote audio track
//!
//! Inbound channel traffic arrives as an ordered stream of [`ChannelEvent`]s.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::session::SessionState;
use crate::core::backend::Recommendation;
use crate::errors::{SessionError, SessionResult};

/// Capacity of the inbound channel event queue.
pub const CHANNEL_EVENT_CAPACITY: usize = 256;

// =============================================================================
// Session Descriptions
// =============================================================================

/// Kind of an SDP session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    /// Local offer
    Offer,
    /// Remote answer
    Answer,
}

/// An SDP session description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// Offer or answer
    #[serde(rename = "type")]
    pub kind: SdpKind,
    /// Raw SDP body
    pub sdp: String,
}

impl SessionDescription {
    /// Create an offer description.
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    /// Create an answer description.
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

// =============================================================================
// Logical Channel
// =============================================================================

/// Events observed on the logical data channel, in delivery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel opened and can carry traffic
    Open,
    /// A text message arrived
    Message(String),
    /// The channel closed (remote or local)
    Closed,
}

/// Outbound half of the logical channel.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Channel label
    fn label(&self) -> &str;

    /// Whether the channel is open.
    fn is_open(&self) -> bool;

    /// Send a text frame. Delivery is reliable and ordered.
    async fn send_text(&self, payload: String) -> SessionResult<()>;

    /// Close the channel.
    async fn close(&self) -> SessionResult<()>;
}

/// A negotiated logical channel: the sender and its inbound event stream.
pub struct LogicalChannel {
    /// Outbound half
    pub sender: Arc<dyn DataChannel>,
    /// Inbound events
    pub events: mpsc::Receiver<ChannelEvent>,
}

impl fmt::Debug for LogicalChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalChannel")
            .field("label", &self.sender.label())
            .field("open", &self.sender.is_open())
            .finish()
    }
}

// =============================================================================
// Media
// =============================================================================

/// One encoded frame of captured audio.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Encoded payload (Opus for the WebRTC transport)
    pub data: Bytes,
    /// Frame duration
    pub duration: Duration,
}

/// Local audio capture track.
pub trait LocalAudioTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> &str;

    /// Whether captured audio is forwarded to the peer.
    fn is_enabled(&self) -> bool;

    /// Enable or disable forwarding (mute).
    fn set_enabled(&self, enabled: bool);

    /// Stop capture permanently.
    fn stop(&self);

    /// Whether the track has been stopped.
    fn is_stopped(&self) -> bool;

    /// Take the stream of captured frames. Returns `None` once taken or for
    /// tracks that feed the transport directly.
    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>>;
}

/// Source of local audio capture.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire a capture track. Fails with [`SessionError::MediaAcquisition`]
    /// when permission is denied or no device exists.
    async fn acquire_audio(&self) -> SessionResult<Arc<dyn LocalAudioTrack>>;
}

/// Remote audio track received from the peer.
#[async_trait]
pub trait RemoteAudioTrack: Send + Sync {
    /// Track identifier
    fn id(&self) -> &str;

    /// Next media payload, `None` when the track ended.
    async fn next_payload(&self) -> Option<Bytes>;
}

/// Playback sink for remote audio. One sink per session, never reused.
pub trait PlaybackSink: Send + Sync {
    /// Connect a remote track for playback, replacing any previous track.
    fn attach(&self, track: Arc<dyn RemoteAudioTrack>);

    /// Release the sink. Idempotent.
    fn release(&self);

    /// Whether the sink has been released.
    fn is_released(&self) -> bool;
}

/// Platform audio-output facility creating playback sinks.
pub trait AudioOutput: Send + Sync {
    /// Open a fresh playback sink.
    fn open_sink(&self) -> SessionResult<Arc<dyn PlaybackSink>>;
}

/// Handler invoked for every inbound remote audio track.
pub type RemoteTrackHandler = Arc<dyn Fn(Arc<dyn RemoteAudioTrack>) + Send + Sync>;

// =============================================================================
// Peer Transport
// =============================================================================

/// A realtime peer connection.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Attach the local capture track.
    async fn add_local_audio(&self, track: Arc<dyn LocalAudioTrack>) -> SessionResult<()>;

    /// Create the logical data channel. Must happen before the offer is
    /// created so the channel is part of the negotiated SDP.
    async fn create_data_channel(&self, label: &str) -> SessionResult<LogicalChannel>;

    /// Create a local offer.
    async fn create_offer(&self) -> SessionResult<SessionDescription>;

    /// Apply the local description. Returns the description to send to the
    /// signaling endpoint (candidates included when the stack gathers them).
    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> SessionResult<SessionDescription>;

    /// Apply the remote answer.
    async fn set_remote_description(&self, description: SessionDescription) -> SessionResult<()>;

    /// Register the inbound media track handler.
    fn on_remote_audio(&self, handler: RemoteTrackHandler);

    /// Close the peer connection. Idempotent.
    async fn close(&self) -> SessionResult<()>;
}

/// Factory for peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    /// Create a new, unconnected peer.
    async fn create_peer(&self) -> SessionResult<Arc<dyn PeerTransport>>;
}

/// Everything a session needs to reach the remote endpoint.
#[derive(Clone)]
pub struct TransportStack {
    /// Peer connection factory
    pub connector: Arc<dyn PeerConnector>,
    /// Local capture
    pub media: Arc<dyn MediaSource>,
    /// Remote playback
    pub audio_output: Arc<dyn AudioOutput>,
}

impl TransportStack {
    /// Bundle the three transport seams.
    pub fn new(
        connector: Arc<dyn PeerConnector>,
        media: Arc<dyn MediaSource>,
        audio_output: Arc<dyn AudioOutput>,
    ) -> Self {
        Self {
            connector,
            media,
            audio_output,
        }
    }
}

impl fmt::Debug for TransportStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportStack").finish_non_exhaustive()
    }
}

// =============================================================================
// Callback Types
// =============================================================================

/// Boxed future returned by callbacks.
pub type CallbackFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Callback type for lifecycle state changes.
pub type StateCallback = Arc<dyn Fn(SessionState) -> CallbackFuture + Send + Sync>;

/// Callback type for error events: the error and a short context string.
pub type ErrorCallback = Arc<dyn Fn(SessionError, String) -> CallbackFuture + Send + Sync>;

/// Callback type for products discovered by device tools.
pub type ProductsCallback = Arc<dyn Fn(Vec<Value>) -> CallbackFuture + Send + Sync>;

/// Callback type for cart summaries.
pub type CartCallback = Arc<dyn Fn(Value) -> CallbackFuture + Send + Sync>;

/// Callback type for proactive recommendations and the customer name.
pub type RecommendationsCallback =
    Arc<dyn Fn(Vec<Recommendation>, Option<String>) -> CallbackFuture + Send + Sync>;

/// Application callbacks shared by the session, the reader and the dispatcher.
#[derive(Default)]
pub struct SessionCallbacks {
    state: RwLock<Option<StateCallback>>,
    error: RwLock<Option<ErrorCallback>>,
    products: RwLock<Option<ProductsCallback>>,
    cart: RwLock<Option<CartCallback>>,
    recommendations: RwLock<Option<RecommendationsCallback>>,
}

impl SessionCallbacks {
    pub fn set_state(&self, callback: StateCallback) {
        *self.state.write() = Some(callback);
    }

    pub fn set_error(&self, callback: ErrorCallback) {
        *self.error.write() = Some(callback);
    }

    pub fn set_products(&self, callback: ProductsCallback) {
        *self.products.write() = Some(callback);
    }

    pub fn set_cart(&self, callback: CartCallback) {
        *self.cart.write() = Some(callback);
    }

    pub fn set_recommendations(&self, callback: RecommendationsCallback) {
        *self.recommendations.write() = Some(callback);
    }

    pub fn has_products(&self) -> bool {
        self.products.read().is_some()
    }

    pub fn has_cart(&self) -> bool {
        self.cart.read().is_some()
    }

    pub async fn emit_state(&self, state: SessionState) {
        let callback = self.state.read().clone();
        if let Some(callback) = callback {
            callback(state).await;
        }
    }

    pub async fn emit_error(&self, error: SessionError, context: impl Into<String>) {
        let callback = self.error.read().clone();
        if let Some(callback) = callback {
            callback(error, context.into()).await;
        }
    }

    pub async fn emit_products(&self, products: Vec<Value>) {
        let callback = self.products.read().clone();
        if let Some(callback) = callback {
            callback(products).await;
        }
    }

    pub async fn emit_cart(&self, cart: Value) {
        let callback = self.cart.read().clone();
        if let Some(callback) = callback {
            callback(cart).await;
        }
    }

    pub async fn emit_recommendations(
        &self,
        recommendations: Vec<Recommendation>,
        customer_name: Option<String>,
    ) {
        let callback = self.recommendations.read().clone();
        if let Some(callback) = callback {
            callback(recommendations, customer_name).await;
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("state", &self.state.read().is_some())
            .field("error", &self.error.read().is_some())
            .field("products", &self.products.read().is_some())
            .field("cart", &self.cart.read().is_some())
            .field("recommendations", &self.recommendations.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_description_constructors() {
        let offer = SessionDescription::offer("v=0");
        assert_eq!(offer.kind, SdpKind::Offer);
        let answer = SessionDescription::answer("v=0");
        assert_eq!(answer.kind, SdpKind::Answer);
        assert_eq!(answer.sdp, "v=0");
    }

    #[tokio::test]
    async fn test_callbacks_are_optional() {
        let callbacks = SessionCallbacks::default();
        assert!(!callbacks.has_cart());
        callbacks.emit_cart(Value::Null).await;
        callbacks
            .emit_error(SessionError::NotConnected, "nobody listening")
            .await;
    }

    #[tokio::test]
    async fn test_cart_callback_receives_value() {
        let callbacks = SessionCallbacks::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        callbacks.set_cart(Arc::new(move |cart| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(cart);
            })
        }));

        assert!(callbacks.has_cart());
        callbacks.emit_cart(serde_json::json!({"cart_count": 2})).await;
        assert_eq!(rx.recv().await.unwrap()["cart_count"], 2);
    }

    #[test]
    fn test_session_description_serialization() {
        let json = serde_json::to_value(SessionDescription::answer("v=0")).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["sdp"], "v=0");
    }
}
