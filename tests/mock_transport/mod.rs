//! In-memory realtime transport.
//!
//! Stands in for the WebRTC stack in integration tests:
//! - `MockConnector` creates `MockPeer`s and can hold `create_peer` open
//! - `MockPeer` records the negotiation sequence and injects channel events
//! - `MockDataChannel` records every frame the client sends
//! - `MockMediaSource` can simulate a denied microphone
//! - `MockAudioOutput` tracks playback sinks

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc};

use voicecare_realtime::core::realtime::{
    AudioFrame, AudioOutput, ChannelEvent, DataChannel, LocalAudioTrack, LogicalChannel,
    MediaSource, PeerConnector, PeerTransport, PlaybackSink, RemoteAudioTrack,
    RemoteTrackHandler, SessionDescription, TransportStack,
};
use voicecare_realtime::errors::{SessionError, SessionResult};

pub const MOCK_OFFER_SDP: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\ns=mock-offer\r\n";

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Data Channel
// =============================================================================

pub struct MockDataChannel {
    label: String,
    open: AtomicBool,
    failing: AtomicBool,
    sent: Mutex<Vec<String>>,
    events: mpsc::Sender<ChannelEvent>,
}

impl MockDataChannel {
    /// Make every following send fail while the channel stays open.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Every frame sent by the client, decoded.
    pub fn sent_events(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|frame| serde_json::from_str(frame).expect("client sent invalid JSON"))
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Sent events of the given `type`.
    pub fn sent_of_type(&self, event_type: &str) -> Vec<Value> {
        self.sent_events()
            .into_iter()
            .filter(|event| event["type"] == event_type)
            .collect()
    }

    /// Items of every sent `function_call_output`.
    pub fn function_call_outputs(&self) -> Vec<Value> {
        self.sent_of_type("conversation.item.create")
            .into_iter()
            .filter(|event| event["item"]["type"] == "function_call_output")
            .map(|event| event["item"].clone())
            .collect()
    }
}

#[async_trait]
impl DataChannel for MockDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send_text(&self, payload: String) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::Transport("channel closed".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SessionError::Transport("send buffer full".to_string()));
        }
        self.sent.lock().push(payload);
        Ok(())
    }

    async fn close(&self) -> SessionResult<()> {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(ChannelEvent::Closed).await;
        }
        Ok(())
    }
}

// =============================================================================
// Peer
// =============================================================================

pub struct MockPeer {
    channel: Mutex<Option<Arc<MockDataChannel>>>,
    events: Mutex<Option<mpsc::Sender<ChannelEvent>>>,
    remote_handler: Mutex<Option<RemoteTrackHandler>>,
    steps: Mutex<Vec<&'static str>>,
    remote_sdp: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl MockPeer {
    fn new() -> Self {
        Self {
            channel: Mutex::new(None),
            events: Mutex::new(None),
            remote_handler: Mutex::new(None),
            steps: Mutex::new(Vec::new()),
            remote_sdp: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Negotiation calls in the order they happened.
    pub fn steps(&self) -> Vec<&'static str> {
        self.steps.lock().clone()
    }

    pub fn channel(&self) -> Arc<MockDataChannel> {
        self.channel
            .lock()
            .clone()
            .expect("data channel was never created")
    }

    pub fn remote_sdp(&self) -> Option<String> {
        self.remote_sdp.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn sender(&self) -> mpsc::Sender<ChannelEvent> {
        self.events
            .lock()
            .clone()
            .expect("data channel was never created")
    }

    /// Remote side opened the channel.
    pub async fn open(&self) {
        self.channel().open.store(true, Ordering::SeqCst);
        self.sender()
            .send(ChannelEvent::Open)
            .await
            .expect("reader gone");
    }

    /// Deliver a server event.
    pub async fn inject(&self, event: Value) {
        self.sender()
            .send(ChannelEvent::Message(event.to_string()))
            .await
            .expect("reader gone");
    }

    /// Remote side closed the channel.
    pub async fn remote_close(&self) {
        self.channel().open.store(false, Ordering::SeqCst);
        let _ = self.sender().send(ChannelEvent::Closed).await;
    }

    /// Remote side started sending audio.
    pub fn emit_remote_track(&self, payloads: Vec<Bytes>) {
        let handler = self
            .remote_handler
            .lock()
            .clone()
            .expect("no remote audio handler registered");
        handler(Arc::new(MockRemoteTrack {
            payloads: tokio::sync::Mutex::new(payloads),
        }));
    }
}

#[async_trait]
impl PeerTransport for MockPeer {
    async fn add_local_audio(&self, _track: Arc<dyn LocalAudioTrack>) -> SessionResult<()> {
        self.steps.lock().push("add_local_audio");
        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> SessionResult<LogicalChannel> {
        self.steps.lock().push("create_data_channel");
        let (tx, rx) = mpsc::channel(256);
        let channel = Arc::new(MockDataChannel {
            label: label.to_string(),
            open: AtomicBool::new(false),
            failing: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            events: tx.clone(),
        });
        *self.channel.lock() = Some(channel.clone());
        *self.events.lock() = Some(tx);
        Ok(LogicalChannel {
            sender: channel,
            events: rx,
        })
    }

    async fn create_offer(&self) -> SessionResult<SessionDescription> {
        self.steps.lock().push("create_offer");
        Ok(SessionDescription::offer(MOCK_OFFER_SDP))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> SessionResult<SessionDescription> {
        self.steps.lock().push("set_local_description");
        Ok(description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> SessionResult<()> {
        self.steps.lock().push("set_remote_description");
        *self.remote_sdp.lock() = Some(description.sdp);
        Ok(())
    }

    fn on_remote_audio(&self, handler: RemoteTrackHandler) {
        *self.remote_handler.lock() = Some(handler);
    }

    async fn close(&self) -> SessionResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let channel = self.channel.lock().clone();
        if let Some(channel) = channel {
            channel.close().await?;
        }
        Ok(())
    }
}

struct MockRemoteTrack {
    payloads: tokio::sync::Mutex<Vec<Bytes>>,
}

#[async_trait]
impl RemoteAudioTrack for MockRemoteTrack {
    fn id(&self) -> &str {
        "mock-remote-audio"
    }

    async fn next_payload(&self) -> Option<Bytes> {
        let mut payloads = self.payloads.lock().await;
        if payloads.is_empty() {
            None
        } else {
            Some(payloads.remove(0))
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

#[derive(Default)]
pub struct MockConnector {
    peers: Mutex<Vec<Arc<MockPeer>>>,
    create_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl MockConnector {
    /// Number of `create_peer` calls, counted on entry.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn peers(&self) -> Vec<Arc<MockPeer>> {
        self.peers.lock().clone()
    }

    pub fn last_peer(&self) -> Arc<MockPeer> {
        self.peers.lock().last().cloned().expect("no peer created")
    }

    /// Make `create_peer` wait until the returned notify is signalled.
    pub fn hold(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(notify.clone());
        notify
    }
}

#[async_trait]
impl PeerConnector for MockConnector {
    async fn create_peer(&self) -> SessionResult<Arc<dyn PeerTransport>> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let peer = Arc::new(MockPeer::new());
        self.peers.lock().push(peer.clone());
        Ok(peer)
    }
}

// =============================================================================
// Media
// =============================================================================

pub struct MockAudioTrack {
    enabled: AtomicBool,
    stopped: AtomicBool,
}

impl LocalAudioTrack for MockAudioTrack {
    fn id(&self) -> &str {
        "mock-microphone"
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        None
    }
}

#[derive(Default)]
pub struct MockMediaSource {
    deny: AtomicBool,
    tracks: Mutex<Vec<Arc<MockAudioTrack>>>,
}

impl MockMediaSource {
    /// Simulate a denied microphone permission.
    pub fn deny_permission(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    pub fn tracks(&self) -> Vec<Arc<MockAudioTrack>> {
        self.tracks.lock().clone()
    }
}

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn acquire_audio(&self) -> SessionResult<Arc<dyn LocalAudioTrack>> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(SessionError::MediaAcquisition(
                "Permission denied".to_string(),
            ));
        }
        let track = Arc::new(MockAudioTrack {
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
        });
        self.tracks.lock().push(track.clone());
        Ok(track)
    }
}

pub struct MockSink {
    released: AtomicBool,
    attached: AtomicUsize,
}

impl MockSink {
    pub fn attached(&self) -> usize {
        self.attached.load(Ordering::SeqCst)
    }
}

impl PlaybackSink for MockSink {
    fn attach(&self, _track: Arc<dyn RemoteAudioTrack>) {
        self.attached.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct MockAudioOutput {
    sinks: Mutex<Vec<Arc<MockSink>>>,
}

impl MockAudioOutput {
    pub fn sinks(&self) -> Vec<Arc<MockSink>> {
        self.sinks.lock().clone()
    }
}

impl AudioOutput for MockAudioOutput {
    fn open_sink(&self) -> SessionResult<Arc<dyn PlaybackSink>> {
        let sink = Arc::new(MockSink {
            released: AtomicBool::new(false),
            attached: AtomicUsize::new(0),
        });
        self.sinks.lock().push(sink.clone());
        Ok(sink)
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// All mock transport pieces, kept for assertions.
#[derive(Default, Clone)]
pub struct MockTransport {
    pub connector: Arc<MockConnector>,
    pub media: Arc<MockMediaSource>,
    pub audio: Arc<MockAudioOutput>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack(&self) -> TransportStack {
        TransportStack::new(
            self.connector.clone(),
            self.media.clone(),
            self.audio.clone(),
        )
    }
}
