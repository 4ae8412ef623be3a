//! Session state machine.
//!
//! [`RealtimeSession`] owns the connection lifecycle:
//!
//! ```text
//! idle --start_session()--> connecting --channel open--> connected --channel closed--> ended
//!   ^                           |                            |
//!   +---- start failure --------+                            |
//!   +---------------------- end_session() -------------------+
//! ```
//!
//! State lives in a `tokio::sync::watch` channel. Every session attempt gets a
//! generation number; updates coming from an attempt that has since been torn
//! down are discarded, so a late event can never resurrect an ended session.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{
    CartCallback, ChannelEvent, DataChannel, ErrorCallback, LocalAudioTrack, LogicalChannel,
    PeerTransport, ProductsCallback, RecommendationsCallback, SessionCallbacks, StateCallback,
    TransportStack,
};
use super::dispatcher::{ToolDispatcher, send_quietly};
use super::media::SinkGuard;
use super::messages::{ClientEvent, ConversationItem, InputAudioTranscription, SessionConfig};
use super::negotiator::{NegotiatedTransport, TransportNegotiator};
use super::reader::EventReader;
use super::transcript::{ChatMessage, MessageCallback, Transcript};
use super::visual::{VisualCallback, VisualConfig, VisualState};
use crate::config::ClientConfig;
use crate::core::backend::{
    BackendClient, Recommendation, SessionRequest, ToolCatalog, ToolCatalogCache,
};
use crate::errors::{SessionError, SessionResult};

// =============================================================================
// Session State
// =============================================================================

/// Connection lifecycle status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Connecting,
    Connected,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Ended => "ended",
        }
    }

    /// Whether a session attempt is in progress or established.
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Connected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub is_muted: bool,
    pub voice_response_enabled: bool,
    /// True between a user-initiated turn and its terminal event
    pub is_processing: bool,
}

/// Watch-backed state cell with generation-guarded updates.
#[derive(Debug)]
pub struct StateHandle {
    tx: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl Default for StateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Claim the `idle|ended -> connecting` transition.
    ///
    /// Every attempt captures with a fresh, enabled track, so the mute flag
    /// starts cleared. Returns the generation of the new attempt, or `None` when an attempt
    /// is already connecting or connected.
    pub fn begin(&self) -> Option<u64> {
        let mut claimed = None;
        self.tx.send_if_modified(|state| {
            if state.status.is_active() {
                return false;
            }
            claimed = Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1);
            state.status = SessionStatus::Connecting;
            state.is_processing = false;
            state.is_muted = false;
            true
        });
        claimed
    }

    /// Apply `f` if `generation` is still current. `f` returns whether it
    /// changed the state.
    pub fn update(&self, generation: u64, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        self.tx
            .send_if_modified(|state| self.is_current(generation) && f(state))
    }

    /// Apply `f` regardless of generation.
    pub fn modify(&self, f: impl FnOnce(&mut SessionState) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Retire the current attempt so its pending updates are discarded.
    pub fn invalidate(&self) {
        self.tx.send_if_modified(|_| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            false
        });
    }

    /// Replace the whole state, returning whether it changed.
    pub fn replace(&self, next: SessionState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        })
    }
}

// =============================================================================
// Customer Context
// =============================================================================

/// Known-customer data captured at session start.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerContext {
    pub name: Option<String>,
    pub recommendations: Vec<Recommendation>,
}

impl CustomerContext {
    /// Instructions block describing the top recommendation. `None` without a
    /// customer name or recommendations.
    pub fn instructions_block(&self) -> Option<String> {
        let name = self.name.as_deref().filter(|n| !n.is_empty())?;
        let top = self.recommendations.first()?;
        let savings = match top.estimated_savings {
            Some(amount) if amount != 0.0 => format!("- Potential Savings: £{amount}/month"),
            _ => String::new(),
        };

        Some(format!(
            "\n\n## CURRENT CUSTOMER CONTEXT\n\n\
             You are speaking with {name}.\n\n\
             TOP PRIORITY RECOMMENDATION:\n\
             - Type: {}\n\
             - Priority: {}\n\
             - Title: {}\n\
             - Talking Point: {}\n\
             {savings}\n\n\
             IMPORTANT: Mention this recommendation naturally in your FIRST response, \
             following the proactive nudging guidelines above.",
            top.recommendation_type, top.priority, top.title, top.talking_point
        ))
    }
}

/// Build the `session.update` event for the current configuration.
pub fn build_session_update(
    config: &ClientConfig,
    customer: Option<&CustomerContext>,
    catalog: Option<&ToolCatalog>,
    voice_enabled: bool,
) -> ClientEvent {
    let mut instructions = config.instructions.clone();
    if let Some(block) = customer.and_then(CustomerContext::instructions_block) {
        instructions.push_str(&block);
    }

    let (tools, tool_choice) = match catalog {
        Some(catalog) if !catalog.tools.is_empty() => {
            (Some(catalog.tools.clone()), Some(catalog.tool_choice.clone()))
        }
        _ => (None, None),
    };

    ClientEvent::SessionUpdate {
        session: SessionConfig {
            instructions,
            modalities: SessionConfig::modalities_for(voice_enabled),
            input_audio_transcription: InputAudioTranscription {
                model: config.transcription_model.clone(),
            },
            tools,
            tool_choice,
        },
    }
}

// =============================================================================
// Realtime Session
// =============================================================================

/// Resources of the current session attempt.
struct ActiveSession {
    generation: u64,
    channel: Arc<dyn DataChannel>,
    peer: Arc<dyn PeerTransport>,
    local_track: Arc<dyn LocalAudioTrack>,
    sink: SinkGuard,
    cancel: CancellationToken,
    reader_task: JoinHandle<()>,
}

impl ActiveSession {
    async fn shutdown(self) {
        debug!("Tearing down session attempt {}", self.generation);
        self.cancel.cancel();

        if self.channel.is_open()
            && let Err(e) = self.channel.close().await
        {
            debug!("Ignoring channel close error: {}", e);
        }
        self.local_track.stop();
        if let Err(e) = self.peer.close().await {
            debug!("Ignoring peer close error: {}", e);
        }
        self.sink.sink().release();

        // The reader exits at its next event; it may be the caller's own task.
        drop(self.reader_task);
    }
}

struct SessionInner {
    config: ClientConfig,
    backend: BackendClient,
    catalog_cache: Arc<ToolCatalogCache>,
    negotiator: TransportNegotiator,
    state: Arc<StateHandle>,
    callbacks: Arc<SessionCallbacks>,
    transcript: Transcript,
    visuals: VisualState,
    dispatcher: Arc<ToolDispatcher>,
    customer: RwLock<Option<CustomerContext>>,
    catalog: ArcSwapOption<ToolCatalog>,
    active: Mutex<Option<ActiveSession>>,
}

impl SessionInner {
    async fn notify_state(&self) {
        self.callbacks.emit_state(self.state.get()).await;
    }

    fn session_update(&self, voice_enabled: bool) -> ClientEvent {
        let catalog = self.catalog.load_full();
        let customer = self.customer.read().clone();
        let event = build_session_update(
            &self.config,
            customer.as_ref(),
            catalog.as_deref(),
            voice_enabled,
        );
        info!(
            "Sending session.update with {} tools, voice={}, customer={}",
            catalog.as_ref().map_or(0, |c| c.tools.len()),
            voice_enabled,
            customer
                .as_ref()
                .and_then(|c| c.name.as_deref())
                .unwrap_or("anonymous")
        );
        event
    }

    async fn connect(self: &Arc<Self>, generation: u64) -> SessionResult<ActiveSession> {
        let catalog = self.catalog_cache.get_or_load(&self.backend).await?;
        self.catalog.store(Some(catalog));

        let grant = self
            .backend
            .create_session(&SessionRequest {
                deployment: self.config.deployment.clone(),
                voice: self.config.voice.clone(),
                account_number: self.config.account_number.clone(),
            })
            .await?;
        info!("Ephemeral key received for session {}", grant.session_id);

        if !grant.proactive_recommendations.is_empty() {
            info!(
                "Received {} proactive recommendation(s) for {}",
                grant.proactive_recommendations.len(),
                grant.customer_name.as_deref().unwrap_or("customer")
            );
            *self.customer.write() = Some(CustomerContext {
                name: grant.customer_name.clone(),
                recommendations: grant.proactive_recommendations.clone(),
            });
            self.callbacks
                .emit_recommendations(
                    grant.proactive_recommendations.clone(),
                    grant.customer_name.clone(),
                )
                .await;
        }

        let negotiation = self
            .negotiator
            .negotiate(&grant.ephemeral_key, &grant.webrtc_url);
        let negotiated = match self.config.negotiation_timeout() {
            Some(limit) => tokio::time::timeout(limit, negotiation)
                .await
                .map_err(|_| {
                    SessionError::Timeout(format!(
                        "WebRTC negotiation exceeded {} ms",
                        limit.as_millis()
                    ))
                })??,
            None => negotiation.await?,
        };

        Ok(self.activate(generation, negotiated))
    }

    fn activate(self: &Arc<Self>, generation: u64, negotiated: NegotiatedTransport) -> ActiveSession {
        let NegotiatedTransport {
            peer,
            channel,
            local_track,
            sink,
        } = negotiated;
        let LogicalChannel { sender, events } = channel;

        let reader = EventReader::new(
            generation,
            self.state.clone(),
            self.transcript.clone(),
            self.dispatcher.clone(),
            self.callbacks.clone(),
        );
        let cancel = CancellationToken::new();
        let reader_task = tokio::spawn(run_channel(
            Arc::downgrade(self),
            generation,
            sender.clone(),
            events,
            reader,
            cancel.clone(),
        ));

        ActiveSession {
            generation,
            channel: sender,
            peer,
            local_track,
            sink,
            cancel,
            reader_task,
        }
    }

    async fn on_channel_open(&self, generation: u64, channel: &Arc<dyn DataChannel>) {
        info!("Data channel is open");
        let voice_enabled = self.state.get().voice_response_enabled;
        send_quietly(channel, &self.session_update(voice_enabled)).await;

        let connected = self.state.update(generation, |state| {
            if state.status != SessionStatus::Connecting {
                return false;
            }
            state.status = SessionStatus::Connected;
            true
        });
        if connected {
            self.notify_state().await;
        }
    }

    async fn on_channel_closed(&self, generation: u64) {
        info!("Data channel is closed");
        let ended = self.state.update(generation, |state| {
            if state.status == SessionStatus::Ended {
                return false;
            }
            state.status = SessionStatus::Ended;
            true
        });
        if ended {
            self.notify_state().await;
        }
    }

    /// Channel of an established session.
    fn connected_channel(&self) -> SessionResult<Arc<dyn DataChannel>> {
        if self.state.get().status != SessionStatus::Connected {
            return Err(SessionError::NotConnected);
        }
        let channel = self
            .active
            .lock()
            .as_ref()
            .map(|active| active.channel.clone())
            .ok_or(SessionError::NotConnected)?;
        if !channel.is_open() {
            return Err(SessionError::NotConnected);
        }
        Ok(channel)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
            active.local_track.stop();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(active.shutdown());
            }
        }
    }
}

/// Pump channel events for one session attempt.
async fn run_channel(
    inner: Weak<SessionInner>,
    generation: u64,
    channel: Arc<dyn DataChannel>,
    mut events: mpsc::Receiver<ChannelEvent>,
    reader: EventReader,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(ChannelEvent::Open) => {
                let Some(inner) = inner.upgrade() else { break };
                inner.on_channel_open(generation, &channel).await;
            }
            Some(ChannelEvent::Message(payload)) => {
                reader.handle_message(&channel, &payload).await;
            }
            Some(ChannelEvent::Closed) | None => {
                if let Some(inner) = inner.upgrade() {
                    inner.on_channel_closed(generation).await;
                }
                break;
            }
        }
    }
    debug!("Channel reader for attempt {} stopped", generation);
}

/// Builder for [`RealtimeSession`].
pub struct RealtimeSessionBuilder {
    config: ClientConfig,
    stack: TransportStack,
    catalog_cache: Option<Arc<ToolCatalogCache>>,
    http: Option<reqwest::Client>,
}

impl RealtimeSessionBuilder {
    /// Share a tool catalog cache with other sessions.
    pub fn catalog_cache(mut self, cache: Arc<ToolCatalogCache>) -> Self {
        self.catalog_cache = Some(cache);
        self
    }

    /// Use an existing HTTP client for backend and signaling requests.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> SessionResult<RealtimeSession> {
        self.config
            .validate()
            .map_err(|e| SessionError::InvalidConfiguration(e.to_string()))?;

        let backend = match self.http {
            Some(http) => BackendClient::with_http_client(http, self.config.backend_base_url.clone()),
            None => BackendClient::from_config(&self.config)?,
        };
        let negotiator = TransportNegotiator::new(
            backend.http().clone(),
            self.stack,
            self.config.deployment.clone(),
            self.config.data_channel_label.clone(),
        );

        let state = Arc::new(StateHandle::new());
        let callbacks = Arc::new(SessionCallbacks::default());
        let transcript = Transcript::new();
        let visuals = VisualState::new();
        let dispatcher = Arc::new(ToolDispatcher::new(
            state.clone(),
            backend.clone(),
            transcript.clone(),
            visuals.clone(),
            callbacks.clone(),
            self.config.tool_timeout(),
        ));

        Ok(RealtimeSession {
            inner: Arc::new(SessionInner {
                config: self.config,
                backend,
                catalog_cache: self.catalog_cache.unwrap_or_default(),
                negotiator,
                state,
                callbacks,
                transcript,
                visuals,
                dispatcher,
                customer: RwLock::new(None),
                catalog: ArcSwapOption::empty(),
                active: Mutex::new(None),
            }),
        })
    }
}

/// Realtime voice/text session with the conversational AI endpoint.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct RealtimeSession {
    inner: Arc<SessionInner>,
}

impl fmt::Debug for RealtimeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeSession")
            .field("state", &self.state())
            .field("transcript", &self.inner.transcript)
            .finish_non_exhaustive()
    }
}

impl RealtimeSession {
    pub fn builder(config: ClientConfig, stack: TransportStack) -> RealtimeSessionBuilder {
        RealtimeSessionBuilder {
            config,
            stack,
            catalog_cache: None,
            http: None,
        }
    }

    pub fn new(config: ClientConfig, stack: TransportStack) -> SessionResult<Self> {
        Self::builder(config, stack).build()
    }

    // -------------------------------------------------------------------------
    // Callbacks
    // -------------------------------------------------------------------------

    pub fn on_state_change(&self, callback: StateCallback) {
        self.inner.callbacks.set_state(callback);
    }

    pub fn on_message(&self, callback: MessageCallback) {
        self.inner.transcript.set_on_message(callback);
    }

    pub fn on_visual_update(&self, callback: VisualCallback) {
        self.inner.visuals.set_on_update(callback);
    }

    pub fn on_error(&self, callback: ErrorCallback) {
        self.inner.callbacks.set_error(callback);
    }

    pub fn on_products_discovered(&self, callback: ProductsCallback) {
        self.inner.callbacks.set_products(callback);
    }

    pub fn on_cart_updated(&self, callback: CartCallback) {
        self.inner.callbacks.set_cart(callback);
    }

    pub fn on_recommendations(&self, callback: RecommendationsCallback) {
        self.inner.callbacks.set_recommendations(callback);
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().status == SessionStatus::Connected
    }

    /// Transcript in append order.
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.inner.transcript.snapshot()
    }

    /// Empty the transcript ("clear chat").
    pub fn clear_transcript(&self) {
        self.inner.transcript.clear();
    }

    /// The live visual directive, if any.
    pub fn current_visual(&self) -> Option<Arc<VisualConfig>> {
        self.inner.visuals.current()
    }

    pub fn customer_context(&self) -> Option<CustomerContext> {
        self.inner.customer.read().clone()
    }

    /// Local capture track of the current session, e.g. for voice activity display.
    pub fn local_audio_track(&self) -> Option<Arc<dyn LocalAudioTrack>> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|active| active.local_track.clone())
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start a session.
    ///
    /// A no-op while a session is connecting or connected. On failure the
    /// state reverts to idle and the error is returned.
    pub async fn start_session(&self) -> SessionResult<()> {
        let inner = &self.inner;
        let Some(generation) = inner.state.begin() else {
            info!(
                "Ignoring start_session: session already {}",
                inner.state.get().status
            );
            return Ok(());
        };

        let leftover = inner.active.lock().take();
        if let Some(previous) = leftover {
            previous.shutdown().await;
        }
        inner.customer.write().take();
        inner.notify_state().await;
        info!("Starting realtime session (attempt {})", generation);

        match inner.connect(generation).await {
            Ok(active) => {
                let stale = {
                    let mut slot = inner.active.lock();
                    if inner.state.is_current(generation) {
                        *slot = Some(active);
                        None
                    } else {
                        Some(active)
                    }
                };
                if let Some(active) = stale {
                    active.shutdown().await;
                    return Err(SessionError::Start(
                        "Session was ended before the transport was ready".to_string(),
                    ));
                }
                Ok(())
            }
            Err(e) => {
                error!("Error starting session: {}", e);
                let reverted = inner.state.update(generation, |state| {
                    state.status = SessionStatus::Idle;
                    state.is_processing = false;
                    true
                });
                if reverted {
                    inner.customer.write().take();
                    inner.notify_state().await;
                }
                Err(e)
            }
        }
    }

    /// End the session and release every resource. A no-op when idle.
    pub async fn end_session(&self) {
        let inner = &self.inner;
        let idle = inner.state.get().status == SessionStatus::Idle;
        inner.state.invalidate();
        let active = inner.active.lock().take();

        if idle && active.is_none() {
            debug!("end_session ignored: no active session");
            return;
        }

        if let Some(active) = active {
            active.shutdown().await;
        }
        inner.customer.write().take();

        if inner.state.replace(SessionState::default()) {
            inner.notify_state().await;
        }
        info!("Session closed.");
    }

    // -------------------------------------------------------------------------
    // Controls
    // -------------------------------------------------------------------------

    /// Toggle the local microphone. Returns the new muted state.
    ///
    /// Purely local: nothing is sent to the remote endpoint.
    pub fn toggle_mute(&self) -> SessionResult<bool> {
        let track = self
            .local_audio_track()
            .ok_or(SessionError::NotConnected)?;

        let enabled = !track.is_enabled();
        track.set_enabled(enabled);
        let muted = !enabled;
        self.inner.state.modify(|state| {
            if state.is_muted == muted {
                return false;
            }
            state.is_muted = muted;
            true
        });
        info!("Microphone {}", if muted { "muted" } else { "unmuted" });
        Ok(muted)
    }

    /// Toggle spoken responses and resend `session.update` with the new
    /// modality set. Returns the new setting.
    pub async fn toggle_voice_response(&self) -> SessionResult<bool> {
        let channel = self.inner.connected_channel()?;

        let mut enabled = false;
        self.inner.state.modify(|state| {
            state.voice_response_enabled = !state.voice_response_enabled;
            enabled = state.voice_response_enabled;
            true
        });

        let event = self.inner.session_update(enabled);
        let sent: SessionResult<()> = async { channel.send_text(event.to_json()?).await }.await;
        if let Err(e) = sent {
            warn!("Failed to resend session.update: {}", e);
            self.inner.state.modify(|state| {
                state.voice_response_enabled = !enabled;
                true
            });
            return Err(e);
        }
        info!(
            "{}",
            if enabled {
                "Voice responses enabled"
            } else {
                "Voice responses disabled (text only)"
            }
        );
        Ok(enabled)
    }

    /// Send a typed user message and request a response.
    pub async fn send_text_message(&self, text: &str) -> SessionResult<()> {
        let channel = self.inner.connected_channel()?;
        if text.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                "Please enter a message before sending.".to_string(),
            ));
        }

        self.inner.state.modify(|state| {
            if state.is_processing {
                return false;
            }
            state.is_processing = true;
            true
        });

        let item = ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text(text),
        };
        let sent: SessionResult<()> = async {
            channel.send_text(item.to_json()?).await?;
            channel
                .send_text(ClientEvent::ResponseCreate.to_json()?)
                .await
        }
        .await;

        if let Err(e) = sent {
            self.inner.state.modify(|state| {
                let changed = state.is_processing;
                state.is_processing = false;
                changed
            });
            return Err(e);
        }

        self.inner.transcript.append(ChatMessage::user(text)).await;
        debug!("Sent user text ({} chars)", text.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value, json};

    fn recommendation(savings: Option<f64>) -> Recommendation {
        Recommendation {
            recommendation_type: "upgrade".to_string(),
            priority: "high".to_string(),
            title: "Upgrade to 5G".to_string(),
            talking_point: "Faster data".to_string(),
            estimated_savings: savings,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::Connecting.to_string(), "connecting");
        assert!(SessionStatus::Connected.is_active());
        assert!(!SessionStatus::Ended.is_active());
    }

    #[test]
    fn test_state_serializes_camel_case() {
        let value = serde_json::to_value(SessionState::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "idle",
                "isMuted": false,
                "voiceResponseEnabled": false,
                "isProcessing": false
            })
        );
    }

    #[test]
    fn test_begin_claims_once() {
        let state = StateHandle::new();
        let first = state.begin().unwrap();
        assert!(state.begin().is_none());
        assert_eq!(state.get().status, SessionStatus::Connecting);
        assert!(state.is_current(first));

        state.invalidate();
        assert!(!state.is_current(first));
        assert!(!state.update(first, |s| {
            s.status = SessionStatus::Connected;
            true
        }));
        assert_eq!(state.get().status, SessionStatus::Connecting);
    }

    #[test]
    fn test_begin_clears_mute() {
        let state = StateHandle::new();
        state.modify(|s| {
            s.status = SessionStatus::Ended;
            s.is_muted = true;
            s.voice_response_enabled = true;
            true
        });
        state.begin().unwrap();
        let current = state.get();
        assert!(!current.is_muted);
        assert!(current.voice_response_enabled);
    }

    #[test]
    fn test_begin_from_ended() {
        let state = StateHandle::new();
        state.modify(|s| {
            s.status = SessionStatus::Ended;
            true
        });
        assert!(state.begin().is_some());
    }

    #[test]
    fn test_replace_reports_change() {
        let state = StateHandle::new();
        assert!(!state.replace(SessionState::default()));
        let mut rx = state.subscribe();
        assert!(state.replace(SessionState {
            is_muted: true,
            ..Default::default()
        }));
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_customer_context_block() {
        let context = CustomerContext {
            name: Some("Sam".to_string()),
            recommendations: vec![recommendation(Some(12.5))],
        };
        let block = context.instructions_block().unwrap();
        assert!(block.starts_with("\n\n## CURRENT CUSTOMER CONTEXT\n\nYou are speaking with Sam."));
        assert!(block.contains("- Type: upgrade\n- Priority: high\n- Title: Upgrade to 5G\n"));
        assert!(block.contains("- Talking Point: Faster data\n- Potential Savings: £12.5/month\n"));
        assert!(block.ends_with("following the proactive nudging guidelines above."));
    }

    #[test]
    fn test_customer_context_requires_name() {
        let context = CustomerContext {
            name: None,
            recommendations: vec![recommendation(None)],
        };
        assert!(context.instructions_block().is_none());

        let context = CustomerContext {
            name: Some("Sam".to_string()),
            recommendations: vec![recommendation(None)],
        };
        assert!(!context.instructions_block().unwrap().contains("Savings"));
    }

    #[test]
    fn test_build_session_update() {
        let config = ClientConfig {
            instructions: "Base".to_string(),
            ..Default::default()
        };
        let catalog: ToolCatalog = serde_json::from_value(json!({
            "tools": [{"name": "get_cart_summary"}],
            "tool_choice": "auto"
        }))
        .unwrap();

        let event = build_session_update(&config, None, Some(&catalog), true);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["session"]["instructions"], "Base");
        assert_eq!(value["session"]["modalities"], json!(["text", "audio"]));
        assert_eq!(value["session"]["tools"][0]["name"], "get_cart_summary");
        assert_eq!(value["session"]["tool_choice"], "auto");

        let event = build_session_update(&config, None, Some(&ToolCatalog::default()), false);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["session"]["modalities"], json!(["text"]));
        assert_eq!(value["session"].get("tools"), None::<&Value>);
    }
}
