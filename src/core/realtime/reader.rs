//! Event channel reader.
//!
//! Decodes inbound channel messages into [`ServerEvent`]s and routes each one
//! to exactly one handler. Events are handled one at a time, so function calls
//! of a `response.done` are dispatched and answered in request order.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::base::{DataChannel, SessionCallbacks};
use super::dispatcher::ToolDispatcher;
use super::messages::ServerEvent;
use super::session::StateHandle;
use super::transcript::{ChatMessage, Transcript};
use crate::errors::SessionError;

/// Routes inbound events for one session attempt.
pub struct EventReader {
    generation: u64,
    state: Arc<StateHandle>,
    transcript: Transcript,
    dispatcher: Arc<ToolDispatcher>,
    callbacks: Arc<SessionCallbacks>,
}

impl EventReader {
    pub fn new(
        generation: u64,
        state: Arc<StateHandle>,
        transcript: Transcript,
        dispatcher: Arc<ToolDispatcher>,
        callbacks: Arc<SessionCallbacks>,
    ) -> Self {
        Self {
            generation,
            state,
            transcript,
            dispatcher,
            callbacks,
        }
    }

    /// Decode and handle one channel text frame.
    pub async fn handle_message(&self, channel: &Arc<dyn DataChannel>, payload: &str) {
        match ServerEvent::parse(payload) {
            Ok(event) => self.handle_event(channel, event).await,
            Err(e) => warn!("Failed to parse realtime event: {}", e),
        }
    }

    /// Handle one decoded event.
    pub async fn handle_event(&self, channel: &Arc<dyn DataChannel>, event: ServerEvent) {
        debug!("Realtime event: {}", event.kind());

        match &event {
            ServerEvent::SessionError { error } => {
                let message = error
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown session error".to_string());
                error!("Session error: {}", message);
                self.set_processing(false);
                self.callbacks
                    .emit_error(SessionError::Protocol(message), "Session error")
                    .await;
            }
            ServerEvent::SessionEnd => info!("Session ended."),
            ServerEvent::SessionCreated { .. } | ServerEvent::SessionUpdated { .. } => {}
            ServerEvent::TextDelta { .. } => {}
            ServerEvent::TextDone { .. } => {
                if let Some(text) = event.completed_text() {
                    self.transcript.append(ChatMessage::assistant(text)).await;
                }
                self.set_processing(false);
            }
            ServerEvent::AudioTranscriptDelta { delta } => {
                debug!("Transcript delta: {}", delta);
            }
            ServerEvent::AudioTranscriptDone { transcript } => {
                if let Some(text) = transcript.as_deref().filter(|t| !t.is_empty()) {
                    self.transcript.append(ChatMessage::assistant(text)).await;
                }
                self.set_processing(false);
            }
            ServerEvent::InputTranscriptionCompleted { transcript, .. } => {
                if let Some(text) = transcript.as_deref().filter(|t| !t.is_empty()) {
                    self.transcript.append(ChatMessage::user(text)).await;
                }
            }
            ServerEvent::SpeechStarted => {}
            ServerEvent::SpeechStopped => self.set_processing(true),
            ServerEvent::ResponseDone { response } => {
                if let Some(body) = response {
                    for call in body.function_calls() {
                        self.dispatcher.dispatch(self.generation, channel, call).await;
                    }
                }
                self.set_processing(false);
            }
            ServerEvent::Unknown => debug!("Ignoring unhandled realtime event"),
        }
    }

    fn set_processing(&self, processing: bool) {
        self.state.update(self.generation, |state| {
            if state.is_processing == processing {
                return false;
            }
            state.is_processing = processing;
            true
        });
    }
}
