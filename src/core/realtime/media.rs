//! Channel-backed media endpoints.
//!
//! Host applications own the actual audio devices. They push encoded capture
//! frames into a [`ChannelAudioSource`] and receive remote audio from a
//! [`ForwardingAudioOutput`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::base::{
    AudioFrame, AudioOutput, LocalAudioTrack, MediaSource, PlaybackSink, RemoteAudioTrack,
};
use crate::errors::{SessionError, SessionResult};

/// Capacity of capture and playback queues.
pub const MEDIA_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Local Capture
// =============================================================================

/// Local capture track fed by an mpsc queue of encoded frames.
pub struct CapturedAudioTrack {
    id: String,
    enabled: AtomicBool,
    stopped: AtomicBool,
    frames: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl CapturedAudioTrack {
    pub fn new(frames: mpsc::Receiver<AudioFrame>) -> Self {
        Self {
            id: format!("audio-{}", Uuid::new_v4()),
            enabled: AtomicBool::new(true),
            stopped: AtomicBool::new(false),
            frames: Mutex::new(Some(frames)),
        }
    }
}

impl LocalAudioTrack for CapturedAudioTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            // Dropping the receiver tells the producer capture has ended.
            self.frames.lock().take();
            debug!("Stopped local audio track {}", self.id);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn take_frames(&self) -> Option<mpsc::Receiver<AudioFrame>> {
        if self.is_stopped() {
            return None;
        }
        self.frames.lock().take()
    }
}

/// Media source backed by a frame queue the application writes into.
///
/// Each capture queue backs one track. Call [`ChannelAudioSource::replenish`]
/// before starting another session.
pub struct ChannelAudioSource {
    pending: Mutex<Option<mpsc::Receiver<AudioFrame>>>,
}

impl ChannelAudioSource {
    /// Create a source and the sender the application feeds frames into.
    pub fn new() -> (Self, mpsc::Sender<AudioFrame>) {
        let (tx, rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        (
            Self {
                pending: Mutex::new(Some(rx)),
            },
            tx,
        )
    }

    /// Install a fresh capture queue, returning its sender.
    pub fn replenish(&self) -> mpsc::Sender<AudioFrame> {
        let (tx, rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        *self.pending.lock() = Some(rx);
        tx
    }
}

#[async_trait]
impl MediaSource for ChannelAudioSource {
    async fn acquire_audio(&self) -> SessionResult<Arc<dyn LocalAudioTrack>> {
        let frames = self.pending.lock().take().ok_or_else(|| {
            SessionError::MediaAcquisition("No audio capture device available".to_string())
        })?;
        let track = CapturedAudioTrack::new(frames);
        info!("Acquired local audio track {}", track.id());
        Ok(Arc::new(track))
    }
}

// =============================================================================
// Playback
// =============================================================================

/// Audio output forwarding remote payloads to an application queue.
pub struct ForwardingAudioOutput {
    tx: mpsc::Sender<Bytes>,
}

impl ForwardingAudioOutput {
    /// Create an output and the receiver of remote audio payloads.
    pub fn new() -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }
}

impl AudioOutput for ForwardingAudioOutput {
    fn open_sink(&self) -> SessionResult<Arc<dyn PlaybackSink>> {
        Ok(Arc::new(ForwardingSink {
            tx: self.tx.clone(),
            cancel: CancellationToken::new(),
            current: Mutex::new(None),
            released: AtomicBool::new(false),
        }))
    }
}

struct ForwardingSink {
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    current: Mutex<Option<CancellationToken>>,
    released: AtomicBool,
}

impl PlaybackSink for ForwardingSink {
    fn attach(&self, track: Arc<dyn RemoteAudioTrack>) {
        if self.is_released() {
            debug!("Ignoring remote track {} on released sink", track.id());
            return;
        }

        let token = self.cancel.child_token();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        let tx = self.tx.clone();
        info!("Attached remote audio track {}", track.id());
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    payload = track.next_payload() => match payload {
                        Some(payload) => {
                            if tx.send(payload).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
            debug!("Remote audio forwarding stopped for {}", track.id());
        });
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.cancel.cancel();
            debug!("Released playback sink");
        }
    }

    fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Releases a playback sink when dropped.
pub struct SinkGuard {
    sink: Arc<dyn PlaybackSink>,
}

impl SinkGuard {
    pub fn new(sink: Arc<dyn PlaybackSink>) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &Arc<dyn PlaybackSink> {
        &self.sink
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        self.sink.release();
    }
}
