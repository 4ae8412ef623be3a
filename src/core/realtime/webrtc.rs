//! WebRTC transport (webrtc-rs).
//!
//! Implements [`PeerConnector`], [`PeerTransport`] and [`DataChannel`] on top
//! of an `RTCPeerConnection`. Local audio frames must be Opus encoded.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use super::base::{
    CHANNEL_EVENT_CAPACITY, ChannelEvent, DataChannel, LocalAudioTrack, LogicalChannel,
    PeerConnector, PeerTransport, RemoteAudioTrack, RemoteTrackHandler, SdpKind,
    SessionDescription,
};
use crate::errors::{SessionError, SessionResult};

fn transport_error(e: webrtc::Error) -> SessionError {
    SessionError::Transport(e.to_string())
}

// =============================================================================
// Connector
// =============================================================================

/// Creates WebRTC peer connections.
#[derive(Debug, Clone, Default)]
pub struct WebRtcConnector {
    ice_servers: Vec<String>,
}

impl WebRtcConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given STUN/TURN URLs.
    pub fn with_ice_servers(mut self, urls: Vec<String>) -> Self {
        self.ice_servers = urls;
        self
    }
}

#[async_trait]
impl PeerConnector for WebRtcConnector {
    async fn create_peer(&self) -> SessionResult<Arc<dyn PeerTransport>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(transport_error)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(transport_error)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if self.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(transport_error)?;

        Ok(Arc::new(WebRtcPeer::new(Arc::new(pc))))
    }
}

// =============================================================================
// Peer
// =============================================================================

/// WebRTC peer connection.
pub struct WebRtcPeer {
    pc: Arc<RTCPeerConnection>,
    remote_handler: Arc<RwLock<Option<RemoteTrackHandler>>>,
}

impl WebRtcPeer {
    fn new(pc: Arc<RTCPeerConnection>) -> Self {
        let remote_handler: Arc<RwLock<Option<RemoteTrackHandler>>> = Arc::new(RwLock::new(None));

        let handler = remote_handler.clone();
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
            let handler = handler.read().clone();
            Box::pin(async move {
                if track.kind() != RTPCodecType::Audio {
                    return;
                }
                match handler {
                    Some(handler) => handler(Arc::new(WebRtcRemoteTrack {
                        id: track.id(),
                        track,
                    })),
                    None => debug!("Remote audio track arrived without a handler"),
                }
            })
        }));

        Self { pc, remote_handler }
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn add_local_audio(&self, local: Arc<dyn LocalAudioTrack>) -> SessionResult<()> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            local.id().to_string(),
            "voicecare".to_owned(),
        ));

        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(transport_error)?;

        // Drain RTCP so interceptors keep running.
        tokio::spawn(async move {
            let mut buf = vec![0u8; 1500];
            while sender.read(&mut buf).await.is_ok() {}
        });

        let Some(mut frames) = local.take_frames() else {
            warn!("Local audio track {} has no frame stream", local.id());
            return Ok(());
        };

        tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if local.is_stopped() {
                    break;
                }
                if !local.is_enabled() {
                    continue;
                }
                let sample = Sample {
                    data: frame.data,
                    duration: frame.duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    debug!("Stopping local audio writer: {}", e);
                    break;
                }
            }
        });

        Ok(())
    }

    async fn create_data_channel(&self, label: &str) -> SessionResult<LogicalChannel> {
        let dc = self
            .pc
            .create_data_channel(label, None)
            .await
            .map_err(transport_error)?;
        let (tx, events) = mpsc::channel(CHANNEL_EVENT_CAPACITY);

        let open_tx = tx.clone();
        dc.on_open(Box::new(move || {
            let tx = open_tx.clone();
            Box::pin(async move {
                let _ = tx.send(ChannelEvent::Open).await;
            })
        }));

        let message_tx = tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let tx = message_tx.clone();
            Box::pin(async move {
                match String::from_utf8(msg.data.to_vec()) {
                    Ok(text) => {
                        let _ = tx.send(ChannelEvent::Message(text)).await;
                    }
                    Err(e) => warn!("Dropping non UTF-8 channel message: {}", e),
                }
            })
        }));

        dc.on_close(Box::new(move || {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(ChannelEvent::Closed).await;
            })
        }));

        info!("Created data channel '{}'", label);
        Ok(LogicalChannel {
            sender: Arc::new(WebRtcDataChannel {
                label: label.to_string(),
                dc,
            }),
            events,
        })
    }

    async fn create_offer(&self) -> SessionResult<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(transport_error)?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> SessionResult<SessionDescription> {
        let local = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(transport_error)?;

        let mut gathering = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(local)
            .await
            .map_err(transport_error)?;
        let _ = gathering.recv().await;

        let gathered = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| SessionError::Transport("local description missing".to_string()))?;
        Ok(SessionDescription {
            kind: description.kind,
            sdp: gathered.sdp,
        })
    }

    async fn set_remote_description(&self, description: SessionDescription) -> SessionResult<()> {
        let remote = match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp),
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp),
        }
        .map_err(transport_error)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(transport_error)
    }

    fn on_remote_audio(&self, handler: RemoteTrackHandler) {
        *self.remote_handler.write() = Some(handler);
    }

    async fn close(&self) -> SessionResult<()> {
        self.pc.close().await.map_err(transport_error)
    }
}

// =============================================================================
// Data Channel and Remote Track
// =============================================================================

struct WebRtcDataChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, payload: String) -> SessionResult<()> {
        self.dc
            .send_text(payload)
            .await
            .map(|_| ())
            .map_err(transport_error)
    }

    async fn close(&self) -> SessionResult<()> {
        self.dc.close().await.map_err(transport_error)
    }
}

struct WebRtcRemoteTrack {
    id: String,
    track: Arc<TrackRemote>,
}

#[async_trait]
impl RemoteAudioTrack for WebRtcRemoteTrack {
    fn id(&self) -> &str {
        &self.id
    }

    async fn next_payload(&self) -> Option<Bytes> {
        match self.track.read_rtp().await {
            Ok((packet, _attributes)) => Some(packet.payload),
            Err(e) => {
                debug!("Remote track {} ended: {}", self.id, e);
                None
            }
        }
    }
}
