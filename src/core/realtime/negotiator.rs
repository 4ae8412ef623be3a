//! Transport negotiation.
//!
//! Opens the peer connection, attaches local audio, creates the logical
//! channel and exchanges SDP with the signaling endpoint over HTTP.

use std::fmt;
use std::sync::Arc;

use http::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use super::base::{
    LocalAudioTrack, LogicalChannel, PeerTransport, SessionDescription, TransportStack,
};
use super::media::SinkGuard;
use crate::core::backend::EphemeralKey;
use crate::errors::{SessionError, SessionResult};

/// Content type of SDP bodies.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Resources of a successfully negotiated transport.
///
/// Exclusively owned by one session attempt.
pub struct NegotiatedTransport {
    pub peer: Arc<dyn PeerTransport>,
    pub channel: LogicalChannel,
    pub local_track: Arc<dyn LocalAudioTrack>,
    /// Playback sink, released when dropped
    pub sink: SinkGuard,
}

impl fmt::Debug for NegotiatedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiatedTransport")
            .field("channel", &self.channel)
            .field("local_track", &self.local_track.id())
            .finish_non_exhaustive()
    }
}

/// Negotiates a realtime transport with the remote endpoint.
pub struct TransportNegotiator {
    http: Client,
    stack: TransportStack,
    deployment: String,
    channel_label: String,
}

impl TransportNegotiator {
    pub fn new(
        http: Client,
        stack: TransportStack,
        deployment: impl Into<String>,
        channel_label: impl Into<String>,
    ) -> Self {
        Self {
            http,
            stack,
            deployment: deployment.into(),
            channel_label: channel_label.into(),
        }
    }

    /// Build `{endpoint}?model=<deployment>`.
    pub fn signaling_url(endpoint: &str, deployment: &str) -> SessionResult<Url> {
        let mut url = Url::parse(endpoint).map_err(|e| SessionError::Negotiation {
            status: None,
            message: format!("invalid signaling URL '{endpoint}': {e}"),
        })?;
        url.query_pairs_mut().append_pair("model", deployment);
        Ok(url)
    }

    /// Negotiate a transport using the ephemeral credential.
    ///
    /// On failure every resource acquired so far is released.
    pub async fn negotiate(
        &self,
        credential: &EphemeralKey,
        endpoint: &str,
    ) -> SessionResult<NegotiatedTransport> {
        let url = Self::signaling_url(endpoint, &self.deployment)?;
        info!("Negotiating WebRTC connection with {}", url.host_str().unwrap_or(endpoint));

        let peer = self.stack.connector.create_peer().await?;
        let sink = match self.stack.audio_output.open_sink() {
            Ok(sink) => SinkGuard::new(sink),
            Err(e) => {
                close_quietly(&peer).await;
                return Err(e);
            }
        };

        let playback = sink.sink().clone();
        peer.on_remote_audio(Arc::new(move |track| playback.attach(track)));

        let local_track = match self.stack.media.acquire_audio().await {
            Ok(track) => track,
            Err(e) => {
                warn!("Local audio capture failed: {}", e);
                close_quietly(&peer).await;
                return Err(match e {
                    SessionError::MediaAcquisition(_) => e,
                    other => SessionError::MediaAcquisition(other.to_string()),
                });
            }
        };

        match self.exchange(&peer, &local_track, &url, credential).await {
            Ok(channel) => {
                info!("WebRTC negotiation complete");
                Ok(NegotiatedTransport {
                    peer,
                    channel,
                    local_track,
                    sink,
                })
            }
            Err(e) => {
                local_track.stop();
                close_quietly(&peer).await;
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        peer: &Arc<dyn PeerTransport>,
        local_track: &Arc<dyn LocalAudioTrack>,
        url: &Url,
        credential: &EphemeralKey,
    ) -> SessionResult<LogicalChannel> {
        peer.add_local_audio(local_track.clone()).await?;

        // The channel must exist before the offer so it is part of the SDP.
        let channel = peer.create_data_channel(&self.channel_label).await?;

        let offer = peer.create_offer().await?;
        let local = peer.set_local_description(offer).await?;
        debug!("Local offer ready ({} bytes)", local.sdp.len());

        let answer = self.post_offer(url, credential, local.sdp).await?;
        peer.set_remote_description(SessionDescription::answer(answer))
            .await?;
        Ok(channel)
    }

    async fn post_offer(
        &self,
        url: &Url,
        credential: &EphemeralKey,
        offer_sdp: String,
    ) -> SessionResult<String> {
        let response = self
            .http
            .post(url.clone())
            .bearer_auth(credential.expose())
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp)
            .send()
            .await
            .map_err(|e| SessionError::Negotiation {
                status: None,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("signaling failed").to_string()
            } else {
                body
            };
            return Err(SessionError::Negotiation {
                status: Some(status.as_u16()),
                message,
            });
        }

        response.text().await.map_err(|e| SessionError::Negotiation {
            status: Some(status.as_u16()),
            message: format!("failed to read SDP answer: {e}"),
        })
    }
}

async fn close_quietly(peer: &Arc<dyn PeerTransport>) {
    if let Err(e) = peer.close().await {
        debug!("Ignoring peer close error: {}", e);
    }
}
