//! `webrtc`-crate implementation of the signaling boundary.
//!
//! ICE/STUN negotiation, DTLS, and SCTP all live inside the webrtc stack;
//! this module only wires its handles into the trait surface the session
//! controller owns. Audio capture into the local track is the platform
//! audio layer's job and is out of scope here.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use cpal::traits::HostTrait;
use tokio::sync::mpsc;
use webrtc::api::APIBuilder;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MediaEngine};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use crate::signaling::{
    ChannelHandle, ChannelNotice, ChannelState, IceConfig, PeerSession, SignalingGateway,
};

const NOTICE_CAPACITY: usize = 256;

pub struct WebRtcGateway;

impl WebRtcGateway {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WebRtcGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingGateway for WebRtcGateway {
    async fn request_microphone(&self) -> Result<bool> {
        // On desktop there is no permission prompt; having a default
        // input device is the grant.
        let host = cpal::default_host();
        Ok(host.default_input_device().is_some())
    }

    async fn create_peer(&self, config: &IceConfig) -> Result<Box<dyn PeerSession>> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .context("failed to register media codecs")?;

        let api = APIBuilder::new().with_media_engine(media).build();
        let rtc_config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let peer = api
            .new_peer_connection(rtc_config)
            .await
            .context("failed to create peer connection")?;

        Ok(Box::new(WebRtcPeer {
            peer: Arc::new(peer),
        }))
    }

    fn start_audio_route(&self) {
        // Platform audio routing (speakerphone) is a no-op on desktop;
        // the marker lines keep session timelines diagnosable.
        tracing::info!("audio route: speakerphone engaged");
    }

    fn stop_audio_route(&self) {
        tracing::info!("audio route: released");
    }
}

struct WebRtcPeer {
    peer: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerSession for WebRtcPeer {
    async fn add_local_audio(&self) -> Result<usize> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "tabletalk-mic".to_owned(),
        ));

        self.peer
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .context("failed to attach local audio track")?;

        Ok(1)
    }

    fn on_remote_track(&self, handler: Box<dyn Fn() + Send + Sync>) {
        let handler = Arc::new(handler);
        self.peer
            .on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
                tracing::debug!("remote track arrived: {}", track.kind());
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    handler();
                })
            }));
    }

    async fn create_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ChannelHandle>, mpsc::Receiver<ChannelNotice>)> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let channel = self
            .peer
            .create_data_channel(label, Some(init))
            .await
            .context("failed to create data channel")?;

        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CAPACITY);

        let tx = notice_tx.clone();
        channel.on_open(Box::new(move || {
            forward(&tx, ChannelNotice::Open);
            Box::pin(async {})
        }));

        let tx = notice_tx.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            match String::from_utf8(message.data.to_vec()) {
                Ok(text) => forward(&tx, ChannelNotice::Message(text)),
                Err(error) => tracing::warn!("non-UTF8 data channel message dropped: {error}"),
            }
            Box::pin(async {})
        }));

        let tx = notice_tx.clone();
        channel.on_error(Box::new(move |error: webrtc::Error| {
            forward(&tx, ChannelNotice::Error(error.to_string()));
            Box::pin(async {})
        }));

        let tx = notice_tx;
        channel.on_close(Box::new(move || {
            forward(&tx, ChannelNotice::Closed);
            Box::pin(async {})
        }));

        Ok((Arc::new(WebRtcChannel { channel }), notice_rx))
    }

    async fn create_offer(&self) -> Result<String> {
        let offer = self
            .peer
            .create_offer(None)
            .await
            .context("failed to create offer")?;
        Ok(offer.sdp)
    }

    async fn set_local_description(&self, sdp: &str) -> Result<()> {
        let description = RTCSessionDescription::offer(sdp.to_string())
            .context("offer SDP did not parse")?;
        self.peer
            .set_local_description(description)
            .await
            .context("failed to set local description")?;
        Ok(())
    }

    async fn set_remote_description(&self, sdp: &str) -> Result<()> {
        let description = RTCSessionDescription::answer(sdp.to_string())
            .context("answer SDP did not parse")?;
        self.peer
            .set_remote_description(description)
            .await
            .context("failed to set remote description")?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(error) = self.peer.close().await {
            tracing::warn!("peer connection close reported: {error}");
        }
    }
}

fn forward(tx: &mpsc::Sender<ChannelNotice>, notice: ChannelNotice) {
    if let Err(error) = tx.try_send(notice) {
        tracing::warn!("channel notice dropped: {error}");
    }
}

struct WebRtcChannel {
    channel: Arc<RTCDataChannel>,
}

#[async_trait]
impl ChannelHandle for WebRtcChannel {
    fn ready_state(&self) -> ChannelState {
        match self.channel.ready_state() {
            RTCDataChannelState::Connecting => ChannelState::Connecting,
            RTCDataChannelState::Open => ChannelState::Open,
            RTCDataChannelState::Closing => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.channel
            .send_text(text.to_string())
            .await
            .context("data channel send failed")?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(error) = self.channel.close().await {
            tracing::warn!("data channel close reported: {error}");
        }
    }
}
