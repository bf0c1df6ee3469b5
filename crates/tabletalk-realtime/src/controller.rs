//! Voice session lifecycle.
//!
//! One controller owns at most one live session: the peer connection, the
//! data channel, and the pump task draining it. Status moves
//! `Idle → Connecting → Connected → Idle`, with every failure during
//! `Connecting` falling back to `Idle`. A generation counter is bound to
//! each connect attempt so a disconnect racing an in-flight connect can
//! never be resurrected by the stale attempt finishing late.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::SecretString;
use tabletalk_types::SessionConfig;
use tabletalk_types::events::client::{
    ConversationItem, ConversationItemCreateEvent, ResponseCreateEvent,
};
use tabletalk_types::ClientEvent;
use tokio::sync::mpsc;

use crate::SessionEvent;
use crate::decoder;
use crate::provider::VoiceProvider;
use crate::signaling::{
    ChannelHandle, ChannelNotice, ChannelState, IceConfig, PeerSession, SignalingGateway,
};

const DATA_CHANNEL_LABEL: &str = "oai-events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// A session was already connecting or connected; the call did nothing.
    AlreadyActive,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("microphone permission denied")]
    MicrophoneDenied,
    #[error("no local audio track could be acquired")]
    NoAudioTrack,
    #[error("local offer is missing an audio section")]
    OfferMissingAudio,
    #[error("connect canceled by a concurrent disconnect")]
    Canceled,
    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

fn step(step: &'static str) -> impl FnOnce(anyhow::Error) -> ConnectError {
    move |source| ConnectError::Step { step, source }
}

struct Shared {
    status: SessionStatus,
    peer: Option<Box<dyn PeerSession>>,
    channel: Option<Arc<dyn ChannelHandle>>,
    pump: Option<tokio::task::JoinHandle<()>>,
}

pub struct VoiceSessionController {
    gateway: Arc<dyn SignalingGateway>,
    provider: Arc<dyn VoiceProvider>,
    config: SessionConfig,
    ice: IceConfig,
    events_tx: mpsc::Sender<SessionEvent>,
    shared: Mutex<Shared>,
    generation: AtomicU64,
}

impl VoiceSessionController {
    pub fn new(
        gateway: Arc<dyn SignalingGateway>,
        provider: Arc<dyn VoiceProvider>,
        config: SessionConfig,
        ice: IceConfig,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            gateway,
            provider,
            config,
            ice,
            events_tx,
            shared: Mutex::new(Shared {
                status: SessionStatus::Idle,
                peer: None,
                channel: None,
                pump: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    fn lock_shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stale(&self, my_generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) != my_generation
    }

    pub fn status(&self) -> SessionStatus {
        self.lock_shared().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Connected
    }

    /// Establishes the session. A no-op while one is already connecting
    /// or connected; on any failure the controller is back at `Idle` with
    /// no peer or channel left behind.
    pub async fn connect(&self) -> Result<ConnectOutcome, ConnectError> {
        let my_generation = {
            let mut shared = self.lock_shared();
            if shared.status != SessionStatus::Idle {
                tracing::debug!("connect ignored; session is {:?}", shared.status);
                return Ok(ConnectOutcome::AlreadyActive);
            }
            shared.status = SessionStatus::Connecting;
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        match self.run_connect(my_generation).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                tracing::warn!("voice connect failed: {error}");
                self.abort_connect(my_generation);
                Err(error)
            }
        }
    }

    async fn run_connect(&self, my_generation: u64) -> Result<ConnectOutcome, ConnectError> {
        let granted = self
            .gateway
            .request_microphone()
            .await
            .map_err(step("microphone request"))?;
        if !granted {
            return Err(ConnectError::MicrophoneDenied);
        }

        let credential = self
            .provider
            .create_session_credential()
            .await
            .map_err(step("session credential"))?;
        if self.is_stale(my_generation) {
            return Err(ConnectError::Canceled);
        }

        let peer = self
            .gateway
            .create_peer(&self.ice)
            .await
            .map_err(step("peer connection"))?;

        let (channel, notices) = match self.negotiate(my_generation, &*peer, &credential).await {
            Ok(pair) => pair,
            Err(error) => {
                peer.close().await;
                return Err(error);
            }
        };

        // Commit only if no disconnect (or newer connect) got in first.
        let mut peer_slot = Some(peer);
        let mut channel_slot = Some(channel);
        let committed = {
            let mut shared = self.lock_shared();
            if self.is_stale(my_generation) || shared.status != SessionStatus::Connecting {
                false
            } else if let Some(channel) = channel_slot.take() {
                shared.pump = Some(tokio::spawn(decoder::run_channel_pump(
                    notices,
                    Arc::clone(&channel),
                    self.config.clone(),
                    self.events_tx.clone(),
                )));
                shared.peer = peer_slot.take();
                shared.channel = Some(channel);
                shared.status = SessionStatus::Connected;
                true
            } else {
                false
            }
        };

        if !committed {
            if let Some(channel) = channel_slot {
                channel.close().await;
            }
            if let Some(peer) = peer_slot {
                peer.close().await;
            }
            return Err(ConnectError::Canceled);
        }

        tracing::info!("voice session connected");
        Ok(ConnectOutcome::Connected)
    }

    async fn negotiate(
        &self,
        my_generation: u64,
        peer: &dyn PeerSession,
        credential: &SecretString,
    ) -> Result<(Arc<dyn ChannelHandle>, mpsc::Receiver<ChannelNotice>), ConnectError> {
        let tracks = peer.add_local_audio().await.map_err(step("local audio"))?;
        if tracks == 0 {
            return Err(ConnectError::NoAudioTrack);
        }

        let gateway = Arc::clone(&self.gateway);
        peer.on_remote_track(Box::new(move || gateway.start_audio_route()));

        let (channel, notices) = peer
            .create_channel(DATA_CHANNEL_LABEL)
            .await
            .map_err(step("data channel"))?;

        let offer = peer.create_offer().await.map_err(step("offer"))?;
        if !offer.contains("m=audio") {
            return Err(ConnectError::OfferMissingAudio);
        }

        peer.set_local_description(&offer)
            .await
            .map_err(step("local description"))?;

        let answer = self
            .provider
            .exchange_offer(credential, &offer)
            .await
            .map_err(step("answer exchange"))?;
        if self.is_stale(my_generation) {
            return Err(ConnectError::Canceled);
        }

        peer.set_remote_description(&answer)
            .await
            .map_err(step("remote description"))?;

        Ok((channel, notices))
    }

    fn abort_connect(&self, my_generation: u64) {
        let mut shared = self.lock_shared();
        if !self.is_stale(my_generation) && shared.status == SessionStatus::Connecting {
            shared.status = SessionStatus::Idle;
        }
    }

    /// Tears the session down. Idempotent, and safe to call while a
    /// connect is in flight: the generation bump makes the stale attempt
    /// cancel itself instead of resurrecting the session.
    pub async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let (peer, channel, pump) = {
            let mut shared = self.lock_shared();
            shared.status = SessionStatus::Idle;
            (shared.peer.take(), shared.channel.take(), shared.pump.take())
        };

        if let Some(channel) = channel {
            channel.close().await;
        }
        if let Some(peer) = peer {
            peer.close().await;
        }
        if let Some(pump) = pump {
            pump.abort();
        }
        self.gateway.stop_audio_route();
        tracing::info!("voice session disconnected");
    }

    fn open_channel(&self) -> Option<Arc<dyn ChannelHandle>> {
        let shared = self.lock_shared();
        match &shared.channel {
            Some(channel) if channel.ready_state() == ChannelState::Open => {
                Some(Arc::clone(channel))
            }
            _ => None,
        }
    }

    /// The two-message send protocol: a conversation item carrying the
    /// text, then a response request. Fire-and-forget; a channel that is
    /// not open reports as `false`, never as an error.
    async fn send_two_part(&self, item: ConversationItem, response: ResponseCreateEvent) -> bool {
        let Some(channel) = self.open_channel() else {
            tracing::warn!("dropping outbound turn; data channel not open");
            return false;
        };

        let events = [
            ClientEvent::ConversationItemCreate(ConversationItemCreateEvent::new(item)),
            ClientEvent::ResponseCreate(response),
        ];
        for event in events {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(error) => {
                    tracing::error!("failed to serialize outbound event: {error}");
                    return false;
                }
            };
            if let Err(error) = channel.send(&text).await {
                tracing::warn!("failed to send outbound event: {error:#}");
                return false;
            }
        }
        true
    }

    /// Sends one user text turn and asks for a spoken and written reply.
    pub async fn send_user_turn(&self, text: &str) -> bool {
        self.send_two_part(
            ConversationItem::user_text(text),
            ResponseCreateEvent::new(vec!["text".to_string(), "audio".to_string()]),
        )
        .await
    }

    /// Sends one context turn (e.g. an image description) and asks for an
    /// audio-only reply steered by `instructions`.
    pub async fn send_context_turn(&self, text: &str, instructions: &str) -> bool {
        self.send_two_part(
            ConversationItem::user_text(text),
            ResponseCreateEvent::new(vec!["audio".to_string()]).with_instructions(instructions),
        )
        .await
    }
}
