//! The signaling/media collaborator boundary.
//!
//! The session controller owns the peer connection and data channel for
//! the lifetime of one session; everything behind these traits is
//! platform plumbing (WebRTC stack, microphone access, audio routing).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
#[cfg(test)]
use mockall::mock;
use tokio::sync::mpsc;

/// ICE configuration: a single public STUN server by default.
#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Notifications from one data channel, delivered in order.
#[derive(Debug)]
pub enum ChannelNotice {
    Open,
    Message(String),
    Error(String),
    Closed,
}

/// Send side of the ordered, reliable message channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    fn ready_state(&self) -> ChannelState;
    async fn send(&self, text: &str) -> Result<()>;
    async fn close(&self);
}

/// One peer connection. Created in `Connecting`, owned exclusively by the
/// session controller, closed on teardown.
//
// NOTE: `#[automock]` cannot be used here because `on_remote_track` takes a
// `Box<dyn Fn() + ...>` argument, which mockall's automock Self-substitution
// rejects (asomers/mockall#139). A hand-written `mock!` block below produces
// the equivalent `MockPeerSession` with the same expectation API.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Attaches the local audio-only media stream and returns the number
    /// of tracks acquired. Zero tracks is fatal to the connect attempt.
    async fn add_local_audio(&self) -> Result<usize>;

    /// Registers the remote-track handler. The controller uses it to flip
    /// platform audio routing once the AI's audio arrives.
    fn on_remote_track(&self, handler: Box<dyn Fn() + Send + Sync>);

    /// Creates the ordered, reliable channel. Notices (open, inbound
    /// messages, errors, close) arrive on the returned receiver.
    async fn create_channel(
        &self,
        label: &str,
    ) -> Result<(Arc<dyn ChannelHandle>, mpsc::Receiver<ChannelNotice>)>;

    async fn create_offer(&self) -> Result<String>;

    async fn set_local_description(&self, sdp: &str) -> Result<()>;

    async fn set_remote_description(&self, sdp: &str) -> Result<()>;

    async fn close(&self);
}

#[cfg(test)]
mock! {
    pub PeerSession {}

    #[async_trait]
    impl PeerSession for PeerSession {
        async fn add_local_audio(&self) -> Result<usize>;
        fn on_remote_track(&self, handler: Box<dyn Fn() + Send + Sync>);
        async fn create_channel(
            &self,
            label: &str,
        ) -> Result<(Arc<dyn ChannelHandle>, mpsc::Receiver<ChannelNotice>)>;
        async fn create_offer(&self) -> Result<String>;
        async fn set_local_description(&self, sdp: &str) -> Result<()>;
        async fn set_remote_description(&self, sdp: &str) -> Result<()>;
        async fn close(&self);
    }
}

/// Platform entry points: permission prompt, peer construction, audio
/// routing.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SignalingGateway: Send + Sync {
    /// Asks the platform for microphone access. `Ok(false)` is a denial.
    async fn request_microphone(&self) -> Result<bool>;

    async fn create_peer(&self, config: &IceConfig) -> Result<Box<dyn PeerSession>>;

    /// Starts speakerphone routing for the session's remote audio.
    fn start_audio_route(&self);

    fn stop_audio_route(&self);
}
