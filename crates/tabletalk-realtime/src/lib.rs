pub mod controller;
pub mod decoder;
pub mod provider;
pub mod signaling;
pub mod webrtc_gateway;

pub use controller::{ConnectError, ConnectOutcome, SessionStatus, VoiceSessionController};
pub use provider::{VoiceProvider, VoiceProviderClient};
pub use signaling::{ChannelHandle, ChannelNotice, ChannelState, IceConfig, PeerSession, SignalingGateway};
pub use webrtc_gateway::WebRtcGateway;

/// Events the open session surfaces to the application. These are the
/// decoder's output: everything else it sees is logged and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// One complete assistant utterance (transcript or text).
    AssistantUtterance(String),
    /// The provider reported an error over the channel.
    ProviderError(String),
    /// The channel closed; the session is over.
    Closed,
}
