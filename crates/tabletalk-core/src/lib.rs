pub mod chat_log;
pub mod completion;
pub mod geo;
pub mod intent;
pub mod menu_extract;
pub mod orchestrator;
pub mod order;
pub mod search;
pub mod vision;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// A handle onto the open voice session, as far as the rest of the
/// application is allowed to see it. The session controller is the only
/// writer of connection state; everything else talks through this trait,
/// which also keeps the orchestrator testable without a live channel.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// Whether a data channel is currently open.
    fn is_connected(&self) -> bool;

    /// Sends one user text turn and requests a spoken+written reply.
    /// Returns false when the channel is not open; never errors.
    async fn send_user_turn(&self, text: &str) -> bool;

    /// Sends one context turn (e.g. an image description) and requests an
    /// audio-only reply steered by `instructions`. Same send semantics as
    /// [`VoiceLink::send_user_turn`].
    async fn send_context_turn(&self, text: &str, instructions: &str) -> bool;
}
