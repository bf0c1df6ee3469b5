pub mod events;
pub mod menu;
pub mod message;
pub mod session;

pub use events::{ClientEvent, EventDecodeError, ServerEvent};
pub use menu::{MenuData, MenuItem};
pub use message::{ChatMessage, MessageId, MessageKind, QueryPayload, QueryTopic};
pub use session::{AudioFormat, SessionConfig, TranscriptionModel, Voice};
