pub mod client;
pub mod server;

use client::*;
use server::*;

/// Events the client sends over the data channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate(SessionUpdateEvent),
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate(ConversationItemCreateEvent),
    #[serde(rename = "response.create")]
    ResponseCreate(ResponseCreateEvent),
}

/// Events the voice provider sends over the data channel, keyed by the
/// `type` string. Tags outside this vocabulary decode to `Unknown` so a
/// provider rollout can never crash the decoder.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "error")]
    Error(ErrorEvent),
    #[serde(rename = "session.created")]
    SessionCreated(SessionCreatedEvent),
    #[serde(rename = "session.updated")]
    SessionUpdated(SessionUpdatedEvent),
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted(SpeechStartedEvent),
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped(SpeechStoppedEvent),
    #[serde(rename = "response.content_part.done")]
    ContentPartDone(ContentPartDoneEvent),
    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone(AudioTranscriptDoneEvent),
    #[serde(rename = "response.text.done")]
    TextDone(TextDoneEvent),
    #[serde(rename = "response.done")]
    ResponseDone(ResponseDoneEvent),
    #[serde(skip)]
    Unknown { event_type: String },
}

const KNOWN_TAGS: &[&str] = &[
    "error",
    "session.created",
    "session.updated",
    "input_audio_buffer.speech_started",
    "input_audio_buffer.speech_stopped",
    "response.content_part.done",
    "response.audio_transcript.done",
    "response.text.done",
    "response.done",
];

#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("malformed event JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("event has no string `type` field")]
    MissingType,
    #[error("bad payload for `{event_type}` event: {source}")]
    Payload {
        event_type: String,
        source: serde_json::Error,
    },
}

impl ServerEvent {
    /// Decodes one inbound data-channel message. Unrecognized tags come
    /// back as `Unknown`; only malformed JSON or a bad payload for a
    /// known tag is an error, and callers drop the single event either way.
    pub fn decode(text: &str) -> Result<Self, EventDecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let tag = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(EventDecodeError::MissingType)?
            .to_string();

        if !KNOWN_TAGS.contains(&tag.as_str()) {
            return Ok(ServerEvent::Unknown { event_type: tag });
        }

        serde_json::from_value(value).map_err(|source| EventDecodeError::Payload {
            event_type: tag,
            source,
        })
    }
}
