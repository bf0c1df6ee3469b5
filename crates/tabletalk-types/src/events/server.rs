//! Payload structs for inbound data-channel events.

/// Details carried by an `error` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorDetails {
    #[serde(rename = "type")]
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    message: String,
}

impl ErrorDetails {
    pub fn error_type(&self) -> Option<&str> {
        self.error_type.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// `error` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorEvent {
    #[serde(default)]
    event_id: Option<String>,
    error: ErrorDetails,
}

impl ErrorEvent {
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn error(&self) -> &ErrorDetails {
        &self.error
    }
}

/// Subset of the session resource the client cares about.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl SessionResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// `session.created` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionCreatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionCreatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `session.updated` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdatedEvent {
    event_id: String,
    session: SessionResource,
}

impl SessionUpdatedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn session(&self) -> &SessionResource {
        &self.session
    }
}

/// `input_audio_buffer.speech_started` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeechStartedEvent {
    event_id: String,
    /// Milliseconds since the session started when speech was detected.
    #[serde(default)]
    audio_start_ms: Option<i64>,
    #[serde(default)]
    item_id: Option<String>,
}

impl SpeechStartedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn audio_start_ms(&self) -> Option<i64> {
        self.audio_start_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// `input_audio_buffer.speech_stopped` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SpeechStoppedEvent {
    event_id: String,
    #[serde(default)]
    audio_end_ms: Option<i64>,
    #[serde(default)]
    item_id: Option<String>,
}

impl SpeechStoppedEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn audio_end_ms(&self) -> Option<i64> {
        self.audio_end_ms
    }

    pub fn item_id(&self) -> Option<&str> {
        self.item_id.as_deref()
    }
}

/// Content part embedded in a `response.content_part.done` event.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "audio")]
    Audio {
        #[serde(default)]
        transcript: Option<String>,
    },
}

impl ContentPart {
    /// The readable text of the part, whichever shape carried it.
    pub fn text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::Audio { transcript } => transcript.as_deref(),
        }
    }
}

/// `response.content_part.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentPartDoneEvent {
    event_id: String,
    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
    part: ContentPart,
}

impl ContentPartDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn part(&self) -> &ContentPart {
        &self.part
    }
}

/// `response.audio_transcript.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptDoneEvent {
    event_id: String,
    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
    /// The complete transcript of the spoken reply.
    transcript: String,
}

impl AudioTranscriptDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }
}

/// `response.text.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TextDoneEvent {
    event_id: String,
    response_id: String,
    item_id: String,
    output_index: i32,
    content_index: i32,
    text: String,
}

impl TextDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response_id(&self) -> &str {
        &self.response_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Subset of the response resource the client cares about.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseResource {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ResponseResource {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// `response.done` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDoneEvent {
    event_id: String,
    response: ResponseResource,
}

impl ResponseDoneEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn response(&self) -> &ResponseResource {
        &self.response
    }
}
