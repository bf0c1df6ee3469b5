//! Session configuration sent once over the data channel after it opens.
//!
//! The instructions string is a policy lever: it tells the voice AI how to
//! defer lookup questions so the client can intercept and augment them.

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Alloy,
    Coral,
    Echo,
    Sage,
    Verse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AudioFormat {
    #[serde(rename = "pcm16")]
    Pcm16,
    #[serde(rename = "g711_ulaw")]
    G711Ulaw,
    #[serde(rename = "g711_alaw")]
    G711Alaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TranscriptionModel {
    #[serde(rename = "whisper-1")]
    Whisper,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InputAudioTranscription {
    model: TranscriptionModel,
}

impl InputAudioTranscription {
    pub fn new(model: TranscriptionModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> TranscriptionModel {
        self.model
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionConfig {
    /// The set of modalities the model can respond with. To disable audio,
    /// set this to ["text"].
    modalities: Vec<String>,

    /// System instructions prepended to model calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,

    /// The voice the model uses to respond.
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<Voice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_format: Option<AudioFormat>,

    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_format: Option<AudioFormat>,

    /// Transcription of the user's audio turns. None turns it off.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<InputAudioTranscription>,
}

impl SessionConfig {
    pub fn new() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn modalities(&self) -> &[String] {
        &self.modalities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn voice(&self) -> Option<Voice> {
        self.voice
    }

    /// True when the configured modality set includes audio. The decoder
    /// uses this to pick the canonical utterance-complete signal.
    pub fn speaks_audio(&self) -> bool {
        self.modalities.iter().any(|m| m == "audio")
    }
}

pub struct SessionConfigurator {
    config: SessionConfig,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            config: SessionConfig {
                modalities: vec!["text".to_string(), "audio".to_string()],
                instructions: None,
                voice: None,
                input_audio_format: None,
                output_audio_format: None,
                input_audio_transcription: None,
            },
        }
    }

    pub fn with_modalities_enable_audio(mut self) -> Self {
        self.config.modalities = vec!["text".to_string(), "audio".to_string()];
        self
    }

    pub fn with_modalities_disable_audio(mut self) -> Self {
        self.config.modalities = vec!["text".to_string()];
        self
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.config.instructions = Some(instructions.to_string());
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.config.voice = Some(voice);
        self
    }

    pub fn with_input_audio_format(mut self, format: AudioFormat) -> Self {
        self.config.input_audio_format = Some(format);
        self
    }

    pub fn with_output_audio_format(mut self, format: AudioFormat) -> Self {
        self.config.output_audio_format = Some(format);
        self
    }

    pub fn with_input_audio_transcription_enable(mut self, model: TranscriptionModel) -> Self {
        self.config.input_audio_transcription = Some(InputAudioTranscription::new(model));
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}
