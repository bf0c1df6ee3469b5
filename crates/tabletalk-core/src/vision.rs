//! Image description pipeline.
//!
//! Vision failures never abort the surrounding conversation: any error on
//! this path collapses into a fixed fallback sentence.

use base64::{Engine as _, engine::general_purpose};

use crate::VoiceLink;
use crate::completion::{CompletionApi, CompletionRequest};

const VISION_SYSTEM_PROMPT: &str =
    "You are describing a photo to a friend over the phone. Describe what is \
     in the image in under 100 words, in a warm conversational tone. Mention \
     food, signage, and anything a traveler would care about.";

/// Spoken-reply steering used when the description is handed to the voice
/// session.
const VISION_VOICE_STEER: &str =
    "Briefly react to what the user is looking at, based on the description \
     they just shared. Keep it to a couple of spoken sentences.";

pub const VISION_FALLBACK: &str =
    "I couldn't quite make out that image, but it looks interesting!";

pub struct VisionPipeline<C> {
    completion: C,
}

impl<C: CompletionApi> VisionPipeline<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    /// Describes one image. Always returns text.
    pub async fn describe(&self, image_bytes: &[u8]) -> String {
        let encoded = general_purpose::STANDARD.encode(image_bytes);
        let request = CompletionRequest {
            system: Some(VISION_SYSTEM_PROMPT.to_string()),
            user_text: Some("What am I looking at?".to_string()),
            image_b64: Some(encoded),
            max_tokens: 200,
            temperature: 0.5,
        };

        match self.completion.complete(request).await {
            Ok(description) => description,
            Err(error) => {
                tracing::warn!("vision description failed: {error}");
                VISION_FALLBACK.to_string()
            }
        }
    }

    /// Describes the image and, when a voice session is open, feeds the
    /// description back in as a new turn requesting a spoken reaction.
    pub async fn describe_and_speak(&self, image_bytes: &[u8], voice: &dyn VoiceLink) -> String {
        let description = self.describe(image_bytes).await;
        if voice.is_connected() {
            let turn = format!("I'm looking at this right now: {description}");
            if !voice.send_context_turn(&turn, VISION_VOICE_STEER).await {
                tracing::warn!("voice session refused the image-description turn");
            }
        }
        description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockVoiceLink;
    use crate::completion::{CompletionError, MockCompletionApi};

    #[tokio::test]
    async fn describe_returns_model_text() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_complete()
            .withf(|request| request.image_b64.is_some() && request.system.is_some())
            .returning(|_| Ok("A steaming bowl of ramen on a wooden counter.".to_string()));

        let pipeline = VisionPipeline::new(completion);
        let description = pipeline.describe(&[1, 2, 3]).await;
        assert_eq!(description, "A steaming bowl of ramen on a wooden counter.");
    }

    #[tokio::test]
    async fn failures_fall_back_to_fixed_sentence() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_complete()
            .returning(|_| Err(CompletionError::Shape));

        let pipeline = VisionPipeline::new(completion);
        let description = pipeline.describe(&[1, 2, 3]).await;
        assert_eq!(description, VISION_FALLBACK);
    }

    #[tokio::test]
    async fn connected_voice_session_gets_the_description() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_complete()
            .returning(|_| Ok("A night market food stall.".to_string()));

        let mut voice = MockVoiceLink::new();
        voice.expect_is_connected().return_const(true);
        voice
            .expect_send_context_turn()
            .withf(|text, _| text.contains("A night market food stall."))
            .times(1)
            .returning(|_, _| true);

        let pipeline = VisionPipeline::new(completion);
        pipeline.describe_and_speak(&[9, 9], &voice).await;
    }

    #[tokio::test]
    async fn idle_voice_session_is_left_alone() {
        let mut completion = MockCompletionApi::new();
        completion
            .expect_complete()
            .returning(|_| Ok("A temple gate.".to_string()));

        let mut voice = MockVoiceLink::new();
        voice.expect_is_connected().return_const(false);
        voice.expect_send_context_turn().times(0);

        let pipeline = VisionPipeline::new(completion);
        pipeline.describe_and_speak(&[4], &voice).await;
    }
}
