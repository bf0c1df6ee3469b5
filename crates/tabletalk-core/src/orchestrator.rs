//! The dispatch policy: for every inbound user utterance or AI event,
//! decide which conversational mode handles it, run that mode's protocol,
//! and append the results to the shared chat log.

use std::sync::Arc;

use tabletalk_types::{ChatMessage, MenuData, MenuItem, MessageKind};
use tokio::sync::Mutex;

use crate::VoiceLink;
use crate::chat_log::ChatLog;
use crate::completion::{CompletionApi, CompletionRequest};
use crate::geo::ReverseGeocode;
use crate::intent;
use crate::menu_extract::MenuExtractor;
use crate::order::{OrderFlow, OrderGuide, OrderTurn};
use crate::search::{self, SearchApi};
use crate::vision::VisionPipeline;

const CHAT_SYSTEM_PROMPT: &str =
    "You are TableTalk, a friendly dining companion for travelers. \
     Keep answers short and helpful.";

pub const CHAT_APOLOGY: &str =
    "Sorry, I'm having trouble answering right now. Please try again.";

pub const VOICE_SEND_FAILURE: &str =
    "I couldn't reach the voice session just now. Try again in a second.";

pub const MENU_APOLOGY: &str =
    "I couldn't read that menu photo. Try a sharper shot with more light.";

pub const LOCATION_APOLOGY: &str =
    "I couldn't work out where you are right now.";

pub struct Orchestrator {
    log: Arc<ChatLog>,
    search: Arc<dyn SearchApi>,
    completion: Arc<dyn CompletionApi>,
    guide: Arc<dyn OrderGuide>,
    voice: Arc<dyn VoiceLink>,
    geocoder: Arc<dyn ReverseGeocode>,
    vision: VisionPipeline<Arc<dyn CompletionApi>>,
    menu: MenuExtractor<Arc<dyn CompletionApi>>,
    order: Mutex<OrderFlow>,
}

impl Orchestrator {
    pub fn new(
        log: Arc<ChatLog>,
        search: Arc<dyn SearchApi>,
        completion: Arc<dyn CompletionApi>,
        guide: Arc<dyn OrderGuide>,
        voice: Arc<dyn VoiceLink>,
        geocoder: Arc<dyn ReverseGeocode>,
    ) -> Self {
        Self {
            vision: VisionPipeline::new(Arc::clone(&completion)),
            menu: MenuExtractor::new(Arc::clone(&completion)),
            log,
            search,
            completion,
            guide,
            voice,
            geocoder,
            order: Mutex::new(OrderFlow::new()),
        }
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Runs one search augmentation and appends the result as a single
    /// external-query message; an apology message carries no payload.
    async fn augment_into_log(&self, text: &str) -> ChatMessage {
        let augmented = search::augment(&*self.search, text).await;
        match augmented.payload {
            Some(payload) => self.log.append_external(augmented.display_text, payload),
            None => self
                .log
                .append(augmented.display_text, false, MessageKind::ExternalQuery),
        }
    }

    /// Handles one user-typed message. Returns every message appended for
    /// this turn, the user's own included, for the front-end to render.
    pub async fn handle_user_text(&self, text: &str) -> Vec<ChatMessage> {
        let mut out = vec![self.log.append(text, true, MessageKind::Plain)];

        // The order flow gets first refusal: an in-progress clarification
        // or an order command must not leak into the other modes.
        let order_turn = {
            let mut order = self.order.lock().await;
            if order.awaiting_clarification() || intent::is_order_command(text) {
                order.handle_user_message(&*self.guide, text).await
            } else {
                OrderTurn::Ignored
            }
        };
        match order_turn {
            OrderTurn::Ignored => {}
            OrderTurn::PromptSelection(reply)
            | OrderTurn::PromptClarification(reply)
            | OrderTurn::Failed(reply) => {
                out.push(self.log.append(reply, false, MessageKind::Plain));
                return out;
            }
            OrderTurn::Finalized(instructions) => {
                out.push(self.log.append_markdown(instructions));
                return out;
            }
        }

        if intent::is_external_query(text) {
            out.push(self.augment_into_log(text).await);
            return out;
        }

        if self.voice.is_connected() {
            // The spoken reply comes back through the event decoder as a
            // transcript; nothing more to append here on success.
            if !self.voice.send_user_turn(text).await {
                out.push(self.log.append(VOICE_SEND_FAILURE, false, MessageKind::Plain));
            }
            return out;
        }

        let request = CompletionRequest {
            system: Some(CHAT_SYSTEM_PROMPT.to_string()),
            user_text: Some(text.to_string()),
            image_b64: None,
            max_tokens: 400,
            temperature: 0.6,
        };
        match self.completion.complete(request).await {
            Ok(reply) => out.push(self.log.append(reply, false, MessageKind::Plain)),
            Err(error) => {
                tracing::warn!("chat completion failed: {error}");
                out.push(self.log.append(CHAT_APOLOGY, false, MessageKind::Plain));
            }
        }
        out
    }

    /// Handles one completed assistant utterance from the voice session.
    /// The same lookup predicate that watches user text runs here, which
    /// is what turns the AI's deferral phrase into a live search.
    pub async fn handle_assistant_utterance(&self, text: &str) -> Vec<ChatMessage> {
        let mut out = vec![self.log.append(text, false, MessageKind::Transcript)];
        if intent::is_external_query(text) {
            out.push(self.augment_into_log(text).await);
        }
        out
    }

    /// Explicit menu-item selection from the menu screen.
    pub async fn handle_menu_selection(&self, items: Vec<MenuItem>) -> Vec<ChatMessage> {
        let labels = items
            .iter()
            .map(MenuItem::display_label)
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = vec![self.log.append(
            format!("Selected: {labels}"),
            true,
            MessageKind::Plain,
        )];

        let turn = self.order.lock().await.select_items(items);
        match turn {
            OrderTurn::PromptSelection(reply) | OrderTurn::PromptClarification(reply) => {
                out.push(self.log.append(reply, false, MessageKind::Plain));
            }
            _ => {}
        }
        out
    }

    /// Camera/gallery attachment: describe the image, hand the description
    /// to the voice session if one is open.
    pub async fn handle_image(&self, image_bytes: &[u8]) -> Vec<ChatMessage> {
        let mut out = vec![self.log.append("[photo]", true, MessageKind::Plain)];
        let description = self.vision.describe_and_speak(image_bytes, &*self.voice).await;
        out.push(self.log.append(description, false, MessageKind::Plain));
        out
    }

    /// Menu-photo attachment: extract items for the order screen.
    pub async fn handle_menu_photo(
        &self,
        image_bytes: &[u8],
    ) -> (Vec<ChatMessage>, Option<MenuData>) {
        let mut out = vec![self.log.append("[menu photo]", true, MessageKind::Plain)];
        match self.menu.extract(image_bytes).await {
            Ok(menu) if menu.has_items() => {
                out.push(self.log.append(
                    format!(
                        "I read {} items off the menu (prices in {}). Pick what you want and tell me to order.",
                        menu.items().len(),
                        menu.currency()
                    ),
                    false,
                    MessageKind::Plain,
                ));
                (out, Some(menu))
            }
            Ok(_) => {
                out.push(self.log.append(MENU_APOLOGY, false, MessageKind::Plain));
                (out, None)
            }
            Err(error) => {
                tracing::warn!("menu extraction failed: {error:#}");
                out.push(self.log.append(MENU_APOLOGY, false, MessageKind::Plain));
                (out, None)
            }
        }
    }

    /// Location attachment: resolve the place and search around it.
    pub async fn handle_location(&self, lat: f64, lon: f64) -> Vec<ChatMessage> {
        match self.geocoder.reverse(lat, lon).await {
            Ok(place) => {
                let where_am_i = place.display();
                let mut out = vec![self.log.append(
                    format!("I'm near {where_am_i}"),
                    true,
                    MessageKind::Plain,
                )];
                out.push(
                    self.augment_into_log(&format!("restaurants near {where_am_i}"))
                        .await,
                );
                out
            }
            Err(error) => {
                tracing::warn!("reverse geocoding failed: {error:#}");
                vec![self.log.append(LOCATION_APOLOGY, false, MessageKind::Plain)]
            }
        }
    }

    /// Clears the chat and the order dialogue, counter included.
    pub async fn clear(&self) {
        self.log.clear();
        self.order.lock().await.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockVoiceLink;
    use crate::completion::MockCompletionApi;
    use crate::geo::MockReverseGeocode;
    use crate::order::MockOrderGuide;
    use crate::search::{MockSearchApi, SEARCH_APOLOGY};
    use tabletalk_types::QueryTopic;

    struct Mocks {
        search: MockSearchApi,
        completion: MockCompletionApi,
        guide: MockOrderGuide,
        voice: MockVoiceLink,
        geocoder: MockReverseGeocode,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                search: MockSearchApi::new(),
                completion: MockCompletionApi::new(),
                guide: MockOrderGuide::new(),
                voice: MockVoiceLink::new(),
                geocoder: MockReverseGeocode::new(),
            }
        }

        fn disconnected_voice(mut self) -> Self {
            self.voice.expect_is_connected().return_const(false);
            self
        }

        fn build(self) -> Orchestrator {
            Orchestrator::new(
                Arc::new(ChatLog::new()),
                Arc::new(self.search),
                Arc::new(self.completion),
                Arc::new(self.guide),
                Arc::new(self.voice),
                Arc::new(self.geocoder),
            )
        }
    }

    #[tokio::test]
    async fn weather_question_becomes_an_external_query_message() {
        let mut mocks = Mocks::new();
        mocks.search.expect_search().returning(|_| {
            Ok(serde_json::json!({"organicResults": [{"title": "Paris forecast"}]}))
        });
        let orchestrator = mocks.disconnected_voice().build();

        let out = orchestrator.handle_user_text("What's the weather in Paris?").await;

        assert_eq!(out.len(), 2);
        assert!(out[0].from_user());
        assert_eq!(out[1].kind(), MessageKind::ExternalQuery);
        assert_eq!(out[1].payload().unwrap().topic(), QueryTopic::Weather);
        assert!(out[1].body().contains("Paris forecast"));
    }

    #[tokio::test]
    async fn deferral_transcript_triggers_augmentation() {
        let mut mocks = Mocks::new();
        mocks
            .search
            .expect_search()
            .times(1)
            .returning(|_| Ok(serde_json::json!({"organicResults": [{"title": "Sushi Kan"}]})));
        let orchestrator = mocks.build();

        let out = orchestrator
            .handle_assistant_utterance(
                "I will check nearby sushi restaurants and get back to you soon",
            )
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind(), MessageKind::Transcript);
        assert_eq!(out[1].kind(), MessageKind::ExternalQuery);
    }

    #[tokio::test]
    async fn plain_transcript_is_logged_without_augmentation() {
        let mut mocks = Mocks::new();
        mocks.search.expect_search().times(0);
        let orchestrator = mocks.build();

        let out = orchestrator
            .handle_assistant_utterance("That sounds like a lovely trip!")
            .await;
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn connected_voice_takes_the_plain_turn() {
        let mut mocks = Mocks::new();
        mocks.voice.expect_is_connected().return_const(true);
        mocks
            .voice
            .expect_send_user_turn()
            .times(1)
            .returning(|_| true);
        mocks.completion.expect_complete().times(0);
        let orchestrator = mocks.build();

        let out = orchestrator.handle_user_text("tell me a story").await;
        assert_eq!(out.len(), 1, "reply arrives later via the decoder");
    }

    #[tokio::test]
    async fn failed_voice_send_is_reported_in_chat() {
        let mut mocks = Mocks::new();
        mocks.voice.expect_is_connected().return_const(true);
        mocks.voice.expect_send_user_turn().returning(|_| false);
        let orchestrator = mocks.build();

        let out = orchestrator.handle_user_text("tell me a story").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].body(), VOICE_SEND_FAILURE);
    }

    #[tokio::test]
    async fn no_voice_falls_back_to_text_chat() {
        let mut mocks = Mocks::new();
        mocks
            .completion
            .expect_complete()
            .times(1)
            .returning(|_| Ok("Once upon a time...".to_string()));
        let orchestrator = mocks.disconnected_voice().build();

        let out = orchestrator.handle_user_text("tell me a story").await;
        assert_eq!(out[1].body(), "Once upon a time...");
    }

    #[tokio::test]
    async fn selection_then_order_command_waits_for_clarification() {
        let mut mocks = Mocks::new();
        mocks.guide.expect_generate_instructions().times(0);
        let orchestrator = mocks.build();

        let items = vec![
            MenuItem::new("A", "A en", "¥1", "$1"),
            MenuItem::new("B", "B en", "¥2", "$2"),
        ];
        orchestrator.handle_menu_selection(items).await;

        // Order command while awaiting clarification re-prompts; no
        // instructions are generated yet.
        let out = orchestrator.handle_user_text("order for me").await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].body(), crate::order::CLARIFICATION_PROMPT);
    }

    #[tokio::test]
    async fn clarification_finalizes_as_markdown() {
        let mut mocks = Mocks::new();
        mocks
            .guide
            .expect_generate_instructions()
            .times(1)
            .returning(|_, _| Ok("## Ordering\nSay: gyoza kudasai".to_string()));
        let orchestrator = mocks.build();

        orchestrator
            .handle_menu_selection(vec![MenuItem::new("餃子", "Dumplings", "¥400", "$2.70")])
            .await;
        let out = orchestrator.handle_user_text("no allergies").await;

        assert_eq!(out.len(), 2);
        assert!(out[1].markdown());
        assert!(out[1].body().contains("gyoza kudasai"));
    }

    #[tokio::test]
    async fn search_failure_surfaces_apology_without_payload() {
        let mut mocks = Mocks::new();
        mocks
            .search
            .expect_search()
            .returning(|_| Err(anyhow::anyhow!("HTTP 500")));
        let orchestrator = mocks.disconnected_voice().build();

        let out = orchestrator.handle_user_text("sushi restaurants nearby").await;
        assert_eq!(out[1].body(), SEARCH_APOLOGY);
        assert!(out[1].payload().is_none());
    }

    #[tokio::test]
    async fn location_attachment_searches_around_the_place() {
        let mut mocks = Mocks::new();
        mocks.geocoder.expect_reverse().returning(|_, _| {
            Ok(crate::geo::Place {
                locality: "Shibuya".to_string(),
                region: "Tokyo".to_string(),
                country: "Japan".to_string(),
            })
        });
        mocks
            .search
            .expect_search()
            .withf(|query| query.contains("Shibuya"))
            .returning(|_| Ok(serde_json::json!({"organicResults": [{"title": "Ichiran"}]})));
        let orchestrator = mocks.build();

        let out = orchestrator.handle_location(35.66, 139.7).await;
        assert_eq!(out.len(), 2);
        assert!(out[0].body().contains("Shibuya, Tokyo, Japan"));
        assert_eq!(out[1].kind(), MessageKind::ExternalQuery);
    }

    #[tokio::test]
    async fn clear_resets_log_and_order_state() {
        let mut mocks = Mocks::new();
        mocks.guide.expect_generate_instructions().times(0);
        let orchestrator = mocks.build();

        orchestrator
            .handle_menu_selection(vec![MenuItem::new("A", "A", "1", "1")])
            .await;
        orchestrator.clear().await;

        assert!(orchestrator.log().is_empty());
        // After the reset a bare order command must ask for a selection
        // again instead of reusing the cleared one.
        let out = orchestrator.handle_user_text("order for me").await;
        assert_eq!(out[1].body(), crate::order::SELECTION_PROMPT);
        assert_eq!(out[0].id().seq(), 1, "clear resets the id counter");
    }
}
