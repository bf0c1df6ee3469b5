//! The ordering dialogue: a small state machine nested inside chat.

use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tabletalk_types::MenuItem;

use crate::completion::{CompletionApi, CompletionRequest};
use crate::intent;

pub const CLARIFICATION_PROMPT: &str =
    "Great choice! Any allergies or special requests I should mention when ordering?";

pub const SELECTION_PROMPT: &str =
    "I can help you order — pick some items from the menu first, then tell me to order.";

pub const ORDER_APOLOGY: &str =
    "Sorry, I couldn't put the order instructions together. Please try again.";

/// Produces the final ordering instructions from the selection and the
/// accumulated clarification notes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrderGuide: Send + Sync {
    async fn generate_instructions(&self, items: &[MenuItem], notes: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderPhase {
    NoOrder,
    AwaitingClarification,
}

/// What the order flow wants said back to the user after one input.
#[derive(Debug, PartialEq)]
pub enum OrderTurn {
    /// Input was not order-related; let the normal dispatch handle it.
    Ignored,
    /// Ask the user to select menu items before ordering.
    PromptSelection(String),
    /// Ask the allergy/customization question.
    PromptClarification(String),
    /// Final instructions, rendered as markdown.
    Finalized(String),
    /// The instruction collaborator failed; attempt is over.
    Failed(String),
}

pub struct OrderFlow {
    phase: OrderPhase,
    selection: Vec<MenuItem>,
    /// Last selection that reached the clarification stage, kept so a
    /// later bare "order for me" can reuse it.
    remembered: Vec<MenuItem>,
    clarifications: Vec<String>,
}

impl OrderFlow {
    pub fn new() -> Self {
        Self {
            phase: OrderPhase::NoOrder,
            selection: Vec::new(),
            remembered: Vec::new(),
            clarifications: Vec::new(),
        }
    }

    pub fn awaiting_clarification(&self) -> bool {
        self.phase == OrderPhase::AwaitingClarification
    }

    pub fn selection(&self) -> &[MenuItem] {
        &self.selection
    }

    /// Explicit item selection from the menu screen. Always moves into
    /// clarification, replacing any in-progress selection.
    pub fn select_items(&mut self, items: Vec<MenuItem>) -> OrderTurn {
        self.selection = items;
        self.remembered = self.selection.clone();
        self.clarifications.clear();
        self.phase = OrderPhase::AwaitingClarification;
        if self.selection.is_empty() {
            OrderTurn::PromptSelection(SELECTION_PROMPT.to_string())
        } else {
            OrderTurn::PromptClarification(CLARIFICATION_PROMPT.to_string())
        }
    }

    /// Feeds one user chat message through the order flow.
    pub async fn handle_user_message(&mut self, guide: &dyn OrderGuide, text: &str) -> OrderTurn {
        match self.phase {
            OrderPhase::NoOrder => {
                if !intent::is_order_command(text) {
                    return OrderTurn::Ignored;
                }
                if self.remembered.is_empty() {
                    // Nothing selected yet: enter clarification with an
                    // empty selection and ask for a pick first.
                    self.selection.clear();
                    self.clarifications.clear();
                    self.phase = OrderPhase::AwaitingClarification;
                    OrderTurn::PromptSelection(SELECTION_PROMPT.to_string())
                } else {
                    self.selection = self.remembered.clone();
                    self.clarifications.clear();
                    self.phase = OrderPhase::AwaitingClarification;
                    OrderTurn::PromptClarification(CLARIFICATION_PROMPT.to_string())
                }
            }
            OrderPhase::AwaitingClarification => {
                if intent::is_order_command(text) {
                    return if self.selection.is_empty() {
                        OrderTurn::PromptSelection(SELECTION_PROMPT.to_string())
                    } else {
                        OrderTurn::PromptClarification(CLARIFICATION_PROMPT.to_string())
                    };
                }
                if !intent::is_order_response(text) {
                    return OrderTurn::Ignored;
                }
                if self.selection.is_empty() {
                    return OrderTurn::PromptSelection(SELECTION_PROMPT.to_string());
                }

                self.clarifications.push(text.to_string());
                // One accumulated response (a "no allergies" included) is
                // enough to finalize; there is deliberately no separate
                // "done" signal, to avoid an unbounded back-and-forth.
                self.finalize(guide).await
            }
        }
    }

    async fn finalize(&mut self, guide: &dyn OrderGuide) -> OrderTurn {
        let notes = self.clarifications.join("; ");
        let result = guide.generate_instructions(&self.selection, &notes).await;

        // The attempt is over either way; the remembered selection
        // survives so the user can immediately say "order for me" again.
        self.remembered = std::mem::take(&mut self.selection);
        self.clarifications.clear();
        self.phase = OrderPhase::NoOrder;

        match result {
            Ok(instructions) => OrderTurn::Finalized(instructions),
            Err(error) => {
                tracing::warn!("order instruction generation failed: {error:#}");
                OrderTurn::Failed(ORDER_APOLOGY.to_string())
            }
        }
    }

    /// Full reset, including the remembered selection. Used on chat-clear.
    pub fn reset(&mut self) {
        self.phase = OrderPhase::NoOrder;
        self.selection.clear();
        self.remembered.clear();
        self.clarifications.clear();
    }
}

impl Default for OrderFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Completion-backed instruction generator.
pub struct CompletionOrderGuide<C> {
    completion: C,
}

impl<C: CompletionApi> CompletionOrderGuide<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl<C: CompletionApi> OrderGuide for CompletionOrderGuide<C> {
    async fn generate_instructions(&self, items: &[MenuItem], notes: &str) -> Result<String> {
        let listing = items
            .iter()
            .map(|item| format!("- {} / {} — {} ({})", item.name(), item.name_en(), item.price(), item.price_usd()))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "A traveler wants to order these dishes at a local restaurant:\n{listing}\n\n\
             Their notes: {notes}\n\n\
             Write short markdown ordering instructions: how to ask for each dish \
             in the local language (with pronunciation), the total price in both \
             currencies, and one line covering their notes. Be practical, not chatty.",
            notes = if notes.is_empty() { "none" } else { notes },
        );

        let request = CompletionRequest {
            system: None,
            user_text: Some(prompt),
            image_b64: None,
            max_tokens: 600,
            temperature: 0.3,
        };

        let text = self.completion.complete(request).await?;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_items() -> Vec<MenuItem> {
        vec![
            MenuItem::new("搾菜肉絲麺", "Zha cai pork noodles", "¥950", "$6.40"),
            MenuItem::new("餃子", "Dumplings", "¥400", "$2.70"),
        ]
    }

    #[tokio::test]
    async fn selection_then_no_allergies_finalizes_once() {
        let mut guide = MockOrderGuide::new();
        guide
            .expect_generate_instructions()
            .withf(|items, notes| items.len() == 2 && notes.contains("no allergies"))
            .times(1)
            .returning(|_, _| Ok("## How to order".to_string()));

        let mut flow = OrderFlow::new();
        assert_eq!(
            flow.select_items(two_items()),
            OrderTurn::PromptClarification(CLARIFICATION_PROMPT.to_string())
        );
        assert!(flow.awaiting_clarification());

        let turn = flow.handle_user_message(&guide, "no allergies, thanks").await;
        assert_eq!(turn, OrderTurn::Finalized("## How to order".to_string()));
        assert!(!flow.awaiting_clarification());
    }

    #[tokio::test]
    async fn order_command_without_selection_asks_for_a_pick() {
        let guide = MockOrderGuide::new();
        let mut flow = OrderFlow::new();

        let turn = flow.handle_user_message(&guide, "order for me").await;
        assert_eq!(turn, OrderTurn::PromptSelection(SELECTION_PROMPT.to_string()));
        assert!(flow.awaiting_clarification());
        assert!(flow.selection().is_empty());
    }

    #[tokio::test]
    async fn bare_order_command_reuses_remembered_selection() {
        let mut guide = MockOrderGuide::new();
        guide
            .expect_generate_instructions()
            .times(2)
            .returning(|_, _| Ok("instructions".to_string()));

        let mut flow = OrderFlow::new();
        flow.select_items(two_items());
        let first = flow.handle_user_message(&guide, "I'm vegetarian").await;
        assert!(matches!(first, OrderTurn::Finalized(_)));

        // Later, with no fresh selection, a bare command resolves to the
        // remembered one.
        let turn = flow.handle_user_message(&guide, "order for me").await;
        assert_eq!(
            turn,
            OrderTurn::PromptClarification(CLARIFICATION_PROMPT.to_string())
        );
        assert_eq!(flow.selection().len(), 2);

        let done = flow.handle_user_message(&guide, "no allergies").await;
        assert!(matches!(done, OrderTurn::Finalized(_)));
    }

    #[tokio::test]
    async fn unrelated_chatter_is_ignored() {
        let guide = MockOrderGuide::new();
        let mut flow = OrderFlow::new();

        assert_eq!(
            flow.handle_user_message(&guide, "what's the weather?").await,
            OrderTurn::Ignored
        );

        flow.select_items(two_items());
        assert_eq!(
            flow.handle_user_message(&guide, "nice view from here").await,
            OrderTurn::Ignored
        );
        assert!(flow.awaiting_clarification(), "clarification keeps waiting");
    }

    #[tokio::test]
    async fn guide_failure_ends_the_attempt_with_an_apology() {
        let mut guide = MockOrderGuide::new();
        guide
            .expect_generate_instructions()
            .returning(|_, _| Err(anyhow::anyhow!("HTTP 500")));

        let mut flow = OrderFlow::new();
        flow.select_items(two_items());
        let turn = flow.handle_user_message(&guide, "no allergies").await;

        assert_eq!(turn, OrderTurn::Failed(ORDER_APOLOGY.to_string()));
        assert!(!flow.awaiting_clarification());
    }

    #[tokio::test]
    async fn reset_forgets_the_remembered_selection() {
        let guide = MockOrderGuide::new();
        let mut flow = OrderFlow::new();
        flow.select_items(two_items());
        flow.reset();

        let turn = flow.handle_user_message(&guide, "order for me").await;
        assert_eq!(turn, OrderTurn::PromptSelection(SELECTION_PROMPT.to_string()));
    }
}
