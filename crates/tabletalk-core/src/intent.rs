//! Keyword-based intent classification.
//!
//! Every predicate here is pure: lowercase the input, scan a fixed list,
//! first match wins. The same predicates run against user-typed text and
//! against the voice AI's own transcripts, which is what makes the
//! deferral contract work: the session instructions tell the AI to answer
//! lookup questions with a phrase from LOOKUP_INDICATORS, and the client
//! intercepts that phrase to trigger live search augmentation.

use tabletalk_types::QueryTopic;

/// Direct lookup asks typed by the user.
const EXTERNAL_QUERY_KEYWORDS: &[&str] = &[
    "weather",
    "forecast",
    "temperature",
    "restaurant",
    "restaurants",
    "cafe",
    "coffee shop",
    "where can i buy",
    "where to buy",
    "shopping",
    "near me",
    "nearby",
    "open now",
    "best place",
];

/// Phrases the voice AI is instructed to emit when it wants the client to
/// look something up. Must stay consistent with
/// [`voice_instructions`]; see the test at the bottom of this file.
const LOOKUP_INDICATORS: &[&str] = &[
    "i will check",
    "i'll check",
    "let me check",
    "i will look",
    "i'll look",
    "look that up",
    "looking that up",
    "get back to you",
];

const ORDER_COMMAND_KEYWORDS: &[&str] = &[
    "order for me",
    "order it for me",
    "place the order",
    "place my order",
    "i want to order",
    "order this",
    "order the food",
];

const ORDER_RESPONSE_KEYWORDS: &[&str] = &[
    "allerg",
    "no nuts",
    "peanut",
    "shellfish",
    "gluten",
    "lactose",
    "dairy",
    "vegetarian",
    "vegan",
    "halal",
    "kosher",
    "not spicy",
    "less spicy",
    "mild",
    "extra",
    "no restrictions",
    "nothing special",
    "none",
];

const NO_ALLERGIES_KEYWORDS: &[&str] = &[
    "no allerg",
    "no restrictions",
    "nothing special",
    "none",
    "i'm fine with anything",
    "im fine with anything",
    "anything is fine",
];

const WEATHER_KEYWORDS: &[&str] = &[
    "weather", "forecast", "temperature", "rain", "sunny", "snow", "humid",
];

const RESTAURANT_KEYWORDS: &[&str] = &[
    "restaurant",
    "food",
    "eat",
    "dinner",
    "lunch",
    "breakfast",
    "cafe",
    "sushi",
    "noodle",
    "menu",
    "cuisine",
    "hungry",
];

const SHOP_KEYWORDS: &[&str] = &[
    "shop", "store", "buy", "purchase", "price", "mall", "market", "souvenir",
];

fn matches_any(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

/// True when the text asks for (or defers to) a live lookup.
pub fn is_external_query(text: &str) -> bool {
    matches_any(text, EXTERNAL_QUERY_KEYWORDS) || matches_any(text, LOOKUP_INDICATORS)
}

/// True when the text is a free-text command to place an order.
pub fn is_order_command(text: &str) -> bool {
    matches_any(text, ORDER_COMMAND_KEYWORDS)
}

/// True when the text reads as an answer to the allergy/customization
/// question of an in-progress order.
pub fn is_order_response(text: &str) -> bool {
    matches_any(text, ORDER_RESPONSE_KEYWORDS)
}

/// Refinement of [`is_order_response`]: the answer means "safe to proceed
/// without further clarification".
pub fn is_no_allergies_response(text: &str) -> bool {
    matches_any(text, NO_ALLERGIES_KEYWORDS)
}

/// Categorizes a lookup. Check order is fixed: weather wins over
/// restaurant wins over shop; everything else is general.
pub fn query_topic(text: &str) -> QueryTopic {
    if matches_any(text, WEATHER_KEYWORDS) {
        QueryTopic::Weather
    } else if matches_any(text, RESTAURANT_KEYWORDS) {
        QueryTopic::Restaurant
    } else if matches_any(text, SHOP_KEYWORDS) {
        QueryTopic::Shop
    } else {
        QueryTopic::General
    }
}

/// System instructions for the voice session. The deferral sentence keeps
/// the AI from answering lookup questions itself so the client can
/// intercept the reply and augment it with live results.
pub fn voice_instructions() -> String {
    "You are TableTalk, a friendly dining companion for travelers. \
     Keep spoken replies short and conversational. \
     When the user asks about places, restaurants, shopping, or the weather, \
     do NOT answer from memory. Instead reply exactly: \
     \"I will check that and get back to you shortly.\" \
     For everything else, answer normally."
        .to_string()
}
