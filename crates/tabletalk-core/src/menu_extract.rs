//! Menu photo → structured menu items.

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose};
use tabletalk_types::{MenuData, MenuItem};

use crate::completion::{CompletionApi, CompletionRequest};

const MENU_SYSTEM_PROMPT: &str = "You read restaurant menu photos for travelers. Output STRICT JSON only, no prose, in this exact shape:\n{\n  \"items\": [{\"name\": \"<as printed>\", \"name_en\": \"<english>\", \"price\": \"<printed price>\", \"price_usd\": \"<converted>\"}],\n  \"currency\": \"<ISO code>\",\n  \"exchange_rate\": \"<1 <code> = $x.xx>\"\n}\nInclude every legible dish. If a translation is uncertain, give your best guess.";

#[derive(Debug, serde::Deserialize)]
struct ExtractedMenu {
    items: Vec<ExtractedItem>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    exchange_rate: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct ExtractedItem {
    name: String,
    name_en: String,
    price: String,
    price_usd: String,
}

pub struct MenuExtractor<C> {
    completion: C,
}

impl<C: CompletionApi> MenuExtractor<C> {
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    /// Extracts menu items from one photo. Unlike the vision pipeline this
    /// surfaces errors: an unreadable menu must not silently become an
    /// empty order screen.
    pub async fn extract(&self, image_bytes: &[u8]) -> Result<MenuData> {
        let encoded = general_purpose::STANDARD.encode(image_bytes);
        let request = CompletionRequest {
            system: Some(MENU_SYSTEM_PROMPT.to_string()),
            user_text: Some("Extract every item from this menu.".to_string()),
            image_b64: Some(encoded),
            max_tokens: 1200,
            temperature: 0.1,
        };

        let answer = self
            .completion
            .complete(request)
            .await
            .context("menu extraction call failed")?;

        let extracted: ExtractedMenu = serde_json::from_str(strip_code_fences(&answer))
            .with_context(|| format!("menu extraction returned non-JSON output: {answer}"))?;

        let items = extracted
            .items
            .into_iter()
            .map(|item| MenuItem::new(item.name, item.name_en, item.price, item.price_usd))
            .collect();

        Ok(MenuData::new(
            items,
            extracted.currency.unwrap_or_else(|| "USD".to_string()),
            extracted.exchange_rate.unwrap_or_default(),
        ))
    }
}

/// Models wrap JSON in markdown fences often enough that stripping them
/// here is cheaper than re-prompting.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}
