//! Live search augmentation.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tabletalk_types::{QueryPayload, QueryTopic};

use crate::intent;

/// Shown instead of results whenever the search collaborator fails.
pub const SEARCH_APOLOGY: &str =
    "Sorry, I couldn't fetch live results right now. Please try again in a moment.";

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SearchApi: Send + Sync {
    /// Runs one search and returns the raw response document.
    async fn search(&self, query: &str) -> anyhow::Result<serde_json::Value>;
}

/// SERP-style search client with fixed locale/device/page-size parameters.
pub struct SerpClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    location: String,
    device_type: String,
    page_size: u32,
}

impl SerpClient {
    pub fn new(endpoint: String, api_key: SecretString, location: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            location,
            device_type: "mobile".to_string(),
            page_size: 10,
        }
    }
}

#[async_trait]
impl SearchApi for SerpClient {
    async fn search(&self, query: &str) -> anyhow::Result<serde_json::Value> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("location", self.location.as_str()),
                ("deviceType", self.device_type.as_str()),
                ("num", &self.page_size.to_string()),
                ("start", "0"),
                ("apiKey", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;
        Ok(response)
    }
}

/// Result of one augmentation: ready-to-render text plus the raw payload.
#[derive(Debug)]
pub struct Augmented {
    pub display_text: String,
    pub payload: Option<QueryPayload>,
    pub topic: QueryTopic,
}

/// Classifies the query, runs the search, and formats the sections in
/// fixed order. Failures stop here: the caller always gets display text.
pub async fn augment(search: &dyn SearchApi, text: &str) -> Augmented {
    let topic = intent::query_topic(text);

    let raw = match search.search(text).await {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!("search failed for {text:?}: {error:#}");
            return Augmented {
                display_text: SEARCH_APOLOGY.to_string(),
                payload: None,
                topic,
            };
        }
    };

    let display_text = format_results(&raw);
    Augmented {
        payload: Some(QueryPayload::new(raw, topic)),
        display_text,
        topic,
    }
}

fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(serde_json::Value::as_str)
}

fn format_results(raw: &serde_json::Value) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(results) = raw.get("organicResults").and_then(|v| v.as_array()) {
        let mut lines = Vec::new();
        for result in results.iter().take(3) {
            let title = str_field(result, "title").unwrap_or("Untitled");
            let mut line = format!("• {title}");
            if let Some(snippet) = str_field(result, "snippet") {
                line.push_str(&format!("\n  {snippet}"));
            }
            if let Some(link) = str_field(result, "link") {
                line.push_str(&format!("\n  {link}"));
            }
            lines.push(line);
        }
        if !lines.is_empty() {
            sections.push(format!("Top results:\n{}", lines.join("\n")));
        }
    }

    if let Some(products) = raw.get("immersiveProducts").and_then(|v| v.as_array()) {
        let mut lines = Vec::new();
        for product in products.iter().take(3) {
            let title = str_field(product, "title").unwrap_or("Untitled");
            let mut line = format!("• {title}");
            if let Some(price) = str_field(product, "price") {
                line.push_str(&format!(" — {price}"));
            }
            if let Some(delivery) = str_field(product, "delivery") {
                line.push_str(&format!(" ({delivery})"));
            }
            if let Some(source) = str_field(product, "source") {
                line.push_str(&format!(" · {source}"));
            }
            lines.push(line);
        }
        if !lines.is_empty() {
            sections.push(format!("Products:\n{}", lines.join("\n")));
        }
    }

    if let Some(related) = raw.get("relatedSearches").and_then(|v| v.as_array()) {
        let suggestions: Vec<&str> = related
            .iter()
            .take(3)
            .filter_map(|entry| {
                entry
                    .as_str()
                    .or_else(|| str_field(entry, "query"))
            })
            .collect();
        if !suggestions.is_empty() {
            sections.push(format!("People also search for: {}", suggestions.join(", ")));
        }
    }

    if sections.is_empty() {
        "I didn't find anything useful for that, sorry.".to_string()
    } else {
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_response() -> serde_json::Value {
        serde_json::json!({
            "organicResults": [
                {"title": "Ramen Ichiro", "snippet": "Late-night tonkotsu.", "link": "https://example.com/ichiro"},
                {"title": "Sushi Kan", "snippet": "Counter seats only.", "link": "https://example.com/kan"},
                {"title": "Cafe Lumen", "link": "https://example.com/lumen"},
                {"title": "Fourth result is never shown"}
            ],
            "immersiveProducts": [
                {"title": "Instant ramen 12-pack", "price": "$14.99", "delivery": "Free delivery", "source": "MegaMart"}
            ],
            "relatedSearches": [{"query": "ramen near me"}, "best sushi", {"query": "late night food"}]
        })
    }

    #[tokio::test]
    async fn formats_sections_in_fixed_order() {
        let mut api = MockSearchApi::new();
        api.expect_search()
            .returning(|_| Ok(sample_response()));

        let augmented = augment(&api, "best ramen nearby").await;

        assert_eq!(augmented.topic, QueryTopic::Restaurant);
        let text = &augmented.display_text;
        let top = text.find("Top results:").expect("organic section");
        let products = text.find("Products:").expect("product section");
        let related = text.find("People also search for:").expect("related section");
        assert!(top < products && products < related);
        assert!(text.contains("Ramen Ichiro"));
        assert!(text.contains("$14.99"));
        assert!(!text.contains("Fourth result"), "only three organic results render");
        assert!(augmented.payload.is_some());
    }

    #[tokio::test]
    async fn omits_empty_sections() {
        let mut api = MockSearchApi::new();
        api.expect_search().returning(|_| {
            Ok(serde_json::json!({
                "organicResults": [{"title": "Only result"}],
                "immersiveProducts": []
            }))
        });

        let augmented = augment(&api, "weather tomorrow").await;
        assert!(augmented.display_text.contains("Top results:"));
        assert!(!augmented.display_text.contains("Products:"));
        assert!(!augmented.display_text.contains("People also search for:"));
    }

    #[tokio::test]
    async fn search_failure_returns_apology_with_no_payload() {
        let mut api = MockSearchApi::new();
        api.expect_search()
            .returning(|_| Err(anyhow::anyhow!("HTTP 500")));

        let augmented = augment(&api, "sushi places").await;
        assert_eq!(augmented.display_text, SEARCH_APOLOGY);
        assert!(augmented.payload.is_none());
        assert_eq!(augmented.topic, QueryTopic::Restaurant);
    }

    #[tokio::test]
    async fn empty_response_still_produces_text() {
        let mut api = MockSearchApi::new();
        api.expect_search().returning(|_| Ok(serde_json::json!({})));

        let augmented = augment(&api, "anything at all nearby").await;
        assert!(!augmented.display_text.is_empty());
        assert!(augmented.payload.is_some());
    }
}
