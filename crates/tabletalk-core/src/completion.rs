//! Chat-completion collaborator.
//!
//! The provider answers in one of two envelope shapes: its native
//! `{completion_message: {content: {text}}}` or the OpenAI-compatible
//! `{choices: [{message: {content}}]}`. `extract_text` tries them in that
//! order and fails typed if neither matches, so schema drift shows up as
//! its own error with the raw payload in the log rather than as a generic
//! network failure.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion response matched no known envelope shape")]
    Shape,
}

/// One completion request. Image bytes are already base64-encoded by the
/// caller; the client decides how to embed them.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub user_text: Option<String>,
    pub image_b64: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait CompletionApi: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError>;
}

#[async_trait]
impl<T: CompletionApi + ?Sized> CompletionApi for std::sync::Arc<T> {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request).await
    }
}

/// Pulls the reply text out of either supported envelope shape.
pub fn extract_text(value: &serde_json::Value) -> Option<String> {
    if let Some(text) = value
        .pointer("/completion_message/content/text")
        .and_then(serde_json::Value::as_str)
    {
        return Some(text.to_string());
    }
    value
        .pointer("/choices/0/message/content")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

pub struct CompletionClient {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl CompletionClient {
    pub fn new(endpoint: String, api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
            model,
        }
    }

    fn build_messages(request: &CompletionRequest) -> Vec<serde_json::Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        match (&request.user_text, &request.image_b64) {
            (text, Some(image)) => {
                let mut parts = Vec::new();
                if let Some(text) = text {
                    parts.push(serde_json::json!({"type": "text", "text": text}));
                }
                parts.push(serde_json::json!({
                    "type": "image_url",
                    "image_url": {"url": format!("data:image/jpeg;base64,{image}")}
                }));
                messages.push(serde_json::json!({"role": "user", "content": parts}));
            }
            (Some(text), None) => {
                messages.push(serde_json::json!({"role": "user", "content": text}));
            }
            (None, None) => {}
        }
        messages
    }
}

#[async_trait]
impl CompletionApi for CompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": Self::build_messages(&request),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let raw = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await?;

        match extract_text(&raw) {
            Some(text) => Ok(text),
            None => {
                tracing::error!("unexpected completion envelope: {}", raw);
                Err(CompletionError::Shape)
            }
        }
    }
}
