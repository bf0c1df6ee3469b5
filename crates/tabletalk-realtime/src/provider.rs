//! Voice-provider HTTP surface: the short-lived session credential and
//! the SDP offer/answer exchange.

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug, serde::Deserialize)]
struct SessionCredentialResponse {
    client_secret: ClientSecret,
}

#[derive(Debug, serde::Deserialize)]
struct ClientSecret {
    value: String,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait VoiceProvider: Send + Sync {
    /// `POST /sessions`: mints the short-lived credential used to
    /// authenticate the SDP exchange.
    async fn create_session_credential(&self) -> Result<SecretString>;

    /// `POST /realtime?model=...`: trades the local offer for the remote
    /// answer, authenticated with the session credential.
    async fn exchange_offer(&self, credential: &SecretString, offer_sdp: &str) -> Result<String>;
}

pub struct VoiceProviderClient {
    client: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    voice: String,
}

impl VoiceProviderClient {
    pub fn new(base_url: String, api_key: SecretString, model: String, voice: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
            voice,
        }
    }
}

#[async_trait]
impl VoiceProvider for VoiceProviderClient {
    async fn create_session_credential(&self) -> Result<SecretString> {
        let body = serde_json::json!({
            "model": self.model,
            "voice": self.voice,
        });

        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("session credential request failed")?
            .error_for_status()
            .context("session credential request rejected")?
            .json::<SessionCredentialResponse>()
            .await
            .context("session credential response was not the expected shape")?;

        Ok(SecretString::from(response.client_secret.value))
    }

    async fn exchange_offer(&self, credential: &SecretString, offer_sdp: &str) -> Result<String> {
        let answer = self
            .client
            .post(format!("{}/realtime", self.base_url))
            .query(&[("model", self.model.as_str())])
            .bearer_auth(credential.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await
            .context("SDP exchange request failed")?
            .error_for_status()
            .context("SDP exchange rejected")?
            .text()
            .await
            .context("SDP answer body unreadable")?;

        Ok(answer)
    }
}
