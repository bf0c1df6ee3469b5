//! Application configuration.
//!
//! Everything comes from environment variables (a local `.env` is picked
//! up for development); secrets stay wrapped in `SecretString` from the
//! moment they are read.

use secrecy::SecretString;
use std::env;
use tracing::Level;

/// Holds all configuration loaded from the environment.
#[derive(Clone)]
pub struct Config {
    /// Key for the realtime voice provider.
    pub voice_api_key: SecretString,
    /// Key for the search collaborator.
    pub search_api_key: SecretString,
    /// Key for the chat/vision completion collaborator.
    pub chat_api_key: SecretString,
    pub voice_base_url: String,
    pub voice_model: String,
    pub voice_name: String,
    pub chat_endpoint: String,
    pub chat_model: String,
    pub search_endpoint: String,
    pub search_location: String,
    pub geocode_endpoint: String,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

fn required(name: &str) -> Result<SecretString, ConfigError> {
    env::var(name)
        .map(SecretString::from)
        .map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `OPENAI_API_KEY`: key for the realtime voice provider. Required.
    // *   `SERP_API_KEY`: key for the live-search collaborator. Required.
    // *   `CHAT_API_KEY`: key for the completion collaborator. Falls back
    //     to `OPENAI_API_KEY` when unset.
    // *   `VOICE_BASE_URL`, `REALTIME_MODEL`, `REALTIME_VOICE`,
    //     `CHAT_ENDPOINT`, `CHAT_MODEL`, `SERP_ENDPOINT`,
    //     `SEARCH_LOCATION`, `GEOCODE_ENDPOINT`: optional overrides.
    // *   `RUST_LOG`: logging level, defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present; ignored otherwise.
        dotenvy::dotenv().ok();

        let voice_api_key = required("OPENAI_API_KEY")?;
        let search_api_key = required("SERP_API_KEY")?;
        let chat_api_key = match env::var("CHAT_API_KEY") {
            Ok(key) => SecretString::from(key),
            Err(_) => required("OPENAI_API_KEY")?,
        };

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            voice_api_key,
            search_api_key,
            chat_api_key,
            voice_base_url: or_default("VOICE_BASE_URL", "https://api.openai.com/v1"),
            voice_model: or_default("REALTIME_MODEL", "gpt-4o-realtime-preview-2024-10-01"),
            voice_name: or_default("REALTIME_VOICE", "alloy"),
            chat_endpoint: or_default("CHAT_ENDPOINT", "https://api.llama.com/v1/chat"),
            chat_model: or_default("CHAT_MODEL", "gpt-4o"),
            search_endpoint: or_default("SERP_ENDPOINT", "https://api.serphouse.com/serp/live"),
            search_location: or_default("SEARCH_LOCATION", "United States"),
            geocode_endpoint: or_default(
                "GEOCODE_ENDPOINT",
                "https://nominatim.openstreetmap.org/reverse",
            ),
            log_level,
        })
    }
}
