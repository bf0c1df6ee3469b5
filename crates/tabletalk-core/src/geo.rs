//! Reverse geocoding for the location attachment.

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;

/// Human-readable place resolved from coordinates.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Place {
    pub locality: String,
    pub region: String,
    pub country: String,
}

impl Place {
    pub fn display(&self) -> String {
        [&self.locality, &self.region, &self.country]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReverseGeocode: Send + Sync {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Place>;
}

/// Nominatim-style reverse geocoding client.
pub struct NominatimClient {
    client: Client,
    endpoint: String,
    user_agent: String,
}

impl NominatimClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            user_agent: "tabletalk/0.1".to_string(),
        }
    }
}

#[async_trait]
impl ReverseGeocode for NominatimClient {
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Place> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("format", "jsonv2"),
                ("lat", &lat.to_string()),
                ("lon", &lon.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<serde_json::Value>()
            .await
            .context("reverse geocoding returned non-JSON")?;

        let address = response
            .get("address")
            .context("reverse geocoding response has no address")?;
        let field = |keys: &[&str]| -> String {
            keys.iter()
                .find_map(|key| address.get(*key).and_then(serde_json::Value::as_str))
                .unwrap_or_default()
                .to_string()
        };

        Ok(Place {
            locality: field(&["city", "town", "village", "suburb"]),
            region: field(&["state", "province", "county"]),
            country: field(&["country"]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_skips_empty_parts() {
        let place = Place {
            locality: "Kyoto".to_string(),
            region: String::new(),
            country: "Japan".to_string(),
        };
        assert_eq!(place.display(), "Kyoto, Japan");
    }
}
