use chrono::{DateTime, Utc};

/// One parsed entry from a photographed menu.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MenuItem {
    /// Name as printed on the menu.
    name: String,
    /// English translation of the name.
    name_en: String,
    /// Price as printed, including the local currency symbol.
    price: String,
    /// Converted USD price.
    price_usd: String,
}

impl MenuItem {
    pub fn new(
        name: impl Into<String>,
        name_en: impl Into<String>,
        price: impl Into<String>,
        price_usd: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            name_en: name_en.into(),
            price: price.into(),
            price_usd: price_usd.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_en(&self) -> &str {
        &self.name_en
    }

    pub fn price(&self) -> &str {
        &self.price
    }

    pub fn price_usd(&self) -> &str {
        &self.price_usd
    }

    /// Label used when the selection is echoed back into the chat.
    pub fn display_label(&self) -> String {
        format!("{} ({}) — {}", self.name_en, self.name, self.price)
    }
}

/// Extraction result for one menu photo.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MenuData {
    items: Vec<MenuItem>,
    currency: String,
    exchange_rate: String,
    updated_at: DateTime<Utc>,
}

impl MenuData {
    pub fn new(items: Vec<MenuItem>, currency: impl Into<String>, exchange_rate: impl Into<String>) -> Self {
        Self {
            items,
            currency: currency.into(),
            exchange_rate: exchange_rate.into(),
            updated_at: Utc::now(),
        }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn exchange_rate(&self) -> &str {
        &self.exchange_rate
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }
}
