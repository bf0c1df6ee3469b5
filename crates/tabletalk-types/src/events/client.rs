//! Payload structs for outbound data-channel events.

use crate::session::SessionConfig;

/// `session.update` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionUpdateEvent {
    session: SessionConfig,
}

impl SessionUpdateEvent {
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &SessionConfig {
        &self.session
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ItemContent {
    #[serde(rename = "input_text")]
    InputText { text: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemRole {
    User,
    System,
}

/// A conversation item carrying one user (or system) text turn.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    item_type: String,
    role: ItemRole,
    content: Vec<ItemContent>,
}

impl ConversationItem {
    pub fn user_text(text: &str) -> Self {
        Self {
            item_type: "message".to_string(),
            role: ItemRole::User,
            content: vec![ItemContent::InputText {
                text: text.to_string(),
            }],
        }
    }

    pub fn system_text(text: &str) -> Self {
        Self {
            item_type: "message".to_string(),
            role: ItemRole::System,
            content: vec![ItemContent::InputText {
                text: text.to_string(),
            }],
        }
    }

    pub fn role(&self) -> ItemRole {
        self.role
    }

    pub fn content(&self) -> &[ItemContent] {
        &self.content
    }
}

/// `conversation.item.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConversationItemCreateEvent {
    item: ConversationItem,
}

impl ConversationItemCreateEvent {
    pub fn new(item: ConversationItem) -> Self {
        Self { item }
    }

    pub fn item(&self) -> &ConversationItem {
        &self.item
    }
}

/// Directives for one requested response.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseDirectives {
    modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

/// `response.create` event
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResponseCreateEvent {
    response: ResponseDirectives,
}

impl ResponseCreateEvent {
    pub fn new(modalities: Vec<String>) -> Self {
        Self {
            response: ResponseDirectives {
                modalities,
                instructions: None,
            },
        }
    }

    pub fn with_instructions(mut self, instructions: &str) -> Self {
        self.response.instructions = Some(instructions.to_string());
        self
    }

    pub fn modalities(&self) -> &[String] {
        &self.response.modalities
    }

    pub fn instructions(&self) -> Option<&str> {
        self.response.instructions.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_item_serializes_as_message_with_input_text() {
        let item = ConversationItem::user_text("two dumplings please");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"][0]["type"], "input_text");
        assert_eq!(json["content"][0]["text"], "two dumplings please");
    }

    #[test]
    fn response_create_keeps_instructions_optional() {
        let plain = ResponseCreateEvent::new(vec!["audio".to_string()]);
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json["response"].get("instructions").is_none());

        let steered = ResponseCreateEvent::new(vec!["audio".to_string()])
            .with_instructions("talk about what the user is looking at");
        assert!(steered.instructions().is_some());
    }
}
