use chrono::{DateTime, Utc};

/// Category assigned to an external lookup, in fixed precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryTopic {
    Weather,
    Restaurant,
    Shop,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Plain,
    Transcript,
    ExternalQuery,
}

/// Raw search payload kept alongside the rendered text so richer views can
/// be re-derived without another network call.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueryPayload {
    data: serde_json::Value,
    topic: QueryTopic,
}

impl QueryPayload {
    pub fn new(data: serde_json::Value, topic: QueryTopic) -> Self {
        Self { data, topic }
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn topic(&self) -> QueryTopic {
        self.topic
    }
}

/// Message identifier: a monotonic sequence number paired with the creation
/// stamp in unix milliseconds. The sequence number alone orders messages;
/// the stamp keeps ids unique across a counter reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MessageId {
    seq: u64,
    stamp_ms: i64,
}

impl MessageId {
    pub fn new(seq: u64, stamp_ms: i64) -> Self {
        Self { seq, stamp_ms }
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn stamp_ms(&self) -> i64 {
        self.stamp_ms
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.seq, self.stamp_ms)
    }
}

/// One entry in the chat log. Messages are append-only: once created they
/// are never mutated or deleted.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    id: MessageId,
    body: String,
    from_user: bool,
    kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<QueryPayload>,
    markdown: bool,
    created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(id: MessageId, body: impl Into<String>, from_user: bool, kind: MessageKind) -> Self {
        Self {
            id,
            body: body.into(),
            from_user,
            kind,
            payload: None,
            markdown: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: QueryPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_markdown(mut self) -> Self {
        self.markdown = true;
        self
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn from_user(&self) -> bool {
        self.from_user
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn payload(&self) -> Option<&QueryPayload> {
        self.payload.as_ref()
    }

    pub fn markdown(&self) -> bool {
        self.markdown
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Plain-text form used by the clipboard export. External-query
    /// messages also carry their raw payload serialized as JSON.
    pub fn export_text(&self) -> String {
        match &self.payload {
            Some(payload) if self.kind == MessageKind::ExternalQuery => {
                let raw = serde_json::to_string_pretty(payload.data())
                    .unwrap_or_else(|_| "{}".to_string());
                format!("{}\n\n{}", self.body, raw)
            }
            _ => self.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_order_by_sequence() {
        let a = MessageId::new(1, 2_000);
        let b = MessageId::new(2, 1_000);
        assert!(a < b, "sequence number dominates the stamp");
    }

    #[test]
    fn export_includes_payload_for_external_query() {
        let id = MessageId::new(1, 0);
        let payload = QueryPayload::new(serde_json::json!({"organicResults": []}), QueryTopic::Weather);
        let msg = ChatMessage::new(id, "Weather in Paris", false, MessageKind::ExternalQuery)
            .with_payload(payload);

        let exported = msg.export_text();
        assert!(exported.starts_with("Weather in Paris"));
        assert!(exported.contains("organicResults"));
    }

    #[test]
    fn export_is_body_only_for_plain_messages() {
        let msg = ChatMessage::new(MessageId::new(1, 0), "hello", true, MessageKind::Plain);
        assert_eq!(msg.export_text(), "hello");
    }
}
