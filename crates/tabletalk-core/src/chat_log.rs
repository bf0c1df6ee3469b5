//! The append-only message history every conversational mode writes into.

use std::sync::{Mutex, PoisonError};

use chrono::Utc;
use tabletalk_types::{ChatMessage, MessageId, MessageKind, QueryPayload};

struct Inner {
    next_seq: u64,
    messages: Vec<ChatMessage>,
}

/// Shared chat history. Appends are serialized by an internal lock so the
/// user-input path and the data-channel event path can both write without
/// coordinating; ids stay strictly increasing in insertion order.
pub struct ChatLog {
    inner: Mutex<Inner>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_seq: 1,
                messages: Vec::new(),
            }),
        }
    }

    fn push(&self, message_for: impl FnOnce(MessageId) -> ChatMessage) -> ChatMessage {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = MessageId::new(inner.next_seq, Utc::now().timestamp_millis());
        inner.next_seq += 1;
        let message = message_for(id);
        inner.messages.push(message.clone());
        message
    }

    /// Appends one message and returns the stored copy.
    pub fn append(&self, body: impl Into<String>, from_user: bool, kind: MessageKind) -> ChatMessage {
        let body = body.into();
        self.push(|id| ChatMessage::new(id, body, from_user, kind))
    }

    /// Appends an assistant message rendered as markdown.
    pub fn append_markdown(&self, body: impl Into<String>) -> ChatMessage {
        let body = body.into();
        self.push(|id| ChatMessage::new(id, body, false, MessageKind::Plain).with_markdown())
    }

    /// Appends an external-query result with its structured payload.
    pub fn append_external(&self, body: impl Into<String>, payload: QueryPayload) -> ChatMessage {
        let body = body.into();
        self.push(|id| {
            ChatMessage::new(id, body, false, MessageKind::ExternalQuery).with_payload(payload)
        })
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).messages.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the log and resets the id counter. Existing entries are
    /// dropped, never edited.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.messages.clear();
        inner.next_seq = 1;
    }
}

impl Default for ChatLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletalk_types::QueryTopic;

    #[test]
    fn ids_strictly_increase_in_append_order() {
        let log = ChatLog::new();
        log.append("one", true, MessageKind::Plain);
        log.append("two", false, MessageKind::Transcript);
        log.append("three", true, MessageKind::Plain);

        let messages = log.messages();
        assert_eq!(messages.len(), 3);
        for pair in messages.windows(2) {
            assert!(pair[0].id() < pair[1].id());
        }
        assert_eq!(messages[0].id().seq(), 1);
        assert_eq!(messages[2].id().seq(), 3);
    }

    #[test]
    fn clear_resets_the_counter() {
        let log = ChatLog::new();
        log.append("one", true, MessageKind::Plain);
        log.append("two", true, MessageKind::Plain);
        log.clear();

        assert!(log.is_empty());
        let fresh = log.append("again", true, MessageKind::Plain);
        assert_eq!(fresh.id().seq(), 1);
    }

    #[test]
    fn external_append_carries_payload() {
        let log = ChatLog::new();
        let payload = QueryPayload::new(serde_json::json!({"organicResults": []}), QueryTopic::Shop);
        let stored = log.append_external("results", payload);

        assert_eq!(stored.kind(), MessageKind::ExternalQuery);
        assert_eq!(stored.payload().unwrap().topic(), QueryTopic::Shop);
        assert!(!stored.from_user());
    }

    #[test]
    fn concurrent_appends_stay_unique() {
        use std::sync::Arc;

        let log = Arc::new(ChatLog::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    log.append("x", true, MessageKind::Plain);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let mut seqs: Vec<u64> = log.messages().iter().map(|m| m.id().seq()).collect();
        let count = seqs.len();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), count, "no id may be issued twice");
        assert_eq!(count, 400);
    }
}
