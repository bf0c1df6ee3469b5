//! Inbound data-channel event handling.
//!
//! The pump decodes each message into the typed event vocabulary and
//! reduces the overlapping "utterance complete" tags to exactly one
//! delivery per logical turn. Everything unrecognized is logged and
//! dropped; nothing on this path can take the session down.

use std::sync::Arc;

use tabletalk_types::events::client::SessionUpdateEvent;
use tabletalk_types::{ClientEvent, ServerEvent, SessionConfig};
use tokio::sync::mpsc;

use crate::SessionEvent;
use crate::signaling::{ChannelHandle, ChannelNotice};

/// Picks the canonical utterance-complete signal for the session's
/// modality and suppresses duplicate deliveries of the same response.
/// Audio sessions listen to `response.audio_transcript.done`; text-only
/// sessions listen to `response.text.done`; `response.content_part.done`
/// never delivers.
pub struct TurnTracker {
    audio_mode: bool,
    last_response_id: Option<String>,
}

impl TurnTracker {
    pub fn new(audio_mode: bool) -> Self {
        Self {
            audio_mode,
            last_response_id: None,
        }
    }

    /// Returns the completed utterance if this event is the canonical
    /// completion signal for an undelivered turn.
    pub fn utterance_from(&mut self, event: &ServerEvent) -> Option<String> {
        match event {
            ServerEvent::AudioTranscriptDone(done) if self.audio_mode => {
                self.deliver(done.response_id(), done.transcript())
            }
            ServerEvent::TextDone(done) if !self.audio_mode => {
                self.deliver(done.response_id(), done.text())
            }
            _ => None,
        }
    }

    fn deliver(&mut self, response_id: &str, text: &str) -> Option<String> {
        if self.last_response_id.as_deref() == Some(response_id) {
            tracing::debug!("suppressing duplicate delivery for response {response_id}");
            return None;
        }
        self.last_response_id = Some(response_id.to_string());
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

/// Drives one channel for the lifetime of one session: sends the session
/// configuration when the channel opens, then decodes and dispatches
/// inbound events until the channel closes.
pub async fn run_channel_pump(
    mut notices: mpsc::Receiver<ChannelNotice>,
    channel: Arc<dyn ChannelHandle>,
    config: SessionConfig,
    events_tx: mpsc::Sender<SessionEvent>,
) {
    let mut tracker = TurnTracker::new(config.speaks_audio());

    while let Some(notice) = notices.recv().await {
        match notice {
            ChannelNotice::Open => {
                let event = ClientEvent::SessionUpdate(SessionUpdateEvent::new(config.clone()));
                match serde_json::to_string(&event) {
                    Ok(text) => {
                        if let Err(error) = channel.send(&text).await {
                            tracing::error!("failed to send session configuration: {error:#}");
                        } else {
                            tracing::info!("session configuration sent");
                        }
                    }
                    Err(error) => {
                        tracing::error!("failed to serialize session configuration: {error}");
                    }
                }
            }
            ChannelNotice::Message(text) => match ServerEvent::decode(&text) {
                Ok(event) => dispatch(event, &mut tracker, &events_tx).await,
                Err(error) => {
                    tracing::warn!("dropping undecodable event: {error}");
                }
            },
            ChannelNotice::Error(error) => {
                tracing::warn!("data channel error: {error}");
            }
            ChannelNotice::Closed => {
                tracing::info!("data channel closed");
                let _ = events_tx.send(SessionEvent::Closed).await;
                break;
            }
        }
    }
}

async fn dispatch(event: ServerEvent, tracker: &mut TurnTracker, events_tx: &mpsc::Sender<SessionEvent>) {
    if let Some(utterance) = tracker.utterance_from(&event) {
        if events_tx
            .send(SessionEvent::AssistantUtterance(utterance))
            .await
            .is_err()
        {
            tracing::warn!("session event receiver dropped");
        }
        return;
    }

    match event {
        ServerEvent::SessionCreated(created) => {
            tracing::info!("session created: {:?}", created.session().id());
        }
        ServerEvent::SessionUpdated(updated) => {
            tracing::info!("session updated: {:?}", updated.session().id());
        }
        ServerEvent::SpeechStarted(started) => {
            tracing::debug!("user speech started: {:?}", started.item_id());
        }
        ServerEvent::SpeechStopped(stopped) => {
            tracing::debug!("user speech stopped: {:?}", stopped.item_id());
        }
        ServerEvent::ContentPartDone(part) => {
            tracing::debug!("content part done for response {}", part.response_id());
        }
        ServerEvent::AudioTranscriptDone(done) => {
            tracing::debug!("transcript done for response {} (not canonical)", done.response_id());
        }
        ServerEvent::TextDone(done) => {
            tracing::debug!("text done for response {} (not canonical)", done.response_id());
        }
        ServerEvent::ResponseDone(done) => {
            tracing::debug!("response done: {:?}", done.response().status());
        }
        ServerEvent::Error(error) => {
            tracing::warn!("provider error event: {}", error.error().message());
            if events_tx
                .send(SessionEvent::ProviderError(
                    error.error().message().to_string(),
                ))
                .await
                .is_err()
            {
                tracing::warn!("session event receiver dropped");
            }
        }
        ServerEvent::Unknown { event_type } => {
            tracing::debug!("ignoring unrecognized event type {event_type:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::{ChannelState, MockChannelHandle};
    use tabletalk_types::session::TranscriptionModel;
    use tabletalk_types::{AudioFormat, Voice};

    fn audio_config() -> SessionConfig {
        SessionConfig::new()
            .with_modalities_enable_audio()
            .with_instructions("defer lookups")
            .with_voice(Voice::Alloy)
            .with_input_audio_format(AudioFormat::Pcm16)
            .with_input_audio_transcription_enable(TranscriptionModel::Whisper)
            .build()
    }

    fn transcript_done(response_id: &str, transcript: &str) -> String {
        serde_json::json!({
            "type": "response.audio_transcript.done",
            "event_id": "ev_t",
            "response_id": response_id,
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "transcript": transcript,
        })
        .to_string()
    }

    fn text_done(response_id: &str, text: &str) -> String {
        serde_json::json!({
            "type": "response.text.done",
            "event_id": "ev_x",
            "response_id": response_id,
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "text": text,
        })
        .to_string()
    }

    async fn run_pump_with(
        notices: Vec<ChannelNotice>,
        config: SessionConfig,
    ) -> (Vec<SessionEvent>, Vec<String>) {
        let (notice_tx, notice_rx) = mpsc::channel(32);
        let (events_tx, mut events_rx) = mpsc::channel(32);

        let sent = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let mut channel = MockChannelHandle::new();
        let sent_clone = Arc::clone(&sent);
        channel.expect_send().returning(move |text| {
            sent_clone.lock().unwrap().push(text.to_string());
            Ok(())
        });
        channel.expect_ready_state().return_const(ChannelState::Open);

        for notice in notices {
            notice_tx.send(notice).await.unwrap();
        }
        drop(notice_tx);

        run_channel_pump(notice_rx, Arc::new(channel), config, events_tx).await;

        let mut events = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            events.push(event);
        }
        let sent = sent.lock().unwrap().clone();
        (events, sent)
    }

    #[tokio::test]
    async fn open_notice_sends_session_configuration() {
        let (_, sent) = run_pump_with(vec![ChannelNotice::Open], audio_config()).await;

        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["instructions"], "defer lookups");
        assert_eq!(value["session"]["voice"], "alloy");
    }

    #[tokio::test]
    async fn one_utterance_even_when_both_done_tags_fire() {
        let notices = vec![
            ChannelNotice::Message(transcript_done("resp_1", "Here is the plan.")),
            ChannelNotice::Message(text_done("resp_1", "Here is the plan.")),
        ];
        let (events, _) = run_pump_with(notices, audio_config()).await;

        let utterances: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::AssistantUtterance(_)))
            .collect();
        assert_eq!(utterances.len(), 1);
    }

    #[tokio::test]
    async fn text_only_sessions_listen_to_text_done() {
        let config = SessionConfig::new().with_modalities_disable_audio().build();
        let notices = vec![
            ChannelNotice::Message(transcript_done("resp_2", "spoken")),
            ChannelNotice::Message(text_done("resp_2", "written")),
        ];
        let (events, _) = run_pump_with(notices, config).await;

        assert_eq!(
            events,
            vec![SessionEvent::AssistantUtterance("written".to_string())]
        );
    }

    #[tokio::test]
    async fn duplicate_transcripts_for_one_response_deliver_once() {
        let notices = vec![
            ChannelNotice::Message(transcript_done("resp_3", "hello")),
            ChannelNotice::Message(transcript_done("resp_3", "hello")),
            ChannelNotice::Message(transcript_done("resp_4", "again")),
        ];
        let (events, _) = run_pump_with(notices, audio_config()).await;

        assert_eq!(
            events,
            vec![
                SessionEvent::AssistantUtterance("hello".to_string()),
                SessionEvent::AssistantUtterance("again".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn unknown_tags_and_malformed_json_are_dropped_quietly() {
        let notices = vec![
            ChannelNotice::Message(r#"{"type":"rate_limits.updated","event_id":"e"}"#.to_string()),
            ChannelNotice::Message("{definitely not json".to_string()),
            ChannelNotice::Message(r#"{"no_type_field":true}"#.to_string()),
        ];
        let (events, _) = run_pump_with(notices, audio_config()).await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn provider_error_event_is_surfaced() {
        let error = serde_json::json!({
            "type": "error",
            "event_id": "ev_e",
            "error": {"type": "invalid_request_error", "message": "bad session"}
        })
        .to_string();
        let (events, _) = run_pump_with(vec![ChannelNotice::Message(error)], audio_config()).await;

        assert_eq!(
            events,
            vec![SessionEvent::ProviderError("bad session".to_string())]
        );
    }

    #[tokio::test]
    async fn close_notice_emits_closed_and_stops() {
        let notices = vec![
            ChannelNotice::Closed,
            // Nothing after close is processed.
        ];
        let (events, _) = run_pump_with(notices, audio_config()).await;
        assert_eq!(events, vec![SessionEvent::Closed]);
    }

    #[tokio::test]
    async fn content_part_done_is_never_a_delivery_signal() {
        let part = serde_json::json!({
            "type": "response.content_part.done",
            "event_id": "ev_p",
            "response_id": "resp_9",
            "item_id": "item_9",
            "output_index": 0,
            "content_index": 0,
            "part": {"type": "audio", "transcript": "should not deliver"}
        })
        .to_string();
        let (events, _) = run_pump_with(vec![ChannelNotice::Message(part)], audio_config()).await;
        assert!(events.is_empty());
    }
}
