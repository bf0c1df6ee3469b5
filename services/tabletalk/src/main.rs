mod config;

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::sync::Arc;
use tabletalk_core::chat_log::ChatLog;
use tabletalk_core::completion::{CompletionApi, CompletionClient};
use tabletalk_core::geo::NominatimClient;
use tabletalk_core::intent;
use tabletalk_core::orchestrator::Orchestrator;
use tabletalk_core::order::CompletionOrderGuide;
use tabletalk_core::search::SerpClient;
use tabletalk_core::VoiceLink;
use tabletalk_realtime::{
    IceConfig, SessionEvent, VoiceProviderClient, VoiceSessionController, WebRtcGateway,
};
use tabletalk_types::session::TranscriptionModel;
use tabletalk_types::{AudioFormat, ChatMessage, MenuData, SessionConfig, Voice};
use tokio::io::AsyncBufReadExt;
use tracing_subscriber::fmt::time::ChronoLocal;

#[derive(Parser)]
#[command(name = "tabletalk", about = "Voice-first dining companion chat")]
struct Cli {
    /// Search locale passed to the live-search collaborator.
    #[arg(long)]
    location: Option<String>,

    /// Connect the voice session immediately on startup.
    #[arg(long)]
    voice: bool,
}

/// Adapter giving the core orchestrator its view of the session
/// controller.
struct ControllerLink {
    controller: Arc<VoiceSessionController>,
}

#[async_trait]
impl VoiceLink for ControllerLink {
    fn is_connected(&self) -> bool {
        self.controller.is_connected()
    }

    async fn send_user_turn(&self, text: &str) -> bool {
        self.controller.send_user_turn(text).await
    }

    async fn send_context_turn(&self, text: &str, instructions: &str) -> bool {
        self.controller.send_context_turn(text, instructions).await
    }
}

fn voice_session_config() -> SessionConfig {
    SessionConfig::new()
        .with_modalities_enable_audio()
        .with_instructions(&intent::voice_instructions())
        .with_voice(Voice::Alloy)
        .with_input_audio_format(AudioFormat::Pcm16)
        .with_output_audio_format(AudioFormat::Pcm16)
        .with_input_audio_transcription_enable(TranscriptionModel::Whisper)
        .build()
}

fn render(messages: &[ChatMessage]) {
    for message in messages {
        let who = if message.from_user() { "you" } else { "tabletalk" };
        println!("{who}> {}", message.body());
    }
}

fn render_menu(menu: &MenuData) {
    println!("--- menu ({} / {}) ---", menu.currency(), menu.exchange_rate());
    for (index, item) in menu.items().iter().enumerate() {
        println!(
            "{:>2}. {} ({}) — {} / {}",
            index + 1,
            item.name_en(),
            item.name(),
            item.price(),
            item.price_usd()
        );
    }
    println!("pick with /order 1,3");
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Load configuration ---
    let mut config = Config::from_env().context("Failed to load application configuration")?;

    // --- 2. Initialize logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    // --- 3. Parse command-line arguments ---
    let args = Cli::parse();
    if let Some(location) = args.location {
        config.search_location = location;
    }

    tracing::info!("Configuration loaded. Starting TableTalk...");

    // --- 4. Construct collaborators ---
    let log = Arc::new(ChatLog::new());
    let search = Arc::new(SerpClient::new(
        config.search_endpoint.clone(),
        config.search_api_key.clone(),
        config.search_location.clone(),
    ));
    let completion: Arc<dyn CompletionApi> = Arc::new(CompletionClient::new(
        config.chat_endpoint.clone(),
        config.chat_api_key.clone(),
        config.chat_model.clone(),
    ));
    let guide = Arc::new(CompletionOrderGuide::new(Arc::clone(&completion)));
    let geocoder = Arc::new(NominatimClient::new(config.geocode_endpoint.clone()));

    let provider = Arc::new(VoiceProviderClient::new(
        config.voice_base_url.clone(),
        config.voice_api_key.clone(),
        config.voice_model.clone(),
        config.voice_name.clone(),
    ));
    let (events_tx, mut events_rx) = tokio::sync::mpsc::channel::<SessionEvent>(64);
    let controller = Arc::new(VoiceSessionController::new(
        Arc::new(WebRtcGateway::new()),
        provider,
        voice_session_config(),
        IceConfig::default(),
        events_tx,
    ));
    let voice_link = Arc::new(ControllerLink {
        controller: Arc::clone(&controller),
    });

    let orchestrator = Orchestrator::new(
        Arc::clone(&log),
        search,
        completion,
        guide,
        voice_link,
        geocoder,
    );

    if args.voice {
        start_voice(&orchestrator, &controller).await;
    }

    println!("TableTalk ready. /voice /hangup /photo <path> /menu <path> /order <n,..> /where <lat> <lon> /copy <n> /clear /quit");

    // --- 5. Chat loop: stdin lines and session events, one at a time ---
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut current_menu: Option<MenuData> = None;

    loop {
        tokio::select! {
            maybe_line = lines.next_line() => {
                let Some(line) = maybe_line.context("failed to read stdin")? else {
                    break;
                };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                handle_line(&line, &orchestrator, &controller, &log, &mut current_menu).await;
            }
            Some(event) = events_rx.recv() => {
                match event {
                    SessionEvent::AssistantUtterance(text) => {
                        let appended = orchestrator.handle_assistant_utterance(&text).await;
                        render(&appended);
                    }
                    SessionEvent::ProviderError(message) => {
                        let appended = log.append(
                            format!("Voice session error: {message}"),
                            false,
                            tabletalk_types::MessageKind::Plain,
                        );
                        render(&[appended]);
                    }
                    SessionEvent::Closed => {
                        // The decoder never touches session state itself;
                        // the idempotent teardown happens here.
                        controller.disconnect().await;
                        println!("(voice session ended)");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down...");
                break;
            }
        }
    }

    controller.disconnect().await;
    tracing::info!("Shutting down...");
    Ok(())
}

async fn start_voice(orchestrator: &Orchestrator, controller: &VoiceSessionController) {
    use tabletalk_realtime::{ConnectError, ConnectOutcome};

    match controller.connect().await {
        Ok(ConnectOutcome::Connected) => println!("(voice session connected)"),
        Ok(ConnectOutcome::AlreadyActive) => println!("(voice session already running)"),
        Err(error) => {
            // One user-visible failure message per failed attempt.
            let body = match error {
                ConnectError::MicrophoneDenied => {
                    "Microphone permission denied, so voice chat can't start.".to_string()
                }
                other => format!("Couldn't start the voice session: {other}"),
            };
            let appended =
                orchestrator
                    .log()
                    .append(body, false, tabletalk_types::MessageKind::Plain);
            render(&[appended]);
        }
    }
}

async fn handle_line(
    line: &str,
    orchestrator: &Orchestrator,
    controller: &VoiceSessionController,
    log: &ChatLog,
    current_menu: &mut Option<MenuData>,
) {
    match line.split_once(' ') {
        _ if line == "/voice" => {
            start_voice(orchestrator, controller).await;
        }
        _ if line == "/hangup" => {
            controller.disconnect().await;
            println!("(voice session closed)");
        }
        _ if line == "/clear" => {
            orchestrator.clear().await;
            *current_menu = None;
            println!("(chat cleared)");
        }
        Some(("/photo", path)) => match tokio::fs::read(path.trim()).await {
            Ok(bytes) => render(&orchestrator.handle_image(&bytes).await),
            Err(error) => println!("couldn't read {path}: {error}"),
        },
        Some(("/menu", path)) => match tokio::fs::read(path.trim()).await {
            Ok(bytes) => {
                let (appended, menu) = orchestrator.handle_menu_photo(&bytes).await;
                render(&appended);
                if let Some(menu) = &menu {
                    render_menu(menu);
                }
                *current_menu = menu;
            }
            Err(error) => println!("couldn't read {path}: {error}"),
        },
        Some(("/order", picks)) => {
            let Some(menu) = current_menu else {
                println!("load a menu first with /menu <path>");
                return;
            };
            let items: Vec<_> = picks
                .split(',')
                .filter_map(|token| token.trim().parse::<usize>().ok())
                .filter(|&index| index >= 1)
                .filter_map(|index| menu.items().get(index - 1).cloned())
                .collect();
            if items.is_empty() {
                println!("no valid item numbers in {picks:?}");
                return;
            }
            render(&orchestrator.handle_menu_selection(items).await);
        }
        Some(("/where", coords)) => {
            let parts: Vec<_> = coords.split_whitespace().collect();
            let parsed = match parts.as_slice() {
                [lat, lon] => lat.parse::<f64>().ok().zip(lon.parse::<f64>().ok()),
                _ => None,
            };
            match parsed {
                Some((lat, lon)) => render(&orchestrator.handle_location(lat, lon).await),
                None => println!("usage: /where <lat> <lon>"),
            }
        }
        Some(("/doc", _)) => {
            println!("document attachments aren't supported yet");
        }
        Some(("/copy", seq)) => {
            let wanted = seq.trim().parse::<u64>().ok();
            let found = log
                .messages()
                .into_iter()
                .find(|message| Some(message.id().seq()) == wanted);
            match found {
                Some(message) => println!("{}", message.export_text()),
                None => println!("no message #{seq}"),
            }
        }
        _ => {
            render(&orchestrator.handle_user_text(line).await);
        }
    }
}
