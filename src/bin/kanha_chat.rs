//! Terminal front-end for a Kanha session.
//!
//! Reads lines from stdin and prints the conversation to stdout. Diagnostics
//! go to stderr.
//!
//! - text: send it
//! - empty line: send the current draft (e.g. a dictated transcript)
//! - `/listen`: dictate the next message
//! - `/ambient`: toggle the ambient track
//! - `/quit`: exit

use anyhow::Context;
use kanha::audio::{AmbientOutput, AudioMoodEngine, LoopedTrack};
use kanha::conversation::Role;
use kanha::speech::{EspeakSynthesizer, SpeechPlayback, SpeechSynthesizer};
use kanha::{
    ChatConfig, HttpDialogueService, NoticeKind, SessionController, SessionEvent, app_dirs,
    logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const ASSISTANT_NAME: &str = "Krishna";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = ChatConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let _log_guard = logging::init(&config.logging, &app_dirs::logs_dir())?;

    tracing::info!("kanha-chat starting (config {})", config_path.display());

    let service = HttpDialogueService::new(&config.service)?;
    tracing::info!("dialogue service at {}", service.endpoint());

    let ambient: Option<Arc<dyn AmbientOutput>> = match config.ambient.track.as_deref() {
        Some(track) => match LoopedTrack::open(track, config.ambient.output_device.as_deref()) {
            Ok(output) => Some(Arc::new(output)),
            Err(e) => {
                tracing::warn!("ambient audio unavailable: {e}");
                None
            }
        },
        None => None,
    };
    let synthesizer = EspeakSynthesizer::locate().map(|s| Arc::new(s) as Arc<dyn SpeechSynthesizer>);

    let session = Arc::new(
        SessionController::new(Arc::new(service), &config)
            .with_mood(AudioMoodEngine::new(ambient, config.ambient.clone()))
            .with_playback(SpeechPlayback::new(synthesizer, config.playback.clone())),
    );

    let cancel = CancellationToken::new();
    let renderer = tokio::spawn(render(session.subscribe(), cancel.clone()));
    let runner = {
        let session = Arc::clone(&session);
        let cancel = cancel.clone();
        tokio::spawn(async move { session.run(cancel).await })
    };

    println!("Talk to {ASSISTANT_NAME}. /listen to dictate, /ambient for music, /quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };

        match line.trim() {
            "/quit" => break,
            "/ambient" => {
                session.toggle_ambient_audio();
            }
            "/listen" => {
                if let Err(e) = session.capture_speech().await {
                    tracing::debug!("dictation not started: {e}");
                }
            }
            "" => spawn_submit(&session, session.draft()),
            _ => spawn_submit(&session, line),
        }
    }

    cancel.cancel();
    if session.audio_enabled() {
        session.toggle_ambient_audio();
        session.mood().settle().await;
    }
    let _ = runner.await;
    let _ = renderer.await;
    tracing::info!("kanha-chat shut down cleanly");
    Ok(())
}

fn config_path_from_args() -> anyhow::Result<PathBuf> {
    let mut args = std::env::args().skip(1);
    match (args.next().as_deref(), args.next()) {
        (None, _) => Ok(ChatConfig::default_config_path()),
        (Some("--config" | "-c"), Some(path)) => Ok(PathBuf::from(path)),
        (Some(other), _) => anyhow::bail!("usage: kanha-chat [--config <path>] (got '{other}')"),
    }
}

/// Submit in the background so input stays responsive while a reply is pending.
fn spawn_submit(session: &Arc<SessionController>, text: String) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        let outcome = session.submit(&text).await;
        tracing::debug!(?outcome, "submission finished");
    });
}

async fn render(mut events: broadcast::Receiver<SessionEvent>, cancel: CancellationToken) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            event = events.recv() => event,
        };
        match event {
            Ok(SessionEvent::MessageAppended { message, .. }) => match message.role() {
                Role::User => println!("You: {}", message.content()),
                Role::Assistant => {
                    let mut line = format!("{ASSISTANT_NAME}: {}", message.content());
                    if let Some(emotion) = message.emotion() {
                        line.push_str(&format!(" ({emotion})"));
                    }
                    if message.is_crisis() {
                        line.push_str(" [support resources recommended]");
                    }
                    println!("{line}");
                }
            },
            Ok(SessionEvent::PendingChanged { pending: true }) => {
                println!("{ASSISTANT_NAME} is thinking...");
            }
            Ok(SessionEvent::DraftChanged { text }) if !text.is_empty() => {
                println!("Heard: {text} (press Enter to send)");
            }
            Ok(SessionEvent::AmbientToggled { enabled }) => {
                println!("Ambient audio {}", if enabled { "on" } else { "off" });
            }
            Ok(SessionEvent::Notice { kind, text }) => match kind {
                NoticeKind::CaptureUnsupported => println!("! {text}"),
                NoticeKind::CaptureFailed => println!("! {text} Try /listen again."),
            },
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "renderer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
