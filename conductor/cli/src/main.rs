//! Atelier CLI - Line-Oriented Terminal Surface
//!
//! Reads one line at a time from stdin and forwards it to the Conductor as a
//! `SurfaceEvent`. Everything the Conductor sends back is printed as it
//! arrives, so streamed responses appear token by token.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (~/.config/atelier/conductor.toml if present)
//! atelier
//!
//! # Custom config and model, responses spoken to files
//! atelier --config ./conductor.toml --model gpt-4o --audio
//!
//! # Verbose logging
//! RUST_LOG=debug atelier
//! ```
//!
//! # Surface commands
//!
//! Handled here rather than by the Conductor, since they need the terminal:
//!
//! - `/upload <path>`: attach an image file
//! - `/click <n>`: click the n-th image shown (1-based)
//! - `/record`, `/stop`: microphone capture
//! - `/speak`: speak the last response
//!
//! Everything else (`/help`, `/new`, `/photo`, ...) goes to the Conductor.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use atelier_conductor::{
    load_config_from_path, Conductor, ConductorMessage, ConductorState, ConfigOverrides,
    MediaRef, MessageId, MessageRole, NotifyLevel, Providers, SurfaceEvent, SurfaceType,
};

/// Atelier - chat and image assistant in the terminal
#[derive(Parser, Debug)]
#[command(name = "atelier")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "ATELIER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Text model
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// OpenAI-compatible text API base URL
    #[arg(long, value_name = "URL")]
    text_url: Option<String>,

    /// Speak completed responses
    #[arg(short = 'a', long)]
    audio: bool,

    /// Directory for synthesized speech clips
    #[arg(long, value_name = "DIR")]
    speech_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "ATELIER_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

/// What the printer has shown so far
#[derive(Default)]
struct Shown {
    images: Vec<MediaRef>,
    last_response: Option<MessageId>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout is the conversation
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "atelier={0},atelier_conductor={0}",
                    args.log_level
                ))
            }),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let mut config = load_config_from_path(args.config.clone())
        .with_context(|| "Failed to load configuration")?;
    config.apply_overrides(&ConfigOverrides {
        model: args.model.clone(),
        text_url: args.text_url.clone(),
        audio_enabled: args.audio.then_some(true),
        speech_output_dir: args.speech_dir.clone(),
    });
    config.validate()?;
    info!(source = %config.source(), model = %config.text.model, "Configuration loaded");

    let providers = Providers::from_config(&config)?;
    let (tx, rx) = mpsc::channel::<ConductorMessage>(256);
    let mut conductor = Conductor::new(config, providers, tx);

    let shown = Arc::new(Mutex::new(Shown::default()));
    let printer = tokio::spawn(print_messages(rx, shown.clone()));

    conductor.start().await?;
    conductor
        .handle_event(SurfaceEvent::Connected {
            event_id: SurfaceEvent::new_event_id(),
            surface_type: SurfaceType::Cli,
        })
        .await?;

    println!("atelier - type a message, or /help");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(line) = line else {
            // EOF or Ctrl-C
            conductor
                .handle_event(SurfaceEvent::QuitRequested {
                    event_id: SurfaceEvent::new_event_id(),
                })
                .await?;
            break;
        };

        match surface_event(&line, &shown).await {
            Ok(Some(event)) => conductor.handle_event(event).await?,
            Ok(None) => {}
            Err(e) => eprintln!("! {e:#}"),
        }

        if conductor.state() == ConductorState::ShuttingDown {
            break;
        }
    }

    drop(conductor);
    if let Err(e) = printer.await {
        warn!(error = %e, "Printer task failed");
    }
    Ok(())
}

/// Turn one input line into an event, handling surface commands locally
async fn surface_event(line: &str, shown: &Arc<Mutex<Shown>>) -> Result<Option<SurfaceEvent>> {
    let trimmed = line.trim();
    let mut parts = trimmed.split_whitespace();
    let event_id = SurfaceEvent::new_event_id();

    let event = match parts.next() {
        Some("/upload") => {
            let path = parts.collect::<Vec<_>>().join(" ");
            if path.is_empty() {
                anyhow::bail!("usage: /upload <path>");
            }
            SurfaceEvent::ImageUploaded {
                event_id,
                image: read_image(Path::new(&path)).await?,
            }
        }
        Some("/click") => {
            let index: usize = parts
                .next()
                .and_then(|n| n.parse().ok())
                .context("usage: /click <n>")?;
            let image = shown
                .lock()
                .await
                .images
                .get(index.saturating_sub(1))
                .cloned()
                .with_context(|| format!("no image #{index}"))?;
            SurfaceEvent::ImageClicked { event_id, image }
        }
        Some("/record") => SurfaceEvent::StartRecording { event_id },
        Some("/stop") => SurfaceEvent::StopRecording { event_id },
        Some("/speak") => {
            let message_id = shown
                .lock()
                .await
                .last_response
                .clone()
                .context("nothing to speak yet")?;
            SurfaceEvent::SpeakMessage {
                event_id,
                message_id,
            }
        }
        _ => return Ok(SurfaceEvent::from_input_line(trimmed)),
    };

    Ok(Some(event))
}

/// Read an image file as a data URL
async fn read_image(path: &Path) -> Result<MediaRef> {
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => anyhow::bail!("unsupported image type: {}", path.display()),
    };
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;
    Ok(MediaRef::from_bytes(mime, &bytes))
}

/// Print everything the Conductor sends until it quits
async fn print_messages(mut rx: mpsc::Receiver<ConductorMessage>, shown: Arc<Mutex<Shown>>) {
    let mut stdout = std::io::stdout();

    while let Some(msg) = rx.recv().await {
        match msg {
            ConductorMessage::Message { message } => {
                let prefix = match message.role {
                    MessageRole::User => ">",
                    MessageRole::Assistant => "<",
                };
                if message.streaming {
                    // Tokens follow
                    print!("{prefix} ");
                } else {
                    println!("{prefix} {}", message.content());
                }
                if let Some(image) = message.body.media() {
                    let mut shown = shown.lock().await;
                    shown.images.push(image.clone());
                    println!("  [image #{}] {image}", shown.images.len());
                }
                if message.role == MessageRole::Assistant && !message.streaming {
                    shown.lock().await.last_response = Some(message.id.clone());
                }
            }
            ConductorMessage::Token { text, .. } => {
                print!("{text}");
            }
            ConductorMessage::StreamEnd {
                message_id,
                metadata,
                ..
            } => {
                println!();
                if let Some(tps) = metadata.tokens_per_second {
                    info!(model = ?metadata.model_id, tps, "Response complete");
                }
                shown.lock().await.last_response = Some(message_id);
            }
            ConductorMessage::MessageRemoved { .. } => {
                println!();
            }
            ConductorMessage::Confirmation { options, .. } => {
                let labels: Vec<&str> = options.iter().map(|o| o.label()).collect();
                println!("  ({})", labels.join(" / "));
            }
            ConductorMessage::Suggestions { .. }
            | ConductorMessage::Status { .. }
            | ConductorMessage::State { .. } => {}
            ConductorMessage::Notify {
                level,
                title,
                message,
            } => {
                let marker = match level {
                    NotifyLevel::Info => "i",
                    NotifyLevel::Success => "+",
                    NotifyLevel::Warning => "!",
                    NotifyLevel::Error => "x",
                };
                match title {
                    Some(title) => println!("[{marker}] {title}: {message}"),
                    None => println!("[{marker}] {message}"),
                }
            }
            ConductorMessage::Snapshot { snapshot } => match serde_json::to_string_pretty(&snapshot)
            {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "Failed to serialize snapshot"),
            },
            ConductorMessage::Quit { message } => {
                if let Some(message) = message {
                    println!("{message}");
                }
                break;
            }
        }
        let _ = stdout.flush();
    }
}
