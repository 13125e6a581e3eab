//! Atelier Conductor - Headless Orchestration for a Chat and Image Assistant
//!
//! This crate holds the orchestration core of atelier, completely independent
//! of any UI framework. It decides what each user message means, runs image
//! operations with provider fallback, streams text responses, gates image
//! edits behind a confirmation, and coordinates speech with the microphone.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        UI Surfaces                               │
//! │        ┌─────────┐    ┌─────────┐    ┌─────────────────────┐     │
//! │        │   CLI   │    │   Web   │    │  Desktop / Headless │     │
//! │        └────┬────┘    └────┬────┘    └──────────┬──────────┘     │
//! │             └──────────────┴────────────────────┘                │
//! │                    SurfaceEvent (up)                             │
//! │                  ConductorMessage (down)                         │
//! └───────────────────────────┬──────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼──────────────────────────────────────┐
//! │                    CONDUCTOR CORE                                │
//! │  ┌────────────────────────┴────────────────────────────────────┐ │
//! │  │                      Conductor                               │ │
//! │  │  ┌─────────┐ ┌──────────┐ ┌───────────┐ ┌────────┐ ┌──────┐ │ │
//! │  │  │ routing │ │ pipeline │ │ streaming │ │ speech │ │ gate │ │ │
//! │  │  └─────────┘ └──────────┘ └───────────┘ └────────┘ └──────┘ │ │
//! │  └──────────────────────────────┬──────────────────────────────┘ │
//! │                                 │                                │
//! │      text (OpenAI-compatible) · images (Stability, Inference)    │
//! │                        speech (OpenAI TTS)                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Conductor`]: The main orchestration struct that manages everything
//! - [`ConductorMessage`]: Messages sent from Conductor to UI surfaces
//! - [`SurfaceEvent`]: Events sent from UI surfaces to Conductor
//! - [`Session`]: Conversation session with message history
//! - [`ConversationContext`]: Selection, uploads, topics and style
//! - [`EnhancementState`]: The confirmation gate in front of image edits
//!
//! # Quick Start
//!
//! ```ignore
//! use atelier_conductor::{load_config, Conductor, Providers, SurfaceEvent};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, mut rx) = mpsc::channel(100);
//!
//!     let config = load_config()?;
//!     let providers = Providers::from_config(&config)?;
//!     let mut conductor = Conductor::new(config, providers, tx);
//!     conductor.start().await?;
//!
//!     conductor
//!         .handle_event(SurfaceEvent::user_message("paint me a lighthouse"))
//!         .await?;
//!
//!     while let Ok(msg) = rx.try_recv() {
//!         // Render message to UI
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Provider traits and the HTTP clients behind them
//! - [`conductor`]: Main Conductor struct
//! - [`config`]: TOML configuration with environment overrides
//! - [`context`]: Conversation context and its update commands
//! - [`context_window`]: History selection, summaries and system prompts
//! - [`enhancement`]: Enhancement confirmation state machine
//! - [`error`]: Provider errors and their user-facing categories
//! - [`events`]: Events from UI surfaces to Conductor
//! - [`media`]: Image and audio references
//! - [`messages`]: Messages from Conductor to UI surfaces
//! - [`metrics`]: Provider latency and failure tracking
//! - [`pipeline`]: Image operations with ordered fallback
//! - [`routing`]: Intent classification
//! - [`session`]: Conversation session management
//! - [`speech`]: Speech output and microphone coordination
//! - [`streaming`]: Streaming text responses
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any terminal or UI framework.
//! It's pure business logic that can be used anywhere.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod conductor;
pub mod config;
pub mod context;
pub mod context_window;
pub mod enhancement;
pub mod error;
pub mod events;
pub mod media;
pub mod messages;
pub mod metrics;
pub mod pipeline;
pub mod routing;
pub mod session;
pub mod speech;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    AudioOutput, ChatRole, ChatTurn, ImageEditor, ImageGenerator, ImageUpscaler, LlmBackend,
    LlmRequest, LlmResponse, Microphone, SpeechSynthesizer, StreamingToken,
};
pub use conductor::{Conductor, Providers};
pub use context::{AssistantMode, ContextCommand, ConversationContext};
pub use enhancement::{EnhancementState, Proposal, Transition};
pub use error::{ErrorCategory, ProviderError};
pub use events::{SurfaceEvent, SurfaceType};
pub use media::MediaRef;
pub use messages::{
    ConductorMessage, ConductorState, EventId, MessageId, MessageRole, NotifyLevel,
    ResponseMetadata, SessionId, SessionSnapshot, StatusFlags,
};
pub use session::{ConversationMessage, MessageBody, Session, SessionMetadata, SessionState};

// Pipeline exports
pub use pipeline::{
    MediaPipeline, MediaProviders, MediaRequest, ParamOverrides, PipelineFailure,
};

// Routing exports
pub use routing::{classify, Command, PhotoOperation, RouterView};

// Speech exports
pub use speech::{SpeechCoordinator, SpeechOutcome, VoiceSettings};

// Streaming exports
pub use streaming::{StreamOutcome, StreamingCoordinator};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConductorConfig, ConductorToml,
    ConfigError, ConfigOverrides, ConfigSource,
};
