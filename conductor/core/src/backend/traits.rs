//! Provider Traits
//!
//! Trait definitions for every external collaborator the orchestration core
//! talks to: text generation, image generation/edit/upscale, speech
//! synthesis, and the two single-owner devices (microphone, audio output).
//! The Conductor only ever sees these traits, so tests drive it with mocks
//! and the CLI plugs in HTTP implementations.
//!
//! Every fallible method returns a classified [`ProviderError`]; implementors
//! are responsible for mapping their own status codes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::media::MediaRef;

// ============================================================================
// Text generation
// ============================================================================

/// Token stream events from text backends
#[derive(Clone, Debug)]
pub enum StreamingToken {
    /// A content delta
    Token(String),
    /// Response completed successfully
    Complete {
        /// The complete message (may differ from concatenated deltas)
        message: String,
    },
    /// The stream failed after it was opened
    Error(ProviderError),
}

/// Role of a turn sent to the text provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions / synthesized summaries
    System,
    /// User turn
    User,
    /// Assistant turn
    Assistant,
}

/// One role/content turn of the prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Who said it
    pub role: ChatRole,
    /// What was said
    pub content: String,
}

impl ChatTurn {
    /// Create a turn
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A text-generation request
#[derive(Clone, Debug)]
pub struct LlmRequest {
    /// Model to use (backend-specific identifier)
    pub model: String,
    /// System prompt
    pub system: Option<String>,
    /// Ordered conversation turns, newest last
    pub turns: Vec<ChatTurn>,
    /// Maximum tokens in response (0 = provider default)
    pub max_tokens: u32,
    /// Temperature (0.0-1.0, higher = more creative)
    pub temperature: f32,
    /// Image attached to the last user turn (vision analysis)
    pub image: Option<MediaRef>,
}

impl Default for LlmRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            system: None,
            turns: Vec::new(),
            max_tokens: 0,
            temperature: 0.7,
            image: None,
        }
    }
}

impl LlmRequest {
    /// Create a request for a model with the given turns
    pub fn new(model: impl Into<String>, turns: Vec<ChatTurn>) -> Self {
        Self {
            model: model.into(),
            turns,
            ..Default::default()
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 1.0);
        self
    }

    /// Set system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Attach an image for analysis
    #[must_use]
    pub fn with_image(mut self, image: MediaRef) -> Self {
        self.image = Some(image);
        self
    }
}

/// Response from a non-streaming request
#[derive(Clone, Debug)]
pub struct LlmResponse {
    /// The response text
    pub content: String,
    /// Model that generated the response
    pub model: String,
    /// Tokens used (if available)
    pub tokens_used: Option<u32>,
}

/// Text-generation backend
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend name (e.g., "OpenAI")
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Send a request and get an incremental delta stream
    ///
    /// The channel closes after `Complete` or `Error`.
    async fn send_streaming(
        &self,
        request: &LlmRequest,
    ) -> Result<mpsc::Receiver<StreamingToken>, ProviderError>;

    /// Send a request and wait for the complete response
    async fn send(&self, request: &LlmRequest) -> Result<LlmResponse, ProviderError>;
}

// ============================================================================
// Images
// ============================================================================

/// Output format for generated images
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG
    #[default]
    Png,
    /// JPEG
    Jpeg,
    /// WebP
    Webp,
}

impl ImageFormat {
    /// MIME type
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }
}

/// Text-to-image request
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateRequest {
    /// What to draw
    pub prompt: String,
    /// What to avoid
    pub negative_prompt: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Diffusion steps
    pub steps: u32,
    /// Classifier-free guidance scale
    pub guidance_scale: f32,
    /// Output format
    pub format: ImageFormat,
    /// Sampling seed
    pub seed: u64,
    /// Optional style preset
    pub style: Option<String>,
}

/// Image-to-image edit request
#[derive(Clone, Debug, PartialEq)]
pub struct EditRequest {
    /// Edit instruction
    pub prompt: String,
    /// Image to edit
    pub source: MediaRef,
    /// Optional inpainting mask
    pub mask: Option<MediaRef>,
    /// How far to move away from the source (0.0-1.0)
    pub strength: f32,
    /// Classifier-free guidance scale
    pub guidance_scale: f32,
    /// Diffusion steps
    pub steps: u32,
}

/// Upscale request
#[derive(Clone, Debug, PartialEq)]
pub struct UpscaleRequest {
    /// Image to upscale
    pub source: MediaRef,
    /// Scale factor
    pub scale: u32,
    /// Whether to run the enhancement pass
    pub enhance: bool,
    /// Prompt steering the enhancement pass
    pub enhancement_prompt: Option<String>,
}

/// Text-to-image provider
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Generate an image
    async fn generate(&self, request: &GenerateRequest) -> Result<MediaRef, ProviderError>;
}

/// Image edit / inpaint provider
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Edit an image
    async fn edit(&self, request: &EditRequest) -> Result<MediaRef, ProviderError>;
}

/// Image upscale provider
#[async_trait]
pub trait ImageUpscaler: Send + Sync {
    /// Provider name
    fn name(&self) -> &str;

    /// Upscale an image
    async fn upscale(&self, request: &UpscaleRequest) -> Result<MediaRef, ProviderError>;
}

// ============================================================================
// Speech and devices
// ============================================================================

/// Audio container formats
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG layer 3
    #[default]
    Mp3,
    /// PCM WAV
    Wav,
    /// Opus in Ogg
    Opus,
}

impl AudioFormat {
    /// MIME type
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Opus => "audio/ogg",
        }
    }
}

/// Speech synthesis request
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    /// Text to speak (already length-capped)
    pub text: String,
    /// Voice name
    pub voice: String,
    /// Output format
    pub format: AudioFormat,
    /// Playback speed multiplier
    pub speed: f32,
}

/// Synthesized audio
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioClip {
    /// Container format
    pub format: AudioFormat,
    /// Encoded audio
    pub data: Vec<u8>,
}

/// Text-to-speech engine (remote or on-device)
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Engine name
    fn name(&self) -> &str;

    /// Synthesize speech
    async fn synthesize(&self, request: &SpeechRequest) -> Result<AudioClip, ProviderError>;
}

/// Captured microphone input
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recording {
    /// Transcript of what was said
    pub transcript: String,
    /// The recorded audio, if the device keeps it
    pub audio: Option<MediaRef>,
}

/// Microphone capture device
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Begin capturing
    async fn start(&self) -> Result<(), ProviderError>;

    /// Stop capturing and return what was recorded
    async fn stop(&self) -> Result<Recording, ProviderError>;

    /// Whether the device is capturing right now
    fn is_recording(&self) -> bool;
}

/// Audio playback device
#[async_trait]
pub trait AudioOutput: Send + Sync {
    /// Start playing a clip (returns once playback has started)
    async fn play(&self, clip: AudioClip) -> Result<(), ProviderError>;

    /// Stop whatever is playing
    fn stop(&self);

    /// Whether a clip is playing right now
    fn is_playing(&self) -> bool;
}
