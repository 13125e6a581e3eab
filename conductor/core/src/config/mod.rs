//! TOML Configuration File Support
//!
//! Centralized configuration loading for the Conductor, supporting a TOML
//! file at `~/.config/atelier/conductor.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConductorConfig::apply_overrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [text]
//! base_url = "https://api.openai.com/v1"
//! model = "gpt-4o-mini"
//! max_tokens = 1024
//!
//! [images]
//! engine = "stable-diffusion-xl-1024-v1-0"
//! inference_model = "stabilityai/stable-diffusion-xl-base-1.0"
//!
//! [images.defaults]
//! width = 1024
//! height = 768
//! style = "photographic"
//!
//! [speech]
//! audio_enabled = true
//! voice = "nova"
//! ```
//!
//! API keys are read from the environment only (`OPENAI_API_KEY`,
//! `STABILITY_API_KEY`, `HF_API_TOKEN`), or from the file when set there.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context_window::COMPRESSION_THRESHOLD;
use crate::pipeline::ImageSettings;
use crate::speech::VoiceSettings;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Text section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TextToml {
    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,
    /// API key
    pub api_key: Option<String>,
    /// Model identifier
    pub model: Option<String>,
    /// Response token budget
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Images section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesToml {
    /// Stability API base URL
    pub stability_url: Option<String>,
    /// Stability API key
    pub stability_key: Option<String>,
    /// Stability generation engine
    pub engine: Option<String>,
    /// Hosted inference base URL
    pub inference_url: Option<String>,
    /// Hosted inference token
    pub inference_key: Option<String>,
    /// Hosted inference model
    pub inference_model: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// Generation defaults
    pub defaults: Option<ImageSettings>,
}

/// Speech section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechToml {
    /// Speak completed responses
    pub audio_enabled: Option<bool>,
    /// Speech API base URL
    pub base_url: Option<String>,
    /// Speech model
    pub model: Option<String>,
    /// Voice name
    pub voice: Option<String>,
    /// Playback speed multiplier
    pub speed: Option<f32>,
    /// Where synthesized clips are written on headless surfaces
    pub output_dir: Option<PathBuf>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Messages kept in memory per conversation
    pub max_messages: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorToml {
    /// Text completion section
    pub text: TextToml,
    /// Image providers section
    pub images: ImagesToml,
    /// Speech section
    pub speech: SpeechToml,
    /// Session section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Text completion settings
#[derive(Clone, Debug, PartialEq)]
pub struct TextConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,
    /// API key
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Response token budget
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_tokens: 1024,
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Image provider settings
#[derive(Clone, Debug, PartialEq)]
pub struct ImageConfig {
    /// Stability API base URL
    pub stability_url: String,
    /// Stability API key
    pub stability_key: Option<String>,
    /// Stability generation engine
    pub engine: String,
    /// Hosted inference base URL
    pub inference_url: String,
    /// Hosted inference token
    pub inference_key: Option<String>,
    /// Hosted inference model
    pub inference_model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Generation defaults
    pub settings: ImageSettings,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            stability_url: "https://api.stability.ai".to_string(),
            stability_key: None,
            engine: "stable-diffusion-xl-1024-v1-0".to_string(),
            inference_url: "https://api-inference.huggingface.co".to_string(),
            inference_key: None,
            inference_model: "stabilityai/stable-diffusion-xl-base-1.0".to_string(),
            timeout: Duration::from_secs(120),
            settings: ImageSettings::default(),
        }
    }
}

/// Speech settings
#[derive(Clone, Debug, PartialEq)]
pub struct SpeechConfig {
    /// Speak completed responses
    pub audio_enabled: bool,
    /// Speech API base URL
    pub base_url: String,
    /// Speech API key
    pub api_key: Option<String>,
    /// Speech model
    pub model: String,
    /// Voice parameters
    pub voice: VoiceSettings,
    /// Where synthesized clips are written on headless surfaces
    pub output_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            audio_enabled: false,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
            voice: VoiceSettings::default(),
            output_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("atelier")
                .join("speech"),
        }
    }
}

/// Centralized configuration for the Conductor
#[derive(Clone, Debug)]
pub struct ConductorConfig {
    /// Text completion
    pub text: TextConfig,
    /// Image providers
    pub images: ImageConfig,
    /// Speech
    pub speech: SpeechConfig,
    /// Messages kept in memory per conversation (0 = unlimited)
    ///
    /// A limit must leave room for the context window to summarize older
    /// turns, so it has to exceed [`COMPRESSION_THRESHOLD`].
    pub max_session_messages: usize,
    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,
    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            text: TextConfig::default(),
            images: ImageConfig::default(),
            speech: SpeechConfig::default(),
            max_session_messages: 0,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

/// Values a surface sets from its own arguments
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Text model
    pub model: Option<String>,
    /// Text API base URL
    pub text_url: Option<String>,
    /// Speak completed responses
    pub audio_enabled: Option<bool>,
    /// Directory for synthesized clips
    pub speech_output_dir: Option<PathBuf>,
}

impl ConductorConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Apply surface arguments (highest priority)
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        let mut applied = false;
        if let Some(ref model) = overrides.model {
            self.text.model = model.clone();
            applied = true;
        }
        if let Some(ref url) = overrides.text_url {
            self.text.base_url = url.clone();
            applied = true;
        }
        if let Some(enabled) = overrides.audio_enabled {
            self.speech.audio_enabled = enabled;
            applied = true;
        }
        if let Some(ref dir) = overrides.speech_output_dir {
            self.speech.output_dir = dir.clone();
            applied = true;
        }
        if applied {
            self.source = ConfigSource::Cli;
        }
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.text.temperature) {
            return Err(ConfigError::ValidationError(format!(
                "text.temperature must be between 0.0 and 1.0, got {}",
                self.text.temperature
            )));
        }
        if self.text.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "text.max_tokens must be positive".to_string(),
            ));
        }
        let settings = &self.images.settings;
        for (name, value) in [("width", settings.width), ("height", settings.height)] {
            if value == 0 || value % 64 != 0 {
                return Err(ConfigError::ValidationError(format!(
                    "images.defaults.{name} must be a positive multiple of 64, got {value}"
                )));
            }
        }
        if (1..=COMPRESSION_THRESHOLD).contains(&self.max_session_messages) {
            return Err(ConfigError::ValidationError(format!(
                "session.max_messages must be 0 (unlimited) or above {COMPRESSION_THRESHOLD}, got {}",
                self.max_session_messages
            )));
        }
        if self.speech.voice.speed <= 0.0 {
            return Err(ConfigError::ValidationError(
                "speech.speed must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/atelier/conductor.toml` or
/// `~/.config/atelier/conductor.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("atelier").join("conductor.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the result fails validation. A missing config file is not an error.
pub fn load_config() -> Result<ConductorConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConductorConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ConductorConfig, ConfigError> {
    // Start with defaults
    let mut config = ConductorConfig::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConductorToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConductorConfig, toml: ConductorToml) {
    let ConductorToml {
        text,
        images,
        speech,
        session,
    } = toml;

    if let Some(url) = text.base_url {
        config.text.base_url = url;
    }
    if text.api_key.is_some() {
        config.text.api_key = text.api_key;
    }
    if let Some(model) = text.model {
        config.text.model = model;
    }
    if let Some(max_tokens) = text.max_tokens {
        config.text.max_tokens = max_tokens;
    }
    if let Some(temperature) = text.temperature {
        config.text.temperature = temperature;
    }
    if let Some(secs) = text.timeout_secs {
        config.text.timeout = Duration::from_secs(secs);
    }

    if let Some(url) = images.stability_url {
        config.images.stability_url = url;
    }
    if images.stability_key.is_some() {
        config.images.stability_key = images.stability_key;
    }
    if let Some(engine) = images.engine {
        config.images.engine = engine;
    }
    if let Some(url) = images.inference_url {
        config.images.inference_url = url;
    }
    if images.inference_key.is_some() {
        config.images.inference_key = images.inference_key;
    }
    if let Some(model) = images.inference_model {
        config.images.inference_model = model;
    }
    if let Some(secs) = images.timeout_secs {
        config.images.timeout = Duration::from_secs(secs);
    }
    if let Some(settings) = images.defaults {
        config.images.settings = settings;
    }

    if let Some(enabled) = speech.audio_enabled {
        config.speech.audio_enabled = enabled;
    }
    if let Some(url) = speech.base_url {
        config.speech.base_url = url;
    }
    if let Some(model) = speech.model {
        config.speech.model = model;
    }
    if let Some(voice) = speech.voice {
        config.speech.voice.voice = voice;
    }
    if let Some(speed) = speech.speed {
        config.speech.voice.speed = speed;
    }
    if let Some(dir) = speech.output_dir {
        config.speech.output_dir = dir;
    }

    if let Some(max) = session.max_messages {
        config.max_session_messages = max;
    }
}

/// Apply environment variable overrides
fn apply_env_config(config: &mut ConductorConfig, env: impl Fn(&str) -> Option<String>) {
    let mut applied = false;

    // Keys
    if let Some(key) = env("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
        config.text.api_key = Some(key.clone());
        config.speech.api_key = Some(key);
        applied = true;
    }
    if let Some(key) = env("STABILITY_API_KEY").filter(|k| !k.trim().is_empty()) {
        config.images.stability_key = Some(key);
        applied = true;
    }
    if let Some(key) = env("HF_API_TOKEN").filter(|k| !k.trim().is_empty()) {
        config.images.inference_key = Some(key);
        applied = true;
    }

    // Text
    if let Some(model) = env("ATELIER_MODEL") {
        config.text.model = model;
        applied = true;
    }
    if let Some(url) = env("ATELIER_TEXT_URL") {
        config.text.base_url = url;
        applied = true;
    }
    if let Some(max_tokens) = env("ATELIER_MAX_TOKENS") {
        if let Ok(value) = max_tokens.parse() {
            config.text.max_tokens = value;
            applied = true;
        } else {
            tracing::warn!(value = %max_tokens, "Ignoring invalid ATELIER_MAX_TOKENS");
        }
    }

    // Images
    if let Some(url) = env("ATELIER_STABILITY_URL") {
        config.images.stability_url = url;
        applied = true;
    }
    if let Some(engine) = env("ATELIER_STABILITY_ENGINE") {
        config.images.engine = engine;
        applied = true;
    }
    if let Some(url) = env("ATELIER_INFERENCE_URL") {
        config.images.inference_url = url;
        applied = true;
    }
    if let Some(model) = env("ATELIER_INFERENCE_MODEL") {
        config.images.inference_model = model;
        applied = true;
    }

    // Speech
    if let Some(enabled) = env("ATELIER_AUDIO") {
        config.speech.audio_enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        applied = true;
    }
    if let Some(voice) = env("ATELIER_VOICE") {
        config.speech.voice.voice = voice;
        applied = true;
    }

    if applied {
        config.source = ConfigSource::Env;
    }
}
