//! Media Operation Pipeline
//!
//! Image generate / edit / upscale with deterministic fallback.
//!
//! # Chains
//!
//! ```text
//! generate:  primary generator ──▶ secondary generator
//!
//! edit:      edit (cue-derived or standard params)
//!              ──▶ upscale with the prompt as enhancement
//!              ──▶ edit (relaxed params)
//!
//! upscale:   upscaler
//! ```
//!
//! The pipeline returns either a usable [`MediaRef`] or a [`PipelineFailure`]
//! listing every attempt. It never retries beyond the chain, so a logical
//! operation costs at most three provider calls.

pub mod fallback;
pub mod params;

use std::sync::Arc;

use rand::Rng;

use crate::backend::{
    EditRequest, GenerateRequest, ImageEditor, ImageGenerator, ImageUpscaler, UpscaleRequest,
};
use crate::media::MediaRef;
use crate::metrics::SharedMonitor;

pub use fallback::{run_with_fallback, PipelineAttempt, PipelineFailure, Strategy};
pub use params::{
    EditParams, ImageSettings, ParamError, ParamOverrides, RELAXED_EDIT, STANDARD_EDIT,
    UPSCALE_FACTOR,
};

/// A logical media operation
#[derive(Clone, Debug, PartialEq)]
pub enum MediaRequest {
    /// Text-to-image
    Generate {
        /// What to draw
        prompt: String,
        /// Style preset (falls back to the configured default)
        style: Option<String>,
    },
    /// Change an existing image
    Edit {
        /// Edit instruction
        prompt: String,
        /// Image to edit
        source: MediaRef,
        /// Explicit parameters
        overrides: ParamOverrides,
    },
    /// Enlarge an existing image
    Upscale {
        /// Image to upscale
        source: MediaRef,
    },
}

impl MediaRequest {
    /// Operation name for logs and failures
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Generate { .. } => "generate",
            Self::Edit { .. } => "edit",
            Self::Upscale { .. } => "upscale",
        }
    }
}

/// Providers the pipeline drives
#[derive(Clone)]
pub struct MediaProviders {
    /// Primary text-to-image provider
    pub generator: Arc<dyn ImageGenerator>,
    /// Secondary text-to-image provider
    pub secondary_generator: Option<Arc<dyn ImageGenerator>>,
    /// Image edit provider
    pub editor: Arc<dyn ImageEditor>,
    /// Image upscale provider
    pub upscaler: Arc<dyn ImageUpscaler>,
}

/// Runs media operations through their fallback chains
pub struct MediaPipeline {
    providers: MediaProviders,
    settings: ImageSettings,
    monitor: SharedMonitor,
}

impl MediaPipeline {
    /// Create a pipeline
    #[must_use]
    pub fn new(providers: MediaProviders, settings: ImageSettings, monitor: SharedMonitor) -> Self {
        Self {
            providers,
            settings,
            monitor,
        }
    }

    /// Image settings in use
    #[must_use]
    pub fn settings(&self) -> &ImageSettings {
        &self.settings
    }

    /// Run one logical operation
    pub async fn execute(&self, request: MediaRequest) -> Result<MediaRef, PipelineFailure> {
        let operation = request.operation();
        let strategies = match request {
            MediaRequest::Generate { prompt, style } => {
                self.generation_strategies(&self.generate_request(prompt, style))
            }
            MediaRequest::Edit {
                prompt,
                source,
                overrides,
            } => self.edit_strategies(&prompt, &source, &overrides),
            MediaRequest::Upscale { source } => vec![self.upscale_strategy(UpscaleRequest {
                source,
                scale: UPSCALE_FACTOR,
                enhance: false,
                enhancement_prompt: None,
            })],
        };

        tracing::debug!(operation, strategies = strategies.len(), "Running media chain");
        run_with_fallback(operation, strategies, &self.monitor).await
    }

    /// Text-to-image request with pipeline-supplied settings and a fresh seed
    #[must_use]
    pub fn generate_request(&self, prompt: String, style: Option<String>) -> GenerateRequest {
        GenerateRequest {
            prompt,
            negative_prompt: self.settings.negative_prompt.clone(),
            width: self.settings.width,
            height: self.settings.height,
            steps: self.settings.steps,
            guidance_scale: self.settings.guidance_scale,
            format: self.settings.format,
            seed: rand::thread_rng().gen_range(0..u64::from(u32::MAX)),
            style: style.or_else(|| self.settings.style.clone()),
        }
    }

    /// Primary generator, then the secondary with the same request
    #[must_use]
    pub fn generation_strategies(&self, request: &GenerateRequest) -> Vec<Strategy<MediaRef>> {
        std::iter::once(&self.providers.generator)
            .chain(self.providers.secondary_generator.as_ref())
            .map(|generator| {
                let generator = Arc::clone(generator);
                let request = request.clone();
                let params = format!("{}x{} seed={}", request.width, request.height, request.seed);
                Strategy::new(
                    generator.name().to_string(),
                    "generate",
                    params,
                    move || async move { generator.generate(&request).await },
                )
            })
            .collect()
    }

    /// The three-step edit chain
    #[must_use]
    pub fn edit_strategies(
        &self,
        prompt: &str,
        source: &MediaRef,
        overrides: &ParamOverrides,
    ) -> Vec<Strategy<MediaRef>> {
        let first = EditParams::from_prompt(prompt).with_overrides(overrides);

        vec![
            self.edit_strategy("edit_standard", prompt, source, first),
            self.upscale_strategy(UpscaleRequest {
                source: source.clone(),
                scale: UPSCALE_FACTOR,
                enhance: true,
                enhancement_prompt: Some(prompt.to_string()),
            }),
            self.edit_strategy("edit_relaxed", prompt, source, RELAXED_EDIT),
        ]
    }

    fn edit_strategy(
        &self,
        label: &'static str,
        prompt: &str,
        source: &MediaRef,
        params: EditParams,
    ) -> Strategy<MediaRef> {
        let editor = Arc::clone(&self.providers.editor);
        let request = EditRequest {
            prompt: prompt.to_string(),
            source: source.clone(),
            mask: None,
            strength: params.strength,
            guidance_scale: params.guidance_scale,
            steps: params.steps,
        };
        Strategy::new(
            editor.name().to_string(),
            label,
            params.describe(),
            move || async move { editor.edit(&request).await },
        )
    }

    fn upscale_strategy(&self, request: UpscaleRequest) -> Strategy<MediaRef> {
        let upscaler = Arc::clone(&self.providers.upscaler);
        let label = if request.enhance {
            "upscale_enhance"
        } else {
            "upscale"
        };
        let params = format!("scale={} enhance={}", request.scale, request.enhance);
        Strategy::new(
            upscaler.name().to_string(),
            label,
            params,
            move || async move { upscaler.upscale(&request).await },
        )
    }
}
