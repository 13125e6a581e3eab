//! Stability AI Image Provider
//!
//! Primary image provider: generation, edit (image-to-image and masked
//! inpainting) and upscale.
//!
//! # Stability API
//!
//! - `POST /v1/generation/{engine}/text-to-image` - JSON in, JSON out with
//!   base64 `artifacts`
//! - `POST /v1/generation/{engine}/image-to-image[/masking]` - multipart in,
//!   binary image out (`Accept: image/png`)
//! - `POST /v1/generation/esrgan-v1-x2plus/image-to-image/upscale` - plain 2x
//! - `POST /v2beta/stable-image/upscale/conservative` - prompt-guided upscale

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;

use super::traits::{
    EditRequest, GenerateRequest, ImageEditor, ImageGenerator, ImageUpscaler, UpscaleRequest,
};
use super::{http_client, read_image, require_key, send_checked};
use crate::error::ProviderError;
use crate::media::{MediaBytes, MediaRef};

const PROVIDER: &str = "Stability";
const UPSCALE_ENGINE: &str = "esrgan-v1-x2plus";

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    artifacts: Vec<Artifact>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Artifact {
    base64: String,
    #[serde(default)]
    finish_reason: Option<String>,
}

/// Stability AI client
#[derive(Clone)]
pub struct StabilityImageProvider {
    base_url: String,
    api_key: Option<String>,
    engine: String,
    http_client: reqwest::Client,
}

impl StabilityImageProvider {
    /// Create a new provider
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        engine: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            engine: engine.into(),
            http_client: http_client(PROVIDER, timeout)?,
        })
    }

    fn v1_url(&self, engine: &str, path: &str) -> String {
        format!("{}/v1/generation/{engine}/{path}", self.base_url)
    }

    async fn source_part(&self, name: &'static str, source: &MediaRef) -> Result<Part, ProviderError> {
        let media = source.resolve_bytes(&self.http_client).await?;
        media.ensure_supported_image(PROVIDER)?;
        image_part(name, media)
    }
}

fn image_part(name: &'static str, media: MediaBytes) -> Result<Part, ProviderError> {
    let filename = format!("{name}.{}", media.file_extension());
    Part::bytes(media.bytes)
        .file_name(filename)
        .mime_str(&media.mime)
        .map_err(|e| ProviderError::UnsupportedMedia {
            provider: PROVIDER.to_string(),
            detail: e.to_string(),
        })
}

/// Stability's `image_strength` is how much of the source survives
fn image_strength(strength: f32) -> f32 {
    (1.0 - strength).clamp(0.0, 1.0)
}

fn decode_artifacts(response: GenerationResponse) -> Result<MediaRef, ProviderError> {
    let artifact = response
        .artifacts
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::transport(PROVIDER, "response contained no artifacts"))?;

    if artifact.finish_reason.as_deref() == Some("CONTENT_FILTERED") {
        return Err(ProviderError::InvalidRequest {
            provider: PROVIDER.to_string(),
            detail: "the result was blocked by the content filter".to_string(),
        });
    }

    let bytes = STANDARD
        .decode(artifact.base64.as_bytes())
        .map_err(|e| ProviderError::transport(PROVIDER, e))?;
    Ok(MediaRef::from_bytes("image/png", &bytes))
}

#[async_trait]
impl ImageGenerator for StabilityImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<MediaRef, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;

        let mut prompts = vec![json!({ "text": request.prompt, "weight": 1.0 })];
        if !request.negative_prompt.is_empty() {
            prompts.push(json!({ "text": request.negative_prompt, "weight": -1.0 }));
        }

        let mut body = json!({
            "text_prompts": prompts,
            "cfg_scale": request.guidance_scale,
            "width": request.width,
            "height": request.height,
            "steps": request.steps,
            "samples": 1,
            "seed": request.seed,
        });
        if let Some(ref style) = request.style {
            body["style_preset"] = json!(style);
        }

        let response = send_checked(
            PROVIDER,
            self.http_client
                .post(self.v1_url(&self.engine, "text-to-image"))
                .bearer_auth(key)
                .header(reqwest::header::ACCEPT, "application/json")
                .json(&body),
        )
        .await?;

        let parsed: GenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;
        decode_artifacts(parsed)
    }
}

#[async_trait]
impl ImageEditor for StabilityImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn edit(&self, request: &EditRequest) -> Result<MediaRef, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;

        let mut form = Form::new()
            .part("init_image", self.source_part("init_image", &request.source).await?)
            .text("text_prompts[0][text]", request.prompt.clone())
            .text("text_prompts[0][weight]", "1")
            .text("cfg_scale", request.guidance_scale.to_string())
            .text("steps", request.steps.to_string())
            .text("samples", "1");

        let path = if let Some(ref mask) = request.mask {
            form = form
                .part("mask_image", self.source_part("mask_image", mask).await?)
                .text("mask_source", "MASK_IMAGE_WHITE");
            "image-to-image/masking"
        } else {
            form = form
                .text("init_image_mode", "IMAGE_STRENGTH")
                .text("image_strength", image_strength(request.strength).to_string());
            "image-to-image"
        };

        let response = send_checked(
            PROVIDER,
            self.http_client
                .post(self.v1_url(&self.engine, path))
                .bearer_auth(key)
                .header(reqwest::header::ACCEPT, "image/png")
                .multipart(form),
        )
        .await?;

        read_image(PROVIDER, response, "image/png").await
    }
}

#[async_trait]
impl ImageUpscaler for StabilityImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn upscale(&self, request: &UpscaleRequest) -> Result<MediaRef, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;
        let image = self.source_part("image", &request.source).await?;

        let builder = match (request.enhance, request.enhancement_prompt.as_deref()) {
            (true, Some(prompt)) => self
                .http_client
                .post(format!(
                    "{}/v2beta/stable-image/upscale/conservative",
                    self.base_url
                ))
                .header(reqwest::header::ACCEPT, "image/*")
                .multipart(
                    Form::new()
                        .part("image", image)
                        .text("prompt", prompt.to_string())
                        .text("output_format", "png"),
                ),
            _ => self
                .http_client
                .post(self.v1_url(UPSCALE_ENGINE, "image-to-image/upscale"))
                .header(reqwest::header::ACCEPT, "image/png")
                .multipart(Form::new().part("image", image)),
        };

        let response = send_checked(PROVIDER, builder.bearer_auth(key)).await?;
        read_image(PROVIDER, response, "image/png").await
    }
}
