//! Hosted Inference Image Provider
//!
//! Secondary text-to-image provider for the generation fallback chain. Speaks
//! the Hugging Face inference API shape: `POST {base}/models/{model}` with a
//! JSON `inputs`/`parameters` body and a binary image response.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use super::traits::{GenerateRequest, ImageGenerator};
use super::{http_client, read_image, require_key, send_checked};
use crate::error::ProviderError;
use crate::media::MediaRef;

const PROVIDER: &str = "Inference";

/// Hosted inference client
#[derive(Clone)]
pub struct InferenceImageProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    http_client: reqwest::Client,
}

impl InferenceImageProvider {
    /// Create a new provider
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            http_client: http_client(PROVIDER, timeout)?,
        })
    }

    fn body(request: &GenerateRequest) -> serde_json::Value {
        // No style parameter on this API; fold the tag into the prompt
        let inputs = match request.style {
            Some(ref style) => format!("{}, {style} style", request.prompt),
            None => request.prompt.clone(),
        };
        json!({
            "inputs": inputs,
            "parameters": {
                "negative_prompt": request.negative_prompt,
                "width": request.width,
                "height": request.height,
                "num_inference_steps": request.steps,
                "guidance_scale": request.guidance_scale,
                "seed": request.seed,
            },
        })
    }
}

#[async_trait]
impl ImageGenerator for InferenceImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<MediaRef, ProviderError> {
        let key = require_key(PROVIDER, self.api_key.as_deref())?;

        let response = send_checked(
            PROVIDER,
            self.http_client
                .post(format!("{}/models/{}", self.base_url, self.model))
                .bearer_auth(key)
                .header(reqwest::header::ACCEPT, request.format.mime())
                .json(&Self::body(request)),
        )
        .await?;

        read_image(PROVIDER, response, request.format.mime()).await
    }
}
