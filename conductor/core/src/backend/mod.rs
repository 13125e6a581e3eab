//! Provider Integration
//!
//! Abstracted access to the external services the core orchestrates, through
//! the traits in [`traits`], plus HTTP implementations of them.
//!
//! # Available Providers
//!
//! - **`OpenAiBackend`**: OpenAI-compatible chat completions (SSE streaming, vision)
//! - **`OpenAiSpeech`**: OpenAI-compatible text-to-speech
//! - **`StabilityImageProvider`**: text-to-image, image-to-image, upscale
//! - **`InferenceImageProvider`**: secondary text-to-image (Hugging Face style)
//! - **devices**: stand-ins for microphone / on-device speech / playback
//!
//! # Usage
//!
//! ```ignore
//! use atelier_conductor::backend::{ChatRole, ChatTurn, LlmBackend, LlmRequest, OpenAiBackend};
//!
//! let backend = OpenAiBackend::new("https://api.openai.com/v1", Some(key), timeout)?;
//! let request = LlmRequest::new("gpt-4o-mini", vec![ChatTurn::new(ChatRole::User, "Hello!")]);
//! let rx = backend.send_streaming(&request).await?;
//! ```

mod devices;
mod inference;
mod openai;
mod stability;
mod traits;

use std::time::Duration;

use crate::error::ProviderError;
use crate::media::MediaRef;

pub use devices::{FileAudioOutput, NullLocalSpeech, NullMicrophone};
pub use inference::InferenceImageProvider;
pub use openai::{OpenAiBackend, OpenAiSpeech};
pub use stability::StabilityImageProvider;
pub use traits::{
    AudioClip, AudioFormat, AudioOutput, ChatRole, ChatTurn, EditRequest, GenerateRequest,
    ImageEditor, ImageFormat, ImageGenerator, ImageUpscaler, LlmBackend, LlmRequest, LlmResponse,
    Microphone, Recording, SpeechRequest, SpeechSynthesizer, StreamingToken, UpscaleRequest,
};

/// Build the shared HTTP client for a provider
pub(crate) fn http_client(provider: &str, timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::transport(provider, e))
}

/// The API key, or `NotConfigured` before any network call is made
pub(crate) fn require_key<'a>(provider: &str, key: Option<&'a str>) -> Result<&'a str, ProviderError> {
    match key {
        Some(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ProviderError::not_configured(provider, "API key is missing")),
    }
}

/// Send a request and classify any non-success status
pub(crate) async fn send_checked(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::from_reqwest(provider, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();

    tracing::warn!(provider, status = status.as_u16(), "Provider returned an error status");
    Err(ProviderError::from_status(provider, status.as_u16(), &body).with_retry_after(retry_after))
}

/// Read a binary image response into a data URL
pub(crate) async fn read_image(
    provider: &str,
    response: reqwest::Response,
    fallback_mime: &str,
) -> Result<MediaRef, ProviderError> {
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or_else(|| fallback_mime.to_string());

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProviderError::transport(provider, e))?;

    if bytes.is_empty() {
        return Err(ProviderError::transport(provider, "empty image payload"));
    }

    Ok(MediaRef::from_bytes(&mime, &bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_require_key() {
        assert_eq!(require_key("p", Some("sk-1")).unwrap(), "sk-1");
        assert_eq!(
            require_key("p", Some("  ")).unwrap_err().category(),
            ErrorCategory::NotConfigured
        );
        assert_eq!(
            require_key("p", None).unwrap_err().category(),
            ErrorCategory::NotConfigured
        );
    }
}
