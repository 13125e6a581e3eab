//! Media References
//!
//! Images and audio clips travel through the conversation as references (an
//! `https://` URL or a `data:` URL), never as owned decoded bytes. Bytes are
//! only materialized right before a provider call that needs them.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Image MIME types the edit/upscale providers accept
pub const SUPPORTED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

/// A weak reference to an image or audio clip
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

/// Materialized media payload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaBytes {
    /// MIME type (e.g. `image/png`)
    pub mime: String,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

impl MediaRef {
    /// Wrap an URL or data URL
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Encode a binary payload as a base64 `data:` URL
    #[must_use]
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
    }

    /// The underlying reference string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is an inline `data:` URL
    #[must_use]
    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// MIME type declared by a data URL
    #[must_use]
    pub fn mime_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix("data:")?;
        let end = rest.find([';', ','])?;
        Some(&rest[..end])
    }

    /// Decode a base64 data URL; `None` for remote URLs
    #[must_use]
    pub fn decode_data_url(&self) -> Option<Result<MediaBytes, ProviderError>> {
        let rest = self.0.strip_prefix("data:")?;
        Some(decode_inline(rest))
    }

    /// Materialize the bytes, downloading remote references
    pub async fn resolve_bytes(
        &self,
        client: &reqwest::Client,
    ) -> Result<MediaBytes, ProviderError> {
        if let Some(decoded) = self.decode_data_url() {
            return decoded;
        }

        const PROVIDER: &str = "media-fetch";
        let response = client
            .get(&self.0)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, &e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(PROVIDER, status, &body));
        }

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER, e))?;

        Ok(MediaBytes {
            mime,
            bytes: bytes.to_vec(),
        })
    }
}

impl MediaBytes {
    /// Check the payload is an image format the providers accept
    pub fn ensure_supported_image(&self, provider: &str) -> Result<(), ProviderError> {
        if SUPPORTED_IMAGE_TYPES.contains(&self.mime.as_str()) {
            Ok(())
        } else {
            Err(ProviderError::UnsupportedMedia {
                provider: provider.to_string(),
                detail: format!("received {}", self.mime),
            })
        }
    }

    /// File extension for multipart uploads
    #[must_use]
    pub fn file_extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            "audio/mpeg" => "mp3",
            "audio/wav" => "wav",
            _ => "png",
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_data_url() {
            write!(
                f,
                "<{} inline, {} bytes>",
                self.mime_type().unwrap_or("unknown"),
                self.0.len()
            )
        } else {
            f.write_str(&self.0)
        }
    }
}

fn decode_inline(rest: &str) -> Result<MediaBytes, ProviderError> {
    const PROVIDER: &str = "data-url";
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ProviderError::UnsupportedMedia {
            provider: PROVIDER.to_string(),
            detail: "malformed data URL".to_string(),
        })?;

    let Some(mime) = header.strip_suffix(";base64") else {
        return Err(ProviderError::UnsupportedMedia {
            provider: PROVIDER.to_string(),
            detail: "only base64 data URLs are supported".to_string(),
        });
    };

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| ProviderError::UnsupportedMedia {
            provider: PROVIDER.to_string(),
            detail: e.to_string(),
        })?;

    Ok(MediaBytes {
        mime: mime.to_string(),
        bytes,
    })
}
