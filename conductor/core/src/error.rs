//! Provider Error Taxonomy
//!
//! Every provider call site classifies its own failure into one of the
//! categories below, using the HTTP status when there is one. The Conductor
//! turns a classified failure into exactly one assistant-visible message plus
//! one toast, so each category carries its own user-facing explanation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest slice of a provider error body kept in an error value
const MAX_DETAIL_CHARS: usize = 200;

/// A classified failure from a provider call or an orchestration precondition
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Credentials were rejected (401/403)
    #[error("{provider} rejected the credentials (HTTP {status})")]
    AuthenticationFailure {
        /// Provider name
        provider: String,
        /// HTTP status returned
        status: u16,
    },

    /// The provider asked us to slow down (429)
    #[error("{provider} rate limited the request")]
    RateLimited {
        /// Provider name
        provider: String,
        /// Seconds to wait, when the provider said so
        retry_after_secs: Option<u64>,
    },

    /// Malformed or rejected request (400/404/422 and unknown 4xx)
    #[error("{provider} rejected the request: {detail}")]
    InvalidRequest {
        /// Provider name
        provider: String,
        /// Provider-supplied detail (truncated)
        detail: String,
    },

    /// The media payload is in a format the provider does not accept (415)
    #[error("{provider} does not accept this media: {detail}")]
    UnsupportedMedia {
        /// Provider name
        provider: String,
        /// Provider-supplied detail (truncated)
        detail: String,
    },

    /// The provider is down or overloaded (5xx)
    #[error("{provider} is unavailable (HTTP {status})")]
    ServerUnavailable {
        /// Provider name
        provider: String,
        /// HTTP status returned
        status: u16,
    },

    /// Network or payload parsing failure with no HTTP status
    #[error("transport failure talking to {provider}: {detail}")]
    TransportFailure {
        /// Provider name
        provider: String,
        /// What went wrong
        detail: String,
    },

    /// A credential or endpoint is missing
    #[error("{provider} is not configured: {detail}")]
    NotConfigured {
        /// Provider name
        provider: String,
        /// What is missing
        detail: String,
    },

    /// The operation needs a selected or uploaded image and there is none
    #[error("no image is selected or uploaded")]
    NoSelection,

    /// The operation was aborted through its cancellation token
    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Classify an HTTP failure status
    #[must_use]
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let provider = provider.to_string();
        let detail = truncate_detail(body);
        match status {
            401 | 403 => Self::AuthenticationFailure { provider, status },
            429 => Self::RateLimited {
                provider,
                retry_after_secs: None,
            },
            415 => Self::UnsupportedMedia { provider, detail },
            500..=599 => Self::ServerUnavailable { provider, status },
            _ => Self::InvalidRequest {
                provider,
                detail: if detail.is_empty() {
                    format!("HTTP {status}")
                } else {
                    detail
                },
            },
        }
    }

    /// Classify a `reqwest` failure (status if present, transport otherwise)
    #[must_use]
    pub fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(provider, status.as_u16(), &err.to_string()),
            None => Self::transport(provider, err),
        }
    }

    /// Build a transport failure
    pub fn transport(provider: &str, detail: impl std::fmt::Display) -> Self {
        Self::TransportFailure {
            provider: provider.to_string(),
            detail: truncate_detail(&detail.to_string()),
        }
    }

    /// Build a not-configured failure
    pub fn not_configured(provider: &str, detail: impl Into<String>) -> Self {
        Self::NotConfigured {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    /// Attach a `Retry-After` hint to a rate limit error
    #[must_use]
    pub fn with_retry_after(self, secs: Option<u64>) -> Self {
        match self {
            Self::RateLimited { provider, .. } => Self::RateLimited {
                provider,
                retry_after_secs: secs,
            },
            other => other,
        }
    }

    /// The category of this failure
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailure { .. } => ErrorCategory::AuthenticationFailure,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::InvalidRequest { .. } => ErrorCategory::InvalidRequest,
            Self::UnsupportedMedia { .. } => ErrorCategory::UnsupportedMedia,
            Self::ServerUnavailable { .. } => ErrorCategory::ServerUnavailable,
            Self::TransportFailure { .. } => ErrorCategory::TransportFailure,
            Self::NotConfigured { .. } => ErrorCategory::NotConfigured,
            Self::NoSelection => ErrorCategory::NoSelection,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether this is a transport-level failure (eligible for the
    /// non-streaming retry)
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

/// Failure categories shown to the user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Credentials rejected
    AuthenticationFailure,
    /// Too many requests
    RateLimited,
    /// Request rejected
    InvalidRequest,
    /// Media format rejected
    UnsupportedMedia,
    /// Provider down
    ServerUnavailable,
    /// Network/parse failure
    TransportFailure,
    /// Missing credential
    NotConfigured,
    /// No selected/uploaded image
    NoSelection,
    /// Aborted
    Cancelled,
}

impl ErrorCategory {
    /// Assistant-visible explanation for this category
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure => {
                "I couldn't authenticate with the service. Please check that your API key is valid and has access to this feature."
            }
            Self::RateLimited => {
                "The service is receiving too many requests right now. Please wait a minute and try again."
            }
            Self::InvalidRequest => {
                "The service couldn't process that request. Try rephrasing it or simplifying the prompt."
            }
            Self::UnsupportedMedia => {
                "That image format isn't supported. Please use a PNG, JPEG or WebP image."
            }
            Self::ServerUnavailable => {
                "The service is temporarily unavailable and every fallback failed too. Please try again in a few minutes."
            }
            Self::TransportFailure => {
                "I couldn't reach the service. Please check your network connection and try again."
            }
            Self::NotConfigured => {
                "This feature isn't configured yet. Add the required API key to your configuration and restart."
            }
            Self::NoSelection => {
                "There's no image to work with. Select an image with \"select image\" or upload one first."
            }
            Self::Cancelled => "The request was cancelled.",
        }
    }

    /// Short toast title for this category
    #[must_use]
    pub fn toast_title(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "Authentication failed",
            Self::RateLimited => "Rate limited",
            Self::InvalidRequest => "Request rejected",
            Self::UnsupportedMedia => "Unsupported media",
            Self::ServerUnavailable => "Service unavailable",
            Self::TransportFailure => "Connection problem",
            Self::NotConfigured => "Not configured",
            Self::NoSelection => "No image selected",
            Self::Cancelled => "Cancelled",
        }
    }
}

fn truncate_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_DETAIL_CHARS {
        trimmed.to_string()
    } else {
        let mut out: String = trimmed.chars().take(MAX_DETAIL_CHARS).collect();
        out.push('…');
        out
    }
}
