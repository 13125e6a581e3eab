//! Fallback Runner
//!
//! One mechanism for every media fallback chain: an ordered list of
//! [`Strategy`] values (provider + parameter set + the call to make) is tried
//! sequentially until one succeeds.
//!
//! ```text
//! Strategy 1 ──fail──▶ Strategy 2 ──fail──▶ Strategy 3 ──fail──▶ PipelineFailure
//!     │                    │                    │
//!     └─ok─▶ result        └─ok─▶ result        └─ok─▶ result
//! ```
//!
//! Every classified error is a fallback trigger, including
//! `AuthenticationFailure` and `NotConfigured` (the next strategy may use a
//! different provider with different credentials). Only `Cancelled` stops the
//! chain early. Every attempt records a performance sample.

use std::fmt;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use futures::Future;

use crate::error::{ErrorCategory, ProviderError};
use crate::metrics::{PerformanceSample, SharedMonitor};

type StrategyCall<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, ProviderError>> + Send>;

/// One step of a fallback chain
pub struct Strategy<T> {
    /// Provider name
    pub provider: String,
    /// Strategy label (e.g. `edit_standard`)
    pub label: &'static str,
    /// Parameter summary for logs
    pub params: String,
    call: StrategyCall<T>,
}

impl<T> Strategy<T> {
    /// Create a strategy from an async call
    pub fn new<F, Fut>(
        provider: impl Into<String>,
        label: &'static str,
        params: impl Into<String>,
        call: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        Self {
            provider: provider.into(),
            label,
            params: params.into(),
            call: Box::new(move || Box::pin(call())),
        }
    }
}

impl<T> fmt::Debug for Strategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("provider", &self.provider)
            .field("label", &self.label)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// A failed step, kept for the aggregated failure
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineAttempt {
    /// Provider name
    pub provider: String,
    /// Strategy label
    pub strategy: &'static str,
    /// Parameter summary
    pub params: String,
    /// How long the attempt took
    pub latency: Duration,
    /// What went wrong
    pub error: ProviderError,
}

/// Every strategy of a chain failed
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{operation} failed after {} attempt(s)", .attempts.len())]
pub struct PipelineFailure {
    /// Logical operation (`generate`, `edit`, `upscale`)
    pub operation: &'static str,
    /// Failed attempts in order
    pub attempts: Vec<PipelineAttempt>,
}

impl PipelineFailure {
    /// Category reported for the whole chain
    ///
    /// Credential problems are reported distinctly even when a later
    /// strategy failed differently; otherwise the last failure decides.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        let has = |category: ErrorCategory| {
            self.attempts
                .iter()
                .any(|attempt| attempt.error.category() == category)
        };

        if has(ErrorCategory::NotConfigured) {
            ErrorCategory::NotConfigured
        } else if has(ErrorCategory::AuthenticationFailure) {
            ErrorCategory::AuthenticationFailure
        } else {
            self.attempts
                .last()
                .map_or(ErrorCategory::NotConfigured, |attempt| {
                    attempt.error.category()
                })
        }
    }

    /// One line per attempt, for logs
    #[must_use]
    pub fn summary(&self) -> String {
        self.attempts
            .iter()
            .map(|a| format!("{}:{} ({}) -> {}", a.provider, a.strategy, a.params, a.error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Run strategies in order until one succeeds
pub async fn run_with_fallback<T>(
    operation: &'static str,
    strategies: Vec<Strategy<T>>,
    monitor: &SharedMonitor,
) -> Result<T, PipelineFailure> {
    let mut attempts = Vec::with_capacity(strategies.len());

    for (index, strategy) in strategies.into_iter().enumerate() {
        let Strategy {
            provider,
            label,
            params,
            call,
        } = strategy;

        let started = Instant::now();
        let result = call().await;
        let latency = started.elapsed();

        monitor.write().record(PerformanceSample {
            provider: provider.clone(),
            latency,
            success: result.is_ok(),
        });

        match result {
            Ok(value) => {
                tracing::info!(
                    operation,
                    provider = %provider,
                    strategy = label,
                    attempt = index + 1,
                    latency_ms = latency.as_millis() as u64,
                    "Media operation succeeded"
                );
                return Ok(value);
            }
            Err(error) => {
                tracing::warn!(
                    operation,
                    provider = %provider,
                    strategy = label,
                    params = %params,
                    error = %error,
                    "Media strategy failed"
                );
                let cancelled = error == ProviderError::Cancelled;
                attempts.push(PipelineAttempt {
                    provider,
                    strategy: label,
                    params,
                    latency,
                    error,
                });
                if cancelled {
                    break;
                }
            }
        }
    }

    let failure = PipelineFailure {
        operation,
        attempts,
    };
    tracing::error!(
        operation,
        category = ?failure.category(),
        attempts = %failure.summary(),
        "Media operation failed"
    );
    Err(failure)
}
