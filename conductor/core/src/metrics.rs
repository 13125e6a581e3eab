//! Performance Monitoring
//!
//! Every provider call (text, image, speech) records a [`PerformanceSample`].
//! The monitor keeps a bounded window of recent samples plus per-provider
//! totals, and answers one question for the rest of the core: should the
//! next request be degraded (smaller context, lower token budget)?
//!
//! Samples are never persisted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Samples kept for the degradation decision
pub const DEFAULT_WINDOW: usize = 10;

/// Failure rate at or above which requests are degraded
pub const DEGRADE_FAILURE_RATE: f64 = 0.5;

/// Mean latency at or above which requests are degraded
pub const DEGRADE_MEAN_LATENCY: Duration = Duration::from_secs(8);

/// Monitor shared by the pipeline, the streaming coordinator and speech
pub type SharedMonitor = Arc<RwLock<PerformanceMonitor>>;

/// Outcome of one provider call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PerformanceSample {
    /// Provider that served the call
    pub provider: String,
    /// Wall-clock latency
    pub latency: Duration,
    /// Whether the call succeeded
    pub success: bool,
}

impl PerformanceSample {
    /// Sample measured from `started` until now
    pub fn since(provider: impl Into<String>, started: Instant, success: bool) -> Self {
        Self {
            provider: provider.into(),
            latency: started.elapsed(),
            success,
        }
    }
}

/// Lifetime totals for one provider
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderStats {
    /// Calls recorded
    pub calls: u64,
    /// Failed calls
    pub failures: u64,
    /// Sum of latencies
    pub total_latency: Duration,
}

impl ProviderStats {
    /// Mean latency over all calls
    #[must_use]
    pub fn mean_latency(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            self.total_latency / u32::try_from(self.calls).unwrap_or(u32::MAX)
        }
    }
}

/// Summary of the recent window
#[derive(Clone, Debug, PartialEq)]
pub struct PerformanceSnapshot {
    /// Samples in the window
    pub samples: usize,
    /// Fraction of failed samples (0.0-1.0)
    pub failure_rate: f64,
    /// Mean latency of the window
    pub mean_latency: Duration,
    /// Whether requests should be degraded
    pub degraded: bool,
}

/// Bounded record of recent provider performance
#[derive(Debug)]
pub struct PerformanceMonitor {
    window: usize,
    recent: VecDeque<PerformanceSample>,
    per_provider: HashMap<String, ProviderStats>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PerformanceMonitor {
    /// Create a monitor keeping `window` recent samples
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            recent: VecDeque::with_capacity(window),
            per_provider: HashMap::new(),
        }
    }

    /// Create a monitor ready to share
    #[must_use]
    pub fn shared() -> SharedMonitor {
        Arc::new(RwLock::new(Self::default()))
    }

    /// Record one call
    pub fn record(&mut self, sample: PerformanceSample) {
        let stats = self.per_provider.entry(sample.provider.clone()).or_default();
        stats.calls += 1;
        stats.total_latency += sample.latency;
        if !sample.success {
            stats.failures += 1;
        }

        if self.recent.len() == self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(sample);

        if self.is_degraded() {
            tracing::debug!(
                failure_rate = self.failure_rate(),
                mean_latency_ms = self.mean_latency().as_millis() as u64,
                "Provider performance degraded"
            );
        }
    }

    /// Fraction of failures in the window
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        if self.recent.is_empty() {
            return 0.0;
        }
        let failures = self.recent.iter().filter(|s| !s.success).count();
        failures as f64 / self.recent.len() as f64
    }

    /// Mean latency in the window
    #[must_use]
    pub fn mean_latency(&self) -> Duration {
        if self.recent.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.recent.iter().map(|s| s.latency).sum();
        total / self.recent.len() as u32
    }

    /// Whether the next request should be degraded
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.recent.is_empty()
            && (self.failure_rate() >= DEGRADE_FAILURE_RATE
                || self.mean_latency() >= DEGRADE_MEAN_LATENCY)
    }

    /// Totals for one provider
    #[must_use]
    pub fn provider_stats(&self, provider: &str) -> Option<&ProviderStats> {
        self.per_provider.get(provider)
    }

    /// Summary of the window
    #[must_use]
    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            samples: self.recent.len(),
            failure_rate: self.failure_rate(),
            mean_latency: self.mean_latency(),
            degraded: self.is_degraded(),
        }
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.recent.clear();
        self.per_provider.clear();
    }
}
