//! Exponential backoff with full jitter.
//!
//! `delay(attempt)` is drawn uniformly from `[0, min(base * 2^attempt, max))`, so concurrent
//! operations that fail together do not retry in lockstep against the upstream provider.

use std::time::Duration;

use crate::config::ExecutorConfig;

/// Backoff policy derived from an [`ExecutorConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Create a policy from a base delay and a ceiling
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Build from executor configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.retry_delay(), config.max_retry_delay())
    }

    /// Upper bound of the delay for `attempt`: `min(base * 2^attempt, max)`.
    ///
    /// Saturates instead of overflowing at extreme attempt counts.
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let base_ms = self.base.as_millis().min(u64::MAX as u128) as u64;
        let factor = 2u64.saturating_pow(attempt);
        let exponential = Duration::from_millis(base_ms.saturating_mul(factor));
        exponential.min(self.max)
    }

    /// Jittered delay before the retry that follows the failed `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_jitter(attempt, rand::random::<f64>())
    }

    /// Delay with an explicit jitter factor; values outside `[0, 1]` are clamped
    pub fn delay_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        self.ceiling(attempt).mul_f64(jitter)
    }
}

impl From<&ExecutorConfig> for BackoffPolicy {
    fn from(config: &ExecutorConfig) -> Self {
        Self::from_config(config)
    }
}
