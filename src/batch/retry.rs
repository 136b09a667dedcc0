//! Per-operation retry loop
//!
//! Retries every failure up to `max_retries` regardless of error kind. Cancellation is
//! checked before each attempt, after a failed attempt, and during the backoff sleep.

use std::fmt::Display;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::batch::types::Operation;
use crate::config::ExecutorConfig;
use crate::metrics::ExecutorMetrics;
use crate::{ExecutorError, Result};

/// Retry loop shared by every operation of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLoop {
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl RetryLoop {
    /// Create a retry loop
    pub fn new(backoff: BackoffPolicy, max_retries: u32) -> Self {
        Self { backoff, max_retries }
    }

    /// Build from executor configuration
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(BackoffPolicy::from_config(config), config.max_retries)
    }

    /// Upper bound on invocations per operation
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Run `operation` until it succeeds, exhausts its attempts, or `cancel` fires
    pub async fn run<T, E>(
        &self,
        operation: &Operation<T, E>,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        E: Display,
    {
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(index, attempt, "Cancelled before attempt");
                return Err(ExecutorError::Cancelled);
            }

            debug!(index, attempt, "Invoking operation");
            ExecutorMetrics::record_attempt();

            let message = match operation.call().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(index, attempts = attempt + 1, "Operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(err) => err.to_string(),
            };

            if cancel.is_cancelled() {
                debug!(index, attempt, error = %message, "Operation failed after cancellation");
                return Err(ExecutorError::Cancelled);
            }

            if attempt >= self.max_retries {
                return Err(ExecutorError::OperationExhausted {
                    attempts: attempt.saturating_add(1),
                    message,
                });
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                index,
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Operation failed, retrying"
            );
            ExecutorMetrics::record_backoff(delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(index, attempt, "Cancelled during backoff");
                    return Err(ExecutorError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
