//! # Stockrunner Core
//!
//! The request-execution core behind the stock-analytics service: runs a list of
//! independent async operations (usually one upstream market-data call per stock code)
//! with bounded parallelism, jittered exponential backoff, and cooperative cancellation.
//!
//! ## Quick Start
//!
//! ```rust
//! use stockrunner::batch::{ExecuteOptions, Operation, RetryBatchExecutor};
//! use stockrunner::config::ExecutorConfig;
//!
//! # async fn example() -> stockrunner::Result<()> {
//! let executor = RetryBatchExecutor::new(ExecutorConfig::default());
//!
//! let operations: Vec<Operation<u32, String>> = (0..4)
//!     .map(|code| Operation::new(move || async move { Ok::<_, String>(code * 10) }))
//!     .collect();
//!
//! let prices = executor
//!     .execute_all(operations, ExecuteOptions::new().with_concurrency(2))
//!     .await?;
//! assert_eq!(prices, vec![0, 10, 20, 30]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`backoff`]: retry delay computation with full jitter
//! - [`cancel`]: combining a caller token with a timeout into one derived token
//! - [`batch`]: the concurrent retry-batch executor
//! - [`config`]: executor configuration
//! - [`upstream`]: error taxonomy and timeout helper for transport calls
//! - [`metrics`]: Prometheus metrics

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;
use thiserror::Error;

/// Result type for executor operations
pub type Result<T> = std::result::Result<T, ExecutorError>;

/// Main error type for batch execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// The batch or operation observed cancellation
    #[error("Operation cancelled")]
    Cancelled,

    /// The batch-level timeout fired
    #[error("Batch timed out after {after:?}")]
    TimedOut {
        /// Configured batch timeout
        after: Duration,
    },

    /// A single operation failed on every attempt
    #[error("Operation failed after {attempts} attempts: {message}")]
    OperationExhausted {
        /// Number of times the operation was invoked
        attempts: u32,
        /// Message of the last underlying error
        message: String,
    },

    /// Every operation in the batch was exhausted
    #[error("All {failed} operations failed")]
    AllOperationsFailed {
        /// Number of failed operations
        failed: usize,
        /// Batch size
        total: usize,
    },

    /// The input contained no operation at a claimed index
    #[error("Operation at index {index} is undefined")]
    UndefinedOperation {
        /// Index of the missing operation
        index: usize,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Join error from a worker task
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ExecutorError {
    /// True for both caller cancellation and the batch timeout
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut { .. })
    }
}

/// Retry delay computation
pub mod backoff;

/// Cancellation token combination
pub mod cancel;

/// Concurrent retry-batch executor
pub mod batch;

/// Executor configuration
pub mod config;

/// Transport-facing error taxonomy and helpers
pub mod upstream;

/// Prometheus metrics
pub mod metrics;

pub use batch::{ExecuteOptions, Operation, RetryBatchExecutor};
pub use config::ExecutorConfig;
