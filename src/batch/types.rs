use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;

/// Future returned by one invocation of an [`Operation`]
pub type OperationFuture<T, E> = BoxFuture<'static, std::result::Result<T, E>>;

/// Callback receiving `(completed, total)` after each operation finishes
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// A zero-argument async operation that can be invoked once per attempt
pub struct Operation<T, E> {
    call: Arc<dyn Fn() -> OperationFuture<T, E> + Send + Sync>,
}

impl<T, E> Operation<T, E> {
    /// Wrap a closure producing a fresh future on every call
    pub fn new<F, Fut>(f: F) -> Self
    where
        T: 'static,
        E: 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
    {
        Self {
            call: Arc::new(move || f().boxed()),
        }
    }

    /// Start one attempt
    pub fn call(&self) -> OperationFuture<T, E> {
        (self.call)()
    }
}

impl<T, E> Clone for Operation<T, E> {
    fn clone(&self) -> Self {
        Self {
            call: Arc::clone(&self.call),
        }
    }
}

impl<T, E> fmt::Debug for Operation<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation").finish_non_exhaustive()
    }
}

/// Per-call options for [`execute_all`](crate::batch::RetryBatchExecutor::execute_all)
#[derive(Clone)]
pub struct ExecuteOptions {
    /// Number of workers; `0` and `1` both run sequentially
    pub concurrency: usize,
    /// Batch-level cancellation token
    pub cancel: Option<CancellationToken>,
    /// Batch-level timeout; fires as a distinct `TimedOut` error
    pub timeout: Option<Duration>,
    /// Progress callback, invoked in completion order
    pub on_progress: Option<ProgressCallback>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cancel: None,
            timeout: None,
            on_progress: None,
        }
    }
}

impl ExecuteOptions {
    /// Sequential execution, no cancellation, no progress reporting
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Observe a caller-owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abort the batch after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ExecuteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("concurrency", &self.concurrency)
            .field("cancel", &self.cancel.as_ref().map(CancellationToken::is_cancelled))
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// How a batch was driven
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Single worker, input order
    Sequential,
    /// Worker pool over a shared index
    Concurrent,
}

impl ExecutionMode {
    /// Mode used for a requested concurrency
    pub fn for_concurrency(concurrency: usize) -> Self {
        if concurrency <= 1 {
            Self::Sequential
        } else {
            Self::Concurrent
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        }
    }
}

/// Terminal state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Cancellation was latched; no results are returned
    Cancelled,
    /// Every operation was exhausted
    AllFailed {
        /// Failed operations
        failed: usize,
        /// Batch size
        total: usize,
    },
    /// At least one success (or an empty batch); failures are dropped from the output
    Completed,
}

impl BatchOutcome {
    /// Decide the batch result. Precedence: cancellation, then total failure, then success.
    pub fn decide(cancelled: bool, failed: usize, total: usize) -> Self {
        if cancelled {
            Self::Cancelled
        } else if total > 0 && failed == total {
            Self::AllFailed { failed, total }
        } else {
            Self::Completed
        }
    }

    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::AllFailed { .. } => "all_failed",
            Self::Completed => "completed",
        }
    }
}
