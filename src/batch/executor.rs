//! Retry-batch executor
//!
//! Runs a list of independent operations with bounded concurrency:
//! - Sequential path for `concurrency <= 1`, input order
//! - Worker pool over a shared atomic index otherwise
//! - Jittered exponential backoff between attempts
//! - Cooperative cancellation from a caller token and/or a batch timeout
//! - Results returned in input order with exhausted operations dropped

use std::fmt::Display;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::batch::retry::RetryLoop;
use crate::batch::state::BatchState;
use crate::batch::types::{BatchOutcome, ExecuteOptions, ExecutionMode, Operation, ProgressCallback};
use crate::cancel;
use crate::config::ExecutorConfig;
use crate::metrics::ExecutorMetrics;
use crate::{ExecutorError, Result};

/// Stateless, reusable executor for batches of retried operations
#[derive(Debug, Clone)]
pub struct RetryBatchExecutor {
    config: ExecutorConfig,
    retry: RetryLoop,
}

impl RetryBatchExecutor {
    /// Create an executor. Configuration is used as given.
    pub fn new(config: ExecutorConfig) -> Self {
        let retry = RetryLoop::from_config(&config);
        Self { config, retry }
    }

    /// Create an executor after validating the configuration
    pub fn try_new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Executor configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute every operation and return the successful results in input order.
    ///
    /// Fails with [`ExecutorError::Cancelled`] (or [`ExecutorError::TimedOut`]) if the batch
    /// was cancelled, even when some operations already succeeded, and with
    /// [`ExecutorError::AllOperationsFailed`] if no operation succeeded.
    pub async fn execute_all<T, E>(
        &self,
        operations: Vec<Operation<T, E>>,
        options: ExecuteOptions,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let slots = operations.into_iter().map(Some).collect();
        self.execute_slots(slots, options).await
    }

    /// Like [`execute_all`](Self::execute_all), but the input may contain holes.
    ///
    /// Claiming an empty slot fails the batch with [`ExecutorError::UndefinedOperation`].
    #[instrument(
        skip(self, operations, options),
        fields(operation_count = operations.len(), concurrency = options.concurrency)
    )]
    pub async fn execute_slots<T, E>(
        &self,
        operations: Vec<Option<Operation<T, E>>>,
        options: ExecuteOptions,
    ) -> Result<Vec<T>>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let batch_start = Instant::now();
        let total = operations.len();
        let mode = ExecutionMode::for_concurrency(options.concurrency);

        let mut derived = cancel::combine(options.cancel.as_ref(), options.timeout);

        if derived.is_cancelled() {
            info!("Cancellation already signalled; no operations started");
            ExecutorMetrics::record_batch(BatchOutcome::Cancelled.as_str(), mode.as_str(), Duration::ZERO);
            return Err(ExecutorError::Cancelled);
        }

        if total == 0 {
            debug!("No operations to execute in batch");
            return Ok(Vec::new());
        }

        info!(
            total,
            mode = mode.as_str(),
            max_retries = self.config.max_retries,
            timeout = ?options.timeout,
            "Starting batch execution"
        );

        let run = Arc::new(BatchRun {
            retry: self.retry,
            state: BatchState::new(total),
            stop: derived
                .token()
                .map(CancellationToken::child_token)
                .unwrap_or_default(),
            progress: options.on_progress.clone(),
        });

        let driven = match mode {
            ExecutionMode::Sequential => run.run_sequential(&operations).await,
            ExecutionMode::Concurrent => {
                let workers = options.concurrency.min(total);
                Arc::clone(&run).run_concurrent(operations, workers).await
            }
        };

        let timed_out = derived.did_timeout();
        derived.cleanup();
        let batch_duration = batch_start.elapsed();

        if let Err(err) = driven {
            error!(error = %err, "Batch aborted");
            ExecutorMetrics::record_batch("aborted", mode.as_str(), batch_duration);
            return Err(err);
        }

        let state = &run.state;
        let failed = state.failed();
        let outcome = BatchOutcome::decide(state.is_cancelled(), failed, total);
        ExecutorMetrics::record_batch(outcome.as_str(), mode.as_str(), batch_duration);

        match outcome {
            BatchOutcome::Cancelled => {
                info!(
                    completed = state.completed(),
                    total,
                    timed_out,
                    batch_duration_ms = batch_duration.as_millis() as u64,
                    "Batch cancelled; discarding partial results"
                );
                match options.timeout {
                    Some(after) if timed_out => Err(ExecutorError::TimedOut { after }),
                    _ => Err(ExecutorError::Cancelled),
                }
            }
            BatchOutcome::AllFailed { failed, total } => {
                error!(failed, total, "All operations in batch failed");
                Err(ExecutorError::AllOperationsFailed { failed, total })
            }
            BatchOutcome::Completed => {
                let results = state.take_successes();
                info!(
                    total,
                    succeeded = results.len(),
                    failed,
                    batch_duration_ms = batch_duration.as_millis() as u64,
                    "Batch execution completed"
                );
                if failed > 0 {
                    warn!(failed, total, "Batch completed with dropped failures");
                }
                Ok(results)
            }
        }
    }

    /// Run a single operation through the retry loop, without batch aggregation
    #[instrument(skip(self, operation, cancel))]
    pub async fn execute_one<T, E>(
        &self,
        operation: &Operation<T, E>,
        cancel: Option<&CancellationToken>,
    ) -> Result<T>
    where
        E: Display,
    {
        let token = cancel.cloned().unwrap_or_default();
        self.retry.run(operation, 0, &token).await
    }
}

impl Default for RetryBatchExecutor {
    fn default() -> Self {
        Self::new(ExecutorConfig::default())
    }
}

/// Everything the workers of one batch share
struct BatchRun<T> {
    retry: RetryLoop,
    state: BatchState<T>,
    /// Fires with the derived batch token and whenever any worker latches the batch
    stop: CancellationToken,
    progress: Option<ProgressCallback>,
}

impl<T: Send + 'static> BatchRun<T> {
    async fn run_sequential<E>(&self, operations: &[Option<Operation<T, E>>]) -> Result<()>
    where
        E: Display,
    {
        for (index, operation) in operations.iter().enumerate() {
            if self.observe_cancellation() {
                break;
            }
            if !self.run_slot(index, operation.as_ref()).await? {
                break;
            }
        }
        Ok(())
    }

    async fn run_concurrent<E>(
        self: Arc<Self>,
        operations: Vec<Option<Operation<T, E>>>,
        workers: usize,
    ) -> Result<()>
    where
        E: Display + Send + 'static,
    {
        let operations: Arc<[Option<Operation<T, E>>]> = operations.into();
        let mut tasks = JoinSet::new();

        for worker_id in 0..workers {
            let run = Arc::clone(&self);
            let operations = Arc::clone(&operations);
            tasks.spawn(async move { run.worker(worker_id, operations).await });
        }
        debug!(workers, "Spawned batch workers");

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(ExecutorError::from).and_then(|result| result);
            if let Err(err) = outcome {
                self.latch();
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    async fn worker<E>(&self, worker_id: usize, operations: Arc<[Option<Operation<T, E>>]>) -> Result<()>
    where
        E: Display,
    {
        loop {
            if self.observe_cancellation() {
                break;
            }
            let Some(index) = self.state.claim() else {
                break;
            };
            debug!(worker_id, index, "Claimed operation");

            if !self.run_slot(index, operations[index].as_ref()).await? {
                break;
            }
        }
        debug!(worker_id, "Worker exiting");
        Ok(())
    }

    /// Run one slot. Returns `Ok(false)` once the batch is cancelled.
    async fn run_slot<E>(&self, index: usize, operation: Option<&Operation<T, E>>) -> Result<bool>
    where
        E: Display,
    {
        let Some(operation) = operation else {
            error!(index, "Operation slot is empty");
            self.latch();
            return Err(ExecutorError::UndefinedOperation { index });
        };

        match self.retry.run(operation, index, &self.stop).await {
            Ok(value) => {
                ExecutorMetrics::record_operation("success");
                self.state.record_success(index, value);
                self.report_progress();
                Ok(true)
            }
            Err(ExecutorError::Cancelled) => {
                ExecutorMetrics::record_operation("cancelled");
                if self.latch() {
                    info!(index, "Batch cancellation latched");
                }
                Ok(false)
            }
            Err(err) => {
                ExecutorMetrics::record_operation("exhausted");
                let failed = self.state.record_failure();
                warn!(index, failed, error = %err, "Operation exhausted retries; dropping from results");
                self.report_progress();
                Ok(true)
            }
        }
    }

    fn observe_cancellation(&self) -> bool {
        if self.stop.is_cancelled() {
            self.latch();
        }
        self.state.is_cancelled()
    }

    /// Set the cancelled latch and stop every retry loop in the batch.
    /// Returns true for the caller that set the latch.
    fn latch(&self) -> bool {
        let first = self.state.latch_cancelled();
        self.stop.cancel();
        first
    }

    fn report_progress(&self) {
        let completed = self.state.mark_completed();
        if let Some(callback) = &self.progress {
            callback(completed, self.state.total());
        }
    }
}
