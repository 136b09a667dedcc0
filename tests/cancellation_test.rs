//! Cancellation tests
//!
//! Cancellation beats partial success: once the batch latches cancellation, `execute_all`
//! rejects even if most operations already produced results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use stockrunner::batch::{ExecuteOptions, Operation, RetryBatchExecutor};
use stockrunner::cancel::{combine, CancellationToken};
use stockrunner::config::ExecutorConfig;
use stockrunner::ExecutorError;

fn executor(max_retries: u32) -> RetryBatchExecutor {
    RetryBatchExecutor::new(
        ExecutorConfig::default()
            .with_max_retries(max_retries)
            .with_retry_delay(Duration::from_millis(1))
            .with_max_retry_delay(Duration::from_millis(5)),
    )
}

/// Records its invocation, optionally cancels `token` on the way out, then succeeds
fn recording(
    index: usize,
    calls: Arc<Vec<AtomicUsize>>,
    cancel_after: Option<CancellationToken>,
) -> Operation<usize, String> {
    Operation::new(move || {
        calls[index].fetch_add(1, Ordering::SeqCst);
        let cancel_after = cancel_after.clone();
        async move {
            if let Some(token) = cancel_after {
                token.cancel();
            }
            Ok(index)
        }
    })
}

fn counters(n: usize) -> Arc<Vec<AtomicUsize>> {
    Arc::new((0..n).map(|_| AtomicUsize::new(0)).collect())
}

#[tokio::test]
async fn test_pre_cancelled_token_runs_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let calls = counters(3);
    let operations: Vec<_> = (0..3).map(|i| recording(i, calls.clone(), None)).collect();

    for concurrency in [1, 3] {
        let err = executor(2)
            .execute_all(
                operations.clone(),
                ExecuteOptions::new()
                    .with_concurrency(concurrency)
                    .with_cancellation(token.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
    }

    assert!(calls.iter().all(|c| c.load(Ordering::SeqCst) == 0));
}

#[tokio::test]
async fn test_cancel_between_operations_rejects() {
    let token = CancellationToken::new();
    let calls = counters(3);
    let operations = vec![
        recording(0, calls.clone(), Some(token.clone())),
        recording(1, calls.clone(), None),
        recording(2, calls.clone(), None),
    ];

    let err = executor(2)
        .execute_all(operations, ExecuteOptions::new().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
    assert_eq!(calls[0].load(Ordering::SeqCst), 1);
    assert_eq!(calls[1].load(Ordering::SeqCst), 0);
    assert_eq!(calls[2].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancel_after_nine_of_ten_still_rejects() {
    let token = CancellationToken::new();
    let calls = counters(10);
    let operations = (0..10)
        .map(|i| {
            let cancel = (i == 8).then(|| token.clone());
            recording(i, calls.clone(), cancel)
        })
        .collect();

    let err = executor(0)
        .execute_all(operations, ExecuteOptions::new().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
    let invoked: usize = calls.iter().map(|c| c.load(Ordering::SeqCst)).sum();
    assert_eq!(invoked, 9);
    assert_eq!(calls[9].load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_in_flight_operation_finishes_but_result_is_discarded() {
    let token = CancellationToken::new();
    let finished = Arc::new(AtomicUsize::new(0));
    let started = counters(6);

    let mut operations: Vec<Operation<usize, String>> = Vec::new();
    {
        // Ignores cancellation and completes after the batch is cancelled
        let finished = finished.clone();
        let started = started.clone();
        operations.push(Operation::new(move || {
            started[0].fetch_add(1, Ordering::SeqCst);
            let finished = finished.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(0)
            }
        }));
    }
    {
        let token = token.clone();
        let started = started.clone();
        operations.push(Operation::new(move || {
            started[1].fetch_add(1, Ordering::SeqCst);
            let token = token.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                token.cancel();
                Ok(1)
            }
        }));
    }
    for i in 2..6 {
        operations.push(recording(i, started.clone(), None));
    }

    let err = executor(0)
        .execute_all(
            operations,
            ExecuteOptions::new().with_concurrency(2).with_cancellation(token),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(started[2..].iter().all(|c| c.load(Ordering::SeqCst) == 0));
}

#[tokio::test]
async fn test_cancellation_skips_remaining_retries() {
    let token = CancellationToken::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let inner = token.clone();

    // Fails and cancels the batch on its first attempt
    let op: Operation<usize, String> = Operation::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        let token = inner.clone();
        async move {
            token.cancel();
            Err("connection reset".to_string())
        }
    });

    let err = executor(5)
        .execute_all(vec![op], ExecuteOptions::new().with_cancellation(token))
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_timeout_reports_timed_out() {
    let calls = Arc::new(AtomicUsize::new(0));
    let operations: Vec<Operation<usize, String>> = (0..10)
        .map(|i| {
            let calls = calls.clone();
            Operation::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok(i)
                }
            })
        })
        .collect();

    let started = Instant::now();
    let err = executor(0)
        .execute_all(operations, ExecuteOptions::new().with_timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();

    assert!(
        matches!(err, ExecutorError::TimedOut { after } if after == Duration::from_millis(100)),
        "unexpected error: {:?}",
        err
    );
    assert!(err.is_cancellation());
    assert!(calls.load(Ordering::SeqCst) < 10);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_caller_cancel_with_timeout_is_not_timed_out() {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(15)).await;
        trigger.cancel();
    });

    let operations: Vec<Operation<usize, String>> = (0..20)
        .map(|i| {
            Operation::new(move || async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(i)
            })
        })
        .collect();

    let err = executor(0)
        .execute_all(
            operations,
            ExecuteOptions::new()
                .with_cancellation(token)
                .with_timeout(Duration::from_secs(10)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::Cancelled));
}

#[tokio::test]
async fn test_timeout_that_never_fires_is_harmless() {
    let operations: Vec<Operation<usize, String>> =
        (0..3).map(|i| Operation::new(move || async move { Ok(i) })).collect();

    let results = executor(0)
        .execute_all(
            operations,
            ExecuteOptions::new()
                .with_concurrency(3)
                .with_timeout(Duration::from_secs(30)),
        )
        .await
        .unwrap();

    assert_eq!(results, vec![0, 1, 2]);
}

#[tokio::test]
async fn test_combinator_timeout_vs_caller_cancel() {
    let timed = combine(None, Some(Duration::from_millis(50)));
    let token = timed.token().cloned().unwrap();
    tokio::time::timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("timer fires");
    assert!(timed.did_timeout());

    let caller = CancellationToken::new();
    let raced = combine(Some(&caller), Some(Duration::from_millis(50)));
    caller.cancel();
    let token = raced.token().cloned().unwrap();
    tokio::time::timeout(Duration::from_secs(2), token.cancelled())
        .await
        .expect("caller cancellation propagates");
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!raced.did_timeout());
}

#[tokio::test]
async fn test_combinator_cleanup_is_idempotent() {
    let caller = CancellationToken::new();
    let mut derived = combine(Some(&caller), Some(Duration::from_millis(20)));

    derived.cleanup();
    derived.cleanup();
    drop(derived);

    // Caller token is unaffected and can still be cancelled normally
    caller.cancel();
    assert!(caller.is_cancelled());
}
