use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use stockrunner::backoff::BackoffPolicy;
use stockrunner::batch::{ExecuteOptions, Operation, RetryBatchExecutor};
use stockrunner::cancel::{combine, CancellationToken};
use stockrunner::config::ExecutorConfig;
use tokio::runtime::Runtime;

fn create_operations(count: usize) -> Vec<Operation<usize, String>> {
    (0..count)
        .map(|i| Operation::new(move || async move { Ok(i * 2) }))
        .collect()
}

fn create_flaky_operations(count: usize) -> Vec<Operation<usize, String>> {
    // Every fourth operation never succeeds
    (0..count)
        .map(|i| {
            Operation::new(move || async move {
                if i % 4 == 3 {
                    Err(format!("provider rejected {}", i))
                } else {
                    Ok(i)
                }
            })
        })
        .collect()
}

fn fast_executor(max_retries: u32) -> RetryBatchExecutor {
    RetryBatchExecutor::try_new(
        ExecutorConfig::default()
            .with_max_retries(max_retries)
            .with_retry_delay(Duration::from_millis(1))
            .with_max_retry_delay(Duration::from_millis(5)),
    )
    .unwrap()
}

fn benchmark_sequential_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = fast_executor(0);

    c.bench_function("sequential_batch_100", |b| {
        b.iter(|| {
            rt.block_on(async {
                let results = executor
                    .execute_all(create_operations(100), ExecuteOptions::new())
                    .await
                    .unwrap();
                black_box(results)
            })
        })
    });
}

fn benchmark_concurrent_batch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = fast_executor(0);
    let mut group = c.benchmark_group("concurrent_batch_1000");

    for concurrency in [2usize, 8, 32] {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            &concurrency,
            |b, &concurrency| {
                b.iter(|| {
                    rt.block_on(async {
                        let results = executor
                            .execute_all(
                                create_operations(1000),
                                ExecuteOptions::new().with_concurrency(concurrency),
                            )
                            .await
                            .unwrap();
                        black_box(results)
                    })
                })
            },
        );
    }

    group.finish();
}

fn benchmark_partial_failure(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = fast_executor(1);

    c.bench_function("partial_failure_batch_200", |b| {
        b.iter(|| {
            rt.block_on(async {
                let results = executor
                    .execute_all(
                        create_flaky_operations(200),
                        ExecuteOptions::new().with_concurrency(8),
                    )
                    .await
                    .unwrap();
                black_box(results)
            })
        })
    });
}

fn benchmark_cancellation_setup(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let caller = CancellationToken::new();

    c.bench_function("combine_with_timeout", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut derived = combine(Some(&caller), Some(Duration::from_secs(30)));
                black_box(derived.is_cancelled());
                derived.cleanup();
            })
        })
    });
}

fn benchmark_backoff(c: &mut Criterion) {
    let policy = BackoffPolicy::new(Duration::from_millis(1000), Duration::from_millis(10_000));

    c.bench_function("backoff_delay", |b| {
        b.iter(|| {
            for attempt in 0..10 {
                black_box(policy.delay(black_box(attempt)));
            }
        })
    });
}

criterion_group!(
    benches,
    benchmark_sequential_batch,
    benchmark_concurrent_batch,
    benchmark_partial_failure,
    benchmark_cancellation_setup,
    benchmark_backoff
);
criterion_main!(benches);
