use std::path::PathBuf;
use std::time::{Duration, Instant};

use rubberduck::{Config, ExecutionResult, PoolError, ResultStatus, Runner, WorkerPool};

use super::test_config;

const BOUND: Duration = Duration::from_secs(10);

/// Poll `check` until it holds or `limit` elapses
async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_pool_size() {
    let pool = WorkerPool::start(&test_config(2)).expect("Failed to start pool");

    let handles: Vec<_> = (0..8)
        .map(|i| {
            pool.submit(format!("total = sum(range(200000))\nprint({i}, total)"))
                .expect("Failed to submit")
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await_result(BOUND).await;
        assert_eq!(result, ExecutionResult::Success(format!("{i} 19999900000\n")));
    }

    let stats = pool.stats();
    assert_eq!(stats.capacity, 2);
    assert!(stats.peak_busy <= 2, "peak {}", stats.peak_busy);
    assert!(stats.peak_busy >= 1);
    assert_eq!(stats.completed, 8);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_hung_worker_is_reclaimed() {
    let pool = WorkerPool::start(&test_config(1)).expect("Failed to start pool");

    let hung = pool
        .submit_with_timeout("while True: pass", Duration::from_millis(300))
        .expect("Failed to submit");
    assert_eq!(
        hung.await_result(Duration::from_millis(300)).await,
        ExecutionResult::Timeout
    );

    assert!(
        eventually(Duration::from_secs(5), || pool.stats().reclaimed == 1).await,
        "stats: {:?}",
        pool.stats()
    );

    // The only slot is usable again
    let result = pool
        .submit("print('after')")
        .expect("Failed to submit")
        .await_result(BOUND)
        .await;
    assert_eq!(result, ExecutionResult::Success("after\n".to_owned()));
    assert!(pool.stats().respawned >= 1);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_queued_submission_is_skipped() {
    let pool = WorkerPool::start(&test_config(1)).expect("Failed to start pool");

    let hung = pool
        .submit_with_timeout("while True: pass", Duration::from_millis(300))
        .expect("Failed to submit");
    let queued = pool.submit("print('never')").expect("Failed to submit");

    assert_eq!(
        queued.await_result(Duration::from_millis(100)).await,
        ExecutionResult::Timeout
    );
    assert_eq!(
        hung.await_result(Duration::from_millis(300)).await,
        ExecutionResult::Timeout
    );

    let result = pool
        .submit("print('next')")
        .expect("Failed to submit")
        .await_result(BOUND)
        .await;
    assert_eq!(result, ExecutionResult::Success("next\n".to_owned()));

    // The hung job and the last one ran; the abandoned one never did
    assert_eq!(pool.stats().completed, 2);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_crashing_worker_is_reported_and_replaced() {
    let config = Config {
        worker_path: Some(PathBuf::from("true")),
        ..test_config(1)
    };
    let runner = Runner::start(config).expect("Failed to start runner");

    let result = runner.run_sandboxed("print(1)", None).await;
    let ExecutionResult::WorkerFailure(message) = result else {
        panic!("expected worker failure, got {result:?}");
    };
    assert!(message.starts_with("worker"), "message: {message}");

    // A rejected script never reaches the broken worker
    let result = runner.run_sandboxed("import os", None).await;
    assert_eq!(result.status(), ResultStatus::CompileError);

    assert!(runner.stats().respawned >= 1);
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_workers_are_retired_after_max_jobs() {
    let config = Config {
        max_jobs_per_worker: 2,
        ..test_config(1)
    };
    let pool = WorkerPool::start(&config).expect("Failed to start pool");

    for i in 0..5 {
        let result = pool
            .submit(format!("print({i})"))
            .expect("Failed to submit")
            .await_result(BOUND)
            .await;
        assert_eq!(result, ExecutionResult::Success(format!("{i}\n")));
    }

    assert!(
        eventually(Duration::from_secs(5), || pool.stats().respawned >= 2).await,
        "stats: {:?}",
        pool.stats()
    );
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_state_survives_between_jobs() {
    let pool = WorkerPool::start(&test_config(1)).expect("Failed to start pool");

    let first = pool
        .submit("secret = 42\nprint(secret)")
        .expect("Failed to submit")
        .await_result(BOUND)
        .await;
    assert_eq!(first, ExecutionResult::Success("42\n".to_owned()));

    let second = pool
        .submit("print(secret)")
        .expect("Failed to submit")
        .await_result(BOUND)
        .await;
    let ExecutionResult::RuntimeError(message) = second else {
        panic!("expected runtime error, got {second:?}");
    };
    assert!(message.contains("NameError"), "message: {message}");
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_refuses_new_work() {
    let runner = Runner::start(test_config(1)).expect("Failed to start runner");
    runner.shutdown().await;

    let result = runner.run_sandboxed("print(1)", None).await;
    assert_eq!(result.status(), ResultStatus::WorkerFailure);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_does_not_wait_for_hung_jobs() {
    let pool = WorkerPool::start(&test_config(1)).expect("Failed to start pool");
    let _hung = pool
        .submit_with_timeout("while True: pass", Duration::from_secs(60))
        .expect("Failed to submit");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    pool.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(matches!(pool.submit("print(1)"), Err(PoolError::Closed)));
}
