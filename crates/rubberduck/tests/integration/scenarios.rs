use std::time::{Duration, Instant};

use rubberduck::{ExecutionResult, ResultStatus, Runner};

use super::{fixture_script, test_config};

fn runner(pool_size: usize) -> Runner {
    Runner::start(test_config(pool_size)).expect("Failed to start runner")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_print_is_captured() {
    let runner = runner(1);
    let result = runner.run_sandboxed("print(2 + 2)", None).await;
    assert_eq!(result, ExecutionResult::Success("4\n".to_owned()));
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_infinite_loop_times_out() {
    let runner = runner(1);
    let bound = Duration::from_secs(1);

    let started = Instant::now();
    let result = runner.run_sandboxed("while True: pass", Some(bound)).await;
    let waited = started.elapsed();

    assert_eq!(result, ExecutionResult::Timeout);
    assert!(waited >= bound);
    assert!(waited < bound + Duration::from_secs(2), "waited {waited:?}");
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disallowed_import_names_module() {
    let runner = runner(1);
    let result = runner.run_sandboxed("import os", None).await;

    let ExecutionResult::CompileError(message) = result else {
        panic!("expected compile error, got {result:?}");
    };
    assert!(message.contains("'os'"), "message: {message}");
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_division_by_zero_is_runtime_error() {
    let runner = runner(1);
    let result = runner.run_sandboxed("1/0", None).await;

    let ExecutionResult::RuntimeError(message) = result else {
        panic!("expected runtime error, got {result:?}");
    };
    assert!(message.contains("division by zero"), "message: {message}");
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dunder_attribute_is_rejected() {
    let runner = runner(1);

    let result = runner.run_sandboxed("x.__class__", None).await;
    assert_eq!(result.status(), ResultStatus::RuntimeError);

    let result = runner.run_sandboxed("x = 1\nx.__class__", None).await;
    let ExecutionResult::RuntimeError(message) = result else {
        panic!("expected runtime error, got {result:?}");
    };
    assert!(message.starts_with("AttributeError"), "message: {message}");
    assert!(message.contains("__class__"), "message: {message}");
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_submissions_keep_their_output() {
    let runner = runner(2);

    let (a, b) = tokio::join!(
        runner.run_sandboxed("print('a')", None),
        runner.run_sandboxed("print('b')", None)
    );

    assert_eq!(a, ExecutionResult::Success("a\n".to_owned()));
    assert_eq!(b, ExecutionResult::Success("b\n".to_owned()));
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_escape_attempts_are_blocked() {
    let runner = runner(1);
    let result = runner
        .run_sandboxed(&fixture_script("escape_attempts.py"), None)
        .await;

    assert_eq!(
        result,
        ExecutionResult::Success(
            "blocked: access to attribute '__class__' is not allowed\n\
             blocked: str.format is not allowed\n\
             blocked: name 'getattr' is not defined\n"
                .to_owned()
        )
    );
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_disallowed_builtins_never_succeed() {
    let runner = runner(1);

    for source in [
        "open('/etc/passwd')",
        "exec('print(1)')",
        "eval('1')",
        "__import__('os')",
        "getattr(1, 'real')",
        "globals()",
    ] {
        let result = runner.run_sandboxed(source, None).await;
        assert!(
            matches!(
                result.status(),
                ResultStatus::RuntimeError | ResultStatus::CompileError
            ),
            "{source} gave {result:?}"
        );
    }
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fixture_scripts() {
    let runner = runner(2);

    let fizzbuzz = runner
        .run_sandboxed(&fixture_script("fizzbuzz.py"), None)
        .await;
    let output = fizzbuzz.output().expect("fizzbuzz should succeed");
    assert_eq!(output.lines().count(), 15);
    assert_eq!(output.lines().last(), Some("FizzBuzz"));

    let statistics = runner
        .run_sandboxed(&fixture_script("statistics.py"), None)
        .await;
    assert_eq!(
        statistics,
        ExecutionResult::Success("5 4.5 4\n2.0\n4.0 120\n".to_owned())
    );
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_module_allow_list_comes_from_config() {
    let mut config = test_config(1);
    config.policy = config.policy.with_modules(["math"]);
    let runner = Runner::start(config).expect("Failed to start runner");

    let result = runner.run_sandboxed("import math\nprint(math.floor(2.7))", None).await;
    assert_eq!(result, ExecutionResult::Success("2\n".to_owned()));

    let result = runner.run_sandboxed("import random", None).await;
    assert_eq!(result.status(), ResultStatus::CompileError);
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_output_is_deterministic() {
    let runner = runner(2);
    let source = "words = 'the quick brown fox'.split()\nprint(sorted(words, key=len))";

    let first = runner.run_sandboxed(source, None).await;
    let second = runner.run_sandboxed(source, None).await;
    assert!(first.is_success());
    assert_eq!(first, second);
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unbounded_timeout_still_runs() {
    let runner = runner(1);
    let result = runner.run_sandboxed("print(2 + 2)", Some(Duration::MAX)).await;
    assert_eq!(result, ExecutionResult::Success("4\n".to_owned()));
    runner.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_lambda_keys_and_self_referencing_lists() {
    let runner = runner(1);

    let result = runner
        .run_sandboxed("print(sorted(['ccc', 'a', 'bb'], key=lambda w: len(w)))", None)
        .await;
    assert_eq!(result, ExecutionResult::Success("['a', 'bb', 'ccc']\n".to_owned()));

    let result = runner
        .run_sandboxed("a = []\na.append(a)\nb = []\nb.append(b)\nprint(a == b)", None)
        .await;
    assert_eq!(result.status(), ResultStatus::RuntimeError);

    // The worker survived the comparison
    let result = runner.run_sandboxed("print('alive')", None).await;
    assert_eq!(result, ExecutionResult::Success("alive\n".to_owned()));
    runner.shutdown().await;
}
