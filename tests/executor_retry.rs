use std::error::Error;
use std::time::Duration;

use reconcile_flow::dag::{Graph, Task, TaskOutcome};
use reconcile_flow::engine::Opts;
use reconcile_flow::errors::TaskFailure;
use reconcile_flow_test_utils::actions::{
    CallCounter, always_minor, fail_severe, minor_then_ok, succeed, wait_for_cancel,
};
use reconcile_flow_test_utils::init_tracing;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

const INTERVAL: Duration = Duration::from_secs(1);
const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test(start_paused = true)]
async fn test_retry_until_timeout_fails_with_last_error() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("retry");
    g.add(
        Task::new("Waiting until infrastructure is ready", always_minor(&calls, "not ready"))
            .retry_until_timeout(INTERVAL, TIMEOUT),
    );
    let flow = g.compile()?;

    let started = Instant::now();
    let report = flow.execute(CancellationToken::new(), Opts::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(
        report.outcome_of("Waiting until infrastructure is ready"),
        Some(TaskOutcome::Failed)
    );
    let expected = (TIMEOUT.as_secs() / INTERVAL.as_secs()) as usize;
    let count = calls.count();
    assert!(
        (expected - 1..=expected + 1).contains(&count),
        "expected about {expected} attempts, got {count}"
    );
    assert!(elapsed >= TIMEOUT, "gave up after {elapsed:?}");
    assert!(elapsed < TIMEOUT + INTERVAL, "gave up after {elapsed:?}");

    let err = report.error.expect("run must fail");
    match &err.errors()[0].cause {
        TaskFailure::TimedOut {
            timeout,
            attempts,
            last,
        } => {
            assert_eq!(*timeout, TIMEOUT);
            assert_eq!(*attempts as usize, count);
            assert!(last.to_string().contains("not ready"), "{last}");
        }
        other => panic!("expected TimedOut, got {other:?}"),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_minor_errors_are_retried_until_done() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("eventually");
    g.add(Task::new("Deploying etcd", minor_then_ok(&calls, 2)).retry_until_timeout(INTERVAL, TIMEOUT));
    let flow = g.compile()?;

    let started = Instant::now();
    flow.run(CancellationToken::new(), Opts::new()).await?;

    assert_eq!(calls.count(), 3);
    let elapsed = started.elapsed();
    assert!(elapsed >= INTERVAL * 2 && elapsed < INTERVAL * 3, "took {elapsed:?}");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_severe_error_stops_retrying() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("severe");
    g.add(
        Task::new("Deploying backup infrastructure", fail_severe(&calls, "bucket name taken"))
            .retry_until_timeout(INTERVAL, TIMEOUT),
    );
    let flow = g.compile()?;

    let err = flow
        .run(CancellationToken::new(), Opts::new())
        .await
        .expect_err("run must fail");

    assert_eq!(calls.count(), 1);
    assert!(matches!(err.errors()[0].cause, TaskFailure::Fatal(_)));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_in_flight_attempt() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("hung");
    g.add(Task::new("Waiting for a hung backend", wait_for_cancel(&calls)).retry_until_timeout(INTERVAL, TIMEOUT));
    let flow = g.compile()?;

    let started = Instant::now();
    let err = flow
        .run(CancellationToken::new(), Opts::new())
        .await
        .expect_err("run must fail");

    assert_eq!(calls.count(), 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= TIMEOUT && elapsed < TIMEOUT + INTERVAL, "took {elapsed:?}");
    assert!(err.errors()[0].cause.is_timeout());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_task_timeout_does_not_affect_siblings() -> TestResult {
    init_tracing();

    let (slow_calls, sibling_calls) = (CallCounter::new(), CallCounter::new());
    let mut g = Graph::new("siblings");
    g.add(Task::new("slow", always_minor(&slow_calls, "still pending")).retry_until_timeout(INTERVAL, TIMEOUT));
    g.add(
        Task::new("sibling", minor_then_ok(&sibling_calls, 7))
            .retry_until_timeout(INTERVAL, Duration::from_secs(30)),
    );
    g.add(Task::new("fast", succeed(&CallCounter::new())));
    let flow = g.compile()?;

    let report = flow.execute(CancellationToken::new(), Opts::new()).await;

    assert_eq!(report.outcome_of("slow"), Some(TaskOutcome::Failed));
    assert_eq!(report.outcome_of("sibling"), Some(TaskOutcome::Succeeded));
    assert_eq!(report.outcome_of("fast"), Some(TaskOutcome::Succeeded));
    assert_eq!(sibling_calls.count(), 8);
    Ok(())
}
