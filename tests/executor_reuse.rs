use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use reconcile_flow::dag::{Graph, Task, TaskFn, TaskOutcome};
use reconcile_flow::engine::{Opts, RetryResult};
use reconcile_flow_test_utils::actions::{CallCounter, succeed};
use reconcile_flow_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn test_flow_can_run_twice_without_leaking_state() -> TestResult {
    init_tracing();

    // `gate` fails on the first run only. Nothing from the first run may
    // leak into the second.
    let fail_gate = Arc::new(AtomicBool::new(true));
    let calls = CallCounter::new();

    let mut g = Graph::new("reuse");
    let gate = {
        let fail_gate = Arc::clone(&fail_gate);
        g.add(Task::new(
            "gate",
            TaskFn::new(move |_ctx| {
                let fail = fail_gate.load(Ordering::SeqCst);
                async move {
                    if fail {
                        RetryResult::Severe(anyhow!("gate closed"))
                    } else {
                        RetryResult::Ok
                    }
                }
            }),
        ))
    };
    g.add(Task::new("behind gate", succeed(&calls)).after(gate));
    let flow = g.compile()?;

    let first = with_timeout(flow.execute(CancellationToken::new(), Opts::new())).await;
    assert_eq!(first.outcome_of("behind gate"), Some(TaskOutcome::DependencySkipped));
    assert_eq!(calls.count(), 0);

    fail_gate.store(false, Ordering::SeqCst);

    let second = with_timeout(flow.execute(CancellationToken::new(), Opts::new())).await;
    assert!(second.is_success());
    assert_eq!(second.outcome_of("gate"), Some(TaskOutcome::Succeeded));
    assert_eq!(second.outcome_of("behind gate"), Some(TaskOutcome::Succeeded));
    assert_eq!(second.stats.completed(), 2);
    assert_eq!(calls.count(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_of_one_flow_are_independent() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("concurrent");
    let a = g.add(Task::new("A", succeed(&calls)));
    let b = g.add(Task::new("B", succeed(&calls)).after(a));
    g.add(Task::new("C", succeed(&calls)).after(a).after(b));
    let flow = Arc::new(g.compile()?);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let flow = Arc::clone(&flow);
        handles.push(tokio::spawn(async move {
            flow.execute(CancellationToken::new(), Opts::new()).await
        }));
    }

    for handle in handles {
        let report = with_timeout(handle).await?;
        assert!(report.is_success());
        assert_eq!(report.stats.succeeded.len(), 3);
    }
    assert_eq!(calls.count(), 24);
    Ok(())
}
