use std::collections::BTreeSet;
use std::error::Error;

use reconcile_flow::dag::{Graph, Task};
use reconcile_flow::engine::{Opts, Stats, make_description};
use reconcile_flow_test_utils::actions::{CallCounter, RecordingReporter, fail_severe, succeed};
use reconcile_flow_test_utils::{init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_progress_accounting() -> TestResult {
    init_tracing();

    // A; B after A; C after A, skipped; D after B and C.
    let calls = CallCounter::new();
    let mut g = Graph::new("accounting");
    let a = g.add(Task::new("A", succeed(&calls)));
    let b = g.add(Task::new("B", succeed(&calls)).after(a));
    let c = g.add(Task::new("C", succeed(&calls)).after(a).skip_if(true));
    g.add(Task::new("D", succeed(&calls)).after(b).after(c));
    let flow = g.compile()?;

    let reporter = RecordingReporter::new();
    let opts = Opts::new().with_progress_reporter(reporter.clone());
    let report = with_timeout(flow.execute(CancellationToken::new(), opts)).await;
    assert!(report.is_success());

    // Right after A completes, B, C and D are still pending.
    let after_a = reporter
        .snapshots()
        .into_iter()
        .find(|s| s.succeeded.contains("A"))
        .expect("a report after A completed");
    assert_eq!(after_a.progress_percent(), 25);
    assert_eq!(after_a.pending, names(&["B", "C", "D"]));
    assert!(after_a.running.is_empty());

    let last = reporter.last().expect("at least one report");
    assert_eq!(last.total, 4);
    assert_eq!(last.succeeded, names(&["A", "B", "D"]));
    assert_eq!(last.condition_skipped, names(&["C"]));
    assert!(last.failed.is_empty());
    assert!(last.dependency_skipped.is_empty());
    assert_eq!(last.progress_percent(), 100);
    assert_eq!(last, report.stats);

    // One report per transition, in order.
    assert_eq!(reporter.percents(), vec![0, 25, 25, 50, 75, 75, 100]);
    Ok(())
}

#[tokio::test]
async fn test_reports_include_running_and_failed_tasks() -> TestResult {
    init_tracing();

    let calls = CallCounter::new();
    let mut g = Graph::new("failing");
    let a = g.add(Task::new("A", fail_severe(&calls, "boom")));
    g.add(Task::new("B", succeed(&calls)).after(a));
    let flow = g.compile()?;

    let reporter = RecordingReporter::new();
    let opts = Opts::new().with_progress_reporter(reporter.clone());
    let report = with_timeout(flow.execute(CancellationToken::new(), opts)).await;

    let snapshots = reporter.snapshots();
    assert_eq!(snapshots[0].running, names(&["A"]));
    assert_eq!(snapshots[1].failed, names(&["A"]));
    assert_eq!(snapshots[1].progress_percent(), 50);
    assert_eq!(report.stats.dependency_skipped, names(&["B"]));
    assert_eq!(report.stats.progress_percent(), 100);
    Ok(())
}

#[tokio::test]
async fn test_closure_reporter() -> TestResult {
    init_tracing();

    let seen = CallCounter::new();
    let counted = seen.clone();
    let mut g = Graph::new("closure");
    g.add(Task::new("only", succeed(&CallCounter::new())));
    let flow = g.compile()?;

    let opts = Opts::new().with_progress_reporter(move |_stats: &Stats| {
        counted.hit();
    });
    with_timeout(flow.run(CancellationToken::new(), opts)).await?;

    // running + succeeded
    assert_eq!(seen.count(), 2);
    Ok(())
}

#[test]
fn test_make_description() {
    let mut stats = Stats {
        flow_name: "Shoot cluster reconciliation".to_string(),
        total: 4,
        pending: names(&["A", "B", "C", "D"]),
        running: BTreeSet::new(),
        succeeded: BTreeSet::new(),
        condition_skipped: BTreeSet::new(),
        dependency_skipped: BTreeSet::new(),
        failed: BTreeSet::new(),
        last_completed: None,
    };
    assert_eq!(make_description(&stats), "Starting Shoot cluster reconciliation");

    stats.pending = names(&["C", "D"]);
    stats.running = names(&["Deploying namespace", "Deploying secrets"]);
    assert_eq!(
        make_description(&stats),
        "Deploying namespace, Deploying secrets"
    );

    stats.running.clear();
    stats.succeeded = names(&["A", "B"]);
    stats.last_completed = Some("B".to_string());
    assert_eq!(make_description(&stats), "Completed B");

    stats.pending.clear();
    stats.succeeded = names(&["A", "B", "C", "D"]);
    assert_eq!(make_description(&stats), "Shoot cluster reconciliation finished");
}

#[tokio::test]
async fn test_description_names_last_completed_task_in_large_flow() -> TestResult {
    init_tracing();

    // Past 100 tasks the percentage stays at 0 after the first completion.
    let calls = CallCounter::new();
    let mut g = Graph::new("big");
    let mut previous = g.add(Task::new("task_0", succeed(&calls)));
    for i in 1..150 {
        previous = g.add(Task::new(format!("task_{i}"), succeed(&calls)).after(previous));
    }
    let flow = g.compile()?;

    let reporter = RecordingReporter::new();
    let opts = Opts::new().with_progress_reporter(reporter.clone());
    let report = with_timeout(flow.execute(CancellationToken::new(), opts)).await;
    assert!(report.is_success());

    let after_first = reporter
        .snapshots()
        .into_iter()
        .find(|s| s.completed() == 1 && s.running.is_empty())
        .ok_or("no report right after task_0 completed")?;
    assert_eq!(after_first.progress_percent(), 0);
    assert_eq!(make_description(&after_first), "Completed task_0");
    Ok(())
}
