// src/engine/runtime.rs

//! Async shell around the [`Scheduler`].
//!
//! One coordinating loop per run owns the scheduler. Every scheduled task
//! runs in its own Tokio task and reports back over a channel; task bodies
//! never touch run state directly.

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::dag::{Flow, ScheduledTask, Scheduler};
use crate::engine::Opts;
use crate::engine::report::RunReport;
use crate::engine::retry::run_with_policy;
use crate::errors::TaskFailure;

/// Events flowing from task runners into the coordinating loop.
#[derive(Debug)]
enum RunEvent {
    TaskFinished {
        index: usize,
        result: Result<(), TaskFailure>,
    },
}

pub(crate) async fn execute(flow: &Flow, root: CancellationToken, opts: Opts) -> RunReport {
    let span = info_span!(parent: &opts.span, "flow", flow = %flow.name());
    run_loop(flow, root, opts).instrument(span).await
}

async fn run_loop(flow: &Flow, root: CancellationToken, opts: Opts) -> RunReport {
    // Cancels in-flight actions if this future is dropped before the run
    // is over.
    let run_token = root.child_token();
    let _abandon_guard = run_token.clone().drop_guard();

    let task_span = Span::current();
    let mut scheduler = Scheduler::new(flow, root, opts.progress_reporter.clone());
    let (tx, mut rx) = mpsc::channel::<RunEvent>(flow.len().max(1));

    info!(tasks = flow.len(), "flow run started");

    let step = scheduler.start();
    dispatch(step.newly_scheduled, &run_token, &tx, &task_span);

    while !scheduler.is_finished() {
        let Some(event) = rx.recv().await else {
            warn!("run event channel closed before all tasks finished");
            break;
        };
        debug!(?event, "run loop received event");

        match event {
            RunEvent::TaskFinished { index, result } => {
                let step = scheduler.step_completion(index, result);
                if !step.newly_skipped.is_empty() {
                    debug!(skipped = ?step.newly_skipped, "tasks skipped");
                }
                dispatch(step.newly_scheduled, &run_token, &tx, &task_span);
            }
        }
    }

    let report = scheduler.into_report();
    match &report.error {
        None => info!("flow run succeeded"),
        Some(err) => warn!(failed = ?err.task_names(), "flow run finished with failed tasks"),
    }
    report
}

fn dispatch(
    tasks: Vec<ScheduledTask>,
    token: &CancellationToken,
    tx: &mpsc::Sender<RunEvent>,
    parent: &Span,
) {
    for task in tasks {
        let span = info_span!(parent: parent, "task", task = %task.name);
        let index = task.index;
        let token = token.clone();
        let tx = tx.clone();

        tokio::spawn(
            async move {
                let result = run_task(task, token).await;
                if tx.send(RunEvent::TaskFinished { index, result }).await.is_err() {
                    debug!("run loop is gone; dropping task completion");
                }
            }
            .instrument(span),
        );
    }
}

/// Run a task's action under its retry policy, turning panics into a
/// `Panicked` failure.
async fn run_task(task: ScheduledTask, token: CancellationToken) -> Result<(), TaskFailure> {
    let ScheduledTask {
        name, func, retry, ..
    } = task;

    let handle = tokio::spawn(
        async move { run_with_policy(&func, retry, &token, &name).await }.in_current_span(),
    );

    match handle.await {
        Ok(result) => result,
        Err(join_err) => Err(TaskFailure::Panicked(panic_message(join_err))),
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(msg) = payload.downcast_ref::<&str>() {
                msg.to_string()
            } else if let Some(msg) = payload.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
