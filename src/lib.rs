// src/lib.rs

//! Dependency-graph task execution engine.
//!
//! Build a [`dag::Graph`] of named tasks, compile it into an immutable
//! [`dag::Flow`], and run the flow as often as needed. Independent branches
//! run concurrently; a failed task only skips its own dependents; every
//! failure of a run is collected into one
//! [`AggregatedError`](errors::AggregatedError), which [`status`] turns into
//! publishable status records.

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod status;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span};

use crate::cli::CliArgs;
use crate::config::{PlanFile, build_graph, load_and_validate};
use crate::engine::{Opts, Stats};
use crate::errors::FlowError;
use crate::status::{LastError, LastOperation, LastOperationType};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading and validation
/// - graph construction and compilation
/// - progress reporting as [`LastOperation`] records
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let plan = load_and_validate(&args.plan)?;

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let flow = build_graph(&plan)?.compile()?;
    let kind = LastOperationType::from(args.operation);

    // Ctrl-C → cancel the root token.
    let root = CancellationToken::new();
    {
        let token = root.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl-C received; cancelling run");
            token.cancel();
        });
    }

    let last_operation: Arc<Mutex<Option<LastOperation>>> = Arc::new(Mutex::new(None));
    let reporter = {
        let last_operation = Arc::clone(&last_operation);
        move |stats: &Stats| {
            let op = LastOperation::processing_from_stats(kind, stats);
            info!(progress = op.progress, description = %op.description, "progress");
            if let Ok(mut guard) = last_operation.lock() {
                *guard = Some(op);
            }
        }
    };

    let opts = Opts::new()
        .with_span(info_span!("reconcile", plan = %args.plan))
        .with_progress_reporter(reporter);

    match flow.run(root, opts).await {
        Ok(()) => {
            let op = LastOperation::succeeded(
                kind,
                format!("{} has been successfully completed.", flow.name()),
            );
            println!("{:?} {:?}: {}", op.kind, op.state, op.description);
            Ok(())
        }
        Err(err) => {
            let last_error = LastError::from_error(&err);
            let previous = last_operation.lock().ok().and_then(|guard| guard.clone());
            let op = LastOperation::errored(
                kind,
                &last_error,
                previous.as_ref(),
                None,
                std::time::Duration::ZERO,
            );

            error!(
                codes = ?last_error.codes,
                tasks = ?last_error.task_names,
                retryable = last_error.is_retryable(),
                "run failed"
            );
            println!(
                "{:?} {:?} at {}%: {}",
                op.kind, op.state, op.progress, op.description
            );
            if !last_error.codes.is_empty() {
                let codes: Vec<_> = last_error.codes.iter().map(|c| c.as_str()).collect();
                println!("error codes: {}", codes.join(", "));
            }

            Err(FlowError::Execution(err).into())
        }
    }
}

/// Simple dry-run output: print tasks, deps and commands in execution order.
fn print_dry_run(plan: &PlanFile) {
    println!("reconcile-flow dry-run");
    println!("  flow.name = {}", plan.flow.name);
    println!("  defaults.retry_interval = {}", plan.defaults.retry_interval);
    println!("  defaults.retry_timeout = {}", plan.defaults.retry_timeout);
    println!();

    println!("tasks ({}):", plan.task.len());
    for (key, task) in plan.tasks_in_order() {
        println!("  - {key}");
        if let Some(ref name) = task.name {
            println!("      name: {name}");
        }
        println!("      cmd: {}", task.cmd);
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Ok(policy) = task.retry_policy(&plan.defaults) {
            println!("      retry: {policy:?}");
        }
        if let Some(flag) = task.run_if {
            println!("      run_if: {flag}");
        }
        if let Some(flag) = task.skip_if {
            println!("      skip_if: {flag}");
        }
        if !task.fatal_exit_codes.is_empty() {
            println!("      fatal_exit_codes: {:?}", task.fatal_exit_codes);
        }
    }

    debug!("dry-run complete (no execution)");
}
