// src/engine/retry.rs

//! Retry wrapper around a task's action.
//!
//! An action reports one of three results per invocation:
//! - [`RetryResult::Ok`]: done, the task succeeded
//! - [`RetryResult::Minor`]: not done yet, retry if the policy allows it
//! - [`RetryResult::Severe`]: stop now, the task failed
//!
//! [`run_with_policy`] applies a task's [`RetryPolicy`] to these results and
//! produces the task's final result for the scheduler.

use std::time::Duration;

use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::dag::{RetryPolicy, TaskFn};
use crate::engine::Context;
use crate::errors::TaskFailure;

/// Result of a single action invocation.
#[derive(Debug)]
pub enum RetryResult {
    Ok,
    /// Retryable error: the action is not done yet.
    Minor(anyhow::Error),
    /// Non-retryable error: the task fails immediately.
    Severe(anyhow::Error),
}

impl RetryResult {
    pub fn ok() -> Self {
        RetryResult::Ok
    }

    pub fn minor_error(err: impl Into<anyhow::Error>) -> Self {
        RetryResult::Minor(err.into())
    }

    pub fn severe_error(err: impl Into<anyhow::Error>) -> Self {
        RetryResult::Severe(err.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RetryResult::Ok)
    }
}

/// Plain errors are "not done yet".
impl From<anyhow::Result<()>> for RetryResult {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => RetryResult::Ok,
            Err(err) => RetryResult::Minor(err),
        }
    }
}

enum Wake {
    Cancelled,
    Deadline,
    Retry,
}

/// Invoke `func` under `policy` until it is done, failed, timed out or
/// `root` was cancelled.
pub(crate) async fn run_with_policy(
    func: &TaskFn,
    policy: RetryPolicy,
    root: &CancellationToken,
    task: &str,
) -> Result<(), TaskFailure> {
    match policy {
        RetryPolicy::Once => run_once(func, root, task).await,
        RetryPolicy::UntilTimeout { interval, timeout } => {
            run_until_timeout(func, interval, timeout, root, task).await
        }
    }
}

async fn run_once(func: &TaskFn, root: &CancellationToken, task: &str) -> Result<(), TaskFailure> {
    let ctx = Context::new(root.child_token(), task);
    match func.call(ctx).await {
        RetryResult::Ok => Ok(()),
        RetryResult::Minor(err) | RetryResult::Severe(err) => Err(failure(root, err)),
    }
}

async fn run_until_timeout(
    func: &TaskFn,
    interval: Duration,
    timeout: Duration,
    root: &CancellationToken,
    task: &str,
) -> Result<(), TaskFailure> {
    let deadline = Instant::now() + timeout;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let token = root.child_token();
        let mut attempt = func.call(Context::new(token.clone(), task));

        let finished = tokio::select! {
            biased;
            result = &mut attempt => Some(result),
            _ = sleep_until(deadline) => None,
        };
        let hit_deadline = finished.is_none();
        let result = match finished {
            Some(result) => result,
            None => {
                debug!(attempt = attempts, ?timeout, "timeout elapsed; cancelling attempt");
                token.cancel();
                attempt.await
            }
        };

        let err = match result {
            RetryResult::Ok => {
                if attempts > 1 {
                    debug!(attempts, "task done after retrying");
                }
                return Ok(());
            }
            RetryResult::Severe(err) if !hit_deadline => return Err(failure(root, err)),
            RetryResult::Severe(err) | RetryResult::Minor(err) => err,
        };

        if root.is_cancelled() {
            return Err(TaskFailure::Cancelled { last: Some(err) });
        }
        if hit_deadline || Instant::now() >= deadline {
            return Err(TaskFailure::TimedOut {
                timeout,
                attempts,
                last: err,
            });
        }

        debug!(attempt = attempts, error = %format!("{err:#}"), ?interval, "task not done yet; retrying");

        let wake = tokio::select! {
            biased;
            _ = root.cancelled() => Wake::Cancelled,
            _ = sleep_until(deadline) => Wake::Deadline,
            _ = sleep(interval) => Wake::Retry,
        };
        match wake {
            Wake::Cancelled => return Err(TaskFailure::Cancelled { last: Some(err) }),
            Wake::Deadline => {
                return Err(TaskFailure::TimedOut {
                    timeout,
                    attempts,
                    last: err,
                });
            }
            Wake::Retry => {}
        }
    }
}

fn failure(root: &CancellationToken, err: anyhow::Error) -> TaskFailure {
    if root.is_cancelled() {
        TaskFailure::Cancelled { last: Some(err) }
    } else {
        TaskFailure::Fatal(err)
    }
}
