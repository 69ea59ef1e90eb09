// src/dag/task_fn.rs

//! Caller-supplied actions.
//!
//! A [`TaskFn`] is the only thing the engine knows about a step: it receives
//! a [`Context`] and resolves to a [`RetryResult`]. Everything the step
//! touches is captured by the closure and owned by the caller.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use crate::engine::{Context, RetryResult};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ActionFn = dyn Fn(Context) -> BoxFuture<RetryResult> + Send + Sync;

/// A cloneable, shareable action.
#[derive(Clone)]
pub struct TaskFn(Arc<ActionFn>);

impl TaskFn {
    /// Wrap an action that reports done / retry / fatal itself.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RetryResult> + Send + 'static,
    {
        Self(Arc::new(move |ctx| Box::pin(f(ctx))))
    }

    /// Wrap an action that only reports success or an error.
    ///
    /// Errors are treated as "not done yet": under a retry policy the action
    /// is retried, without one the task fails after the single attempt.
    pub fn simple<F, Fut>(f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(move |ctx| {
            let fut = f(ctx);
            async move { RetryResult::from(fut.await) }
        })
    }

    /// An action that succeeds immediately.
    pub fn noop() -> Self {
        Self::new(|_ctx| async { RetryResult::Ok })
    }

    /// Run `fns` one after another, stopping at the first result that is
    /// not `Ok`.
    pub fn sequential(fns: impl IntoIterator<Item = TaskFn>) -> Self {
        let fns: Arc<[TaskFn]> = fns.into_iter().collect();
        Self::new(move |ctx| {
            let fns = Arc::clone(&fns);
            async move {
                for f in fns.iter() {
                    match f.call(ctx.clone()).await {
                        RetryResult::Ok => {}
                        other => return other,
                    }
                }
                RetryResult::Ok
            }
        })
    }

    /// Run `fns` concurrently.
    ///
    /// Resolves to the first severe error (in declaration order), otherwise
    /// the first minor error, otherwise `Ok`.
    pub fn parallel(fns: impl IntoIterator<Item = TaskFn>) -> Self {
        let fns: Arc<[TaskFn]> = fns.into_iter().collect();
        Self::new(move |ctx| {
            let fns = Arc::clone(&fns);
            async move {
                let handles: Vec<_> = fns
                    .iter()
                    .map(|f| tokio::spawn(f.call(ctx.clone())))
                    .collect();

                let mut first_minor = None;
                let mut first_severe = None;

                for handle in handles {
                    let result = match handle.await {
                        Ok(result) => result,
                        Err(join_err) => {
                            debug!(error = %join_err, "parallel sub-action did not complete");
                            RetryResult::Severe(anyhow!("parallel sub-action failed: {join_err}"))
                        }
                    };
                    match result {
                        RetryResult::Ok => {}
                        RetryResult::Minor(err) => {
                            first_minor.get_or_insert(err);
                        }
                        RetryResult::Severe(err) => {
                            first_severe.get_or_insert(err);
                        }
                    }
                }

                match (first_severe, first_minor) {
                    (Some(err), _) => RetryResult::Severe(err),
                    (None, Some(err)) => RetryResult::Minor(err),
                    (None, None) => RetryResult::Ok,
                }
            }
        })
    }

    pub fn call(&self, ctx: Context) -> BoxFuture<RetryResult> {
        (self.0)(ctx)
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskFn(..)")
    }
}
