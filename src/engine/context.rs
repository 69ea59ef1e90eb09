// src/engine/context.rs

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::TaskName;

/// Execution context handed to every action invocation.
///
/// The token is a child of the run's root token. Under a retry policy each
/// attempt gets its own child, which is cancelled when the task's timeout
/// elapses.
#[derive(Debug, Clone)]
pub struct Context {
    cancellation: CancellationToken,
    task: TaskName,
}

impl Context {
    pub fn new(cancellation: CancellationToken, task: impl Into<TaskName>) -> Self {
        Self {
            cancellation,
            task: task.into(),
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Completes once the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Sleep for `duration` unless the context is cancelled first.
    ///
    /// Returns `false` if the sleep was cut short by cancellation.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancellation.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
