// src/errors.rs

//! Crate-wide error types.
//!
//! - [`FlowError`] is returned by graph compilation, plan loading and the
//!   binary entry point.
//! - [`TaskFailure`] is the cause recorded for a single failed task.
//! - [`TaskError`] pairs a failure with the name of the task it belongs to.
//! - [`AggregatedError`] collects every failed task of one flow run, in the
//!   order the tasks failed.

use std::time::Duration;

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum FlowError {
    /// The graph handed to `compile` references tasks it does not own, or
    /// contains unnamed / duplicate tasks.
    #[error("invalid graph {graph:?}: {reason}")]
    InvalidGraph { graph: String, reason: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Cycle detected in plan: {0}")]
    PlanCycle(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Execution(#[from] AggregatedError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub(crate) fn invalid_graph(graph: &str, reason: impl Into<String>) -> Self {
        FlowError::InvalidGraph {
            graph: graph.to_string(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;

/// Why a single task ended up `Failed`.
#[derive(Error, Debug)]
pub enum TaskFailure {
    /// The action reported a severe error, or a task without retry policy
    /// returned any error on its only attempt.
    #[error("{}", render(.0))]
    Fatal(anyhow::Error),

    /// The retry policy's timeout elapsed before the action reported success.
    #[error(
        "retry failed after {attempts} attempt(s) within {timeout:?}, last error: {}",
        render(.last)
    )]
    TimedOut {
        timeout: Duration,
        attempts: u32,
        last: anyhow::Error,
    },

    /// The root context was cancelled while the task was pending or running.
    #[error("task was cancelled{}", cancelled_suffix(.last))]
    Cancelled { last: Option<anyhow::Error> },

    /// The action panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskFailure {
    /// The error the action itself produced last, if any.
    pub fn last_error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskFailure::Fatal(err) => Some(err),
            TaskFailure::TimedOut { last, .. } => Some(last),
            TaskFailure::Cancelled { last } => last.as_ref(),
            TaskFailure::Panicked(_) => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TaskFailure::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskFailure::Cancelled { .. })
    }
}

fn render(err: &anyhow::Error) -> String {
    format!("{err:#}")
}

fn cancelled_suffix(last: &Option<anyhow::Error>) -> String {
    match last {
        Some(err) => format!(", last error: {err:#}"),
        None => String::new(),
    }
}

/// A failed task of a flow run.
#[derive(Error, Debug)]
#[error("{task} failed: {cause}")]
pub struct TaskError {
    pub task: TaskName,
    #[source]
    pub cause: TaskFailure,
}

/// Every task failure of a single flow run.
///
/// Tasks that were skipped because an ancestor failed do not contribute an
/// entry; only the failed tasks themselves do.
#[derive(Error, Debug)]
#[error("flow {flow:?} encountered task errors: [{}]", join_errors(.errors))]
pub struct AggregatedError {
    flow: String,
    errors: Vec<TaskError>,
}

impl AggregatedError {
    pub fn new(flow: impl Into<String>, errors: Vec<TaskError>) -> Self {
        Self {
            flow: flow.into(),
            errors,
        }
    }

    pub fn flow_name(&self) -> &str {
        &self.flow
    }

    /// Task errors in the order the tasks reached `Failed`.
    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TaskError> {
        self.errors
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.task.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

fn join_errors(errors: &[TaskError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
