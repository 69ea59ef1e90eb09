// src/dag/task_info.rs

//! Task definitions and per-run task state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::dag::graph::{TaskId, TaskIds};
use crate::dag::task_fn::TaskFn;
use crate::engine::TaskName;

/// Predicate deciding whether a task runs. Evaluated once, when all of the
/// task's dependencies have finished.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Whether a task's action executes or the task is skipped.
#[derive(Clone, Default)]
pub enum RunCondition {
    #[default]
    Always,
    RunIf(Predicate),
    SkipIf(Predicate),
}

impl RunCondition {
    pub fn should_run(&self) -> bool {
        match self {
            RunCondition::Always => true,
            RunCondition::RunIf(pred) => pred(),
            RunCondition::SkipIf(pred) => !pred(),
        }
    }
}

impl fmt::Debug for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunCondition::Always => f.write_str("Always"),
            RunCondition::RunIf(_) => f.write_str("RunIf(..)"),
            RunCondition::SkipIf(_) => f.write_str("SkipIf(..)"),
        }
    }
}

/// How often a task's action is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    /// A single attempt; any error fails the task.
    #[default]
    Once,
    /// Retry every `interval` until the action is done or `timeout` elapsed.
    UntilTimeout { interval: Duration, timeout: Duration },
}

/// A named unit of work in a [`Graph`](crate::dag::Graph).
///
/// ```
/// # use std::time::Duration;
/// # use reconcile_flow::dag::{Graph, Task, TaskFn};
/// let mut g = Graph::new("example");
/// let ns = g.add(Task::new("Deploying namespace", TaskFn::noop()));
/// let _policies = g.add(
///     Task::new("Deploying network policies", TaskFn::noop())
///         .after(ns)
///         .skip_if(false)
///         .retry_until_timeout(Duration::from_secs(5), Duration::from_secs(30)),
/// );
/// ```
pub struct Task {
    pub(crate) name: TaskName,
    pub(crate) func: TaskFn,
    pub(crate) dependencies: TaskIds,
    pub(crate) condition: RunCondition,
    pub(crate) retry: RetryPolicy,
}

impl Task {
    pub fn new(name: impl Into<TaskName>, func: TaskFn) -> Self {
        Self {
            name: name.into(),
            func,
            dependencies: TaskIds::new(),
            condition: RunCondition::Always,
            retry: RetryPolicy::Once,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add all of `ids` to the task's dependencies.
    pub fn depends_on(mut self, ids: impl Into<TaskIds>) -> Self {
        self.dependencies.extend(&ids.into());
        self
    }

    /// Add a single dependency.
    pub fn after(mut self, id: TaskId) -> Self {
        self.dependencies.insert(id);
        self
    }

    /// Only run the action when `flag` is true.
    pub fn run_if(self, flag: bool) -> Self {
        self.run_if_with(move || flag)
    }

    /// Only run the action when `pred` returns true at scheduling time.
    pub fn run_if_with<F>(mut self, pred: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = RunCondition::RunIf(Arc::new(pred));
        self
    }

    /// Skip the action when `flag` is true.
    pub fn skip_if(self, flag: bool) -> Self {
        self.skip_if_with(move || flag)
    }

    /// Skip the action when `pred` returns true at scheduling time.
    pub fn skip_if_with<F>(mut self, pred: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.condition = RunCondition::SkipIf(Arc::new(pred));
        self
    }

    pub fn condition(mut self, condition: RunCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_until_timeout(self, interval: Duration, timeout: Duration) -> Self {
        self.retry(RetryPolicy::UntilTimeout { interval, timeout })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("condition", &self.condition)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Terminal outcome of a task in one run.
///
/// Failure causes are carried by the run's
/// [`AggregatedError`](crate::errors::AggregatedError).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded,
    /// The run condition said skip; counts as success for dependents.
    ConditionSkipped,
    /// An ancestor failed, so the action was never invoked.
    DependencySkipped,
    Failed,
}

impl TaskOutcome {
    /// Whether dependents of a task with this outcome may run.
    pub fn unblocks_dependents(self) -> bool {
        matches!(self, TaskOutcome::Succeeded | TaskOutcome::ConditionSkipped)
    }
}

/// Per-run state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// Waiting on dependencies.
    Pending,
    /// The action (or its retry loop) is executing.
    Running,
    Done(TaskOutcome),
}

impl TaskRunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskRunState::Done(_))
    }
}
