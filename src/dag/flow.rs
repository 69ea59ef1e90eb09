// src/dag/flow.rs

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::dag::task_fn::TaskFn;
use crate::dag::task_info::{RetryPolicy, RunCondition};
use crate::engine::report::RunReport;
use crate::engine::{Opts, TaskName, runtime};
use crate::errors::AggregatedError;

/// A task as stored in a compiled [`Flow`].
pub(crate) struct CompiledTask {
    pub(crate) name: TaskName,
    pub(crate) func: TaskFn,
    pub(crate) dependencies: Vec<usize>,
    pub(crate) condition: RunCondition,
    pub(crate) retry: RetryPolicy,
}

/// Immutable, compiled form of a [`Graph`](crate::dag::Graph).
///
/// A flow never changes after compilation. Every call to [`Flow::run`] or
/// [`Flow::execute`] creates its own run-local state, so the same flow can be
/// run repeatedly or concurrently.
pub struct Flow {
    name: String,
    tasks: Vec<CompiledTask>,
    /// `dependents[i]` lists the tasks that depend on task `i`.
    dependents: Vec<Vec<usize>>,
    /// Tasks without dependencies.
    roots: Vec<usize>,
}

impl Flow {
    pub(crate) fn new(name: String, tasks: Vec<CompiledTask>, dependents: Vec<Vec<usize>>) -> Self {
        let roots = tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.dependencies.is_empty())
            .map(|(i, _)| i)
            .collect();

        Self {
            name,
            tasks,
            dependents,
            roots,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task names in the order they were added to the graph.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.name.as_str())
    }

    /// Direct dependencies of the named task.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index_of(name)
            .map(|i| {
                self.tasks[i]
                    .dependencies
                    .iter()
                    .map(|&d| self.tasks[d].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct dependents of the named task.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.index_of(name)
            .map(|i| {
                self.dependents[i]
                    .iter()
                    .map(|&d| self.tasks[d].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Run every task and return the aggregated error of all failed tasks.
    ///
    /// Returns `Ok(())` if no task failed. Individual failures never abort
    /// the run; unrelated branches keep going until every task is terminal.
    pub async fn run(&self, ctx: CancellationToken, opts: Opts) -> Result<(), AggregatedError> {
        self.execute(ctx, opts).await.into_result()
    }

    /// Like [`Flow::run`], but returns the full [`RunReport`] with every
    /// task's outcome and the final statistics.
    pub async fn execute(&self, ctx: CancellationToken, opts: Opts) -> RunReport {
        runtime::execute(self, ctx, opts).await
    }

    pub(crate) fn task(&self, index: usize) -> &CompiledTask {
        &self.tasks[index]
    }

    pub(crate) fn tasks(&self) -> &[CompiledTask] {
        &self.tasks
    }

    pub(crate) fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    pub(crate) fn roots(&self) -> &[usize] {
        &self.roots
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("tasks", &self.tasks.len())
            .field("roots", &self.roots)
            .finish()
    }
}
