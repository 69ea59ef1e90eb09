// src/dag/graph.rs

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::dag::flow::{CompiledTask, Flow};
use crate::dag::task_info::Task;
use crate::errors::{FlowError, Result};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Handle for a task added to a [`Graph`].
///
/// A `TaskId` only exists after [`Graph::add`] returned it, so a task can
/// only ever depend on tasks added before it. That is what keeps every graph
/// acyclic without a separate cycle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    graph: u64,
    index: usize,
}

impl TaskId {
    /// Position of the task inside its graph.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Set of task dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskIds(BTreeSet<TaskId>);

impl TaskIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TaskId) -> bool {
        self.0.insert(id)
    }

    pub fn extend(&mut self, other: &TaskIds) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.0.iter()
    }
}

impl<const N: usize> From<[TaskId; N]> for TaskIds {
    fn from(ids: [TaskId; N]) -> Self {
        Self(ids.into_iter().collect())
    }
}

impl From<TaskId> for TaskIds {
    fn from(id: TaskId) -> Self {
        Self([id].into_iter().collect())
    }
}

impl FromIterator<TaskId> for TaskIds {
    fn from_iter<I: IntoIterator<Item = TaskId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TaskIds {
    type Item = &'a TaskId;
    type IntoIter = std::collections::btree_set::Iter<'a, TaskId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Build a [`TaskIds`] set from a list of ids.
///
/// ```
/// # use reconcile_flow::{task_ids, dag::{Graph, Task, TaskFn}};
/// let mut g = Graph::new("example");
/// let a = g.add(Task::new("a", TaskFn::noop()));
/// let b = g.add(Task::new("b", TaskFn::noop()));
/// let deps = task_ids![a, b];
/// assert_eq!(deps.len(), 2);
/// ```
#[macro_export]
macro_rules! task_ids {
    () => { $crate::dag::TaskIds::new() };
    ($($id:expr),+ $(,)?) => {
        $crate::dag::TaskIds::from([$($id),+])
    };
}

/// Append-only builder for a reconciliation plan.
///
/// Tasks are added in order; each task may only depend on tasks that were
/// added before it. [`Graph::compile`] turns the builder into a [`Flow`].
#[derive(Debug)]
pub struct Graph {
    id: u64,
    name: String,
    tasks: Vec<Task>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            tasks: Vec::new(),
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

    /// Append a task and return its id for use as a later dependency.
    ///
    /// Problems with the task (empty name, foreign dependencies) are reported
    /// by [`Graph::compile`].
    pub fn add(&mut self, task: Task) -> TaskId {
        let id = TaskId {
            graph: self.id,
            index: self.tasks.len(),
        };
        debug!(
            graph = %self.name,
            task = %task.name,
            index = id.index,
            deps = task.dependencies.len(),
            "added task to graph"
        );
        self.tasks.push(task);
        id
    }

    /// Validate the graph and compile it into an immutable [`Flow`].
    ///
    /// # Errors
    /// [`FlowError::InvalidGraph`] if a task has an empty or duplicate name,
    /// or depends on a `TaskId` that was not produced by this graph before
    /// the task itself was added.
    pub fn compile(self) -> Result<Flow> {
        let mut seen_names: HashSet<&str> = HashSet::new();

        for (index, task) in self.tasks.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(FlowError::invalid_graph(
                    &self.name,
                    format!("task #{index} has an empty name"),
                ));
            }
            if !seen_names.insert(task.name.as_str()) {
                return Err(FlowError::invalid_graph(
                    &self.name,
                    format!("duplicate task name '{}'", task.name),
                ));
            }

            for dep in task.dependencies.iter() {
                if dep.graph != self.id {
                    return Err(FlowError::invalid_graph(
                        &self.name,
                        format!(
                            "task '{}' depends on a task of a different graph",
                            task.name
                        ),
                    ));
                }
                if dep.index >= index {
                    return Err(FlowError::invalid_graph(
                        &self.name,
                        format!(
                            "task '{}' depends on task #{} which was not added before it",
                            task.name, dep.index
                        ),
                    ));
                }
            }
        }

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        let mut compiled = Vec::with_capacity(self.tasks.len());

        for (index, task) in self.tasks.into_iter().enumerate() {
            let dependencies: Vec<usize> = task.dependencies.iter().map(|d| d.index).collect();
            for &dep in &dependencies {
                dependents[dep].push(index);
            }
            compiled.push(CompiledTask {
                name: task.name,
                func: task.func,
                dependencies,
                condition: task.condition,
                retry: task.retry,
            });
        }

        let flow = Flow::new(self.name, compiled, dependents);
        debug!(
            flow = %flow.name(),
            tasks = flow.len(),
            roots = flow.roots().len(),
            "compiled graph into flow"
        );
        Ok(flow)
    }
}
