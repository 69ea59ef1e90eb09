// src/config/plan.rs

use std::collections::HashMap;

use tracing::debug;

use crate::config::model::PlanFile;
use crate::dag::{Graph, Task, TaskId, TaskIds};
use crate::errors::{FlowError, Result};
use crate::exec::CommandAction;

/// Turn a validated plan into a [`Graph`] of shell command tasks.
///
/// Tasks are added in topological order, so every `after` reference already
/// has a [`TaskId`] when its dependent is added.
pub fn build_graph(plan: &PlanFile) -> Result<Graph> {
    let mut graph = Graph::new(plan.flow.name.clone());
    let mut ids: HashMap<&str, TaskId> = HashMap::new();

    for (key, cfg) in plan.tasks_in_order() {
        let dependencies = cfg
            .after
            .iter()
            .map(|dep| {
                ids.get(dep.as_str()).copied().ok_or_else(|| {
                    FlowError::ConfigError(format!(
                        "task '{}' depends on '{}' which was not added yet",
                        key, dep
                    ))
                })
            })
            .collect::<Result<TaskIds>>()?;

        let action = CommandAction::from_config(key, cfg);
        let mut task = Task::new(cfg.display_name(key), action.into_task_fn())
            .depends_on(dependencies)
            .retry(cfg.retry_policy(&plan.defaults)?);
        if let Some(flag) = cfg.run_if {
            task = task.run_if(flag);
        }
        if let Some(flag) = cfg.skip_if {
            task = task.skip_if(flag);
        }

        debug!(task = %key, "adding plan task to graph");
        ids.insert(key, graph.add(task));
    }

    Ok(graph)
}
