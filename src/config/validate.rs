// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_setting;
use crate::config::model::{PlanFile, RawPlanFile};
use crate::errors::{FlowError, Result};

impl TryFrom<RawPlanFile> for PlanFile {
    type Error = FlowError;

    fn try_from(raw: RawPlanFile) -> std::result::Result<Self, Self::Error> {
        let order = validate_raw_plan(&raw)?;
        Ok(PlanFile::new_unchecked(raw, order))
    }
}

/// Validate a raw plan and return its task keys in topological order.
pub fn validate_raw_plan(plan: &RawPlanFile) -> Result<Vec<String>> {
    ensure_has_tasks(plan)?;
    validate_defaults(plan)?;
    validate_tasks(plan)?;
    validate_task_dependencies(plan)?;
    topological_order(plan)
}

fn ensure_has_tasks(plan: &RawPlanFile) -> Result<()> {
    if plan.task.is_empty() {
        return Err(FlowError::ConfigError(
            "plan must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(plan: &RawPlanFile) -> Result<()> {
    if plan.flow.name.trim().is_empty() {
        return Err(FlowError::ConfigError(
            "[flow].name must not be empty".to_string(),
        ));
    }
    parse_setting("[defaults].retry_interval", &plan.defaults.retry_interval)?;
    let timeout = parse_setting("[defaults].retry_timeout", &plan.defaults.retry_timeout)?;
    if timeout.is_zero() {
        return Err(FlowError::ConfigError(
            "[defaults].retry_timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(plan: &RawPlanFile) -> Result<()> {
    let mut display_names = HashSet::new();

    for (key, task) in plan.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(FlowError::ConfigError(format!(
                "task '{}' has an empty `cmd`",
                key
            )));
        }

        let name = task.display_name(key);
        if name.trim().is_empty() {
            return Err(FlowError::ConfigError(format!(
                "task '{}' has an empty `name`",
                key
            )));
        }
        if !display_names.insert(name) {
            return Err(FlowError::ConfigError(format!(
                "task '{}' reuses the name '{}'",
                key, name
            )));
        }

        if task.run_if.is_some() && task.skip_if.is_some() {
            return Err(FlowError::ConfigError(format!(
                "task '{}' sets both `run_if` and `skip_if`",
                key
            )));
        }

        if let Some(interval) = &task.retry_interval {
            parse_setting(&format!("task '{}' retry_interval", key), interval)?;
        }
        if let Some(timeout) = &task.retry_timeout {
            let timeout = parse_setting(&format!("task '{}' retry_timeout", key), timeout)?;
            if timeout.is_zero() {
                return Err(FlowError::ConfigError(format!(
                    "task '{}' retry_timeout must be greater than zero",
                    key
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(plan: &RawPlanFile) -> Result<()> {
    for (key, task) in plan.task.iter() {
        for dep in task.after.iter() {
            if dep == key {
                return Err(FlowError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    key
                )));
            }
            if !plan.task.contains_key(dep) {
                return Err(FlowError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    key, dep
                )));
            }
        }
    }
    Ok(())
}

fn topological_order(plan: &RawPlanFile) -> Result<Vec<String>> {
    // Edge direction: dep -> task
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for key in plan.task.keys() {
        graph.add_node(key.as_str());
    }

    for (key, task) in plan.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), key.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(FlowError::PlanCycle(format!(
            "cycle detected in plan involving task '{}'",
            cycle.node_id()
        ))),
    }
}
