// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::duration::parse_setting;
use crate::dag::RetryPolicy;
use crate::errors::Result;

/// Plan file as read from TOML, before validation.
///
/// ```toml
/// [flow]
/// name = "Shoot cluster reconciliation"
///
/// [defaults]
/// retry_interval = "5s"
/// retry_timeout = "30s"
///
/// [task.deploy-namespace]
/// cmd = "kubectl apply -f namespace.yaml"
/// retry = true
///
/// [task.deploy-secrets]
/// name = "Deploying Shoot certificates and keys"
/// cmd = "./deploy-secrets.sh"
/// after = ["deploy-namespace"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawPlanFile {
    #[serde(default)]
    pub flow: FlowSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    /// All tasks from `[task.<key>]`. Keys are what `after` refers to.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[flow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowSection {
    /// Name of the flow, used in logs, progress descriptions and errors.
    #[serde(default = "default_flow_name")]
    pub name: String,
}

fn default_flow_name() -> String {
    "reconcile-flow".to_string()
}

impl Default for FlowSection {
    fn default() -> Self {
        Self {
            name: default_flow_name(),
        }
    }
}

/// `[defaults]` section: the retry policy for tasks with `retry = true`.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsSection {
    #[serde(default = "default_retry_interval")]
    pub retry_interval: String,

    #[serde(default = "default_retry_timeout")]
    pub retry_timeout: String,
}

fn default_retry_interval() -> String {
    "5s".to_string()
}

fn default_retry_timeout() -> String {
    "30s".to_string()
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            retry_interval: default_retry_interval(),
            retry_timeout: default_retry_timeout(),
        }
    }
}

/// `[task.<key>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Display name; defaults to the task key.
    #[serde(default)]
    pub name: Option<String>,

    /// The command to execute with `sh -c`.
    pub cmd: String,

    /// Keys of the tasks this task waits for.
    #[serde(default)]
    pub after: Vec<String>,

    /// Retry with the `[defaults]` policy.
    #[serde(default)]
    pub retry: bool,

    /// Overrides `[defaults].retry_interval`; implies `retry`.
    #[serde(default)]
    pub retry_interval: Option<String>,

    /// Overrides `[defaults].retry_timeout`; implies `retry`.
    #[serde(default)]
    pub retry_timeout: Option<String>,

    #[serde(default)]
    pub run_if: Option<bool>,

    #[serde(default)]
    pub skip_if: Option<bool>,

    /// Exit codes that fail the task immediately instead of retrying.
    #[serde(default)]
    pub fatal_exit_codes: Vec<i32>,
}

impl TaskConfig {
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(key)
    }

    pub fn wants_retry(&self) -> bool {
        self.retry || self.retry_interval.is_some() || self.retry_timeout.is_some()
    }

    /// Effective retry policy given the plan's defaults.
    pub fn retry_policy(&self, defaults: &DefaultsSection) -> Result<RetryPolicy> {
        if !self.wants_retry() {
            return Ok(RetryPolicy::Once);
        }

        let interval = self
            .retry_interval
            .as_deref()
            .unwrap_or(&defaults.retry_interval);
        let timeout = self
            .retry_timeout
            .as_deref()
            .unwrap_or(&defaults.retry_timeout);

        Ok(RetryPolicy::UntilTimeout {
            interval: parse_setting("retry_interval", interval)?,
            timeout: parse_setting("retry_timeout", timeout)?,
        })
    }
}

/// A validated plan.
///
/// Only constructed through `TryFrom<RawPlanFile>`, so every `after`
/// reference resolves and the tasks form a DAG.
#[derive(Debug, Clone)]
pub struct PlanFile {
    pub flow: FlowSection,
    pub defaults: DefaultsSection,
    pub task: BTreeMap<String, TaskConfig>,
    /// Task keys in a topological order.
    order: Vec<String>,
}

impl PlanFile {
    pub(crate) fn new_unchecked(raw: RawPlanFile, order: Vec<String>) -> Self {
        Self {
            flow: raw.flow,
            defaults: raw.defaults,
            task: raw.task,
            order,
        }
    }

    /// Task keys ordered so that every task comes after its `after` tasks.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn tasks_in_order(&self) -> impl Iterator<Item = (&str, &TaskConfig)> {
        self.order
            .iter()
            .filter_map(|key| self.task.get(key).map(|cfg| (key.as_str(), cfg)))
    }
}
