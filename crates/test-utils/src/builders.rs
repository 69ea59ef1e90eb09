#![allow(dead_code)]

use std::collections::BTreeMap;

use reconcile_flow::config::{DefaultsSection, FlowSection, PlanFile, RawPlanFile, TaskConfig};

/// Builder for `PlanFile` to simplify test setup.
pub struct PlanBuilder {
    plan: RawPlanFile,
}

impl PlanBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            plan: RawPlanFile {
                flow: FlowSection {
                    name: name.to_string(),
                },
                defaults: DefaultsSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, key: &str, task: TaskConfig) -> Self {
        self.plan.task.insert(key.to_string(), task);
        self
    }

    pub fn with_default_retry(mut self, interval: &str, timeout: &str) -> Self {
        self.plan.defaults.retry_interval = interval.to_string();
        self.plan.defaults.retry_timeout = timeout.to_string();
        self
    }

    /// The unvalidated plan, for tests that expect validation to fail.
    pub fn build_raw(self) -> RawPlanFile {
        self.plan
    }

    pub fn build(self) -> PlanFile {
        PlanFile::try_from(self.plan).expect("Failed to build valid plan from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig {
                name: None,
                cmd: cmd.to_string(),
                after: vec![],
                retry: false,
                retry_interval: None,
                retry_timeout: None,
                run_if: None,
                skip_if: None,
                fatal_exit_codes: vec![],
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.task.name = Some(name.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retry(mut self, val: bool) -> Self {
        self.task.retry = val;
        self
    }

    pub fn retry_interval(mut self, duration: &str) -> Self {
        self.task.retry_interval = Some(duration.to_string());
        self
    }

    pub fn retry_timeout(mut self, duration: &str) -> Self {
        self.task.retry_timeout = Some(duration.to_string());
        self
    }

    pub fn run_if(mut self, val: bool) -> Self {
        self.task.run_if = Some(val);
        self
    }

    pub fn skip_if(mut self, val: bool) -> Self {
        self.task.skip_if = Some(val);
        self
    }

    pub fn fatal_exit_code(mut self, code: i32) -> Self {
        self.task.fatal_exit_codes.push(code);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
