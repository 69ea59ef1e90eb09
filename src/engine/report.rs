// src/engine/report.rs

use std::collections::BTreeMap;

use crate::dag::TaskOutcome;
use crate::engine::{Stats, TaskName};
use crate::errors::AggregatedError;

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: BTreeMap<TaskName, TaskOutcome>,
    pub stats: Stats,
    pub error: Option<AggregatedError>,
}

impl RunReport {
    pub(crate) fn new(
        outcomes: BTreeMap<TaskName, TaskOutcome>,
        stats: Stats,
        error: Option<AggregatedError>,
    ) -> Self {
        Self {
            outcomes,
            stats,
            error,
        }
    }

    /// Terminal outcome of the named task; `None` for unknown tasks or tasks
    /// that never finished because the run was abandoned.
    pub fn outcome_of(&self, name: &str) -> Option<TaskOutcome> {
        self.outcomes.get(name).copied()
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<(), AggregatedError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
