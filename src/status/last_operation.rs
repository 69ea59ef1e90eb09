// src/status/last_operation.rs

//! Status records a caller publishes for the object it reconciles.

use std::error::Error;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Stats, TaskName, make_description};
use crate::errors::TaskError;
use crate::status::causes;
use crate::status::codes::{ErrorCode, extract_error_codes, has_non_retryable_code};
use crate::status::description::format_last_err_description;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastOperationType {
    Create,
    Reconcile,
    Delete,
    Migrate,
    Restore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LastOperationState {
    Processing,
    Succeeded,
    /// Failed, but the operation will be retried.
    Error,
    /// Failed and the retry cycle is over.
    Failed,
    Pending,
    Aborted,
}

/// The last error of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<ErrorCode>,
    /// Names of the failed tasks, in the order they failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub task_names: Vec<TaskName>,
    pub last_update_time: DateTime<Utc>,
}

impl LastError {
    pub fn from_error(err: &(dyn Error + 'static)) -> Self {
        Self::from_error_at(err, Utc::now())
    }

    pub fn from_error_at(err: &(dyn Error + 'static), now: DateTime<Utc>) -> Self {
        let causes = causes(err);
        let task_names = causes
            .iter()
            .filter_map(|cause| cause.downcast_ref::<TaskError>())
            .map(|task_err| task_err.task.clone())
            .collect();

        Self {
            description: format_last_err_description(&causes),
            codes: extract_error_codes(&causes),
            task_names,
            last_update_time: now,
        }
    }

    /// Whether retrying the whole operation can help.
    pub fn is_retryable(&self) -> bool {
        !has_non_retryable_code(&self.codes)
    }
}

/// The most recent operation performed on an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub kind: LastOperationType,
    pub state: LastOperationState,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub description: String,
    pub last_update_time: DateTime<Utc>,
}

impl LastOperation {
    /// In-flight operation built from a progress report.
    pub fn processing_from_stats(kind: LastOperationType, stats: &Stats) -> Self {
        Self {
            kind,
            state: LastOperationState::Processing,
            progress: stats.progress_percent(),
            description: make_description(stats),
            last_update_time: Utc::now(),
        }
    }

    pub fn succeeded(kind: LastOperationType, description: impl Into<String>) -> Self {
        Self {
            kind,
            state: LastOperationState::Succeeded,
            progress: 100,
            description: description.into(),
            last_update_time: Utc::now(),
        }
    }

    /// Failed operation.
    ///
    /// While the retry cycle that started at `retry_cycle_start` is younger
    /// than `retry_duration` the state is `Error` and the description says
    /// the operation will be retried; afterwards it is `Failed`. Progress is
    /// kept from `previous`.
    pub fn errored(
        kind: LastOperationType,
        last_error: &LastError,
        previous: Option<&LastOperation>,
        retry_cycle_start: Option<DateTime<Utc>>,
        retry_duration: Duration,
    ) -> Self {
        Self::errored_at(
            kind,
            last_error,
            previous,
            retry_cycle_start,
            retry_duration,
            Utc::now(),
        )
    }

    pub fn errored_at(
        kind: LastOperationType,
        last_error: &LastError,
        previous: Option<&LastOperation>,
        retry_cycle_start: Option<DateTime<Utc>>,
        retry_duration: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        let mut description = last_error.description.clone();
        let state = if will_retry(retry_cycle_start, retry_duration, now) {
            description.push_str(" Operation will be retried.");
            LastOperationState::Error
        } else {
            LastOperationState::Failed
        };

        Self {
            kind,
            state,
            progress: previous.map_or(1, |op| op.progress),
            description,
            last_update_time: now,
        }
    }
}

/// Whether a retry cycle that started at `start` is still running at `now`.
/// Without a start there is no cycle to continue.
pub fn will_retry(start: Option<DateTime<Utc>>, retry_duration: Duration, now: DateTime<Utc>) -> bool {
    let Some(start) = start else {
        return false;
    };
    match TimeDelta::from_std(retry_duration) {
        Ok(limit) => now.signed_duration_since(start) < limit,
        Err(_) => true,
    }
}
