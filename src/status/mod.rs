// src/status/mod.rs

//! Translating a run's error into externally visible status.
//!
//! The engine returns an [`AggregatedError`]; callers use the helpers here
//! to split it into its causes, classify them into [`ErrorCode`]s, and build
//! the [`LastError`] / [`LastOperation`] records they publish.

use std::error::Error;

use crate::errors::{AggregatedError, FlowError};

pub mod codes;
pub mod description;
pub mod last_operation;

pub use codes::{CodedError, ErrorCode, determine_error_codes, extract_error_codes, has_non_retryable_code};
pub use description::format_last_err_description;
pub use last_operation::{LastError, LastOperation, LastOperationState, LastOperationType, will_retry};

/// Leaf causes of `err`.
///
/// If an [`AggregatedError`] is found anywhere in the source chain its task
/// errors are returned, in the order the tasks failed. Any other error is
/// its own single cause.
pub fn causes<'a>(err: &'a (dyn Error + 'static)) -> Vec<&'a (dyn Error + 'static)> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(agg) = aggregated(e) {
            return agg
                .errors()
                .iter()
                .map(|task_err| task_err as &(dyn Error + 'static))
                .collect();
        }
        current = e.source();
    }
    vec![err]
}

fn aggregated<'a>(err: &'a (dyn Error + 'static)) -> Option<&'a AggregatedError> {
    if let Some(agg) = err.downcast_ref::<AggregatedError>() {
        return Some(agg);
    }
    match err.downcast_ref::<FlowError>() {
        Some(FlowError::Execution(agg)) => Some(agg),
        _ => None,
    }
}
