// src/engine/mod.rs

//! Execution engine for compiled flows.
//!
//! This module ties together:
//! - the per-task [`Context`] handed to every action
//! - the retry wrapper that turns [`RetryResult`]s into a task outcome
//! - progress statistics and the [`ProgressReporter`] callback
//! - the async runtime loop that drives a [`Scheduler`](crate::dag::Scheduler)
//!
//! The scheduling semantics live in the synchronous scheduler; [`runtime`]
//! is the IO shell that spawns actions and feeds their completions back.

use std::fmt;
use std::sync::Arc;

use tracing::Span;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

pub mod context;
pub mod progress;
pub mod report;
pub mod retry;
pub mod runtime;

pub use context::Context;
pub use progress::{ProgressReporter, Stats, make_description};
pub use report::RunReport;
pub use retry::RetryResult;

/// Options for a single run of a flow.
#[derive(Clone)]
pub struct Opts {
    /// Parent span of the run. Every task attempt is instrumented with a
    /// child span carrying the task name.
    pub span: Span,
    pub progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            span: Span::current(),
            progress_reporter: None,
        }
    }
}

impl Opts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_progress_reporter(mut self, reporter: impl ProgressReporter + 'static) -> Self {
        self.progress_reporter = Some(Arc::new(reporter));
        self
    }
}

impl fmt::Debug for Opts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opts")
            .field("span", &self.span)
            .field("progress_reporter", &self.progress_reporter.is_some())
            .finish()
    }
}
