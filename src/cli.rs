// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::status::LastOperationType;

/// Command-line arguments for `reconcile-flow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "reconcile-flow",
    version,
    about = "Run a plan of dependent, retryable reconciliation steps.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Plan.toml")]
    pub plan: String,

    /// Kind of operation the run is reported as.
    #[arg(long, value_enum, default_value_t = Operation::Reconcile)]
    pub operation: Operation,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RECONCILE_FLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the task graph, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum Operation {
    Create,
    Reconcile,
    Delete,
    Migrate,
    Restore,
}

impl From<Operation> for LastOperationType {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Create => LastOperationType::Create,
            Operation::Reconcile => LastOperationType::Reconcile,
            Operation::Delete => LastOperationType::Delete,
            Operation::Migrate => LastOperationType::Migrate,
            Operation::Restore => LastOperationType::Restore,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
