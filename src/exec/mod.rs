// src/exec/mod.rs

//! Process execution for plan tasks.
//!
//! [`command`] turns a plan task's `cmd` into a [`TaskFn`](crate::dag::TaskFn)
//! that runs it with `tokio::process::Command` and maps its exit status to a
//! [`RetryResult`](crate::engine::RetryResult).

pub mod command;

pub use command::CommandAction;
