// src/exec/command.rs

//! Shell commands as task actions.

use std::collections::VecDeque;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, warn};

use crate::config::TaskConfig;
use crate::dag::TaskFn;
use crate::engine::{Context, RetryResult, TaskName};

/// Number of stderr lines kept for the error message of a failed command.
const STDERR_TAIL_LINES: usize = 20;

/// How long stderr may stay open after the command exited. Background
/// processes started by the command inherit the pipe.
const STDERR_DRAIN_GRACE: Duration = Duration::from_millis(500);

type TailBuffer = Arc<Mutex<VecDeque<String>>>;

/// A shell command run as a task's action.
///
/// - exit code 0 is done
/// - an exit code listed in `fatal_exit_codes` fails the task immediately
/// - any other failure is retryable, with the tail of stderr in the error
///   message so message-based error codes can classify it
#[derive(Debug, Clone)]
pub struct CommandAction {
    task: TaskName,
    cmd: String,
    fatal_exit_codes: Vec<i32>,
}

impl CommandAction {
    pub fn new(task: impl Into<TaskName>, cmd: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            cmd: cmd.into(),
            fatal_exit_codes: Vec::new(),
        }
    }

    pub fn from_config(key: &str, cfg: &TaskConfig) -> Self {
        Self::new(cfg.display_name(key), cfg.cmd.clone())
            .with_fatal_exit_codes(cfg.fatal_exit_codes.iter().copied())
    }

    pub fn with_fatal_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.fatal_exit_codes.extend(codes);
        self
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }

    pub fn into_task_fn(self) -> TaskFn {
        let action = Arc::new(self);
        TaskFn::new(move |ctx| {
            let action = Arc::clone(&action);
            async move { action.run(ctx).await }
        })
    }

    pub async fn run(&self, ctx: Context) -> RetryResult {
        match self.execute(&ctx).await {
            Ok(result) => result,
            Err(err) => RetryResult::Severe(err),
        }
    }

    async fn execute(&self, ctx: &Context) -> anyhow::Result<RetryResult> {
        info!(task = %self.task, cmd = %self.cmd, "starting command");

        let mut cmd = shell_command(&self.cmd);
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.task))?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(log_lines(stdout, "stdout").in_current_span());
        }
        let stderr_tail = child.stderr.take().map(|stderr| {
            let buffer = TailBuffer::default();
            let handle = tokio::spawn(collect_tail(stderr, Arc::clone(&buffer)).in_current_span());
            (handle, buffer)
        });

        let status = tokio::select! {
            status = child.wait() => status
                .with_context(|| format!("waiting for process of task '{}'", self.task))?,
            _ = ctx.cancelled() => {
                info!(task = %self.task, "context cancelled; killing process");
                if let Err(e) = child.kill().await {
                    warn!(task = %self.task, error = %e, "failed to kill child process on cancellation");
                }
                return Ok(RetryResult::Minor(anyhow!(
                    "command `{}` was cancelled",
                    self.cmd
                )));
            }
        };

        let tail: Vec<String> = match stderr_tail {
            Some((handle, buffer)) => {
                self.drain_stderr(handle, ctx).await;
                buffer
                    .lock()
                    .map(|lines| lines.iter().cloned().collect())
                    .unwrap_or_default()
            }
            None => Vec::new(),
        };

        let code = status.code();
        info!(task = %self.task, exit_code = ?code, success = status.success(), "command exited");

        if status.success() {
            return Ok(RetryResult::Ok);
        }

        let err = anyhow!(failure_message(&self.cmd, code, &tail));
        match code {
            Some(code) if self.fatal_exit_codes.contains(&code) => Ok(RetryResult::Severe(err)),
            _ => Ok(RetryResult::Minor(err)),
        }
    }

    /// Wait for the stderr reader to hit EOF, but never past cancellation or
    /// the drain grace period.
    async fn drain_stderr(&self, mut handle: JoinHandle<()>, ctx: &Context) {
        tokio::select! {
            _ = &mut handle => return,
            _ = ctx.cancelled() => {
                debug!(task = %self.task, "context cancelled while draining stderr");
            }
            _ = tokio::time::sleep(STDERR_DRAIN_GRACE) => {
                debug!(task = %self.task, "stderr still open after exit; a background process holds it");
            }
        }
        handle.abort();
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(script: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(script);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(script);
        c
    }
}

async fn log_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream, "{}", line);
    }
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R, buffer: TailBuffer) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(stream = "stderr", "{}", line);
        let Ok(mut tail) = buffer.lock() else {
            return;
        };
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

fn failure_message(cmd: &str, code: Option<i32>, stderr_tail: &[String]) -> String {
    let mut message = match code {
        Some(code) => format!("command `{cmd}` exited with code {code}"),
        None => format!("command `{cmd}` was terminated by a signal"),
    };
    if !stderr_tail.is_empty() {
        message.push_str(": ");
        message.push_str(&stderr_tail.join("\n"));
    }
    message
}
