//! Execution runner.
//!
//! Launches an installed agent with a constrained environment, streams its
//! combined output to `<logs>/agent.log` and produces an `ExecutionRecord`.
//! Nothing after spawn is an error: crashes, non-zero exits and cancellation
//! are all recorded.

mod invocation;
pub mod process;
mod sink;

pub use invocation::Invocation;
pub use process::{ProcessExit, run_streaming};
pub use sink::LogSink;

use crate::context::{CancelReason, RunContext};
use crate::credentials::ForwardedEnv;
use crate::extract::ExtractionOutcome;
use crate::usage::UsageSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// Variables copied from the ambient snapshot into every child.
pub const BASE_ENV: &[&str] = &["PATH", "USER", "LANG", "TERM", "SHELL", "TMPDIR"];

/// How the agent process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// The process exited on its own with status 0.
    Completed,
    /// The process could not be started, exited non-zero or died from a signal.
    ProcessCrash,
    /// The harness stopped the process.
    Cancelled,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Completed => write!(f, "completed"),
            RecordKind::ProcessCrash => write!(f, "process_crash"),
            RecordKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one agent run, persisted as `execution.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub agent_id: String,
    pub kind: RecordKind,

    /// Exit code exactly as reported by the OS.
    pub exit_code: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,

    /// Why the process could not be started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub log_path: PathBuf,

    /// Command line with secrets masked.
    pub command: String,

    pub output_lines: u64,

    /// Present in json mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<ExtractionOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSummary>,

    /// Set when `execution.json` itself could not be written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

impl ExecutionRecord {
    pub fn is_success(&self) -> bool {
        self.kind == RecordKind::Completed && self.exit_code == Some(0)
    }

    pub fn duration(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}

/// Everything needed to launch one agent process.
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub agent_id: String,
    pub invocation: Invocation,
    /// Descriptor static environment.
    pub environment: BTreeMap<String, String>,
    /// Extra base variable names from config.
    pub base_env: Vec<String>,
    /// Prepended to PATH (the install's `bin`).
    pub path_prefix: Option<PathBuf>,
    /// Time between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
}

/// Run the agent to completion (or cancellation).
pub fn run(command: &AgentCommand, forwarded: &ForwardedEnv, ctx: &RunContext) -> ExecutionRecord {
    let redactor = forwarded.redactor();
    let log_path = ctx.agent_log_path();
    let command_line = command.invocation.display(&redactor);
    let started_at = Utc::now();

    tracing::info!(
        agent = %command.agent_id,
        command = %command_line,
        credentials = ?forwarded.names(),
        "starting agent"
    );

    let result = prepare_home(ctx).and_then(|()| {
        run_streaming(
            build_command(command, forwarded, ctx),
            &log_path,
            redactor,
            ctx,
            command.kill_grace,
        )
    });

    let mut record = ExecutionRecord {
        agent_id: command.agent_id.clone(),
        kind: RecordKind::Completed,
        exit_code: None,
        signal: None,
        cancel_reason: None,
        spawn_error: None,
        started_at,
        finished_at: Utc::now(),
        log_path,
        command: command_line,
        output_lines: 0,
        structured: None,
        usage: None,
        persist_error: None,
    };

    match result {
        Ok(exit) => {
            record.exit_code = exit.exit_code;
            record.signal = exit.signal;
            record.cancel_reason = exit.interruption;
            record.output_lines = exit.output_lines;
            record.kind = match (exit.interruption, exit.exit_code) {
                (Some(_), _) => RecordKind::Cancelled,
                (None, Some(0)) => RecordKind::Completed,
                (None, _) => RecordKind::ProcessCrash,
            };
        }
        Err(e) => {
            tracing::warn!(agent = %command.agent_id, error = %e, "agent process could not be run");
            record.kind = RecordKind::ProcessCrash;
            record.spawn_error = Some(e.to_string());
        }
    }

    tracing::info!(
        agent = %record.agent_id,
        kind = %record.kind,
        exit_code = ?record.exit_code,
        signal = ?record.signal,
        lines = record.output_lines,
        "agent finished"
    );
    record
}

fn prepare_home(ctx: &RunContext) -> std::io::Result<()> {
    std::fs::create_dir_all(ctx.home_dir())
}

/// Compose the child environment.
///
/// Cleared first; then base variables from the snapshot, the sandbox HOME,
/// the descriptor's static environment and finally the forwarded credentials.
pub fn child_env(
    command: &AgentCommand,
    forwarded: &ForwardedEnv,
    ctx: &RunContext,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();

    for name in BASE_ENV
        .iter()
        .copied()
        .chain(command.base_env.iter().map(String::as_str))
    {
        if let Some(value) = ctx.env_var(name) {
            env.insert(name.to_string(), value.to_string());
        }
    }

    env.insert(
        "HOME".to_string(),
        ctx.home_dir().to_string_lossy().into_owned(),
    );

    if let Some(prefix) = &command.path_prefix {
        let prefix = prefix.to_string_lossy();
        let path = match env.get("PATH") {
            Some(existing) => format!("{}:{}", prefix, existing),
            None => prefix.into_owned(),
        };
        env.insert("PATH".to_string(), path);
    }

    for (key, value) in &command.environment {
        env.insert(key.clone(), value.clone());
    }
    for (key, value) in forwarded.iter() {
        env.insert(key.to_string(), value.to_string());
    }
    env
}

fn build_command(command: &AgentCommand, forwarded: &ForwardedEnv, ctx: &RunContext) -> Command {
    let mut cmd = Command::new(&command.invocation.program);
    cmd.args(&command.invocation.args)
        .current_dir(&ctx.sandbox_dir)
        .env_clear()
        .envs(child_env(command, forwarded, ctx));
    cmd
}

#[cfg(all(test, unix))]
mod tests;
