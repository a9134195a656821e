//! Attempt event log.
//!
//! Each attempt appends NDJSON events (one JSON object per line) to
//! `<logs>/events.ndjson`, giving the harness an audit trail of what the
//! core did and when.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (install_start, run_complete, ...)
//! - `actor`: `user@HOST` of the harness process
//! - `agent`: agent id
//! - `job`: optional job name from the run parameters
//! - `details`: freeform object with action-specific details
//!
//! Details carry credential *names* at most, never their values.

use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Installer started
    InstallStart,
    /// Installer produced an outcome
    InstallComplete,
    /// Host configuration files staged into the sandbox
    ConfigStaged,
    /// Agent process about to be spawned
    RunStart,
    /// Agent process terminated and the record was written
    RunComplete,
    /// Structured result extraction attempted
    Extract,
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// Who ran the harness (e.g., `user@HOST`).
    pub actor: String,

    /// Agent the event belongs to.
    pub agent: String,

    /// Job name, when the harness supplied one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event for `agent`.
    ///
    /// The actor is derived from the context's environment snapshot rather
    /// than the live process environment.
    pub fn new(ctx: &RunContext, action: EventAction, agent: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor_string(ctx),
            agent: agent.into(),
            job: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_job(mut self, job: Option<&str>) -> Self {
        self.job = job.filter(|j| !j.is_empty()).map(str::to_string);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            HarnessError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

fn actor_string(ctx: &RunContext) -> String {
    let user = ctx
        .env_var("USER")
        .or_else(|| ctx.env_var("USERNAME"))
        .unwrap_or("unknown");

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Append an event to `<logs>/events.ndjson`.
pub fn append_event(ctx: &RunContext, event: &Event) -> Result<()> {
    let path = ctx.events_path();
    let line = event.to_ndjson_line()?;

    fs::create_dir_all(&ctx.logs_dir).map_err(|e| {
        HarnessError::UserError(format!(
            "failed to create logs directory '{}': {}",
            ctx.logs_dir.display(),
            e
        ))
    })?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| {
            HarnessError::UserError(format!(
                "failed to open events file '{}': {}",
                path.display(),
                e
            ))
        })?;

    writeln!(file, "{}", line).map_err(|e| {
        HarnessError::UserError(format!(
            "failed to write event to '{}': {}",
            path.display(),
            e
        ))
    })?;

    Ok(())
}

/// Append an event, downgrading failures to a warning.
///
/// The event log is an audit aid; losing a line must not fail the attempt.
pub fn record(ctx: &RunContext, event: Event) {
    if let Err(e) = append_event(ctx, &event) {
        tracing::warn!(action = ?event.action, error = %e, "failed to append attempt event");
    }
}
