//! Per-attempt run context.
//!
//! Every component receives a `RunContext` instead of reading the process
//! working directory or environment. The context carries the sandbox path,
//! a snapshot of the ambient environment, the logs directory, a cancellation
//! token and an optional wall-clock deadline.
//!
//! Layout under the sandbox:
//!
//! ```text
//! <sandbox>/
//!   .agent/<agent_id>/        install location (contains `.installed` marker)
//!   .agent-bundles/           pre-built bundle artifacts (read-only)
//!   .home/                    HOME for the agent process
//! <logs>/
//!   install.sh install.log agent.log execution.json results.json events.ndjson
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Install locations live under this directory in the sandbox.
pub const INSTALL_ROOT: &str = ".agent";

/// HOME directory handed to agent processes, relative to the sandbox.
pub const SANDBOX_HOME: &str = ".home";

/// Why a long-running step was interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The attempt's wall-clock budget ran out.
    Timeout,
    /// The harness (or the user) asked for the attempt to stop.
    Aborted,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Timeout => write!(f, "timeout"),
            CancelReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Explicit context for one attempt.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Sandboxed working directory supplied by the harness.
    pub sandbox_dir: PathBuf,
    /// Directory receiving logs and the execution record.
    pub logs_dir: PathBuf,
    /// Snapshot of the ambient environment taken when the attempt started.
    pub ambient_env: BTreeMap<String, String>,
    /// Cancellation requested by the harness.
    pub cancel: CancelToken,
    /// Wall-clock deadline for the whole attempt.
    pub deadline: Option<Instant>,
}

impl RunContext {
    pub fn new(
        sandbox_dir: impl Into<PathBuf>,
        logs_dir: impl Into<PathBuf>,
        ambient_env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            sandbox_dir: sandbox_dir.into(),
            logs_dir: logs_dir.into(),
            ambient_env,
            cancel: CancelToken::new(),
            deadline: None,
        }
    }

    /// Snapshot the current process environment.
    ///
    /// This is the only place the crate reads process-wide environment; it is
    /// meant for the CLI edge.
    pub fn from_process_env(sandbox_dir: impl Into<PathBuf>, logs_dir: impl Into<PathBuf>) -> Self {
        Self::new(sandbox_dir, logs_dir, std::env::vars().collect())
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Set a deadline `budget` from now.
    pub fn with_timeout(mut self, budget: Duration) -> Self {
        self.deadline = Some(Instant::now() + budget);
        self
    }

    /// Look up a variable in the ambient snapshot. Empty values count as unset.
    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.ambient_env
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Returns the reason the attempt must stop, if any.
    pub fn interruption(&self) -> Option<CancelReason> {
        if self.cancel.is_cancelled() {
            return Some(CancelReason::Aborted);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::Timeout),
            _ => None,
        }
    }

    pub fn install_dir(&self, agent_id: &str) -> PathBuf {
        self.sandbox_dir.join(INSTALL_ROOT).join(agent_id)
    }

    pub fn home_dir(&self) -> PathBuf {
        self.sandbox_dir.join(SANDBOX_HOME)
    }

    pub fn install_script_path(&self) -> PathBuf {
        self.logs_dir.join("install.sh")
    }

    pub fn install_log_path(&self) -> PathBuf {
        self.logs_dir.join("install.log")
    }

    pub fn agent_log_path(&self) -> PathBuf {
        self.logs_dir.join("agent.log")
    }

    pub fn record_path(&self) -> PathBuf {
        self.logs_dir.join("execution.json")
    }

    pub fn results_path(&self) -> PathBuf {
        self.logs_dir.join("results.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.logs_dir.join("events.ndjson")
    }

    /// Resolve a possibly relative path against the sandbox.
    pub fn sandbox_path(&self, path: impl AsRef<Path>) -> PathBuf {
        self.sandbox_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        let mut env = BTreeMap::new();
        env.insert("SET".to_string(), "value".to_string());
        env.insert("EMPTY".to_string(), String::new());
        RunContext::new("/sandbox", "/logs", env)
    }

    #[test]
    fn env_var_treats_empty_as_unset() {
        let ctx = ctx();
        assert_eq!(ctx.env_var("SET"), Some("value"));
        assert_eq!(ctx.env_var("EMPTY"), None);
        assert_eq!(ctx.env_var("MISSING"), None);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let ctx = ctx();
        let handle = ctx.cancel.clone();
        assert_eq!(ctx.interruption(), None);
        handle.cancel();
        assert_eq!(ctx.interruption(), Some(CancelReason::Aborted));
    }

    #[test]
    fn expired_deadline_reports_timeout() {
        let ctx = ctx().with_timeout(Duration::ZERO);
        assert_eq!(ctx.interruption(), Some(CancelReason::Timeout));
    }

    #[test]
    fn abort_wins_over_timeout() {
        let ctx = ctx().with_timeout(Duration::ZERO);
        ctx.cancel.cancel();
        assert_eq!(ctx.interruption(), Some(CancelReason::Aborted));
    }

    #[test]
    fn paths_are_derived_from_sandbox_and_logs() {
        let ctx = ctx();
        assert_eq!(ctx.install_dir("pi-mono"), PathBuf::from("/sandbox/.agent/pi-mono"));
        assert_eq!(ctx.home_dir(), PathBuf::from("/sandbox/.home"));
        assert_eq!(ctx.agent_log_path(), PathBuf::from("/logs/agent.log"));
        assert_eq!(ctx.record_path(), PathBuf::from("/logs/execution.json"));
    }

    #[test]
    #[serial_test::serial]
    fn process_env_is_snapshotted_once() {
        // SAFETY: serialized with every other test touching the process env.
        unsafe { std::env::set_var("AGENTRIG_CTX_PROBE", "before") };
        let ctx = RunContext::from_process_env("/sandbox", "/logs");
        unsafe { std::env::set_var("AGENTRIG_CTX_PROBE", "after") };

        assert_eq!(ctx.env_var("AGENTRIG_CTX_PROBE"), Some("before"));
        unsafe { std::env::remove_var("AGENTRIG_CTX_PROBE") };
    }
}
