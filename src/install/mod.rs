//! Agent installer.
//!
//! Brings an agent to the `Installed` state inside the sandbox:
//!
//! ```text
//! NotStarted ──> FastAttempt ──> Installed
//!     │              │
//!     │              v
//!     └─────────> SlowAttempt ──> Installed | Failed
//! ```
//!
//! The fast path unpacks a pre-built bundle; any problem with it degrades to
//! the slow path, which runs the rendered install script with `sh`. Once the
//! `.installed` marker exists, installing again touches nothing.

mod bundle;
pub mod marker;
mod restore;
mod script;

pub use bundle::{BundleResolution, BundleResolver};
pub use marker::{InstallMarker, InstallPath};
pub use restore::restore;
pub use script::{ScriptRunner, ShellScriptRunner};

use crate::context::{CancelReason, RunContext};
use crate::error::Result;
use crate::fs::atomic_write;
use crate::template::RenderedScript;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why the install failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "value", rename_all = "snake_case")]
pub enum InstallFailure {
    /// The script exited non-zero.
    ExitCode(i32),
    /// The script was killed by a signal.
    Terminated(i32),
    /// The attempt was cancelled while installing.
    Cancelled(CancelReason),
    /// Filesystem or spawn problem.
    Io(String),
}

impl std::fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallFailure::ExitCode(code) => write!(f, "install script exited with code {}", code),
            InstallFailure::Terminated(signal) => {
                write!(f, "install script terminated by signal {}", signal)
            }
            InstallFailure::Cancelled(reason) => write!(f, "install cancelled ({})", reason),
            InstallFailure::Io(message) => write!(f, "{}", message),
        }
    }
}

/// Result of an install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    FastPathRestored,
    SlowPathInstalled,
    Failed { reason: InstallFailure },
}

impl InstallOutcome {
    pub fn is_installed(&self) -> bool {
        !matches!(self, InstallOutcome::Failed { .. })
    }
}

/// Installer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    NotStarted,
    FastAttempt,
    SlowAttempt,
    Installed,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal install transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: InstallState,
    pub to: InstallState,
}

impl InstallState {
    /// Move to `to`, refusing transitions the lifecycle does not allow.
    /// In particular the slow path can never fall back to the fast path.
    pub fn advance(self, to: InstallState) -> std::result::Result<InstallState, IllegalTransition> {
        use InstallState::*;
        let allowed = matches!(
            (self, to),
            (NotStarted, FastAttempt)
                | (NotStarted, SlowAttempt)
                | (FastAttempt, Installed)
                | (FastAttempt, SlowAttempt)
                | (SlowAttempt, Installed)
                | (SlowAttempt, Failed)
        );
        if allowed {
            Ok(to)
        } else {
            Err(IllegalTransition { from: self, to })
        }
    }
}

/// What to install.
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    pub agent_id: &'a str,
    pub version: &'a str,
    /// Rendered install script; `None` when the agent needs no install.
    pub script: Option<&'a RenderedScript>,
    /// Whether a bundle may be used.
    pub allow_bundle: bool,
    pub bundles: &'a BundleResolver,
    /// Environment for the install script.
    pub env: BTreeMap<String, String>,
}

/// Runs installs through a `ScriptRunner`.
#[derive(Debug, Clone, Default)]
pub struct Installer<R> {
    runner: R,
}

impl<R: ScriptRunner> Installer<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn install(&self, request: &InstallRequest<'_>, ctx: &RunContext) -> InstallOutcome {
        let install_dir = ctx.install_dir(request.agent_id);

        if marker::is_installed(&install_dir) {
            tracing::info!(
                agent = request.agent_id,
                path = %install_dir.display(),
                "already installed"
            );
            return InstallOutcome::FastPathRestored;
        }

        match self.install_fresh(request, &install_dir, ctx) {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::warn!(agent = request.agent_id, %reason, "install failed");
                InstallOutcome::Failed { reason }
            }
        }
    }

    fn install_fresh(
        &self,
        request: &InstallRequest<'_>,
        install_dir: &Path,
        ctx: &RunContext,
    ) -> std::result::Result<InstallOutcome, InstallFailure> {
        let mut state = InstallState::NotStarted;

        let bundle = if request.allow_bundle {
            request.bundles.resolve(request.agent_id, ctx)
        } else {
            BundleResolution::NoBundle
        };

        if let BundleResolution::UseBundle(path) = bundle {
            state = step(state, InstallState::FastAttempt)?;
            tracing::info!(agent = request.agent_id, bundle = %path.display(), "restoring bundle");

            match restore(&path, install_dir) {
                Ok(()) => match write_marker(request, install_dir, InstallPath::Bundle, Some(path)) {
                    Ok(()) => {
                        step(state, InstallState::Installed)?;
                        return Ok(InstallOutcome::FastPathRestored);
                    }
                    Err(reason) => {
                        tracing::warn!(
                            agent = request.agent_id,
                            %reason,
                            "restored bundle could not be marked; falling back to install script"
                        );
                        // An unmarked tree is not an install.
                        let _ = std::fs::remove_dir_all(install_dir);
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        agent = request.agent_id,
                        error = %e,
                        "bundle restore failed; falling back to install script"
                    );
                }
            }
        }

        state = step(state, InstallState::SlowAttempt)?;
        if let Err(reason) = self.run_script(request, install_dir, ctx) {
            step(state, InstallState::Failed)?;
            return Err(reason);
        }

        write_marker(request, install_dir, InstallPath::Script, None)?;
        step(state, InstallState::Installed)?;
        Ok(InstallOutcome::SlowPathInstalled)
    }

    fn run_script(
        &self,
        request: &InstallRequest<'_>,
        install_dir: &Path,
        ctx: &RunContext,
    ) -> std::result::Result<(), InstallFailure> {
        if let Some(reason) = ctx.interruption() {
            return Err(InstallFailure::Cancelled(reason));
        }

        std::fs::create_dir_all(install_dir).map_err(|e| {
            InstallFailure::Io(format!(
                "failed to create install dir '{}': {}",
                install_dir.display(),
                e
            ))
        })?;

        let Some(script) = request.script else {
            tracing::debug!(agent = request.agent_id, "no install template; nothing to run");
            return Ok(());
        };

        let script_path = ctx.install_script_path();
        write_script(&script_path, script).map_err(|e| InstallFailure::Io(e.to_string()))?;

        tracing::info!(
            agent = request.agent_id,
            template = %script.template,
            digest = %script.digest,
            log = %ctx.install_log_path().display(),
            "running install script"
        );

        let exit = self
            .runner
            .run_script(&script_path, &ctx.install_log_path(), &request.env, ctx)
            .map_err(|e| InstallFailure::Io(format!("failed to run install script: {}", e)))?;

        match (exit.interruption, exit.exit_code, exit.signal) {
            (Some(reason), _, _) => Err(InstallFailure::Cancelled(reason)),
            (None, Some(0), _) => Ok(()),
            (None, Some(code), _) => Err(InstallFailure::ExitCode(code)),
            (None, None, signal) => Err(InstallFailure::Terminated(signal.unwrap_or_default())),
        }
    }
}

fn step(from: InstallState, to: InstallState) -> std::result::Result<InstallState, InstallFailure> {
    from.advance(to)
        .map_err(|e| InstallFailure::Io(format!("internal error: {}", e)))
}

fn write_script(path: &Path, script: &RenderedScript) -> Result<()> {
    atomic_write(path, script.text.as_bytes())
}

fn write_marker(
    request: &InstallRequest<'_>,
    install_dir: &Path,
    path: InstallPath,
    bundle: Option<PathBuf>,
) -> std::result::Result<(), InstallFailure> {
    let marker = InstallMarker {
        agent_id: request.agent_id.to_string(),
        version: request.version.to_string(),
        path,
        script_digest: request.script.map(|s| s.digest.clone()),
        bundle,
        installed_at: Utc::now(),
    };
    marker::write(install_dir, &marker)
        .map_err(|e| InstallFailure::Io(format!("failed to write install marker: {}", e)))
}
