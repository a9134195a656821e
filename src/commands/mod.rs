//! Command implementations for agentrig.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, plus the helpers they share for turning arguments into
//! a registry, a sandbox context and run parameters.

mod inspect;
mod run;

use crate::cli::{Cli, Command, SandboxArgs};
use agentrig::agent::{OutputMode, RunParameters, parse_override};
use agentrig::context::{CancelToken, RunContext};
use agentrig::error::{HarnessError, Result};
use std::path::{Path, PathBuf};

/// Logs directory used when `--logs` is not given, relative to the sandbox.
const DEFAULT_LOGS_DIR: &str = ".agentrig/logs";

/// Dispatch a command to its implementation.
///
/// `cancel` is tripped by Ctrl-C; long-running commands hand it to the
/// attempt so the agent's process group is torn down.
pub fn dispatch(cli: Cli, cancel: CancelToken) -> Result<()> {
    let config = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => run::cmd_run(args, config, cancel),
        Command::Install(args) => run::cmd_install(args, config, cancel),
        Command::Render(args) => run::cmd_render(args, config),
        Command::Extract(args) => inspect::cmd_extract(args),
        Command::Agents => inspect::cmd_agents(config),
    }
}

/// Build the sandbox context from the process environment.
///
/// The sandbox path is made absolute because it is substituted into
/// templates and the agent runs with the sandbox as its working directory.
fn sandbox_context(args: &SandboxArgs, cancel: CancelToken) -> Result<RunContext> {
    let sandbox = absolute(&args.sandbox)?;
    if !sandbox.is_dir() {
        return Err(HarnessError::UserError(format!(
            "sandbox directory '{}' does not exist",
            sandbox.display()
        )));
    }

    let logs = match &args.logs {
        Some(logs) => absolute(logs)?,
        None => sandbox.join(DEFAULT_LOGS_DIR),
    };

    Ok(RunContext::from_process_env(sandbox, logs).with_cancel(cancel))
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        HarnessError::UserError(format!("invalid path '{}': {}", path.display(), e))
    })
}

/// Assemble run parameters from the shared sandbox arguments.
fn run_parameters(args: &SandboxArgs, instruction: &str) -> Result<RunParameters> {
    let mut params = RunParameters::new(instruction);
    params.model = args.model.clone();
    params.job_name = args.job.clone();

    for raw in &args.overrides {
        let (key, value) = parse_override(raw)?;
        params.overrides.insert(key, value);
    }

    Ok(params)
}

fn parse_output_mode(raw: Option<&str>) -> Result<Option<OutputMode>> {
    raw.map(|value| {
        OutputMode::parse(value).ok_or_else(|| {
            HarnessError::UserError(format!(
                "invalid --output-mode '{}': expected raw, text or json",
                value
            ))
        })
    })
    .transpose()
}
