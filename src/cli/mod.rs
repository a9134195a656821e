//! CLI argument parsing for agentrig.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// agentrig: install, launch and capture third-party CLI coding agents.
///
/// Every attempt works inside a sandbox directory:
/// - the agent is installed under `<sandbox>/.agent/<id>`
/// - it runs with `HOME=<sandbox>/.home` and an allow-listed environment
/// - logs, the execution record and extracted results go to the logs directory
#[derive(Parser, Debug)]
#[command(name = "agentrig")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to an agents.yaml extending the built-in agents.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for agentrig.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install an agent and run it once.
    ///
    /// Writes agent.log, execution.json and (in json mode) results.json to
    /// the logs directory. Exits with the agent's status class.
    Run(RunArgs),

    /// Install an agent without running it.
    ///
    /// Uses the bundle fast path when a bundle is present.
    Install(InstallArgs),

    /// Show the rendered install script and command without running anything.
    #[command(alias = "dry-run")]
    Render(RunArgs),

    /// Extract the trailing JSON payload from a captured log.
    Extract(ExtractArgs),

    /// List the available agents.
    #[command(alias = "list")]
    Agents,
}

/// Where the attempt lives.
#[derive(Args, Debug, Clone)]
pub struct SandboxArgs {
    /// Agent identifier (see `agentrig agents`).
    pub agent: String,

    /// Sandbox directory the agent works in.
    #[arg(long, default_value = ".")]
    pub sandbox: PathBuf,

    /// Directory for logs and records (defaults to `<sandbox>/.agentrig/logs`).
    #[arg(long)]
    pub logs: Option<PathBuf>,

    /// Provider-qualified model id, e.g. `anthropic/claude-sonnet-4-5`.
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Job name recorded in events.
    #[arg(long)]
    pub job: Option<String>,

    /// Template variable override (repeatable).
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Skip the bundle fast path.
    #[arg(long)]
    pub no_bundle: bool,
}

/// Arguments for `run` and `render`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub sandbox: SandboxArgs,

    /// Instruction passed to the agent.
    #[arg(long, short = 'i')]
    pub instruction: String,

    /// Slot number when several attempts run side by side.
    #[arg(long)]
    pub slot: Option<u32>,

    /// Output mode (raw or json).
    #[arg(long)]
    pub output_mode: Option<String>,

    /// Do not copy host config files into the sandbox HOME.
    #[arg(long)]
    pub no_stage: bool,

    /// Overall timeout in seconds (overrides the agent's).
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Arguments for `install`.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    #[command(flatten)]
    pub sandbox: SandboxArgs,
}

/// Arguments for `extract`.
#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    /// Captured agent log.
    pub log: PathBuf,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "agentrig",
            "run",
            "pi-mono",
            "--sandbox",
            "/tmp/sb",
            "-m",
            "anthropic/claude-sonnet-4-5",
            "-i",
            "fix the bug",
            "--set",
            "thinking=high",
            "--set",
            "no_session=true",
            "--output-mode",
            "json",
            "--timeout",
            "60",
        ])
        .unwrap();

        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.sandbox.agent, "pi-mono");
                assert_eq!(args.sandbox.sandbox, PathBuf::from("/tmp/sb"));
                assert_eq!(args.sandbox.overrides, ["thinking=high", "no_session=true"]);
                assert_eq!(args.instruction, "fix the bug");
                assert_eq!(args.output_mode.as_deref(), Some("json"));
                assert_eq!(args.timeout, Some(60));
                assert!(!args.no_stage);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn parse_install_defaults_sandbox_to_cwd() {
        let cli = Cli::try_parse_from(["agentrig", "install", "factory-droid", "--no-bundle"]).unwrap();
        match cli.command {
            Command::Install(args) => {
                assert_eq!(args.sandbox.agent, "factory-droid");
                assert_eq!(args.sandbox.sandbox, PathBuf::from("."));
                assert!(args.sandbox.no_bundle);
                assert!(args.sandbox.logs.is_none());
            }
            _ => panic!("Expected Install command"),
        }
    }

    #[test]
    fn run_requires_instruction() {
        assert!(Cli::try_parse_from(["agentrig", "run", "pi-mono"]).is_err());
    }

    #[test]
    fn global_config_flag() {
        let cli = Cli::try_parse_from(["agentrig", "agents", "--config", "agents.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("agents.yaml")));
        assert!(matches!(cli.command, Command::Agents));
    }

    #[test]
    fn dry_run_alias_parses_as_render() {
        let cli = Cli::try_parse_from(["agentrig", "dry-run", "pi-mono", "-i", "x"]).unwrap();
        assert!(matches!(cli.command, Command::Render(_)));
    }
}
