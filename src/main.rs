//! agentrig: install, launch and capture third-party CLI coding agents.
//!
//! This is the main entry point for the `agentrig` CLI. It sets up logging,
//! wires Ctrl-C to cancellation, dispatches to the appropriate command
//! handler, and handles errors with proper exit codes.

mod cli;
mod commands;

use agentrig::context::CancelToken;
use agentrig::exit_codes;
use cli::Cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter (falls back to `RUST_LOG`).
const LOG_ENV: &str = "AGENTRIG_LOG";

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse_args();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        tracing::warn!(error = %e, "failed to install Ctrl-C handler");
    }

    match commands::dispatch(cli, cancel) {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            ExitCode::from(err.exit_code() as u8)
        }
    }
}

/// Diagnostics go to stderr so stdout stays clean for `extract` and `render`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("agentrig=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
