//! Implementation of `agentrig run`, `agentrig install` and `agentrig render`.

use super::{parse_output_mode, run_parameters, sandbox_context};
use crate::cli::{InstallArgs, RunArgs};
use agentrig::agent::AgentRegistry;
use agentrig::attempt::{AttemptOptions, install_only, prepare, run_attempt};
use agentrig::context::{CancelToken, RunContext};
use agentrig::credentials::Redactor;
use agentrig::error::{HarnessError, Result};
use agentrig::extract::ExtractionOutcome;
use agentrig::runner::{ExecutionRecord, RecordKind};
use std::path::Path;
use std::time::Duration;

/// Execute `agentrig run`.
///
/// Installs the agent if needed, runs it once and prints a summary. The
/// process exit code follows the record: 0 only when the agent exited 0.
pub fn cmd_run(args: RunArgs, config: Option<&Path>, cancel: CancelToken) -> Result<()> {
    let registry = AgentRegistry::load(config)?;
    let mut ctx = sandbox_context(&args.sandbox, cancel)?;
    if let Some(seconds) = args.timeout {
        ctx = ctx.with_timeout(Duration::from_secs(seconds));
    }

    let mut params = run_parameters(&args.sandbox, &args.instruction)?;
    params.slot = args.slot;
    params.output_mode = parse_output_mode(args.output_mode.as_deref())?;

    let opts = AttemptOptions {
        allow_bundle: !args.sandbox.no_bundle,
        stage_config: !args.no_stage,
    };

    println!("Running agent {}...", args.sandbox.agent);
    println!();
    println!("  Sandbox:   {}", ctx.sandbox_dir.display());
    println!("  Logs:      {}", ctx.logs_dir.display());
    println!();

    let report = run_attempt(&registry, &args.sandbox.agent, &params, &ctx, &opts)?;

    println!("  Install:   {:?}", report.install);
    print_record(&report.record, &ctx);

    record_status(&report.record)
}

/// Execute `agentrig install`.
pub fn cmd_install(args: InstallArgs, config: Option<&Path>, cancel: CancelToken) -> Result<()> {
    let registry = AgentRegistry::load(config)?;
    let ctx = sandbox_context(&args.sandbox, cancel)?;
    let ctx = ctx.with_timeout(registry.timeout_for(registry.get(&args.sandbox.agent)?));
    let params = run_parameters(&args.sandbox, "")?;
    let opts = AttemptOptions {
        allow_bundle: !args.sandbox.no_bundle,
        ..AttemptOptions::default()
    };

    let outcome = install_only(&registry, &args.sandbox.agent, &params, &ctx, &opts)?;

    println!("Installed {} ({:?})", args.sandbox.agent, outcome);
    println!(
        "  Location:  {}",
        ctx.install_dir(&args.sandbox.agent).display()
    );
    Ok(())
}

/// Execute `agentrig render`.
///
/// Prints what an attempt would install and run. Nothing is written.
pub fn cmd_render(args: RunArgs, config: Option<&Path>) -> Result<()> {
    let registry = AgentRegistry::load(config)?;
    let ctx = sandbox_context(&args.sandbox, CancelToken::new())?;

    let mut params = run_parameters(&args.sandbox, &args.instruction)?;
    params.slot = args.slot;
    params.output_mode = parse_output_mode(args.output_mode.as_deref())?;

    let prepared = prepare(&registry, &args.sandbox.agent, &params, &ctx)?;
    let descriptor = &prepared.descriptor;
    let timeout = match args.timeout {
        Some(seconds) => Duration::from_secs(seconds),
        None => registry.timeout_for(descriptor),
    };

    println!("Dry run - would execute:");
    println!();
    println!(
        "  Agent:       {} ({})",
        descriptor.id,
        descriptor.display_name()
    );
    println!("  Kind:        {}", descriptor.kind);
    println!("  Version:     {}", descriptor.version);
    println!("  Install dir: {}", ctx.install_dir(&descriptor.id).display());
    // Credentials travel through the environment, never argv.
    println!(
        "  Command:     {}",
        prepared.invocation.display(&Redactor::default())
    );
    println!("  Output mode: {}", prepared.output_mode);
    println!("  Timeout:     {}s", timeout.as_secs());

    if !prepared.credentials.is_empty() {
        println!("  Credentials:");
        for spec in &prepared.credentials {
            let required = if spec.required { " (required)" } else { "" };
            let present = spec.candidates().any(|name| ctx.env_var(name).is_some());
            let status = if present { "set" } else { "unset" };
            println!(
                "    {}{} [{}]",
                spec.candidates().collect::<Vec<_>>().join(" | "),
                required,
                status
            );
        }
    }

    if !descriptor.environment.is_empty() {
        println!("  Environment:");
        for (key, value) in &descriptor.environment {
            println!("    {}={}", key, value);
        }
    }

    match &prepared.script {
        Some(script) => {
            println!();
            println!(
                "Install script ({}, sha256 {}):",
                script.template, script.digest
            );
            println!();
            print!("{}", script.text);
            if !script.text.ends_with('\n') {
                println!();
            }
        }
        None => {
            println!();
            println!("No install script.");
        }
    }

    Ok(())
}

fn print_record(record: &ExecutionRecord, ctx: &RunContext) {
    println!("  Result:    {}", record.kind);
    println!("  Duration:  {:.2}s", record.duration().as_secs_f64());
    println!("  Exit code: {:?}", record.exit_code);
    if let Some(signal) = record.signal {
        println!("  Signal:    {}", signal);
    }
    if let Some(error) = &record.spawn_error {
        println!("  Spawn:     {}", error);
    }
    println!("  Log:       {}", record.log_path.display());
    println!("  Record:    {}", ctx.record_path().display());

    match &record.structured {
        Some(ExtractionOutcome::Structured { .. }) => {
            println!("  Results:   {}", ctx.results_path().display());
        }
        Some(ExtractionOutcome::ExtractionFailed { reason }) => {
            println!("  Results:   none ({})", reason);
        }
        None => {}
    }

    if let Some(usage) = &record.usage {
        let estimated = if usage.estimated { " (estimated)" } else { "" };
        println!(
            "  Usage:     {} in / {} out tokens, ${:.4}{}",
            usage.input_tokens, usage.output_tokens, usage.cost_usd, estimated
        );
    }
}

/// Map a finished record onto the CLI's exit status.
fn record_status(record: &ExecutionRecord) -> Result<()> {
    match record.kind {
        RecordKind::Cancelled => Err(HarnessError::Cancelled(format!(
            "agent '{}' stopped ({}). Check {} for output.",
            record.agent_id,
            record
                .cancel_reason
                .map(|r| r.to_string())
                .unwrap_or_else(|| "aborted".to_string()),
            record.log_path.display()
        ))),
        RecordKind::ProcessCrash => Err(HarnessError::AgentFailed(format!(
            "agent '{}' crashed ({}). Check {} for output.",
            record.agent_id,
            match (&record.spawn_error, record.signal, record.exit_code) {
                (Some(error), _, _) => error.clone(),
                (None, Some(signal), _) => format!("signal {}", signal),
                (None, None, Some(code)) => format!("exit code {}", code),
                (None, None, None) => "no exit status".to_string(),
            },
            record.log_path.display()
        ))),
        RecordKind::Completed => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrig::exit_codes;
    use chrono::Utc;
    use std::path::PathBuf;

    fn record(kind: RecordKind, exit_code: Option<i32>) -> ExecutionRecord {
        ExecutionRecord {
            agent_id: "pi-mono".to_string(),
            kind,
            exit_code,
            signal: None,
            cancel_reason: None,
            spawn_error: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            log_path: PathBuf::from("/logs/agent.log"),
            command: "pi".to_string(),
            output_lines: 0,
            structured: None,
            usage: None,
            persist_error: None,
        }
    }

    #[test]
    fn zero_exit_is_success() {
        assert!(record_status(&record(RecordKind::Completed, Some(0))).is_ok());
    }

    #[test]
    fn non_zero_exit_is_agent_failure() {
        let err = record_status(&record(RecordKind::ProcessCrash, Some(42))).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::AGENT_FAILURE);
        assert!(err.to_string().contains("exit code 42"));
    }

    #[test]
    fn cancelled_record_maps_to_cancelled_exit() {
        let err = record_status(&record(RecordKind::Cancelled, None)).unwrap_err();
        assert_eq!(err.exit_code(), exit_codes::CANCELLED);
    }

    #[test]
    fn spawn_error_is_reported() {
        let mut rec = record(RecordKind::ProcessCrash, None);
        rec.spawn_error = Some("No such file or directory".to_string());
        let err = record_status(&rec).unwrap_err();
        assert!(err.to_string().contains("No such file or directory"));
    }
}
