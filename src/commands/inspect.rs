//! Implementation of `agentrig extract` and `agentrig agents`.

use crate::cli::ExtractArgs;
use agentrig::agent::AgentRegistry;
use agentrig::error::{HarnessError, Result};
use agentrig::extract::{self, ExtractionOutcome};
use std::path::Path;

/// Execute `agentrig extract`.
///
/// Prints the extracted payload as pretty JSON on stdout.
pub fn cmd_extract(args: ExtractArgs) -> Result<()> {
    match extract::extract(&args.log) {
        ExtractionOutcome::Structured { value } => {
            let pretty = serde_json::to_string_pretty(&value).map_err(|e| {
                HarnessError::UserError(format!("failed to format payload: {}", e))
            })?;
            println!("{}", pretty);
            Ok(())
        }
        ExtractionOutcome::ExtractionFailed { reason } => Err(HarnessError::UserError(format!(
            "no structured result in '{}': {}",
            args.log.display(),
            reason
        ))),
    }
}

/// Execute `agentrig agents`.
///
/// Lists built-in agents and those added by agents.yaml.
pub fn cmd_agents(config: Option<&Path>) -> Result<()> {
    let registry = AgentRegistry::load(config)?;
    let agents: Vec<_> = registry.iter().collect();

    if agents.is_empty() {
        println!("No agents available.");
        return Ok(());
    }

    println!("Available agents ({}):", agents.len());
    println!();

    for descriptor in agents {
        let caps = descriptor.capabilities();

        println!("  {}", descriptor.id);
        println!("    Name:        {}", descriptor.display_name());
        println!("    Kind:        {}", descriptor.kind);
        println!("    Version:     {}", descriptor.version);
        println!(
            "    Command:     {}",
            truncate_command(&descriptor.command, 60)
        );
        println!("    Output mode: {}", descriptor.output_mode);
        println!(
            "    Timeout:     {}s",
            registry.timeout_for(descriptor).as_secs()
        );
        println!(
            "    Install:     {}",
            match &descriptor.install_template {
                Some(name) if caps.supports_bundle_restore => format!("{} (bundle restore)", name),
                Some(name) => name.clone(),
                None => "none".to_string(),
            }
        );

        if !descriptor.credentials.is_empty() {
            println!(
                "    Credentials: {}",
                descriptor
                    .credentials
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        if let Some(staging) = &descriptor.config_staging {
            println!(
                "    Config:      ~/{} -> {}",
                staging.source_dir, staging.target_dir
            );
        }

        println!();
    }

    println!("Defaults:");
    println!(
        "  timeout_seconds:    {}",
        registry.defaults().timeout_seconds
    );
    println!(
        "  kill_grace_seconds: {}",
        registry.defaults().kill_grace_seconds
    );
    println!("  bundle_dir:         {}", registry.defaults().bundle_dir);

    Ok(())
}

/// Truncate a command string for display.
fn truncate_command(command: &str, max_len: usize) -> String {
    if command.chars().count() <= max_len {
        command.to_string()
    } else {
        let kept: String = command.chars().take(max_len - 3).collect();
        format!("{}...", kept)
    }
}
