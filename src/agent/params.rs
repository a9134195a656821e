//! Per-attempt parameters and template variable assembly.

use super::descriptor::{AgentDescriptor, CredentialSpec, OutputMode};
use super::models::resolve_flags;
use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use crate::template::TemplateParams;
use std::collections::BTreeMap;

/// Parameters the harness supplies for one attempt.
#[derive(Debug, Clone, Default)]
pub struct RunParameters {
    /// Model identifier, usually `provider/model`.
    pub model: Option<String>,
    /// Task instruction passed to the agent.
    pub instruction: String,
    /// Harness job name (used in events only).
    pub job_name: Option<String>,
    /// Concurrency slot assigned by the harness.
    pub slot: Option<u32>,
    /// Output mode override.
    pub output_mode: Option<OutputMode>,
    /// `key=value` overrides of descriptor defaults.
    pub overrides: BTreeMap<String, String>,
}

impl RunParameters {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }
}

/// Parse a `key=value` override.
pub fn parse_override(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(HarnessError::UserError(format!(
            "invalid override '{}': expected key=value",
            raw
        ))),
    }
}

/// Everything derived from a descriptor and parameters before anything runs.
#[derive(Debug, Clone)]
pub struct ResolvedAgent {
    /// Variables for the install and command templates.
    pub vars: TemplateParams,
    /// Descriptor allow-list plus family-specific entries.
    pub credentials: Vec<CredentialSpec>,
    /// Effective output mode.
    pub output_mode: OutputMode,
}

/// Build the template variables for one attempt.
///
/// Precedence, lowest first: descriptor defaults, overrides, family-derived
/// flags, then context values (`install_dir`, `instruction`, ...), which
/// cannot be overridden.
pub fn resolve(
    descriptor: &AgentDescriptor,
    params: &RunParameters,
    ctx: &RunContext,
) -> Result<ResolvedAgent> {
    let output_mode = effective_output_mode(descriptor, params)?;

    let mut settings = descriptor.defaults.clone();
    settings.extend(params.overrides.clone());

    let flags = resolve_flags(descriptor, params.model.as_deref(), &settings, output_mode)?;

    let mut vars = settings;
    vars.extend(flags.vars);

    let path = |p: std::path::PathBuf| p.to_string_lossy().into_owned();
    let context_vars = [
        ("agent_id", descriptor.id.clone()),
        ("agent_name", descriptor.display_name().to_string()),
        ("version", descriptor.version.clone()),
        ("install_dir", path(ctx.install_dir(&descriptor.id))),
        ("sandbox_dir", path(ctx.sandbox_dir.clone())),
        ("home_dir", path(ctx.home_dir())),
        ("logs_dir", path(ctx.logs_dir.clone())),
        ("instruction", params.instruction.clone()),
        ("model", params.model.clone().unwrap_or_default()),
        ("job_name", params.job_name.clone().unwrap_or_default()),
        (
            "slot",
            params.slot.map(|s| s.to_string()).unwrap_or_default(),
        ),
        ("output_mode", output_mode.to_string()),
    ];
    for (key, value) in context_vars {
        vars.insert(key.to_string(), value);
    }

    let mut credentials = descriptor.credentials.clone();
    credentials.extend(flags.credentials);

    Ok(ResolvedAgent {
        vars,
        credentials,
        output_mode,
    })
}

fn effective_output_mode(descriptor: &AgentDescriptor, params: &RunParameters) -> Result<OutputMode> {
    let requested = match (params.output_mode, params.overrides.get("output_mode")) {
        (Some(mode), _) => mode,
        (None, Some(raw)) => OutputMode::parse(raw).ok_or_else(|| {
            HarnessError::UserError(format!(
                "invalid output_mode '{}': expected raw, text or json",
                raw
            ))
        })?,
        (None, None) => descriptor.output_mode,
    };

    if requested == OutputMode::Json && !descriptor.capabilities().supports_json_output {
        return Err(HarnessError::UserError(format!(
            "agent '{}' does not support json output",
            descriptor.id
        )));
    }
    Ok(requested)
}
