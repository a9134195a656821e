//! One attempt, end to end.
//!
//! Order is fixed: render the install script and command, collect
//! credentials, install (bundle or script), stage host config, run the agent,
//! extract the result, persist the record. Failures before the agent is
//! spawned are errors; everything after is written to `execution.json`.

use crate::agent::{
    AgentDescriptor, AgentKind, AgentRegistry, CredentialSpec, OutputMode, RunParameters, resolve,
    staging,
};
use crate::context::RunContext;
use crate::credentials::{self, ForwardedEnv};
use crate::error::{HarnessError, Result};
use crate::events::{self, Event, EventAction};
use crate::extract::{self, ExtractionOutcome};
use crate::fs::atomic_write_json;
use crate::install::{
    BundleResolver, InstallFailure, InstallOutcome, InstallRequest, Installer, ScriptRunner,
    ShellScriptRunner,
};
use crate::runner::{self, AgentCommand, ExecutionRecord, Invocation};
use crate::template::{RenderedScript, TemplateParams};
use crate::usage;
use serde_json::json;

/// Knobs the harness can turn per attempt.
#[derive(Debug, Clone)]
pub struct AttemptOptions {
    /// Allow the bundle fast path.
    pub allow_bundle: bool,
    /// Copy host config files into the sandbox HOME.
    pub stage_config: bool,
}

impl Default for AttemptOptions {
    fn default() -> Self {
        Self {
            allow_bundle: true,
            stage_config: true,
        }
    }
}

/// Everything rendered for an attempt before anything runs.
#[derive(Debug, Clone)]
pub struct PreparedAttempt {
    pub descriptor: AgentDescriptor,
    pub vars: TemplateParams,
    pub output_mode: OutputMode,
    pub credentials: Vec<CredentialSpec>,
    pub script: Option<RenderedScript>,
    pub invocation: Invocation,
}

/// What an attempt produced.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub agent_id: String,
    pub install: InstallOutcome,
    pub record: ExecutionRecord,
}

/// Render the install script and the invocation.
///
/// Pure apart from reading the registry; nothing is written or executed.
pub fn prepare(
    registry: &AgentRegistry,
    agent_id: &str,
    params: &RunParameters,
    ctx: &RunContext,
) -> Result<PreparedAttempt> {
    let descriptor = registry.get(agent_id)?.clone();
    let resolved = resolve(&descriptor, params, ctx)?;

    let script = match &descriptor.install_template {
        Some(template) => Some(registry.templates().render(template, &resolved.vars)?),
        None => None,
    };
    let invocation = Invocation::build(&descriptor.command, &resolved.vars)?;

    Ok(PreparedAttempt {
        descriptor,
        vars: resolved.vars,
        output_mode: resolved.output_mode,
        credentials: resolved.credentials,
        script,
        invocation,
    })
}

/// Run one attempt with the shell install runner.
pub fn run_attempt(
    registry: &AgentRegistry,
    agent_id: &str,
    params: &RunParameters,
    ctx: &RunContext,
    opts: &AttemptOptions,
) -> Result<AttemptReport> {
    let runner = ShellScriptRunner {
        kill_grace: registry.kill_grace(),
    };
    run_attempt_with(registry, agent_id, params, ctx, opts, &runner)
}

/// Run one attempt with a caller-supplied install runner.
pub fn run_attempt_with<R: ScriptRunner>(
    registry: &AgentRegistry,
    agent_id: &str,
    params: &RunParameters,
    ctx: &RunContext,
    opts: &AttemptOptions,
    script_runner: R,
) -> Result<AttemptReport> {
    let prepared = prepare(registry, agent_id, params, ctx)?;
    let forwarded = credentials::collect(&prepared.credentials, &ctx.ambient_env)?;

    let mut ctx = ctx.clone();
    if ctx.deadline.is_none() {
        ctx = ctx.with_timeout(registry.timeout_for(&prepared.descriptor));
    }
    let ctx = &ctx;
    let job = params.job_name.as_deref();

    let command = agent_command(registry, &prepared, ctx);
    let install = install(registry, &prepared, &command, ctx, opts, job, script_runner)?;

    if opts.stage_config
        && let Some(config) = &prepared.descriptor.config_staging
    {
        let staged = staging::stage(config, ctx)?;
        events::record(
            ctx,
            Event::new(ctx, EventAction::ConfigStaged, agent_id)
                .with_job(job)
                .with_details(json!({
                    "target": staged.target_dir,
                    "staged": staged.staged,
                    "missing": staged.missing,
                })),
        );
    }

    events::record(
        ctx,
        Event::new(ctx, EventAction::RunStart, agent_id)
            .with_job(job)
            .with_details(json!({
                "command": command.invocation.display(&forwarded.redactor()),
                "credentials": forwarded.names(),
                "output_mode": prepared.output_mode,
            })),
    );

    let mut record = runner::run(&command, &forwarded, ctx);

    if prepared.output_mode == OutputMode::Json {
        let outcome = extract::extract(&record.log_path);
        if let Err(e) = extract::persist(&outcome, ctx) {
            tracing::warn!(error = %e, "failed to write results.json");
        }
        events::record(
            ctx,
            Event::new(ctx, EventAction::Extract, agent_id)
                .with_job(job)
                .with_details(extraction_details(&outcome)),
        );
        record.structured = Some(outcome);
    }
    record.usage = summarize_usage(&prepared, params, &record);

    if let Err(e) = atomic_write_json(ctx.record_path(), &record) {
        tracing::warn!(
            path = %ctx.record_path().display(),
            error = %e,
            "failed to write execution record"
        );
        record.persist_error = Some(e.to_string());
    }
    events::record(
        ctx,
        Event::new(ctx, EventAction::RunComplete, agent_id)
            .with_job(job)
            .with_details(json!({
                "kind": record.kind,
                "exit_code": record.exit_code,
                "signal": record.signal,
                "cancel_reason": record.cancel_reason,
                "duration_ms": record.duration().as_millis() as u64,
                "record": ctx.record_path(),
                "persist_error": record.persist_error,
            })),
    );

    Ok(AttemptReport {
        agent_id: agent_id.to_string(),
        install,
        record,
    })
}

/// Install only (the `install` command and the first half of an attempt).
pub fn install_only(
    registry: &AgentRegistry,
    agent_id: &str,
    params: &RunParameters,
    ctx: &RunContext,
    opts: &AttemptOptions,
) -> Result<InstallOutcome> {
    let prepared = prepare(registry, agent_id, params, ctx)?;
    let command = agent_command(registry, &prepared, ctx);
    let runner = ShellScriptRunner {
        kill_grace: registry.kill_grace(),
    };
    install(
        registry,
        &prepared,
        &command,
        ctx,
        opts,
        params.job_name.as_deref(),
        runner,
    )
}

fn agent_command(
    registry: &AgentRegistry,
    prepared: &PreparedAttempt,
    ctx: &RunContext,
) -> AgentCommand {
    AgentCommand {
        agent_id: prepared.descriptor.id.clone(),
        invocation: prepared.invocation.clone(),
        environment: prepared.descriptor.environment.clone(),
        base_env: registry.defaults().base_env.clone(),
        path_prefix: Some(ctx.install_dir(&prepared.descriptor.id).join("bin")),
        kill_grace: registry.kill_grace(),
    }
}

fn install<R: ScriptRunner>(
    registry: &AgentRegistry,
    prepared: &PreparedAttempt,
    command: &AgentCommand,
    ctx: &RunContext,
    opts: &AttemptOptions,
    job: Option<&str>,
    script_runner: R,
) -> Result<InstallOutcome> {
    let descriptor = &prepared.descriptor;
    let bundles = BundleResolver::new(&registry.defaults().bundle_dir);

    events::record(
        ctx,
        Event::new(ctx, EventAction::InstallStart, &descriptor.id)
            .with_job(job)
            .with_details(json!({
                "template": descriptor.install_template,
                "digest": prepared.script.as_ref().map(|s| &s.digest),
                "bundle": bundles.bundle_path(&descriptor.id, ctx),
            })),
    );

    let request = InstallRequest {
        agent_id: &descriptor.id,
        version: &descriptor.version,
        script: prepared.script.as_ref(),
        allow_bundle: opts.allow_bundle && descriptor.capabilities().supports_bundle_restore,
        bundles: &bundles,
        // Install scripts never see credentials.
        env: runner::child_env(command, &ForwardedEnv::default(), ctx),
    };
    let outcome = Installer::new(script_runner).install(&request, ctx);

    events::record(
        ctx,
        Event::new(ctx, EventAction::InstallComplete, &descriptor.id)
            .with_job(job)
            .with_details(json!({ "outcome": outcome })),
    );

    match outcome {
        InstallOutcome::Failed {
            reason: InstallFailure::Cancelled(reason),
        } => Err(HarnessError::Cancelled(format!(
            "install of '{}' interrupted ({})",
            descriptor.id, reason
        ))),
        InstallOutcome::Failed { reason } => Err(HarnessError::InstallFailed(format!(
            "{}: {} (see {})",
            descriptor.id,
            reason,
            ctx.install_log_path().display()
        ))),
        installed => Ok(installed),
    }
}

fn extraction_details(outcome: &ExtractionOutcome) -> serde_json::Value {
    match outcome {
        ExtractionOutcome::Structured { .. } => json!({ "status": "structured" }),
        ExtractionOutcome::ExtractionFailed { reason } => {
            json!({ "status": "extraction_failed", "reason": reason })
        }
    }
}

fn summarize_usage(
    prepared: &PreparedAttempt,
    params: &RunParameters,
    record: &ExecutionRecord,
) -> Option<usage::UsageSummary> {
    if prepared.descriptor.kind == AgentKind::Custom {
        return None;
    }
    let bytes = std::fs::read(&record.log_path).ok()?;
    let text = String::from_utf8_lossy(&bytes);
    let var = |name: &str| prepared.vars.get(name).map(String::as_str);
    let summary = match prepared.descriptor.kind {
        AgentKind::FactoryDroid => {
            usage::estimate_droid(&params.instruction, &text, var("droid_model").unwrap_or(""))
        }
        _ => usage::summarize(&text, var("provider")),
    };
    tracing::info!(
        input = summary.input_tokens,
        output = summary.output_tokens,
        cost_usd = summary.cost_usd,
        estimated = summary.estimated,
        "usage"
    );
    Some(summary)
}
