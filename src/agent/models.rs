//! Model and flag resolution per agent family.
//!
//! The harness passes a model id like `anthropic/claude-sonnet-4`. Each agent
//! CLI wants something different on its command line; this module turns the
//! model id plus overrides into the template variables the invocation and
//! install templates reference.

use super::descriptor::{AgentDescriptor, AgentKind, CredentialSpec, OutputMode};
use crate::error::{HarnessError, Result};
use crate::template::TemplateParams;

/// Providers pi-coding-agent understands.
const PI_PROVIDERS: &[&str] = &[
    "anthropic",
    "openai",
    "google",
    "groq",
    "cerebras",
    "xai",
    "openrouter",
];

/// Variables and extra credentials derived for one attempt.
#[derive(Debug, Clone, Default)]
pub struct ResolvedFlags {
    pub vars: TemplateParams,
    pub credentials: Vec<CredentialSpec>,
}

/// Derive family-specific variables.
///
/// `settings` is the descriptor defaults with the run overrides applied.
pub fn resolve_flags(
    descriptor: &AgentDescriptor,
    model: Option<&str>,
    settings: &TemplateParams,
    output_mode: OutputMode,
) -> Result<ResolvedFlags> {
    match descriptor.kind {
        AgentKind::PiMono => resolve_pi_mono(model, settings, output_mode),
        AgentKind::FactoryDroid => Ok(resolve_factory_droid(model, settings)),
        AgentKind::Custom => Ok(resolve_custom(model)),
    }
}

fn setting<'a>(settings: &'a TemplateParams, key: &str) -> Option<&'a str> {
    settings
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes" | "on")
    )
}

fn resolve_pi_mono(
    model: Option<&str>,
    settings: &TemplateParams,
    output_mode: OutputMode,
) -> Result<ResolvedFlags> {
    let (provider, model_name) = match setting(settings, "provider") {
        Some(provider) => {
            let name = match model {
                Some(m) => m.split_once('/').map(|(_, rest)| rest).unwrap_or(m),
                None => "",
            };
            (provider.to_string(), name.to_string())
        }
        None => {
            let (provider, name) = model.and_then(|m| m.split_once('/')).ok_or_else(|| {
                HarnessError::UserError(
                    "pi-mono expects a model like 'provider/model' (or a 'provider' override)"
                        .to_string(),
                )
            })?;
            (provider.to_string(), name.to_string())
        }
    };

    let provider = provider.to_ascii_lowercase();
    if !PI_PROVIDERS.contains(&provider.as_str()) {
        return Err(HarnessError::UserError(format!(
            "unknown provider '{}' for pi-mono (supported: {})",
            provider,
            PI_PROVIDERS.join(", ")
        )));
    }

    let pi_model = match setting(settings, "pi_model") {
        Some(explicit) => explicit.to_string(),
        None => map_pi_model(&model_name),
    };
    let pi_model = strip_provider_prefix(&provider, &pi_model);

    let mut vars = TemplateParams::new();
    vars.insert("provider".into(), provider.clone());
    vars.insert("pi_model".into(), pi_model);
    vars.insert(
        "pi_mode".into(),
        match output_mode {
            OutputMode::Json => "json",
            OutputMode::Raw => "text",
        }
        .into(),
    );
    vars.insert(
        "session_flag".into(),
        if truthy(setting(settings, "no_session")) {
            "--no-session".into()
        } else {
            String::new()
        },
    );

    Ok(ResolvedFlags {
        vars,
        credentials: provider_credentials(&provider).into_iter().collect(),
    })
}

/// Map a harness model name onto a pi model id.
fn map_pi_model(model: &str) -> String {
    let lower = model.to_ascii_lowercase();

    if lower.contains("claude") {
        if lower.contains("haiku") {
            return "claude-3-5-haiku-latest".into();
        }
        if lower.contains("opus") {
            return "claude-3-opus-latest".into();
        }
        if lower.contains("sonnet") {
            return "claude-3-5-sonnet-latest".into();
        }
        return model.to_string();
    }

    if lower.contains("gpt") {
        let mapped = if lower.contains("5.1-codex-mini") {
            "gpt-5.1-codex-mini"
        } else if lower.contains("5.1-codex") {
            "gpt-5.1-codex"
        } else if lower.contains("5.1") {
            "gpt-5.1"
        } else if lower.contains("4o") {
            "gpt-4o"
        } else if lower.contains("4-turbo") || lower.contains("4turbo") {
            "gpt-4-turbo"
        } else if lower.contains("o1") {
            "o1-preview"
        } else if lower.contains("3.5") {
            "gpt-3.5-turbo"
        } else {
            tracing::warn!(model, "unknown GPT model, defaulting to gpt-4o");
            "gpt-4o"
        };
        return mapped.into();
    }

    if lower.contains("gemini") {
        return "gemini-2.0-flash-exp".into();
    }

    model.to_string()
}

/// pi wants `--provider openai --model gpt-5.1-codex`, not `openai/gpt-5.1-codex`.
fn strip_provider_prefix(provider: &str, model: &str) -> String {
    match model.split_once('/') {
        Some((prefix, rest)) if prefix.eq_ignore_ascii_case(provider) => rest.to_string(),
        _ => model.to_string(),
    }
}

fn provider_credentials(provider: &str) -> Option<CredentialSpec> {
    let spec = match provider {
        "anthropic" => {
            CredentialSpec::optional("ANTHROPIC_API_KEY").with_alternatives(["ANTHROPIC_OAUTH_TOKEN"])
        }
        "openai" => CredentialSpec::optional("OPENAI_API_KEY"),
        "google" => CredentialSpec::optional("GEMINI_API_KEY"),
        "groq" => CredentialSpec::optional("GROQ_API_KEY"),
        "cerebras" => CredentialSpec::optional("CEREBRAS_API_KEY"),
        "xai" => CredentialSpec::optional("XAI_API_KEY"),
        "openrouter" => CredentialSpec::optional("OPENROUTER_API_KEY"),
        _ => return None,
    };
    Some(spec)
}

fn resolve_factory_droid(model: Option<&str>, settings: &TemplateParams) -> ResolvedFlags {
    let mut short = setting(settings, "droid_model").unwrap_or("sonnet").to_string();

    if let Some((provider, name)) = model.and_then(|m| m.split_once('/')) {
        let lower = name.to_ascii_lowercase();
        match provider {
            "anthropic" => {
                for family in ["haiku", "opus", "sonnet"] {
                    if lower.contains(family) {
                        short = family.to_string();
                        break;
                    }
                }
            }
            "openai" if lower.contains("gpt-5") => short = "gpt-5".to_string(),
            _ => {}
        }
    }

    let droid_model = match short.as_str() {
        "sonnet" => "claude-sonnet-4-20250514",
        "opus" => "claude-opus-4-1-20250805",
        // Factory has no haiku; sonnet is the closest.
        "haiku" => "claude-sonnet-4-20250514",
        "gpt-5" | "gpt-5-codex" => "gpt-5-codex",
        "gpt-5-high" => "gpt-5-codex-high",
        other => other,
    }
    .to_string();

    let effort = setting(settings, "reasoning_effort").unwrap_or("medium");
    let (flag, value, auto) = if effort.eq_ignore_ascii_case("off") {
        (String::new(), String::new(), "high".to_string())
    } else {
        ("-r".to_string(), effort.to_string(), effort.to_string())
    };

    let mut vars = TemplateParams::new();
    vars.insert("droid_model".into(), droid_model);
    vars.insert("reasoning_effort".into(), effort.to_string());
    vars.insert("reasoning_flag".into(), flag);
    vars.insert("reasoning_value".into(), value);
    vars.insert("auto_level".into(), auto);

    ResolvedFlags {
        vars,
        credentials: Vec::new(),
    }
}

fn resolve_custom(model: Option<&str>) -> ResolvedFlags {
    let (provider, name) = match model {
        Some(m) => m.split_once('/').unwrap_or(("", m)),
        None => ("", ""),
    };

    let mut vars = TemplateParams::new();
    vars.insert("provider".into(), provider.to_string());
    vars.insert("model_name".into(), name.to_string());

    ResolvedFlags {
        vars,
        credentials: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::params;

    fn descriptor(kind: AgentKind) -> AgentDescriptor {
        AgentDescriptor {
            kind,
            ..Default::default()
        }
    }

    fn pi(model: Option<&str>, settings: &[(&str, &str)]) -> Result<ResolvedFlags> {
        resolve_flags(
            &descriptor(AgentKind::PiMono),
            model,
            &params(settings.iter().copied()),
            OutputMode::Json,
        )
    }

    #[test]
    fn pi_requires_provider_prefix() {
        let err = pi(Some("claude-sonnet"), &[]).unwrap_err();
        assert!(err.to_string().contains("provider/model"));
    }

    #[test]
    fn pi_rejects_unknown_provider() {
        let err = pi(Some("acme/model-x"), &[]).unwrap_err();
        assert!(err.to_string().contains("unknown provider 'acme'"));
    }

    #[test]
    fn pi_maps_anthropic_families() {
        let flags = pi(Some("anthropic/claude-3-5-haiku-20241022"), &[]).unwrap();
        assert_eq!(flags.vars["provider"], "anthropic");
        assert_eq!(flags.vars["pi_model"], "claude-3-5-haiku-latest");
        assert_eq!(flags.vars["pi_mode"], "json");
        assert_eq!(flags.vars["session_flag"], "");

        let spec = &flags.credentials[0];
        assert_eq!(spec.name, "ANTHROPIC_API_KEY");
        assert_eq!(spec.alternatives, vec!["ANTHROPIC_OAUTH_TOKEN"]);
    }

    #[test]
    fn pi_maps_gpt_variants_most_specific_first() {
        assert_eq!(map_pi_model("gpt-5.1-codex-mini"), "gpt-5.1-codex-mini");
        assert_eq!(map_pi_model("gpt-5.1-codex"), "gpt-5.1-codex");
        assert_eq!(map_pi_model("gpt-5.1"), "gpt-5.1");
        assert_eq!(map_pi_model("gpt-4o-mini"), "gpt-4o");
        assert_eq!(map_pi_model("gpt-4turbo"), "gpt-4-turbo");
        assert_eq!(map_pi_model("gpt-3.5"), "gpt-3.5-turbo");
        assert_eq!(map_pi_model("gpt-unknown"), "gpt-4o");
        assert_eq!(map_pi_model("gemini-pro"), "gemini-2.0-flash-exp");
        assert_eq!(map_pi_model("llama-3-70b"), "llama-3-70b");
    }

    #[test]
    fn pi_explicit_provider_and_model_override() {
        let flags = pi(
            Some("openai/openai/gpt-5.1-codex"),
            &[("provider", "openai"), ("pi_model", "openai/gpt-5.1-codex"), ("no_session", "true")],
        )
        .unwrap();
        assert_eq!(flags.vars["pi_model"], "gpt-5.1-codex");
        assert_eq!(flags.vars["session_flag"], "--no-session");
    }

    #[test]
    fn pi_text_mode() {
        let flags = resolve_flags(
            &descriptor(AgentKind::PiMono),
            Some("groq/llama-3"),
            &TemplateParams::new(),
            OutputMode::Raw,
        )
        .unwrap();
        assert_eq!(flags.vars["pi_mode"], "text");
        assert_eq!(flags.credentials[0].name, "GROQ_API_KEY");
    }

    fn droid(model: Option<&str>, settings: &[(&str, &str)]) -> ResolvedFlags {
        resolve_flags(
            &descriptor(AgentKind::FactoryDroid),
            model,
            &params(settings.iter().copied()),
            OutputMode::Raw,
        )
        .unwrap()
    }

    #[test]
    fn droid_infers_short_model_from_model_id() {
        let flags = droid(Some("anthropic/claude-opus-4-1"), &[("droid_model", "sonnet")]);
        assert_eq!(flags.vars["droid_model"], "claude-opus-4-1-20250805");

        let flags = droid(Some("openai/gpt-5"), &[]);
        assert_eq!(flags.vars["droid_model"], "gpt-5-codex");
    }

    #[test]
    fn droid_haiku_falls_back_to_sonnet() {
        let flags = droid(Some("anthropic/claude-haiku"), &[]);
        assert_eq!(flags.vars["droid_model"], "claude-sonnet-4-20250514");
    }

    #[test]
    fn droid_unknown_short_model_passes_through() {
        let flags = droid(None, &[("droid_model", "droid-core")]);
        assert_eq!(flags.vars["droid_model"], "droid-core");
    }

    #[test]
    fn droid_reasoning_effort_flags() {
        let flags = droid(None, &[("reasoning_effort", "high")]);
        assert_eq!(flags.vars["reasoning_flag"], "-r");
        assert_eq!(flags.vars["reasoning_value"], "high");
        assert_eq!(flags.vars["auto_level"], "high");

        let flags = droid(None, &[("reasoning_effort", "off")]);
        assert_eq!(flags.vars["reasoning_flag"], "");
        assert_eq!(flags.vars["reasoning_value"], "");
        assert_eq!(flags.vars["auto_level"], "high");

        let flags = droid(None, &[]);
        assert_eq!(flags.vars["reasoning_value"], "medium");
    }

    #[test]
    fn custom_splits_provider() {
        let flags = resolve_flags(
            &descriptor(AgentKind::Custom),
            Some("openai/gpt-4o"),
            &TemplateParams::new(),
            OutputMode::Raw,
        )
        .unwrap();
        assert_eq!(flags.vars["provider"], "openai");
        assert_eq!(flags.vars["model_name"], "gpt-4o");
    }
}
