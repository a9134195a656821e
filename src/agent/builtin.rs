//! Built-in agent descriptors and install templates.

use super::descriptor::{AgentDescriptor, AgentKind, ConfigStaging, CredentialSpec, OutputMode};
use std::collections::BTreeMap;

/// Default per-attempt budget for the built-in agents.
const BUILTIN_TIMEOUT_SECONDS: u64 = 1800;

const PI_MONO_INSTALL: &str = r#"#!/bin/sh
set -eu

INSTALL_DIR="{install_dir}"
echo "Installing {agent_name} ({package}@{package_version}) into $INSTALL_DIR"

if ! command -v npm >/dev/null 2>&1; then
  if command -v apt-get >/dev/null 2>&1; then
    apt-get update -qq
    apt-get install -y -qq nodejs npm ca-certificates
  else
    echo "npm is required but was not found" >&2
    exit 127
  fi
fi

mkdir -p "$INSTALL_DIR/bin"
npm install --prefix "$INSTALL_DIR" --no-audit --no-fund "{package}@{package_version}"
ln -sf "$INSTALL_DIR/node_modules/.bin/pi" "$INSTALL_DIR/bin/pi"

"$INSTALL_DIR/bin/pi" --version || true
echo "Default provider: {provider}, model: {pi_model}"
"#;

const FACTORY_DROID_INSTALL: &str = r#"#!/bin/sh
set -eu

INSTALL_DIR="{install_dir}"
echo "Installing {agent_name} into $INSTALL_DIR"

if ! command -v curl >/dev/null 2>&1; then
  if command -v apt-get >/dev/null 2>&1; then
    apt-get update -qq
    apt-get install -y -qq curl ca-certificates
  else
    echo "curl is required but was not found" >&2
    exit 127
  fi
fi

mkdir -p "$INSTALL_DIR/bin"
curl -fsSL "{installer_url}" | sh
DROID="$(command -v droid || echo "$HOME/.local/bin/droid")"
ln -sf "$DROID" "$INSTALL_DIR/bin/droid"
echo "Default model: {droid_model}"
"#;

/// Install templates shipped with the crate, keyed by name.
pub fn install_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        ("pi-mono", PI_MONO_INSTALL),
        ("factory-droid", FACTORY_DROID_INSTALL),
    ]
}

/// Descriptors shipped with the crate.
pub fn descriptors() -> Vec<AgentDescriptor> {
    vec![pi_mono(), factory_droid()]
}

fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn optional(names: &[&str]) -> Vec<CredentialSpec> {
    names.iter().map(|n| CredentialSpec::optional(*n)).collect()
}

fn pi_mono() -> AgentDescriptor {
    // The provider's own key is added at resolution time; these are always
    // forwarded when present.
    let credentials = optional(&[
        "ANTHROPIC_API_KEY",
        "OPENAI_API_KEY",
        "GEMINI_API_KEY",
        "OPENAI_USER_EMAIL",
        "OPENAI_ORG",
        "OPENAI_ORG_ID",
        "OPENAI_PROJECT",
        "OPENAI_PROJECT_ID",
        "OPENAI_API_BASE",
    ]);

    AgentDescriptor {
        id: "pi-mono".to_string(),
        name: "Pi Coding Agent".to_string(),
        kind: AgentKind::PiMono,
        version: "1.0.0".to_string(),
        install_template: Some("pi-mono".to_string()),
        command: "pi --provider {provider} --model {pi_model} --mode {pi_mode} {session_flag} {instruction}"
            .to_string(),
        credentials,
        output_mode: OutputMode::Json,
        defaults: map(&[
            ("package", "@mariozechner/pi-coding-agent"),
            ("package_version", "latest"),
            ("no_session", "false"),
        ]),
        environment: BTreeMap::new(),
        timeout_seconds: Some(BUILTIN_TIMEOUT_SECONDS),
        bundle_restore: true,
        config_staging: None,
        extra: BTreeMap::new(),
    }
}

fn factory_droid() -> AgentDescriptor {
    AgentDescriptor {
        id: "factory-droid".to_string(),
        name: "Factory Droid".to_string(),
        kind: AgentKind::FactoryDroid,
        version: "1.0.0".to_string(),
        install_template: Some("factory-droid".to_string()),
        command: "droid exec -m {droid_model} {reasoning_flag} {reasoning_value} --auto {auto_level} {instruction}"
            .to_string(),
        credentials: optional(&[
            "FACTORY_API_KEY",
            "ANTHROPIC_API_KEY",
            "OPENAI_API_KEY",
            "FACTORY_AUTH_TOKEN",
        ]),
        output_mode: OutputMode::Raw,
        defaults: map(&[
            ("droid_model", "sonnet"),
            ("reasoning_effort", "medium"),
            ("installer_url", "https://app.factory.ai/cli"),
        ]),
        environment: BTreeMap::new(),
        timeout_seconds: Some(BUILTIN_TIMEOUT_SECONDS),
        bundle_restore: true,
        config_staging: Some(ConfigStaging {
            source_dir: ".factory".to_string(),
            target_dir: ".factory".to_string(),
            files: vec![
                "auth.json".to_string(),
                "settings.json".to_string(),
                "config.json".to_string(),
            ],
            patch_env: vec!["OPENAI_API_KEY".to_string(), "OLLAMA_API_KEY".to_string()],
            patch_files: vec!["config.json".to_string()],
        }),
        extra: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::placeholders;

    #[test]
    fn every_builtin_references_a_shipped_template() {
        let names: Vec<&str> = install_templates().iter().map(|(n, _)| *n).collect();
        for d in descriptors() {
            let template = d.install_template.as_deref().unwrap();
            assert!(names.contains(&template), "{} has no template", d.id);
        }
    }

    #[test]
    fn builtin_templates_parse() {
        for (name, text) in install_templates() {
            let params = placeholders(text).unwrap_or_else(|e| panic!("{}: {}", name, e));
            assert!(params.contains(&"install_dir".to_string()));
        }
    }

    #[test]
    fn builtin_commands_parse() {
        for d in descriptors() {
            assert!(placeholders(&d.command).unwrap().contains(&"instruction".to_string()));
        }
    }
}
