//! Agent configuration schema.
//!
//! This module defines the `agents.yaml` configuration file format, which adds
//! agents and install templates to the built-in set and tunes harness defaults.
//!
//! # File Format
//!
//! ```yaml
//! defaults:
//!   timeout_seconds: 1800
//!   kill_grace_seconds: 10
//!   bundle_dir: ".agent-bundles"
//!   base_env: [LC_ALL]
//!
//! install_templates:
//!   my-agent: |
//!     #!/bin/sh
//!     set -eu
//!     mkdir -p {install_dir}/bin
//!     curl -fsSL https://example.com/my-agent -o {install_dir}/bin/my-agent
//!     chmod +x {install_dir}/bin/my-agent
//!
//! agents:
//!   my-agent:
//!     name: "My Agent"
//!     install_template: my-agent
//!     command: "{install_dir}/bin/my-agent --model {model} {instruction}"
//!     output_mode: json
//!     credentials:
//!       - name: MY_AGENT_TOKEN
//!         required: true
//! ```
//!
//! # Variable Placeholders
//!
//! Install and command templates can reference:
//!
//! - `{agent_id}`, `{agent_name}`, `{version}`
//! - `{install_dir}` - Absolute install location inside the sandbox
//! - `{sandbox_dir}`, `{home_dir}`, `{logs_dir}`
//! - `{instruction}`, `{model}`, `{job_name}`, `{slot}`, `{output_mode}`
//! - every key of the agent's `defaults` and of `--set key=value` overrides
//! - family-specific values (`{provider}`, `{pi_model}`, `{droid_model}`, ...)

use super::builtin;
use super::descriptor::AgentDescriptor;
use crate::error::{HarnessError, Result};
use crate::template::placeholders;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default timeout for a whole attempt in seconds.
const DEFAULT_TIMEOUT_SECONDS: u64 = 1800;

/// Default time between SIGTERM and SIGKILL on cancellation.
const DEFAULT_KILL_GRACE_SECONDS: u64 = 10;

/// Default bundle directory, relative to the sandbox.
pub const DEFAULT_BUNDLE_DIR: &str = ".agent-bundles";

/// Configuration loaded from `agents.yaml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsConfig {
    /// Agent descriptors keyed by identifier.
    #[serde(default)]
    pub agents: BTreeMap<String, AgentDescriptor>,

    /// Default settings applied to all attempts.
    #[serde(default)]
    pub defaults: HarnessDefaults,

    /// Install templates keyed by name.
    #[serde(default)]
    pub install_templates: BTreeMap<String, String>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Default settings for attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessDefaults {
    /// Overall attempt budget in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Seconds between SIGTERM and SIGKILL when cancelling.
    #[serde(default = "default_kill_grace_seconds")]
    pub kill_grace_seconds: u64,

    /// Bundle directory, relative to the sandbox unless absolute.
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: String,

    /// Extra variable names copied from the ambient environment into every
    /// child, on top of the built-in base set. Never use this for secrets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_env: Vec<String>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl Default for HarnessDefaults {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            kill_grace_seconds: default_kill_grace_seconds(),
            bundle_dir: default_bundle_dir(),
            base_env: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_kill_grace_seconds() -> u64 {
    DEFAULT_KILL_GRACE_SECONDS
}

fn default_bundle_dir() -> String {
    DEFAULT_BUNDLE_DIR.to_string()
}

impl AgentsConfig {
    /// Load agents config from a YAML file.
    ///
    /// Returns `Ok(None)` if the file does not exist.
    /// Returns `Err` if the file exists but cannot be parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::UserError(format!(
                "failed to read agents config '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_yaml(&content)?;
        tracing::debug!(
            path = %path.display(),
            agents = config.agents.len(),
            templates = config.install_templates.len(),
            "loaded agents config"
        );
        Ok(Some(config))
    }

    /// Parse agents config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: AgentsConfig = serde_yaml::from_str(yaml)
            .map_err(|e| HarnessError::UserError(format!("failed to parse agents.yaml: {}", e)))?;

        for (id, descriptor) in config.agents.iter_mut() {
            descriptor.id = id.clone();
        }

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            HarnessError::UserError(format!("failed to serialize agents config: {}", e))
        })
    }

    /// Validate the agents configuration.
    ///
    /// Validation rules:
    /// - Default timeout must be positive
    /// - Install templates must parse
    /// - Agent identifiers and commands must not be empty
    /// - Commands must split into arguments and parse as templates
    /// - Install template references must resolve (config or built-in)
    /// - Credential names must not be empty
    pub fn validate(&self) -> Result<()> {
        if self.defaults.timeout_seconds == 0 {
            return Err(invalid(
                "defaults.timeout_seconds must be greater than 0".to_string(),
            ));
        }

        for (name, text) in &self.install_templates {
            placeholders(text).map_err(|e| {
                invalid(format!("install template '{}' is malformed: {}", name, e))
            })?;
        }

        for (id, agent) in &self.agents {
            if id.is_empty() {
                return Err(invalid("agent identifier cannot be empty".to_string()));
            }

            if agent.command.trim().is_empty() {
                return Err(invalid(format!("agent '{}' has empty command", id)));
            }

            shell_words::split(&agent.command).map_err(|e| {
                invalid(format!("agent '{}' command cannot be split: {}", id, e))
            })?;
            placeholders(&agent.command)
                .map_err(|e| invalid(format!("agent '{}' command is malformed: {}", id, e)))?;

            if let Some(timeout) = agent.timeout_seconds
                && timeout == 0
            {
                return Err(invalid(format!("agent '{}' has timeout_seconds of 0", id)));
            }

            if let Some(ref template) = agent.install_template
                && !self.install_templates.contains_key(template)
                && !builtin::install_templates()
                    .iter()
                    .any(|(name, _)| name == template)
            {
                return Err(invalid(format!(
                    "agent '{}' references unknown install_template '{}'",
                    id, template
                )));
            }

            if agent.credentials.iter().any(|c| c.name.trim().is_empty()) {
                return Err(invalid(format!("agent '{}' has a credential with no name", id)));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> HarnessError {
    HarnessError::UserError(format!("agents.yaml validation failed: {}", message))
}
