//! Agent lookup table.
//!
//! Built-in descriptors are registered first; `agents.yaml` entries with the
//! same id replace them, new ids extend the table.

use super::builtin;
use super::config::{AgentsConfig, HarnessDefaults};
use super::descriptor::AgentDescriptor;
use crate::error::{HarnessError, Result};
use crate::template::TemplateCatalog;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Descriptors and install templates available to an attempt.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDescriptor>,
    templates: TemplateCatalog,
    defaults: HarnessDefaults,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentRegistry {
    /// Registry with only the built-in agents.
    pub fn builtin() -> Self {
        let mut templates = TemplateCatalog::new();
        for (name, text) in builtin::install_templates() {
            templates.insert(name, text);
        }

        let agents = builtin::descriptors()
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        Self {
            agents,
            templates,
            defaults: HarnessDefaults::default(),
        }
    }

    /// Built-ins merged with a parsed (and validated) config.
    pub fn from_config(config: AgentsConfig) -> Self {
        let mut registry = Self::builtin();

        for (name, text) in config.install_templates {
            registry.templates.insert(name, text);
        }
        for (id, mut descriptor) in config.agents {
            if registry.agents.contains_key(&id) {
                tracing::debug!(agent = %id, "agents.yaml overrides built-in agent");
            }
            descriptor.id = id.clone();
            registry.agents.insert(id, descriptor);
        }
        registry.defaults = config.defaults;
        registry
    }

    /// Built-ins plus `path` when given. A missing file is an error only when
    /// the path was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };

        match AgentsConfig::load(path)? {
            Some(config) => Ok(Self::from_config(config)),
            None => Err(HarnessError::UserError(format!(
                "agents config '{}' does not exist",
                path.display()
            ))),
        }
    }

    /// Look up an agent by id.
    pub fn get(&self, id: &str) -> Result<&AgentDescriptor> {
        self.agents
            .get(id)
            .ok_or_else(|| HarnessError::UnknownAgent {
                agent: id.to_string(),
                available: self.available(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.agents.values()
    }

    pub fn templates(&self) -> &TemplateCatalog {
        &self.templates
    }

    pub fn defaults(&self) -> &HarnessDefaults {
        &self.defaults
    }

    /// Overall attempt budget for `descriptor`.
    pub fn timeout_for(&self, descriptor: &AgentDescriptor) -> Duration {
        Duration::from_secs(
            descriptor
                .timeout_seconds
                .unwrap_or(self.defaults.timeout_seconds),
        )
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_secs(self.defaults.kill_grace_seconds)
    }

    fn available(&self) -> String {
        if self.agents.is_empty() {
            "(none)".to_string()
        } else {
            self.agents
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}
