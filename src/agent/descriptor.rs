//! Agent descriptors.
//!
//! A descriptor is the immutable definition of one installable agent: how to
//! install it, how to invoke it, which credentials it may see and what its
//! output looks like. Descriptors come from the built-in table or from
//! `agents.yaml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of agent families. Family-specific behavior (model id mapping,
/// flag derivation) is selected by matching on this, not by subclassing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    /// pi-coding-agent from the pi-mono monorepo.
    PiMono,
    /// Factory AI's `droid` CLI.
    FactoryDroid,
    /// Anything fully described by configuration.
    #[default]
    Custom,
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentKind::PiMono => write!(f, "pi-mono"),
            AgentKind::FactoryDroid => write!(f, "factory-droid"),
            AgentKind::Custom => write!(f, "custom"),
        }
    }
}

/// How the agent's output should be treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Plain text; no extraction.
    #[default]
    Raw,
    /// The output ends with a JSON payload to extract.
    Json,
}

impl OutputMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "raw" | "text" => Some(OutputMode::Raw),
            "json" => Some(OutputMode::Json),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputMode::Raw => write!(f, "raw"),
            OutputMode::Json => write!(f, "json"),
        }
    }
}

/// One entry of a credential allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialSpec {
    /// Primary variable name.
    pub name: String,

    /// Names tried, in order, when the primary is unset.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,

    /// Fail the attempt before spawn when nothing is set.
    #[serde(default)]
    pub required: bool,
}

impl CredentialSpec {
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alternatives: Vec::new(),
            required: false,
        }
    }

    pub fn required(name: impl Into<String>) -> Self {
        Self {
            required: true,
            ..Self::optional(name)
        }
    }

    pub fn with_alternatives<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives = names.into_iter().map(Into::into).collect();
        self
    }

    /// Primary name followed by the alternatives.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.alternatives.iter().map(String::as_str))
    }
}

/// Host configuration files copied into the agent's sandbox HOME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStaging {
    /// Source directory relative to the host HOME (e.g. `.factory`).
    pub source_dir: String,

    /// Target directory relative to the sandbox HOME.
    pub target_dir: String,

    /// File names to copy, in priority order.
    pub files: Vec<String>,

    /// Variables whose `${NAME}` references are substituted in `patch_files`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_env: Vec<String>,

    /// Files that get `${NAME}` substitution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patch_files: Vec<String>,
}

/// What a descriptor is able to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub needs_install_template: bool,
    pub supports_bundle_restore: bool,
    pub supports_json_output: bool,
}

/// Immutable definition of an installable agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Agent identifier (the key in the lookup table).
    #[serde(default, skip_serializing)]
    pub id: String,

    /// Human-readable name.
    #[serde(default)]
    pub name: String,

    /// Agent family.
    #[serde(default)]
    pub kind: AgentKind,

    /// Version reported in records and passed to install templates.
    #[serde(default = "default_version")]
    pub version: String,

    /// Name of the install template; `None` means nothing to install.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_template: Option<String>,

    /// Invocation command template.
    ///
    /// Split into arguments first, then each argument is rendered on its own,
    /// so a parameter value can never introduce additional arguments. An
    /// argument that is a lone placeholder rendering to an empty string is
    /// dropped, which is how optional flags are expressed.
    pub command: String,

    /// Credential allow-list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<CredentialSpec>,

    /// Default output mode.
    #[serde(default)]
    pub output_mode: OutputMode,

    /// Default template variables (model, provider, flags...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub defaults: BTreeMap<String, String>,

    /// Non-secret environment set for the agent process.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,

    /// Wall-clock budget (overrides the config default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Whether a pre-built bundle may replace the install script.
    #[serde(default = "default_true")]
    pub bundle_restore: bool,

    /// Host configuration files to stage before launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_staging: Option<ConfigStaging>,

    /// Unknown fields preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_true() -> bool {
    true
}

impl AgentDescriptor {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            needs_install_template: self.install_template.is_some(),
            supports_bundle_restore: self.bundle_restore,
            supports_json_output: match self.kind {
                AgentKind::PiMono => true,
                AgentKind::FactoryDroid => false,
                AgentKind::Custom => self.output_mode == OutputMode::Json,
            },
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_descriptor_from_yaml_with_defaults() {
        let yaml = r#"
command: "my-agent --model {model} {instruction}"
credentials:
  - name: MY_KEY
    required: true
"#;
        let d: AgentDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(d.kind, AgentKind::Custom);
        assert_eq!(d.version, "1.0.0");
        assert_eq!(d.output_mode, OutputMode::Raw);
        assert!(d.bundle_restore);
        assert!(d.credentials[0].required);
        assert!(d.install_template.is_none());
    }

    #[test]
    fn capabilities_follow_kind_and_mode() {
        let pi = AgentDescriptor {
            kind: AgentKind::PiMono,
            install_template: Some("pi-mono".into()),
            bundle_restore: true,
            ..Default::default()
        };
        let caps = pi.capabilities();
        assert!(caps.needs_install_template && caps.supports_bundle_restore);
        assert!(caps.supports_json_output);

        let droid = AgentDescriptor {
            kind: AgentKind::FactoryDroid,
            output_mode: OutputMode::Json,
            ..Default::default()
        };
        assert!(!droid.capabilities().supports_json_output);

        let custom = AgentDescriptor {
            output_mode: OutputMode::Json,
            ..Default::default()
        };
        assert!(custom.capabilities().supports_json_output);
        assert!(!custom.capabilities().needs_install_template);
    }

    #[test]
    fn output_mode_accepts_text_alias() {
        assert_eq!(OutputMode::parse("text"), Some(OutputMode::Raw));
        assert_eq!(OutputMode::parse("JSON"), Some(OutputMode::Json));
        assert_eq!(OutputMode::parse("xml"), None);
    }

    #[test]
    fn candidates_start_with_primary() {
        let spec = CredentialSpec::optional("A").with_alternatives(["B", "C"]);
        assert_eq!(spec.candidates().collect::<Vec<_>>(), vec!["A", "B", "C"]);
    }
}
