//! Credential forwarding.
//!
//! An agent declares an allow-list of environment variable names. `collect`
//! copies exactly those (when present) out of the ambient snapshot; nothing
//! else from the host environment reaches the agent.
//!
//! Values are secrets. `ForwardedEnv` never prints them, and every forwarded
//! value is registered with a `Redactor` so the log sink masks it even if the
//! agent echoes it back.

use crate::agent::CredentialSpec;
use crate::error::{HarnessError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

/// Replacement written in place of a secret value.
pub const REDACTED: &str = "[REDACTED]";

/// Credentials selected for one agent process.
#[derive(Clone, Default)]
pub struct ForwardedEnv {
    vars: BTreeMap<String, String>,
}

impl ForwardedEnv {
    pub fn names(&self) -> Vec<&str> {
        self.vars.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Name/value pairs for the child environment.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build a redactor covering every forwarded value.
    pub fn redactor(&self) -> Redactor {
        Redactor::new(self.vars.values().cloned())
    }
}

impl fmt::Debug for ForwardedEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedEnv")
            .field("names", &self.names())
            .finish()
    }
}

/// Select allow-listed credentials from the ambient environment.
///
/// Each spec forwards the first of its names (primary, then alternatives)
/// that is set to a non-empty value. Specs with nothing set are skipped
/// unless marked `required`, which fails with `MissingCredential`.
pub fn collect(
    allow_list: &[CredentialSpec],
    ambient_env: &BTreeMap<String, String>,
) -> Result<ForwardedEnv> {
    let mut vars = BTreeMap::new();

    for spec in allow_list {
        let found = spec
            .candidates()
            .find_map(|name| match ambient_env.get(name) {
                Some(value) if !value.is_empty() => Some((name, value)),
                _ => None,
            });

        match found {
            Some((name, value)) => {
                vars.insert(name.to_string(), value.clone());
            }
            None if spec.required => {
                return Err(HarnessError::MissingCredential(spec.name.clone()));
            }
            None => {
                tracing::debug!(credential = %spec.name, "optional credential not set");
            }
        }
    }

    Ok(ForwardedEnv { vars })
}

/// Masks known secret values in text.
#[derive(Clone, Default)]
pub struct Redactor {
    secrets: Vec<String>,
}

impl Redactor {
    pub fn new<I: IntoIterator<Item = String>>(secrets: I) -> Self {
        let mut secrets: Vec<String> = secrets.into_iter().filter(|s| !s.is_empty()).collect();
        // Longest first so a secret that contains another is masked whole.
        secrets.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        secrets.dedup();
        Self { secrets }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn redact<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if !self.secrets.iter().any(|s| text.contains(s.as_str())) {
            return Cow::Borrowed(text);
        }
        let mut out = text.to_string();
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTED);
            }
        }
        Cow::Owned(out)
    }
}

impl fmt::Debug for Redactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Redactor({} secrets)", self.secrets.len())
    }
}
