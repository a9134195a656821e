//! Named install templates.

use super::render::{TemplateParams, placeholders, render_template};
use crate::error::{HarnessError, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// An install script produced from a named template.
///
/// Only the installer executes this; rendering never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScript {
    /// Name of the template the script was rendered from.
    pub template: String,
    /// Fully substituted script text.
    pub text: String,
    /// `sha256:<hex>` digest of `text`.
    pub digest: String,
}

impl RenderedScript {
    fn new(template: &str, text: String) -> Self {
        let digest = format!("sha256:{}", hex::encode(Sha256::digest(text.as_bytes())));
        Self {
            template: template.to_string(),
            text,
            digest,
        }
    }
}

/// Install templates keyed by name.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: BTreeMap<String, String>,
}

impl TemplateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any existing one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.templates.insert(name.into(), text.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Look up a template's source text.
    pub fn get(&self, name: &str) -> Result<&str> {
        self.templates.get(name).map(String::as_str).ok_or_else(|| {
            HarnessError::UserError(format!(
                "install template '{}' is not defined (known templates: {})",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    /// Render the named template into an install script.
    ///
    /// Fails with `MissingParameter` if any placeholder has no value; no
    /// partial script is returned in that case.
    pub fn render(&self, template_ref: &str, params: &TemplateParams) -> Result<RenderedScript> {
        let source = self.get(template_ref)?;
        let text = render_template(source, params)?;
        Ok(RenderedScript::new(template_ref, text))
    }

    /// Placeholder names the named template expects.
    pub fn parameters_of(&self, template_ref: &str) -> Result<Vec<String>> {
        Ok(placeholders(self.get(template_ref)?)?)
    }
}
