//! Placeholder substitution engine.
//!
//! # Syntax
//!
//! - `{name}` - Substitutes the value of parameter `name`
//! - `{{` - Renders as literal `{`
//! - `}}` - Renders as literal `}`
//!
//! Unresolved placeholders are a hard error. Nothing is ever left verbatim in
//! the output, so a rendered install script can never contain a stray `{name}`.

use std::collections::BTreeMap;
use thiserror::Error;

/// Parameters handed to the renderer. Ordered so that iteration is stable.
pub type TemplateParams = BTreeMap<String, String>;

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A placeholder was referenced but no parameter was provided.
    #[error("missing parameter '{name}' at position {position} in template")]
    MissingParameter { name: String, position: usize },

    /// A `{` was found without a matching `}`.
    #[error("unmatched '{{' at position {position} in template (use '{{{{' for a literal brace)")]
    UnmatchedBrace { position: usize },

    /// An empty placeholder was found (e.g., `{}`).
    #[error("empty placeholder '{{}}' at position {position} in template")]
    EmptyPlaceholder { position: usize },
}

enum Segment<'a> {
    Text(&'a str),
    Brace(char),
    Placeholder { name: &'a str, position: usize },
}

/// Split a template into literal text and placeholders.
fn scan(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                if literal_start < i {
                    segments.push(Segment::Text(&template[literal_start..i]));
                }
                if bytes.get(i + 1) == Some(&b'{') {
                    segments.push(Segment::Brace('{'));
                    i += 2;
                } else {
                    let close = template[i + 1..]
                        .find('}')
                        .ok_or(TemplateError::UnmatchedBrace { position: i })?;
                    let name = template[i + 1..i + 1 + close].trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder { position: i });
                    }
                    segments.push(Segment::Placeholder { name, position: i });
                    i += close + 2;
                }
                literal_start = i;
            }
            b'}' => {
                if literal_start < i {
                    segments.push(Segment::Text(&template[literal_start..i]));
                }
                segments.push(Segment::Brace('}'));
                // `}}` collapses to one brace, a lone `}` passes through.
                i += if bytes.get(i + 1) == Some(&b'}') { 2 } else { 1 };
                literal_start = i;
            }
            _ => i += 1,
        }
    }
    if literal_start < bytes.len() {
        segments.push(Segment::Text(&template[literal_start..]));
    }

    Ok(segments)
}

/// Render a template string by substituting parameters.
///
/// Rendering is pure: identical inputs always produce identical output.
///
/// # Examples
///
/// ```
/// use agentrig::template::{TemplateParams, render_template};
///
/// let mut params = TemplateParams::new();
/// params.insert("install_dir".to_string(), "/opt/pi".to_string());
///
/// let script = render_template("mkdir -p {install_dir}", &params).unwrap();
/// assert_eq!(script, "mkdir -p /opt/pi");
/// ```
pub fn render_template(template: &str, params: &TemplateParams) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());

    for segment in scan(template)? {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Brace(c) => out.push(c),
            Segment::Placeholder { name, position } => match params.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    return Err(TemplateError::MissingParameter {
                        name: name.to_string(),
                        position,
                    });
                }
            },
        }
    }

    Ok(out)
}

/// List the distinct placeholder names a template references, in first-use order.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for segment in scan(template)? {
        if let Segment::Placeholder { name, .. } = segment
            && !names.iter().any(|n| n == name)
        {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Build a parameter map from a list of key-value pairs.
pub fn params<I, K, V>(pairs: I) -> TemplateParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
