//! Command line construction.

use crate::credentials::Redactor;
use crate::error::{HarnessError, Result};
use crate::template::{TemplateParams, placeholders, render_template};

/// A fully rendered argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Split `template` into arguments, then render each argument.
    ///
    /// Rendering after splitting means a value containing spaces or quotes
    /// stays a single argument. An argument that is exactly one placeholder
    /// and renders empty is dropped, so optional flags can be expressed as
    /// `{reasoning_flag}`.
    pub fn build(template: &str, vars: &TemplateParams) -> Result<Self> {
        let tokens = shell_words::split(template).map_err(|e| {
            HarnessError::UserError(format!(
                "failed to parse agent command '{}': {}\n\
                 Fix: check for unmatched quotes or invalid escape sequences.",
                template, e
            ))
        })?;

        let mut argv = Vec::with_capacity(tokens.len());
        for token in tokens {
            let rendered = render_template(&token, vars)?;
            if rendered.is_empty() && is_lone_placeholder(&token) {
                continue;
            }
            argv.push(rendered);
        }

        let mut argv = argv.into_iter();
        let program = argv.next().ok_or_else(|| {
            HarnessError::UserError(format!(
                "agent command is empty after rendering: '{}'",
                template
            ))
        })?;

        Ok(Self {
            program,
            args: argv.collect(),
        })
    }

    /// Shell-quoted command line with secrets masked, for logs and records.
    pub fn display(&self, redactor: &Redactor) -> String {
        let line = shell_words::join(std::iter::once(&self.program).chain(self.args.iter()));
        redactor.redact(&line).into_owned()
    }
}

fn is_lone_placeholder(token: &str) -> bool {
    let trimmed = token.trim();
    trimmed.starts_with('{')
        && trimmed.ends_with('}')
        && !trimmed.starts_with("{{")
        && placeholders(trimmed).is_ok_and(|names| names.len() == 1)
        && trimmed[1..trimmed.len() - 1].find(['{', '}']).is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::params;

    #[test]
    fn values_never_split_into_extra_arguments() {
        let inv = Invocation::build(
            "pi --model {model} {instruction}",
            &params([("model", "gpt-4o"), ("instruction", "fix it; rm -rf / 'now'")]),
        )
        .unwrap();
        assert_eq!(inv.program, "pi");
        assert_eq!(inv.args, vec!["--model", "gpt-4o", "fix it; rm -rf / 'now'"]);
    }

    #[test]
    fn empty_lone_placeholder_is_dropped() {
        let inv = Invocation::build(
            "droid exec -m {m} {flag} {value} --auto {auto} {instruction}",
            &params([
                ("m", "gpt-5-codex"),
                ("flag", ""),
                ("value", ""),
                ("auto", "high"),
                ("instruction", ""),
            ]),
        )
        .unwrap();
        assert_eq!(inv.args, vec!["exec", "-m", "gpt-5-codex", "--auto", "high"]);
    }

    #[test]
    fn empty_embedded_placeholder_is_kept() {
        let inv = Invocation::build("agent --opt={v}", &params([("v", "")])).unwrap();
        assert_eq!(inv.args, vec!["--opt="]);
    }

    #[test]
    fn missing_parameter_is_reported() {
        let err = Invocation::build("agent {nope}", &TemplateParams::new()).unwrap_err();
        assert!(matches!(err, HarnessError::MissingParameter(ref n) if n == "nope"));
    }

    #[test]
    fn display_masks_secrets() {
        let inv = Invocation::build("agent --key {k}", &params([("k", "sk-123")])).unwrap();
        let redactor = Redactor::new(["sk-123".to_string()]);
        assert_eq!(inv.display(&redactor), "agent --key [REDACTED]");
    }
}
