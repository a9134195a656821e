//! Error types for agentrig.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.
//! Only failures that happen before the agent process is spawned surface as
//! errors; everything after spawn is captured in the `ExecutionRecord`.

use crate::exit_codes;
use crate::template::TemplateError;
use thiserror::Error;

/// Main error type for agentrig operations.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// A template references a placeholder that has no parameter.
    #[error("missing template parameter '{0}'")]
    MissingParameter(String),

    /// A template is syntactically broken (unterminated or empty placeholder).
    #[error("invalid template: {0}")]
    TemplateSyntax(String),

    /// A credential marked as required is absent from the ambient environment.
    #[error("missing required credential '{0}'\nFix: export it in the environment that launches the harness.")]
    MissingCredential(String),

    /// The install step failed and the attempt cannot proceed.
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// No descriptor is registered under the requested agent id.
    #[error("unknown agent '{agent}' (available: {available})")]
    UnknownAgent { agent: String, available: String },

    /// The agent ran but did not exit cleanly (CLI edge only).
    #[error("agent failed: {0}")]
    AgentFailed(String),

    /// The attempt was cancelled (CLI edge only).
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// User provided invalid arguments or the sandbox is in an invalid state.
    #[error("{0}")]
    UserError(String),
}

impl HarnessError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::MissingParameter(_)
            | HarnessError::TemplateSyntax(_)
            | HarnessError::MissingCredential(_) => exit_codes::MISSING_INPUT,
            HarnessError::InstallFailed(_) => exit_codes::INSTALL_FAILURE,
            HarnessError::AgentFailed(_) => exit_codes::AGENT_FAILURE,
            HarnessError::Cancelled(_) => exit_codes::CANCELLED,
            HarnessError::UnknownAgent { .. } | HarnessError::UserError(_) => {
                exit_codes::USER_ERROR
            }
        }
    }
}

impl From<TemplateError> for HarnessError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::MissingParameter { name, .. } => HarnessError::MissingParameter(name),
            other => HarnessError::TemplateSyntax(other.to_string()),
        }
    }
}

/// Result type alias for agentrig operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_execution_errors_share_missing_input_code() {
        assert_eq!(
            HarnessError::MissingParameter("token".into()).exit_code(),
            exit_codes::MISSING_INPUT
        );
        assert_eq!(
            HarnessError::MissingCredential("OPENAI_API_KEY".into()).exit_code(),
            exit_codes::MISSING_INPUT
        );
    }

    #[test]
    fn install_and_run_failures_are_distinct() {
        assert_eq!(
            HarnessError::InstallFailed("exit 1".into()).exit_code(),
            exit_codes::INSTALL_FAILURE
        );
        assert_eq!(
            HarnessError::AgentFailed("exit 2".into()).exit_code(),
            exit_codes::AGENT_FAILURE
        );
        assert_eq!(
            HarnessError::Cancelled("timeout".into()).exit_code(),
            exit_codes::CANCELLED
        );
    }

    #[test]
    fn template_error_maps_to_missing_parameter() {
        let err: HarnessError = TemplateError::MissingParameter {
            name: "token".into(),
            position: 4,
        }
        .into();
        assert!(matches!(err, HarnessError::MissingParameter(ref n) if n == "token"));
        assert_eq!(err.to_string(), "missing template parameter 'token'");
    }

    #[test]
    fn unknown_agent_lists_available() {
        let err = HarnessError::UnknownAgent {
            agent: "nope".into(),
            available: "factory-droid, pi-mono".into(),
        };
        assert_eq!(
            err.to_string(),
            "unknown agent 'nope' (available: factory-droid, pi-mono)"
        );
    }
}
