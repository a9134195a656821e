//! Structured result extraction.
//!
//! Agents running in json mode print their result as JSON at the end of their
//! output, usually surrounded by progress noise. Extraction picks the last
//! well-formed JSON object or array in the captured log. A missing or broken
//! payload is recorded, never fatal: the attempt still has its exit code and
//! full log.

use crate::context::RunContext;
use crate::error::Result;
use crate::fs::atomic_write_json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Result of looking for a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// A payload was found.
    Structured { value: Value },
    /// No usable payload.
    ExtractionFailed { reason: String },
}

impl ExtractionOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExtractionOutcome::Structured { value } => Some(value),
            ExtractionOutcome::ExtractionFailed { .. } => None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        ExtractionOutcome::ExtractionFailed {
            reason: reason.into(),
        }
    }
}

/// Extract the payload from a log file.
pub fn extract(log_path: &Path) -> ExtractionOutcome {
    match std::fs::read(log_path) {
        Ok(bytes) => extract_from_str(&String::from_utf8_lossy(&bytes)),
        Err(e) => ExtractionOutcome::failed(format!(
            "log '{}' is not readable: {}",
            log_path.display(),
            e
        )),
    }
}

/// Extract the payload from captured output.
///
/// Single-line documents are found by scanning lines from the end. When none
/// parses, a pretty-printed document is accepted if it starts on a line that
/// is exactly `{` or `[` and runs to the end of the output.
pub fn extract_from_str(text: &str) -> ExtractionOutcome {
    if text.trim().is_empty() {
        return ExtractionOutcome::failed("output is empty");
    }

    for line in text.lines().rev() {
        let line = line.trim();
        if !(line.starts_with('{') || line.starts_with('[')) {
            continue;
        }
        if let Ok(value) = serde_json::from_str::<Value>(line)
            && (value.is_object() || value.is_array())
        {
            return ExtractionOutcome::Structured { value };
        }
    }

    if let Some(value) = trailing_document(text) {
        return ExtractionOutcome::Structured { value };
    }

    ExtractionOutcome::failed("no well-formed JSON object or array found in output")
}

/// Earliest `{`/`[` line from which the rest of the text is one JSON value.
fn trailing_document(text: &str) -> Option<Value> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim();
        if trimmed != "{" && trimmed != "[" {
            continue;
        }

        let rest = &text[start..];
        let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next()
            && rest[stream.byte_offset()..].trim().is_empty()
        {
            return Some(value);
        }
    }
    None
}

/// Write a structured payload to `<logs>/results.json`.
///
/// Returns the path when something was written.
pub fn persist(outcome: &ExtractionOutcome, ctx: &RunContext) -> Result<Option<PathBuf>> {
    match outcome.value() {
        Some(value) => {
            let path = ctx.results_path();
            atomic_write_json(&path, value)?;
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn trailing_line_after_noise() {
        assert_eq!(
            extract_from_str("noise\n{\"result\": \"ok\"}\n"),
            ExtractionOutcome::Structured {
                value: json!({"result": "ok"})
            }
        );
    }

    #[test]
    fn noise_only_fails() {
        assert!(matches!(
            extract_from_str("noise\n"),
            ExtractionOutcome::ExtractionFailed { .. }
        ));
        assert!(matches!(
            extract_from_str(""),
            ExtractionOutcome::ExtractionFailed { .. }
        ));
    }

    #[test]
    fn last_well_formed_line_wins() {
        let text = "{\"type\":\"start\"}\n{\"type\":\"end\",\"n\":2}\n{\"broken\":\nbye\n";
        assert_eq!(
            extract_from_str(text).value(),
            Some(&json!({"type": "end", "n": 2}))
        );
    }

    #[test]
    fn harness_notes_are_not_json() {
        let text = "[1, 2]\n[agentrig] process group terminated (timeout)\n";
        assert_eq!(extract_from_str(text).value(), Some(&json!([1, 2])));
    }

    #[test]
    fn pretty_printed_trailing_document() {
        let text = "working...\n{\n  \"files\": [\n    {\n      \"path\": \"a.rs\"\n    }\n  ],\n  \"ok\": true\n}\n";
        assert_eq!(
            extract_from_str(text).value(),
            Some(&json!({"files": [{"path": "a.rs"}], "ok": true}))
        );
    }

    #[test]
    fn pretty_printed_document_followed_by_noise_fails() {
        let text = "{\n  \"a\": 1\n}\nall done\n";
        assert!(extract_from_str(text).value().is_none());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let line = serde_json::to_string(&ExtractionOutcome::failed("nothing")).unwrap();
        assert_eq!(line, r#"{"status":"extraction_failed","reason":"nothing"}"#);
    }

    #[test]
    fn persist_writes_results_json() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = RunContext::new(temp_dir.path(), temp_dir.path().join("logs"), BTreeMap::new());

        let written = persist(
            &ExtractionOutcome::Structured {
                value: json!({"result": "ok"}),
            },
            &ctx,
        )
        .unwrap();
        assert_eq!(written, Some(ctx.results_path()));
        let saved: Value =
            serde_json::from_str(&std::fs::read_to_string(ctx.results_path()).unwrap()).unwrap();
        assert_eq!(saved, json!({"result": "ok"}));

        assert_eq!(persist(&ExtractionOutcome::failed("x"), &ctx).unwrap(), None);
    }

    #[test]
    fn unreadable_log_is_extraction_failure() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = extract(&temp_dir.path().join("missing.log"));
        assert!(matches!(outcome, ExtractionOutcome::ExtractionFailed { ref reason } if reason.contains("not readable")));
    }
}
