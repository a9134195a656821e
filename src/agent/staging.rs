//! Host configuration staging.
//!
//! Some agents authenticate through files under the user's HOME rather than
//! environment variables (Factory's `~/.factory/auth.json`). Staging copies
//! the listed files into the sandbox HOME the agent process receives, so the
//! agent never sees the real HOME.

use super::descriptor::ConfigStaging;
use crate::context::RunContext;
use crate::error::{HarnessError, Result};
use crate::fs::atomic_write;
use std::fs;
use std::path::PathBuf;

/// Files staged for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedConfig {
    pub target_dir: PathBuf,
    pub staged: Vec<String>,
    pub missing: Vec<String>,
}

/// Copy the configured files from the host HOME into the sandbox HOME.
///
/// A missing source directory or file is a warning, not an error: the agent
/// may still authenticate through forwarded credentials.
pub fn stage(staging: &ConfigStaging, ctx: &RunContext) -> Result<StagedConfig> {
    let target_dir = ctx.home_dir().join(&staging.target_dir);
    let mut result = StagedConfig {
        target_dir: target_dir.clone(),
        ..Default::default()
    };

    let Some(host_home) = ctx.env_var("HOME") else {
        tracing::warn!("HOME is not set; skipping config staging");
        result.missing = staging.files.clone();
        return Ok(result);
    };
    let source_dir = PathBuf::from(host_home).join(&staging.source_dir);

    if !source_dir.is_dir() {
        tracing::warn!(
            source = %source_dir.display(),
            "config directory not found on host; agent may fail to authenticate"
        );
        result.missing = staging.files.clone();
        return Ok(result);
    }

    fs::create_dir_all(&target_dir).map_err(|e| {
        HarnessError::UserError(format!(
            "failed to create '{}': {}",
            target_dir.display(),
            e
        ))
    })?;

    for name in &staging.files {
        let source = source_dir.join(name);
        if !source.is_file() {
            tracing::debug!(file = %name, "config file not present on host");
            result.missing.push(name.clone());
            continue;
        }

        let mut content = fs::read(&source).map_err(|e| {
            HarnessError::UserError(format!("failed to read '{}': {}", source.display(), e))
        })?;

        if staging.patch_files.contains(name) {
            match String::from_utf8(content) {
                Ok(text) => content = substitute_env(&text, &staging.patch_env, ctx).into_bytes(),
                Err(e) => {
                    tracing::warn!(file = %name, "config file is not UTF-8; copying unpatched");
                    content = e.into_bytes();
                }
            }
        }

        atomic_write(target_dir.join(name), &content)?;
        result.staged.push(name.clone());
    }

    tracing::info!(
        staged = result.staged.len(),
        total = staging.files.len(),
        target = %target_dir.display(),
        "staged host config files"
    );
    Ok(result)
}

/// Replace `${NAME}` for each listed name that is set in the snapshot.
/// References to unset names are left as they are.
fn substitute_env(text: &str, names: &[String], ctx: &RunContext) -> String {
    let mut out = text.to_string();
    for name in names {
        if let Some(value) = ctx.env_var(name) {
            out = out.replace(&format!("${{{}}}", name), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn staging() -> ConfigStaging {
        ConfigStaging {
            source_dir: ".factory".into(),
            target_dir: ".factory".into(),
            files: vec!["auth.json".into(), "settings.json".into(), "config.json".into()],
            patch_env: vec!["OPENAI_API_KEY".into(), "OLLAMA_API_KEY".into()],
            patch_files: vec!["config.json".into()],
        }
    }

    fn ctx(sandbox: &TempDir, host_home: &TempDir, extra: &[(&str, &str)]) -> RunContext {
        let mut env = BTreeMap::new();
        env.insert(
            "HOME".to_string(),
            host_home.path().to_string_lossy().to_string(),
        );
        for (k, v) in extra {
            env.insert(k.to_string(), v.to_string());
        }
        RunContext::new(sandbox.path(), sandbox.path().join("logs"), env)
    }

    #[test]
    fn copies_present_files_and_patches_config() {
        let sandbox = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let factory = host.path().join(".factory");
        fs::create_dir_all(&factory).unwrap();
        fs::write(factory.join("auth.json"), r#"{"token":"t"}"#).unwrap();
        fs::write(
            factory.join("config.json"),
            r#"{"openai":"${OPENAI_API_KEY}","ollama":"${OLLAMA_API_KEY}"}"#,
        )
        .unwrap();

        let ctx = ctx(&sandbox, &host, &[("OPENAI_API_KEY", "sk-1")]);
        let result = stage(&staging(), &ctx).unwrap();

        assert_eq!(result.staged, vec!["auth.json", "config.json"]);
        assert_eq!(result.missing, vec!["settings.json"]);

        let target = ctx.home_dir().join(".factory");
        assert_eq!(
            fs::read_to_string(target.join("config.json")).unwrap(),
            r#"{"openai":"sk-1","ollama":"${OLLAMA_API_KEY}"}"#
        );
        assert_eq!(
            fs::read_to_string(target.join("auth.json")).unwrap(),
            r#"{"token":"t"}"#
        );
    }

    #[test]
    fn missing_source_dir_is_not_an_error() {
        let sandbox = TempDir::new().unwrap();
        let host = TempDir::new().unwrap();
        let result = stage(&staging(), &ctx(&sandbox, &host, &[])).unwrap();
        assert!(result.staged.is_empty());
        assert_eq!(result.missing.len(), 3);
    }
}
