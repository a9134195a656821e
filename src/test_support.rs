use crate::context::RunContext;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway sandbox with its own logs directory.
pub(crate) struct TestSandbox {
    _dir: TempDir,
    pub(crate) ctx: RunContext,
}

impl TestSandbox {
    pub(crate) fn new() -> Self {
        Self::with_env(&[("PATH", "/usr/bin:/bin")])
    }

    pub(crate) fn with_env(pairs: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        let sandbox = dir.path().join("sandbox");
        std::fs::create_dir_all(&sandbox).unwrap();
        let env: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let ctx = RunContext::new(&sandbox, dir.path().join("logs"), env);
        Self { _dir: dir, ctx }
    }

    pub(crate) fn bundle_path(&self, agent_id: &str) -> PathBuf {
        self.ctx
            .sandbox_dir
            .join(".agent-bundles")
            .join(format!("{}-bundle.tgz", agent_id))
    }
}

/// Write a gzip tarball containing `files` (path, content) to `path`.
pub(crate) fn build_bundle(path: &Path, files: &[(&str, &str)]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let file = std::fs::File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(if name.starts_with("bin/") { 0o755 } else { 0o644 });
        header.set_cksum();
        builder
            .append_data(&mut header, name, content.as_bytes())
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}
