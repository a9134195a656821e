//! Pre-built bundle lookup.
//!
//! A bundle is a gzip tarball of an agent's install tree, dropped next to the
//! sandbox by whoever prepares the benchmark image:
//!
//! ```text
//! <sandbox>/.agent-bundles/<agent_id>-bundle.tgz
//! ```
//!
//! Presence is what matters. The file is only sniffed for the gzip magic so
//! an obviously broken artifact falls back to the install script instead of
//! failing the restore half-way.

use crate::agent::DEFAULT_BUNDLE_DIR;
use crate::context::RunContext;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Whether the fast path is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleResolution {
    UseBundle(PathBuf),
    NoBundle,
}

/// Finds bundles in a directory (relative to the sandbox unless absolute).
#[derive(Debug, Clone)]
pub struct BundleResolver {
    dir: PathBuf,
}

impl Default for BundleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BUNDLE_DIR)
    }
}

impl BundleResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where the bundle for `agent_id` would be.
    pub fn bundle_path(&self, agent_id: &str, ctx: &RunContext) -> PathBuf {
        ctx.sandbox_path(&self.dir)
            .join(format!("{}-bundle.tgz", agent_id))
    }

    pub fn resolve(&self, agent_id: &str, ctx: &RunContext) -> BundleResolution {
        let path = self.bundle_path(agent_id, ctx);
        if !path.is_file() {
            tracing::debug!(agent = agent_id, path = %path.display(), "no bundle");
            return BundleResolution::NoBundle;
        }

        match has_gzip_magic(&path) {
            Ok(true) => BundleResolution::UseBundle(path),
            Ok(false) => {
                tracing::warn!(path = %path.display(), "bundle is not a gzip file; ignoring");
                BundleResolution::NoBundle
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bundle is unreadable; ignoring");
                BundleResolution::NoBundle
            }
        }
    }
}

fn has_gzip_magic(path: &Path) -> std::io::Result<bool> {
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == GZIP_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestSandbox, build_bundle};

    #[test]
    fn missing_bundle_is_no_bundle() {
        let sandbox = TestSandbox::new();
        assert_eq!(
            BundleResolver::default().resolve("pi-mono", &sandbox.ctx),
            BundleResolution::NoBundle
        );
    }

    #[test]
    fn present_bundle_is_used() {
        let sandbox = TestSandbox::new();
        let path = sandbox.bundle_path("pi-mono");
        build_bundle(&path, &[("bin/pi", "#!/bin/sh\n")]);

        assert_eq!(
            BundleResolver::default().resolve("pi-mono", &sandbox.ctx),
            BundleResolution::UseBundle(path)
        );
    }

    #[test]
    fn non_gzip_bundle_is_ignored() {
        let sandbox = TestSandbox::new();
        let path = sandbox.bundle_path("pi-mono");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not a tarball").unwrap();

        assert_eq!(
            BundleResolver::default().resolve("pi-mono", &sandbox.ctx),
            BundleResolution::NoBundle
        );
    }

    #[test]
    fn absolute_bundle_dir_is_respected() {
        let sandbox = TestSandbox::new();
        let cache = tempfile::TempDir::new().unwrap();
        let resolver = BundleResolver::new(cache.path());
        assert_eq!(
            resolver.bundle_path("factory-droid", &sandbox.ctx),
            cache.path().join("factory-droid-bundle.tgz")
        );
    }
}
