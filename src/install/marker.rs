//! `.installed` marker.
//!
//! Written atomically as the last step of a successful install. Its presence
//! alone means "installed"; the content is informational.

use crate::error::Result;
use crate::fs::atomic_write_json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MARKER_FILE: &str = ".installed";

/// Which path produced the install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPath {
    Bundle,
    Script,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallMarker {
    pub agent_id: String,
    pub version: String,
    pub path: InstallPath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<PathBuf>,
    pub installed_at: DateTime<Utc>,
}

pub fn marker_path(install_dir: &Path) -> PathBuf {
    install_dir.join(MARKER_FILE)
}

pub fn is_installed(install_dir: &Path) -> bool {
    marker_path(install_dir).is_file()
}

/// Read the marker, if present and parseable.
pub fn read(install_dir: &Path) -> Option<InstallMarker> {
    let content = std::fs::read_to_string(marker_path(install_dir)).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn write(install_dir: &Path, marker: &InstallMarker) -> Result<()> {
    atomic_write_json(marker_path(install_dir), marker)
}
