use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::{RuntimeError, RuntimeResult};

use super::target::RuntimeTarget;

pub const VERSION_FILE: &str = "version.txt";

/// `{toolkit_version}-{target}`, the directory name and marker content of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeVersion {
    toolkit_version: String,
    target: String,
}

impl RuntimeVersion {
    pub fn new(toolkit_version: impl Into<String>, target: RuntimeTarget) -> Self {
        Self::with_target_string(toolkit_version, target.as_str())
    }

    pub fn with_target_string(toolkit_version: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            toolkit_version: toolkit_version.into(),
            target: target.into(),
        }
    }

    pub fn toolkit_version(&self) -> &str {
        &self.toolkit_version
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.toolkit_version, self.target)
    }
}

pub fn version_file_path(root: &Path) -> PathBuf {
    root.join(VERSION_FILE)
}

/// Reads the marker of `root`, trailing newlines trimmed.
pub fn read_version_marker(root: &Path) -> RuntimeResult<String> {
    let path = version_file_path(root);
    if !path.is_file() {
        return Err(RuntimeError::VersionFileMissing(root.to_path_buf()));
    }

    let raw = std::fs::read_to_string(&path).map_err(|source| RuntimeError::io(&path, source))?;
    Ok(raw.trim_end_matches(['\r', '\n']).to_string())
}

/// Exact string equality; there is no semantic version ordering.
pub fn check_version_marker(root: &Path, expected: &RuntimeVersion) -> RuntimeResult<()> {
    let found = read_version_marker(root)?;
    let expected = expected.to_string();
    if found != expected {
        return Err(RuntimeError::VersionMismatch {
            path: root.to_path_buf(),
            found,
            expected,
        });
    }
    Ok(())
}
