use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::{RuntimeError, RuntimeResult};

const EXECUTABLE_RUNTIMES_DIR: &str = "qt-runtimes";
const USER_RUNTIMES_DIR: &str = ".qml-runtimes";

/// Which candidate roots a lookup walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    All,
    ExecutableDirectory,
    UserDirectory,
}

impl SearchScope {
    fn includes_executable(self) -> bool {
        matches!(self, SearchScope::All | SearchScope::ExecutableDirectory)
    }

    fn includes_user(self) -> bool {
        matches!(self, SearchScope::All | SearchScope::UserDirectory)
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchScope::All => "all",
            SearchScope::ExecutableDirectory => "executable",
            SearchScope::UserDirectory => "user",
        };
        f.write_str(name)
    }
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(SearchScope::All),
            "executable" | "executable_directory" | "exe" => Ok(SearchScope::ExecutableDirectory),
            "user" | "user_directory" => Ok(SearchScope::UserDirectory),
            other => Err(format!(
                "unknown search scope '{other}' (expected all, executable or user)"
            )),
        }
    }
}

/// Candidate parent directories holding `{version}-{target}` bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoots {
    executable_root: Option<PathBuf>,
    user_root: PathBuf,
}

impl SearchRoots {
    pub fn new(executable_root: Option<PathBuf>, user_root: PathBuf) -> Self {
        Self {
            executable_root,
            user_root,
        }
    }

    pub fn detect() -> Self {
        Self::new(default_executable_root(), default_user_root())
    }

    pub fn executable_root(&self) -> Option<&Path> {
        self.executable_root.as_deref()
    }

    pub fn user_root(&self) -> &Path {
        &self.user_root
    }

    /// Roots for `scope`, executable directory first, then user directory.
    pub fn roots(&self, scope: SearchScope) -> Vec<&Path> {
        let mut out = Vec::with_capacity(2);
        if scope.includes_executable() {
            if let Some(root) = self.executable_root.as_deref() {
                out.push(root);
            }
        }
        if scope.includes_user() {
            out.push(self.user_root.as_path());
        }
        out
    }

    pub fn ensure_user_root(&self) -> RuntimeResult<&Path> {
        std::fs::create_dir_all(&self.user_root)
            .map_err(|source| RuntimeError::io(&self.user_root, source))?;
        Ok(&self.user_root)
    }
}

pub fn default_executable_root() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join(EXECUTABLE_RUNTIMES_DIR))
}

pub fn default_user_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(USER_RUNTIMES_DIR)
}
