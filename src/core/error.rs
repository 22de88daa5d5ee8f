use std::path::PathBuf;
use thiserror::Error;

use crate::core::runtime::layout::RuntimeDirKind;

/// Central error type for the runtime locator/installer.
/// Every module returns `Result<T, RuntimeError>`.
#[derive(Debug, Error)]
pub enum RuntimeError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Platform ────────────────────────────────────────
    #[error("Unsupported runtime target: {0}")]
    UnsupportedTarget(String),

    // ── Runtime directory ───────────────────────────────
    #[error("Runtime directory doesn't exist: {0:?}")]
    RuntimeDirMissing(PathBuf),

    #[error("The version.txt file doesn't exist in {0:?}")]
    VersionFileMissing(PathBuf),

    #[error("The version of the runtime directory {path:?} was {found:?}, but expected {expected:?}")]
    VersionMismatch {
        path: PathBuf,
        found: String,
        expected: String,
    },

    #[error("{kind} directory didn't exist: {path:?}")]
    MissingDirectory { kind: RuntimeDirKind, path: PathBuf },

    #[error("Unable to preload library {library:?}: {reason}")]
    PreloadFailed { library: PathBuf, reason: String },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Transfer of {url} failed: {source}")]
    Transfer {
        url: String,
        source: std::io::Error,
    },

    #[error("SHA-256 mismatch for {url}: expected {expected}, got {actual}")]
    Sha256Mismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Insufficient disk space at {path:?}: available={available} required={required}")]
    InsufficientDiskSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },

    // ── Archive ─────────────────────────────────────────
    #[error("Archive extraction into {destination:?} failed: {source}")]
    Extraction {
        destination: PathBuf,
        source: std::io::Error,
    },

    // ── Preconditions ───────────────────────────────────
    #[error("Destination directory {0:?} doesn't exist")]
    DestinationMissing(PathBuf),

    #[error("Destination directory {0:?} is not empty")]
    DestinationNotEmpty(PathBuf),

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four failure classes callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Fatal, no fallback.
    UnsupportedPlatform,
    /// Fatal for one candidate; `discover_or_install` falls through to download.
    InvalidRuntime,
    /// Network or extraction failure, surfaced verbatim.
    Download,
    /// Programmer error: bad destination or missing argument.
    Precondition,
}

impl RuntimeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RuntimeError::UnsupportedTarget(_) => ErrorClass::UnsupportedPlatform,
            RuntimeError::RuntimeDirMissing(_)
            | RuntimeError::VersionFileMissing(_)
            | RuntimeError::VersionMismatch { .. }
            | RuntimeError::MissingDirectory { .. }
            | RuntimeError::PreloadFailed { .. }
            | RuntimeError::Io { .. }
            | RuntimeError::Json(_) => ErrorClass::InvalidRuntime,
            RuntimeError::Http(_)
            | RuntimeError::DownloadFailed { .. }
            | RuntimeError::Transfer { .. }
            | RuntimeError::Sha256Mismatch { .. }
            | RuntimeError::InsufficientDiskSpace { .. }
            | RuntimeError::Extraction { .. } => ErrorClass::Download,
            RuntimeError::DestinationMissing(_)
            | RuntimeError::DestinationNotEmpty(_)
            | RuntimeError::MissingArgument(_) => ErrorClass::Precondition,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RuntimeError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

// ── Serialization for JSON reports ──────────────────────
impl serde::Serialize for RuntimeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
