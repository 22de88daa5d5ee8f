use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::error::{RuntimeError, RuntimeResult};

use super::target::{PlatformFamily, RuntimeTarget};

pub const QT_DIR: &str = "qt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeDirKind {
    Plugins,
    Qml,
    Lib,
    Bin,
}

impl RuntimeDirKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            RuntimeDirKind::Plugins => "plugins",
            RuntimeDirKind::Qml => "qml",
            RuntimeDirKind::Lib => "lib",
            RuntimeDirKind::Bin => "bin",
        }
    }
}

impl fmt::Display for RuntimeDirKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RuntimeDirKind::Plugins => "Plugins",
            RuntimeDirKind::Qml => "QML",
            RuntimeDirKind::Lib => "Lib",
            RuntimeDirKind::Bin => "Bin",
        };
        f.write_str(label)
    }
}

/// A validated runtime, handed to whatever loads the native toolkit next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfiguredRuntime {
    root: PathBuf,
    plugins_dir: PathBuf,
    qml_dir: PathBuf,
    lib_dir: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
    preloaded: Vec<PathBuf>,
}

impl ConfiguredRuntime {
    pub fn new(
        root: PathBuf,
        plugins_dir: PathBuf,
        qml_dir: PathBuf,
        lib_dir: Option<PathBuf>,
        bin_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            root,
            plugins_dir,
            qml_dir,
            lib_dir,
            bin_dir,
            preloaded: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn qml_dir(&self) -> &Path {
        &self.qml_dir
    }

    pub fn lib_dir(&self) -> Option<&Path> {
        self.lib_dir.as_deref()
    }

    pub fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    pub fn preloaded(&self) -> &[PathBuf] {
        &self.preloaded
    }

    pub(crate) fn set_preloaded(&mut self, preloaded: Vec<PathBuf>) {
        self.preloaded = preloaded;
    }
}

pub fn require_dir(kind: RuntimeDirKind, path: PathBuf) -> RuntimeResult<PathBuf> {
    if path.is_dir() {
        Ok(path)
    } else {
        Err(RuntimeError::MissingDirectory { kind, path })
    }
}

/// Checks every required `{root}/qt/*` directory for `target` and returns
/// the resolved paths. Nothing is mutated.
pub fn resolve_layout(root: &Path, target: RuntimeTarget) -> RuntimeResult<ConfiguredRuntime> {
    let family = target
        .family()
        .ok_or_else(|| RuntimeError::UnsupportedTarget(target.to_string()))?;
    let qt = root.join(QT_DIR);
    let dir = |kind: RuntimeDirKind| require_dir(kind, qt.join(kind.dir_name()));

    let plugins_dir = dir(RuntimeDirKind::Plugins)?;
    let qml_dir = dir(RuntimeDirKind::Qml)?;
    let (lib_dir, bin_dir) = match family {
        PlatformFamily::Unix => (Some(dir(RuntimeDirKind::Lib)?), None),
        PlatformFamily::Windows => (None, Some(dir(RuntimeDirKind::Bin)?)),
    };

    Ok(ConfiguredRuntime::new(
        root.to_path_buf(),
        plugins_dir,
        qml_dir,
        lib_dir,
        bin_dir,
    ))
}
