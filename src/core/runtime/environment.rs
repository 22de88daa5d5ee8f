use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::Path;

use tracing::{debug, warn};

use crate::core::config::env_keys::exported;
use crate::core::error::{RuntimeError, RuntimeResult};

use super::layout::ConfiguredRuntime;

/// Where the compatibility environment variables are written.
///
/// The native toolkit only reads its plugin and import paths from the
/// process environment, so `ProcessEnvironment` is what a host uses in
/// production. `MemoryEnvironment` captures the same writes without
/// touching the process.
pub trait Environment: Send {
    fn var(&self, key: &str) -> Option<OsString>;
    fn set_var(&mut self, key: &str, value: &OsStr);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        std::env::set_var(key, value);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryEnvironment {
    vars: BTreeMap<String, OsString>,
}

impl MemoryEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vars(&self) -> &BTreeMap<String, OsString> {
        &self.vars
    }
}

impl Environment for MemoryEnvironment {
    fn var(&self, key: &str) -> Option<OsString> {
        self.vars.get(key).cloned()
    }

    fn set_var(&mut self, key: &str, value: &OsStr) {
        self.vars.insert(key.to_string(), value.to_os_string());
    }
}

/// Writes plugin/import paths and, for Windows layouts, the `PATH` prefix.
pub fn export_runtime(env: &mut dyn Environment, runtime: &ConfiguredRuntime) -> RuntimeResult<()> {
    set_once(env, exported::QT_PLUGIN_PATH, runtime.plugins_dir().as_os_str());
    set_once(env, exported::QML2_IMPORT_PATH, runtime.qml_dir().as_os_str());

    if let Some(bin_dir) = runtime.bin_dir() {
        prepend_search_path(env, bin_dir)?;
    }
    Ok(())
}

fn set_once(env: &mut dyn Environment, key: &str, value: &OsStr) {
    match env.var(key) {
        Some(existing) if existing == value => {
            debug!("{key} already set to {:?}", value);
            return;
        }
        Some(existing) => {
            warn!("Overriding {key}: {:?} -> {:?}", existing, value);
        }
        None => {}
    }
    env.set_var(key, value);
}

fn prepend_search_path(env: &mut dyn Environment, dir: &Path) -> RuntimeResult<()> {
    let existing = env.var(exported::PATH).unwrap_or_default();
    let mut entries: Vec<_> = std::env::split_paths(&existing).collect();
    if entries.first().map(|first| first.as_path()) == Some(dir) {
        debug!("{:?} already leads PATH", dir);
        return Ok(());
    }

    entries.insert(0, dir.to_path_buf());
    let joined = std::env::join_paths(entries.iter().filter(|p| !p.as_os_str().is_empty()))
        .map_err(|e| {
            RuntimeError::io(
                dir,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e),
            )
        })?;
    env.set_var(exported::PATH, &joined);
    Ok(())
}
