use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::RuntimeConfig;
use crate::core::error::{RuntimeError, RuntimeResult};

use super::configure::{self, validate_and_configure_for};
use super::download::{self, DownloadReport};
use super::environment::{Environment, ProcessEnvironment};
use super::install::{self, Installation};
use super::layout::ConfiguredRuntime;
use super::locate::{find_runtime, scan_runtimes, InstalledRuntime};
use super::paths::SearchScope;
use super::preload::{LibraryLoader, NativeLibraryLoader};
use super::target::RuntimeTarget;
use super::version::RuntimeVersion;

/// Entry point for hosts: locates, validates, installs and configures the
/// Qt runtime for one target.
pub struct RuntimeManager {
    config: RuntimeConfig,
    target: RuntimeTarget,
    env: Box<dyn Environment>,
    loader: Box<dyn LibraryLoader>,
}

/// Snapshot of what the manager would do on this machine.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeDiagnostic {
    pub target: RuntimeTarget,
    pub supported: bool,
    pub qt_version: String,
    pub expected_version: String,
    pub search_scope: SearchScope,
    pub executable_root: Option<PathBuf>,
    pub user_root: PathBuf,
    pub download_url: Option<String>,
    pub found: Option<PathBuf>,
    pub preloaded_libraries: usize,
}

impl RuntimeManager {
    /// Current target, process environment and the platform dynamic linker.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            target: Self::determine_current_target(),
            env: Box::new(ProcessEnvironment),
            loader: Box::new(NativeLibraryLoader),
        }
    }

    pub fn with_target(mut self, target: RuntimeTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_environment(mut self, env: Box<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn with_loader(mut self, loader: Box<dyn LibraryLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn determine_current_target() -> RuntimeTarget {
        RuntimeTarget::current()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn target(&self) -> RuntimeTarget {
        self.target
    }

    pub fn environment(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    pub fn expected_version(&self) -> RuntimeVersion {
        self.config.expected_version(self.target)
    }

    /// `None` for an unsupported target or when no root holds a candidate.
    pub fn find_suitable_runtime(&self, scope: SearchScope) -> Option<PathBuf> {
        if !self.target.is_supported() {
            return None;
        }
        find_runtime(self.config.roots(), scope, &self.expected_version())
    }

    pub fn validate_and_configure(&mut self, directory: &Path) -> RuntimeResult<ConfiguredRuntime> {
        let expected = self.expected_version();
        validate_and_configure_for(
            directory,
            &expected,
            self.target,
            self.env.as_mut(),
            self.loader.as_mut(),
        )
    }

    pub fn configure_custom(
        &mut self,
        lib_dir: &Path,
        qml_dir: &Path,
        plugins_dir: &Path,
    ) -> RuntimeResult<ConfiguredRuntime> {
        configure::configure_custom(
            lib_dir,
            qml_dir,
            plugins_dir,
            self.env.as_mut(),
            self.loader.as_mut(),
        )
    }

    pub fn download_runtime(
        &self,
        toolkit_version: &str,
        target: RuntimeTarget,
        destination: &Path,
    ) -> RuntimeResult<DownloadReport> {
        download::download_runtime(&self.config, toolkit_version, target, destination)
    }

    pub fn discover_or_install(&mut self, scope: SearchScope) -> RuntimeResult<Installation> {
        install::discover_or_install(
            &self.config,
            scope,
            self.target,
            self.env.as_mut(),
            self.loader.as_mut(),
        )
    }

    pub fn list_runtimes(&self, scope: SearchScope) -> Vec<InstalledRuntime> {
        scan_runtimes(self.config.roots(), scope, &self.expected_version())
    }

    /// Deletes `{user_root}/{name}`. Bundles next to the executable are never
    /// touched. Returns `false` when there was nothing to delete.
    pub fn remove_runtime(&self, name: &str) -> RuntimeResult<bool> {
        let name = name.trim();
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(RuntimeError::MissingArgument("version"));
        }

        let path = self.config.roots().user_root().join(name);
        if !path.is_dir() {
            warn!("No runtime named {} under {:?}", name, self.config.roots().user_root());
            return Ok(false);
        }

        std::fs::remove_dir_all(&path).map_err(|source| RuntimeError::io(&path, source))?;
        info!("Removed runtime {:?}", path);
        Ok(true)
    }

    pub fn diagnostics(&self) -> RuntimeDiagnostic {
        let roots = self.config.roots();
        let download_url = self
            .config
            .url_builder()
            .build_url(self.config.qt_version(), self.target)
            .ok();

        RuntimeDiagnostic {
            target: self.target,
            supported: self.target.is_supported(),
            qt_version: self.config.qt_version().to_string(),
            expected_version: self.expected_version().to_string(),
            search_scope: self.config.search_scope(),
            executable_root: roots.executable_root().map(Path::to_path_buf),
            user_root: roots.user_root().to_path_buf(),
            download_url,
            found: self.find_suitable_runtime(self.config.search_scope()),
            preloaded_libraries: NativeLibraryLoader::loaded_count(),
        }
    }
}
