use std::path::Path;

use tracing::{info, instrument};

use crate::core::error::{RuntimeError, RuntimeResult};

use super::environment::{export_runtime, Environment};
use super::layout::{require_dir, resolve_layout, ConfiguredRuntime, RuntimeDirKind};
use super::preload::{preload_libraries, LibraryLoader, PreloadManifest};
use super::target::RuntimeTarget;
use super::version::{check_version_marker, RuntimeVersion};

/// Validates `directory` against `expected` and configures the process for it.
///
/// Every directory is checked before the environment is touched. Preloading
/// runs last and stops at the first library that fails to load.
#[instrument(skip(env, loader), fields(expected = %expected))]
pub fn validate_and_configure_for(
    directory: &Path,
    expected: &RuntimeVersion,
    target: RuntimeTarget,
    env: &mut dyn Environment,
    loader: &mut dyn LibraryLoader,
) -> RuntimeResult<ConfiguredRuntime> {
    if directory.as_os_str().is_empty() {
        return Err(RuntimeError::MissingArgument("directory"));
    }
    if !directory.is_dir() {
        return Err(RuntimeError::RuntimeDirMissing(directory.to_path_buf()));
    }

    check_version_marker(directory, expected)?;
    let mut runtime = resolve_layout(directory, target)?;
    export_runtime(env, &runtime)?;

    if let Some(lib_dir) = runtime.lib_dir().map(Path::to_path_buf) {
        if let Some(manifest) = PreloadManifest::read(&lib_dir)? {
            let preloaded = preload_libraries(loader, &lib_dir, &manifest)?;
            runtime.set_preloaded(preloaded);
        }
    }

    info!("Configured Qt runtime at {:?}", directory);
    Ok(runtime)
}

/// Configures arbitrary directories, for hosts on targets without bundles.
/// There is no version marker to check; `{lib}/preload.txt` is optional.
#[instrument(skip(env, loader))]
pub fn configure_custom(
    lib_dir: &Path,
    qml_dir: &Path,
    plugins_dir: &Path,
    env: &mut dyn Environment,
    loader: &mut dyn LibraryLoader,
) -> RuntimeResult<ConfiguredRuntime> {
    let plugins_dir = require_dir(RuntimeDirKind::Plugins, plugins_dir.to_path_buf())?;
    let qml_dir = require_dir(RuntimeDirKind::Qml, qml_dir.to_path_buf())?;
    let lib_dir = require_dir(RuntimeDirKind::Lib, lib_dir.to_path_buf())?;

    let root = lib_dir
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| lib_dir.clone());
    let mut runtime = ConfiguredRuntime::new(root, plugins_dir, qml_dir, Some(lib_dir.clone()), None);
    export_runtime(env, &runtime)?;

    if let Some(manifest) = PreloadManifest::read(&lib_dir)? {
        let preloaded = preload_libraries(loader, &lib_dir, &manifest)?;
        runtime.set_preloaded(preloaded);
    }
    Ok(runtime)
}
