use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info, instrument};

use crate::core::error::{RuntimeError, RuntimeResult};

pub const PRELOAD_FILE: &str = "preload.txt";

/// Ordered library file names from `{lib}/preload.txt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreloadManifest {
    entries: Vec<String>,
}

impl PreloadManifest {
    /// One file name per line; blank lines are ignored.
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { entries }
    }

    /// `None` when the library directory has no manifest.
    pub fn read(lib_dir: &Path) -> RuntimeResult<Option<Self>> {
        let path = lib_dir.join(PRELOAD_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path).map_err(|source| RuntimeError::io(&path, source))?;
        Ok(Some(Self::parse(&content)))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `{lib_dir}/{name}` for every entry. Each entry must be a bare file
    /// name; anything that would leave `lib_dir` is rejected.
    pub fn resolve(&self, lib_dir: &Path) -> RuntimeResult<Vec<PathBuf>> {
        self.entries
            .iter()
            .map(|name| {
                let mut components = Path::new(name).components();
                match (components.next(), components.next()) {
                    (Some(Component::Normal(_)), None) => Ok(lib_dir.join(name)),
                    _ => Err(RuntimeError::PreloadFailed {
                        library: PathBuf::from(name),
                        reason: format!("not a file name inside {:?}", lib_dir),
                    }),
                }
            })
            .collect()
    }
}

/// Loads a shared library into the process for its side effects.
pub trait LibraryLoader: Send {
    fn load(&mut self, path: &Path) -> Result<(), String>;
}

/// Handles stay here for the life of the process so nothing is unloaded.
static LOADED_LIBRARIES: OnceLock<Mutex<Vec<libloading::Library>>> = OnceLock::new();

/// Loader backed by the platform dynamic linker.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLibraryLoader;

impl NativeLibraryLoader {
    /// Number of libraries preloaded so far in this process.
    pub fn loaded_count() -> usize {
        LOADED_LIBRARIES
            .get()
            .map(|libs| libs.lock().unwrap_or_else(|p| p.into_inner()).len())
            .unwrap_or(0)
    }

    #[cfg(unix)]
    fn open(path: &Path) -> Result<libloading::Library, libloading::Error> {
        use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};

        // RTLD_GLOBAL so the toolkit loaded later resolves against these symbols.
        let library = unsafe { Library::open(Some(path), RTLD_NOW | RTLD_GLOBAL)? };
        Ok(library.into())
    }

    #[cfg(not(unix))]
    fn open(path: &Path) -> Result<libloading::Library, libloading::Error> {
        unsafe { libloading::Library::new(path) }
    }
}

impl LibraryLoader for NativeLibraryLoader {
    fn load(&mut self, path: &Path) -> Result<(), String> {
        let library = Self::open(path).map_err(|e| e.to_string())?;
        LOADED_LIBRARIES
            .get_or_init(|| Mutex::new(Vec::new()))
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(library);
        Ok(())
    }
}

/// Loads every manifest entry in order, stopping at the first failure.
/// Libraries loaded before the failure remain loaded.
#[instrument(skip(loader, manifest), fields(count = manifest.entries().len()))]
pub fn preload_libraries(
    loader: &mut dyn LibraryLoader,
    lib_dir: &Path,
    manifest: &PreloadManifest,
) -> RuntimeResult<Vec<PathBuf>> {
    let mut loaded = Vec::with_capacity(manifest.entries().len());
    for library in manifest.resolve(lib_dir)? {
        debug!("Preloading {:?}", library);
        loader
            .load(&library)
            .map_err(|reason| RuntimeError::PreloadFailed {
                library: library.clone(),
                reason,
            })?;
        loaded.push(library);
    }
    if !loaded.is_empty() {
        info!("Preloaded {} libraries from {:?}", loaded.len(), lib_dir);
    }
    Ok(loaded)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every attempt; fails for names listed in `failing`.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingLoader {
        pub attempts: Vec<PathBuf>,
        pub failing: Vec<String>,
    }

    impl LibraryLoader for RecordingLoader {
        fn load(&mut self, path: &Path) -> Result<(), String> {
            self.attempts.push(path.to_path_buf());
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if self.failing.contains(&name) {
                Err(format!("cannot open {name}"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn parse_skips_blank_lines() {
        let manifest = PreloadManifest::parse("libicudata.so.56\n\n  \nlibicuuc.so.56\r\n");
        assert_eq!(manifest.entries(), ["libicudata.so.56", "libicuuc.so.56"]);
    }

    #[test]
    fn missing_manifest_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PreloadManifest::read(dir.path()).unwrap().is_none());
    }

    #[test]
    fn loads_in_order_with_absolute_paths() {
        let lib = Path::new("/rt/qt/lib");
        let manifest = PreloadManifest::parse("a.so\nb.so\n");
        let mut loader = RecordingLoader::default();
        let loaded = preload_libraries(&mut loader, lib, &manifest).unwrap();
        assert_eq!(loaded, vec![lib.join("a.so"), lib.join("b.so")]);
        assert_eq!(loader.attempts, loaded);
    }

    #[test]
    fn first_failure_stops_the_sequence() {
        let lib = Path::new("/rt/qt/lib");
        let manifest = PreloadManifest::parse("a.so\nb.so\nc.so\n");
        let mut loader = RecordingLoader {
            failing: vec!["b.so".to_string()],
            ..Default::default()
        };

        let err = preload_libraries(&mut loader, lib, &manifest).unwrap_err();
        match err {
            RuntimeError::PreloadFailed { library, .. } => assert_eq!(library, lib.join("b.so")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(loader.attempts, vec![lib.join("a.so"), lib.join("b.so")]);
    }

    #[test]
    fn entries_outside_lib_dir_are_rejected_before_loading() {
        let lib = Path::new("/rt/qt/lib");
        for content in [
            "libok.so\n/tmp/evil.so\n",
            "libok.so\n../../outside.so\n",
            "libok.so\nsub/libnested.so\n",
            "libok.so\n..\n",
        ] {
            let manifest = PreloadManifest::parse(content);
            let mut loader = RecordingLoader::default();

            let err = preload_libraries(&mut loader, lib, &manifest).unwrap_err();

            assert!(matches!(err, RuntimeError::PreloadFailed { .. }), "{content:?}");
            assert!(loader.attempts.is_empty(), "{content:?}");
        }
    }

    #[test]
    fn native_loader_reports_missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = NativeLibraryLoader;
        let before = NativeLibraryLoader::loaded_count();
        assert!(loader.load(&dir.path().join("libnothere.so")).is_err());
        assert_eq!(NativeLibraryLoader::loaded_count(), before);
    }
}
