use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::core::config::RuntimeConfig;
use crate::core::error::{RuntimeError, RuntimeResult};

use super::configure::validate_and_configure_for;
use super::download::{download_runtime, DownloadReport};
use super::environment::Environment;
use super::layout::ConfiguredRuntime;
use super::locate::candidate_runtimes;
use super::paths::SearchScope;
use super::preload::LibraryLoader;
use super::target::RuntimeTarget;
use super::version::RuntimeVersion;

pub const RECEIPT_FILE: &str = ".install.json";

/// Written next to `version.txt` for runtimes this crate installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallReceipt {
    pub version: String,
    pub target: RuntimeTarget,
    pub source_url: String,
    pub archive_sha256: String,
    pub archive_bytes: u64,
    pub installed_at: String,
    pub installer_version: String,
}

impl InstallReceipt {
    fn new(version: &RuntimeVersion, target: RuntimeTarget, report: &DownloadReport) -> Self {
        Self {
            version: version.to_string(),
            target,
            source_url: report.url.clone(),
            archive_sha256: report.sha256.clone(),
            archive_bytes: report.bytes,
            installed_at: Utc::now().to_rfc3339(),
            installer_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub fn read_receipt(runtime_root: &Path) -> Option<InstallReceipt> {
    let bytes = std::fs::read(runtime_root.join(RECEIPT_FILE)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn write_receipt(runtime_root: &Path, receipt: &InstallReceipt) -> RuntimeResult<()> {
    let path = runtime_root.join(RECEIPT_FILE);
    let payload = serde_json::to_vec_pretty(receipt)?;
    std::fs::write(&path, payload).map_err(|source| RuntimeError::io(&path, source))
}

/// Result of `discover_or_install`.
#[derive(Debug, Clone, Serialize)]
pub struct Installation {
    pub runtime: ConfiguredRuntime,
    /// Set when the runtime had to be downloaded.
    pub downloaded: Option<DownloadReport>,
}

/// Configures the first usable runtime in `scope`, or downloads one into the
/// user root and configures that.
///
/// Candidates whose marker or layout is wrong are skipped. The install goes
/// through a `{canonical}-{uuid}` staging directory that replaces the
/// canonical one by delete + rename. A crash between the two leaves no
/// runtime, and the next call downloads again.
#[instrument(skip(config, env, loader))]
pub fn discover_or_install(
    config: &RuntimeConfig,
    scope: SearchScope,
    target: RuntimeTarget,
    env: &mut dyn Environment,
    loader: &mut dyn LibraryLoader,
) -> RuntimeResult<Installation> {
    let expected = config.expected_version(target);

    if target.is_supported() {
        for candidate in candidate_runtimes(config.roots(), scope, &expected) {
            match validate_and_configure_for(&candidate, &expected, target, env, loader) {
                Ok(runtime) => {
                    return Ok(Installation {
                        runtime,
                        downloaded: None,
                    })
                }
                Err(err) if is_skippable(&err) => {
                    warn!("Ignoring runtime candidate {:?}: {}", candidate, err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    let target = target.require_supported()?;

    let user_root = config.roots().ensure_user_root()?;
    let canonical = user_root.join(expected.to_string());
    let staging = user_root.join(format!("{}-{}", expected, Uuid::new_v4().simple()));
    std::fs::create_dir(&staging).map_err(|source| RuntimeError::io(&staging, source))?;

    let report = match stage_runtime(config, &expected, target, &staging) {
        Ok(report) => report,
        Err(err) => {
            discard_staging(&staging);
            return Err(err);
        }
    };

    replace_dir(&staging, &canonical)?;
    info!("Installed Qt runtime {} at {:?}", expected, canonical);

    let runtime = validate_and_configure_for(&canonical, &expected, target, env, loader)?;
    Ok(Installation {
        runtime,
        downloaded: Some(report),
    })
}

fn stage_runtime(
    config: &RuntimeConfig,
    expected: &RuntimeVersion,
    target: RuntimeTarget,
    staging: &Path,
) -> RuntimeResult<DownloadReport> {
    let report = download_runtime(config, config.qt_version(), target, staging)?;
    write_receipt(staging, &InstallReceipt::new(expected, target, &report))?;
    Ok(report)
}

/// Marker and layout problems fall through to a download. A failed preload
/// does not: earlier libraries may already be loaded.
fn is_skippable(err: &RuntimeError) -> bool {
    matches!(
        err,
        RuntimeError::RuntimeDirMissing(_)
            | RuntimeError::VersionFileMissing(_)
            | RuntimeError::VersionMismatch { .. }
            | RuntimeError::MissingDirectory { .. }
    )
}

fn replace_dir(staging: &Path, canonical: &Path) -> RuntimeResult<()> {
    if canonical.exists() {
        std::fs::remove_dir_all(canonical).map_err(|source| RuntimeError::io(canonical, source))?;
    }
    std::fs::rename(staging, canonical).map_err(|source| RuntimeError::io(canonical, source))
}

fn discard_staging(staging: &Path) {
    if let Err(source) = std::fs::remove_dir_all(staging) {
        warn!("Failed to remove staging directory {:?}: {}", staging, source);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::core::config::env_keys::exported;
    use crate::core::runtime::download::tests::{runtime_archive, FailingSource, FixtureSource};
    use crate::core::runtime::environment::MemoryEnvironment;
    use crate::core::runtime::extract::{ArchiveExtractor, TarGzExtractor};
    use crate::core::runtime::layout::tests::make_layout;
    use crate::core::runtime::paths::SearchRoots;
    use crate::core::runtime::preload::tests::RecordingLoader;
    use crate::core::runtime::source::ArchiveSource;
    use crate::core::runtime::version::VERSION_FILE;

    const TARGET: RuntimeTarget = RuntimeTarget::LinuxX64;

    fn config(
        exe: Option<&Path>,
        user: &Path,
        spool: &Path,
        source: Arc<dyn ArchiveSource>,
    ) -> RuntimeConfig {
        RuntimeConfig::builder("5.15")
            .roots(SearchRoots::new(exe.map(Path::to_path_buf), user.to_path_buf()))
            .source(source)
            .spool_dir(spool)
            .min_free_disk_bytes(0)
            .build()
            .unwrap()
    }

    fn entry_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn installs_when_nothing_is_found() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let source = FixtureSource::new(runtime_archive("5.15-linux-x64"));
        let config = config(None, user.path(), spool.path(), source.clone());
        let mut env = MemoryEnvironment::new();

        let installation = discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut env,
            &mut RecordingLoader::default(),
        )
        .unwrap();

        let canonical = user.path().join("5.15-linux-x64");
        assert_eq!(source.calls(), 1);
        assert!(installation.downloaded.is_some());
        assert_eq!(installation.runtime.root(), canonical);
        assert_eq!(entry_names(user.path()), vec!["5.15-linux-x64".to_string()]);
        assert_eq!(
            env.var(exported::QT_PLUGIN_PATH),
            Some(canonical.join("qt").join("plugins").into_os_string())
        );

        let receipt = read_receipt(&canonical).unwrap();
        assert_eq!(receipt.version, "5.15-linux-x64");
        assert_eq!(receipt.target, TARGET);
        assert_eq!(receipt.archive_sha256, installation.downloaded.unwrap().sha256);

        // The installed directory validates on its own.
        validate_and_configure_for(
            &canonical,
            &config.expected_version(TARGET),
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap();
    }

    #[test]
    fn second_call_reuses_the_install() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let source = FixtureSource::new(runtime_archive("5.15-linux-x64"));
        let config = config(None, user.path(), spool.path(), source.clone());

        for _ in 0..2 {
            discover_or_install(
                &config,
                SearchScope::All,
                TARGET,
                &mut MemoryEnvironment::new(),
                &mut RecordingLoader::default(),
            )
            .unwrap();
        }
        assert_eq!(source.calls(), 1);
    }

    #[test]
    fn exactly_one_staging_directory_is_used() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
        let seen_in_extractor = Arc::clone(&seen);
        let user_root = user.path().to_path_buf();
        let extractor = move |archive: &mut dyn Read, dest: &Path| -> RuntimeResult<()> {
            seen_in_extractor
                .lock()
                .unwrap()
                .push(entry_names(&user_root));
            TarGzExtractor.extract(archive, dest)
        };
        let config = RuntimeConfig::builder("5.15")
            .roots(SearchRoots::new(None, user.path().to_path_buf()))
            .source(FixtureSource::new(runtime_archive("5.15-linux-x64")))
            .extractor(Arc::new(extractor))
            .spool_dir(spool.path())
            .min_free_disk_bytes(0)
            .build()
            .unwrap();

        discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 1);
        let staging = &seen[0][0];
        let suffix = staging.strip_prefix("5.15-linux-x64-").unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(entry_names(user.path()), vec!["5.15-linux-x64".to_string()]);
    }

    #[test]
    fn stale_canonical_directory_is_replaced() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let stale = user.path().join("5.15-linux-x64");
        make_layout(&stale, &["plugins"]);
        std::fs::write(stale.join(VERSION_FILE), "5.15-linux-x64").unwrap();
        std::fs::write(stale.join("stale.txt"), "old").unwrap();
        let source = FixtureSource::new(runtime_archive("5.15-linux-x64"));
        let config = config(None, user.path(), spool.path(), source.clone());

        discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap();

        assert_eq!(source.calls(), 1);
        assert!(!stale.join("stale.txt").exists());
        assert_eq!(entry_names(user.path()), vec!["5.15-linux-x64".to_string()]);
    }

    #[test]
    fn bundled_runtime_is_used_without_download() {
        let exe = tempfile::tempdir().unwrap();
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let bundled = exe.path().join("5.15-linux-x64");
        make_layout(&bundled, &["plugins", "qml", "lib"]);
        std::fs::write(bundled.join(VERSION_FILE), "5.15-linux-x64\n").unwrap();
        let source = FixtureSource::new(Vec::new());
        let config = config(Some(exe.path()), user.path(), spool.path(), source.clone());

        let installation = discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap();

        assert_eq!(installation.runtime.root(), bundled);
        assert!(installation.downloaded.is_none());
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn unsupported_target_fails_when_nothing_is_found() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let source = FixtureSource::new(Vec::new());
        let config = config(None, user.path(), spool.path(), source.clone());

        let err = discover_or_install(
            &config,
            SearchScope::All,
            RuntimeTarget::Unsupported,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap_err();

        assert!(matches!(err, RuntimeError::UnsupportedTarget(_)));
        assert_eq!(source.calls(), 0);
    }

    #[test]
    fn failed_download_leaves_no_staging_directory() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let config = config(None, user.path(), spool.path(), Arc::new(FailingSource));

        let err = discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut RecordingLoader::default(),
        )
        .unwrap_err();

        assert!(matches!(err, RuntimeError::DownloadFailed { .. }));
        assert!(entry_names(user.path()).is_empty());
    }

    #[test]
    fn preload_failure_is_not_papered_over() {
        let user = tempfile::tempdir().unwrap();
        let spool = tempfile::tempdir().unwrap();
        let installed = user.path().join("5.15-linux-x64");
        make_layout(&installed, &["plugins", "qml", "lib"]);
        std::fs::write(installed.join(VERSION_FILE), "5.15-linux-x64").unwrap();
        std::fs::write(installed.join("qt/lib/preload.txt"), "libbad.so\n").unwrap();
        let source = FixtureSource::new(runtime_archive("5.15-linux-x64"));
        let config = config(None, user.path(), spool.path(), source.clone());
        let mut loader = RecordingLoader {
            failing: vec!["libbad.so".to_string()],
            ..Default::default()
        };

        let err = discover_or_install(
            &config,
            SearchScope::All,
            TARGET,
            &mut MemoryEnvironment::new(),
            &mut loader,
        )
        .unwrap_err();

        assert!(matches!(err, RuntimeError::PreloadFailed { .. }));
        assert_eq!(source.calls(), 0);
    }
}
