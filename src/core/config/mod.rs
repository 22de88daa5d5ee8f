pub mod env_keys;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{RuntimeError, RuntimeResult};
use crate::core::runtime::extract::{ArchiveExtractor, TarGzExtractor};
use crate::core::runtime::paths::{default_executable_root, default_user_root, SearchRoots, SearchScope};
use crate::core::runtime::source::{ArchiveSource, HttpArchiveSource, TemplateUrlBuilder, UrlBuilder};
use crate::core::runtime::target::RuntimeTarget;
use crate::core::runtime::version::RuntimeVersion;

const SETTINGS_DIR_NAME: &str = "qml-runtime";
const SETTINGS_FILE: &str = "settings.json";

pub const DEFAULT_QT_VERSION: &str = "5.15.2";
const DEFAULT_MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// On-disk settings (`{config_dir}/qml-runtime/settings.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub qt_version: String,
    pub url_template: Option<String>,
    pub user_runtimes_dir: Option<PathBuf>,
    pub executable_runtimes_dir: Option<PathBuf>,
    pub search_scope: SearchScope,
    /// 0 disables the free-space check.
    pub min_free_disk_bytes: u64,
    pub archive_sha256: Option<String>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            qt_version: DEFAULT_QT_VERSION.to_string(),
            url_template: None,
            user_runtimes_dir: None,
            executable_runtimes_dir: None,
            search_scope: SearchScope::All,
            min_free_disk_bytes: DEFAULT_MIN_FREE_DISK_BYTES,
            archive_sha256: None,
        }
    }
}

impl RuntimeSettings {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE))
    }

    pub fn load_from(path: &Path) -> RuntimeResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| RuntimeError::io(path, source))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Explicit file if given, else the default file when it exists, else
    /// defaults. Environment overrides are applied on top.
    pub fn load(explicit: Option<&Path>) -> RuntimeResult<Self> {
        let mut settings = match explicit {
            Some(path) => Self::load_from(path)?,
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => {
                    debug!("Loading settings from {:?}", path);
                    Self::load_from(&path)?
                }
                None => Self::default(),
            },
        };
        settings.apply_overrides(env_keys::env_optional);
        Ok(settings)
    }

    /// `lookup(primary, aliases)` returns the override for a key, if any.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str, &[&str]) -> Option<String>,
    {
        use env_keys::settings as keys;

        if let Some(version) = lookup(keys::QT_VERSION, keys::QT_VERSION_ALIASES) {
            self.qt_version = version;
        }
        if let Some(template) = lookup(keys::URL_TEMPLATE, keys::URL_TEMPLATE_ALIASES) {
            self.url_template = Some(template);
        }
        if let Some(dir) = lookup(keys::RUNTIMES_DIR, keys::RUNTIMES_DIR_ALIASES) {
            self.user_runtimes_dir = Some(PathBuf::from(dir));
        }
        if let Some(sha) = lookup(keys::ARCHIVE_SHA256, keys::ARCHIVE_SHA256_ALIASES) {
            self.archive_sha256 = Some(sha);
        }
    }
}

/// Everything the locator/installer needs, fixed once built.
pub struct RuntimeConfig {
    qt_version: String,
    search_scope: SearchScope,
    roots: SearchRoots,
    url_builder: Arc<dyn UrlBuilder>,
    source: Arc<dyn ArchiveSource>,
    extractor: Arc<dyn ArchiveExtractor>,
    archive_sha256: Option<String>,
    min_free_disk_bytes: u64,
    spool_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn builder(qt_version: impl Into<String>) -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new(qt_version)
    }

    pub fn from_settings(settings: &RuntimeSettings) -> RuntimeResult<Self> {
        let roots = SearchRoots::new(
            settings
                .executable_runtimes_dir
                .clone()
                .or_else(default_executable_root),
            settings
                .user_runtimes_dir
                .clone()
                .unwrap_or_else(default_user_root),
        );

        let mut builder = Self::builder(settings.qt_version.clone())
            .search_scope(settings.search_scope)
            .roots(roots)
            .min_free_disk_bytes(settings.min_free_disk_bytes);
        if let Some(template) = &settings.url_template {
            builder = builder.url_builder(Arc::new(TemplateUrlBuilder::new(template.clone())));
        }
        if let Some(sha) = &settings.archive_sha256 {
            builder = builder.archive_sha256(sha.clone());
        }
        builder.build()
    }

    pub fn qt_version(&self) -> &str {
        &self.qt_version
    }

    pub fn search_scope(&self) -> SearchScope {
        self.search_scope
    }

    pub fn roots(&self) -> &SearchRoots {
        &self.roots
    }

    pub fn url_builder(&self) -> &dyn UrlBuilder {
        self.url_builder.as_ref()
    }

    pub fn source(&self) -> &dyn ArchiveSource {
        self.source.as_ref()
    }

    pub fn extractor(&self) -> &dyn ArchiveExtractor {
        self.extractor.as_ref()
    }

    pub fn archive_sha256(&self) -> Option<&str> {
        self.archive_sha256.as_deref()
    }

    pub fn min_free_disk_bytes(&self) -> u64 {
        self.min_free_disk_bytes
    }

    pub fn spool_dir(&self) -> &Path {
        &self.spool_dir
    }

    pub fn expected_version(&self, target: RuntimeTarget) -> RuntimeVersion {
        RuntimeVersion::new(self.qt_version.clone(), target)
    }
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeConfig")
            .field("qt_version", &self.qt_version)
            .field("search_scope", &self.search_scope)
            .field("roots", &self.roots)
            .field("archive_sha256", &self.archive_sha256)
            .field("min_free_disk_bytes", &self.min_free_disk_bytes)
            .field("spool_dir", &self.spool_dir)
            .finish_non_exhaustive()
    }
}

pub struct RuntimeConfigBuilder {
    qt_version: String,
    search_scope: SearchScope,
    roots: Option<SearchRoots>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    source: Option<Arc<dyn ArchiveSource>>,
    extractor: Option<Arc<dyn ArchiveExtractor>>,
    archive_sha256: Option<String>,
    min_free_disk_bytes: u64,
    spool_dir: Option<PathBuf>,
}

impl RuntimeConfigBuilder {
    fn new(qt_version: impl Into<String>) -> Self {
        Self {
            qt_version: qt_version.into(),
            search_scope: SearchScope::All,
            roots: None,
            url_builder: None,
            source: None,
            extractor: None,
            archive_sha256: None,
            min_free_disk_bytes: DEFAULT_MIN_FREE_DISK_BYTES,
            spool_dir: None,
        }
    }

    pub fn search_scope(mut self, scope: SearchScope) -> Self {
        self.search_scope = scope;
        self
    }

    pub fn roots(mut self, roots: SearchRoots) -> Self {
        self.roots = Some(roots);
        self
    }

    pub fn url_builder(mut self, builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(builder);
        self
    }

    pub fn source(mut self, source: Arc<dyn ArchiveSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn archive_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.archive_sha256 = Some(sha256.into());
        self
    }

    pub fn min_free_disk_bytes(mut self, bytes: u64) -> Self {
        self.min_free_disk_bytes = bytes;
        self
    }

    pub fn spool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spool_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> RuntimeResult<RuntimeConfig> {
        if self.qt_version.trim().is_empty() {
            return Err(RuntimeError::MissingArgument("qt_version"));
        }

        let source: Arc<dyn ArchiveSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HttpArchiveSource::new()?),
        };

        Ok(RuntimeConfig {
            qt_version: self.qt_version,
            search_scope: self.search_scope,
            roots: self.roots.unwrap_or_else(SearchRoots::detect),
            url_builder: self
                .url_builder
                .unwrap_or_else(|| Arc::new(TemplateUrlBuilder::default())),
            source,
            extractor: self.extractor.unwrap_or_else(|| Arc::new(TarGzExtractor)),
            archive_sha256: self.archive_sha256,
            min_free_disk_bytes: self.min_free_disk_bytes,
            spool_dir: self.spool_dir.unwrap_or_else(std::env::temp_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: RuntimeSettings =
            serde_json::from_str(r#"{ "qt_version": "6.2.4", "search_scope": "user_directory" }"#)
                .unwrap();
        assert_eq!(settings.qt_version, "6.2.4");
        assert_eq!(settings.search_scope, SearchScope::UserDirectory);
        assert_eq!(settings.min_free_disk_bytes, DEFAULT_MIN_FREE_DISK_BYTES);
        assert!(settings.url_template.is_none());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "user_runtimes_dir": "/srv/qt" }"#).unwrap();
        let settings = RuntimeSettings::load_from(&path).unwrap();
        assert_eq!(settings.user_runtimes_dir, Some(PathBuf::from("/srv/qt")));
        assert_eq!(settings.qt_version, DEFAULT_QT_VERSION);
    }

    #[test]
    fn invalid_file_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            RuntimeSettings::load_from(&path),
            Err(RuntimeError::Json(_))
        ));
    }

    #[test]
    fn overrides_apply_primary_keys() {
        let values: HashMap<&str, &str> = HashMap::from([
            (env_keys::settings::QT_VERSION, "5.12.0"),
            (env_keys::settings::RUNTIMES_DIR, "/data/rt"),
        ]);
        let mut settings = RuntimeSettings::default();
        settings.apply_overrides(|key, _| values.get(key).map(|v| v.to_string()));

        assert_eq!(settings.qt_version, "5.12.0");
        assert_eq!(settings.user_runtimes_dir, Some(PathBuf::from("/data/rt")));
        assert!(settings.archive_sha256.is_none());
    }

    #[test]
    fn builder_rejects_empty_version() {
        let err = RuntimeConfig::builder("  ").build().unwrap_err();
        assert!(matches!(err, RuntimeError::MissingArgument("qt_version")));
    }

    #[test]
    fn from_settings_honours_roots_and_template() {
        let settings = RuntimeSettings {
            user_runtimes_dir: Some(PathBuf::from("/home/u/rt")),
            executable_runtimes_dir: Some(PathBuf::from("/opt/app/rt")),
            url_template: Some("https://mirror/{version}/{target}.tar.gz".to_string()),
            ..Default::default()
        };
        let config = RuntimeConfig::from_settings(&settings).unwrap();
        assert_eq!(config.roots().user_root(), Path::new("/home/u/rt"));
        assert_eq!(
            config.roots().executable_root(),
            Some(Path::new("/opt/app/rt"))
        );
        assert_eq!(
            config
                .url_builder()
                .build_url("5.15.2", RuntimeTarget::LinuxX64)
                .unwrap(),
            "https://mirror/5.15.2/linux-x64.tar.gz"
        );
        assert_eq!(
            config.expected_version(RuntimeTarget::LinuxX64).to_string(),
            "5.15.2-linux-x64"
        );
    }
}
