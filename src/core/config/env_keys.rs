//! Environment variable names, read and written.

/// Read at startup; each primary key may also be given under an alias.
pub mod settings {
    pub const QT_VERSION: &str = "QML_RUNTIME_QT_VERSION";
    pub const QT_VERSION_ALIASES: &[&str] = &["QT_BUILD_VERSION"];

    pub const URL_TEMPLATE: &str = "QML_RUNTIME_URL_TEMPLATE";
    pub const URL_TEMPLATE_ALIASES: &[&str] = &[];

    /// Overrides the per-user runtimes root.
    pub const RUNTIMES_DIR: &str = "QML_RUNTIME_DIR";
    pub const RUNTIMES_DIR_ALIASES: &[&str] = &["QT_RUNTIMES_DIR"];

    pub const ARCHIVE_SHA256: &str = "QML_RUNTIME_SHA256";
    pub const ARCHIVE_SHA256_ALIASES: &[&str] = &[];
}

/// Written for the native toolkit once a runtime is configured.
pub mod exported {
    pub const QT_PLUGIN_PATH: &str = "QT_PLUGIN_PATH";
    pub const QML2_IMPORT_PATH: &str = "QML2_IMPORT_PATH";
    pub const PATH: &str = "PATH";
}

/// Primary key first, then aliases; empty values count as unset.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    std::iter::once(primary)
        .chain(aliases.iter().copied())
        .find_map(|key| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}
