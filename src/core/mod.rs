// ─── qml-runtime core ───
// Locates, validates, downloads and configures the native Qt runtime
// bundle a QML binding needs before the toolkit is loaded.
//
// Architecture:
//   core/
//     config/  — Settings file, environment overrides, RuntimeConfig
//     runtime/ — Target detection, lookup, validation, download, install
//     http.rs  — Shared reqwest client
//     error.rs — RuntimeError / RuntimeResult

pub mod config;
pub mod error;
pub mod http;
pub mod runtime;
