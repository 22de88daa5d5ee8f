use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cli::{Commands, ConfigureArgs, DownloadArgs, GlobalOpts};
use crate::core::config::env_keys::exported;
use crate::core::config::{RuntimeConfig, RuntimeSettings};
use crate::core::error::{RuntimeError, RuntimeResult};
use crate::core::runtime::{Environment, MemoryEnvironment, RuntimeManager, SearchScope};

/// Text for humans, JSON for `--json`.
pub struct CommandOutput {
    text: String,
    json: serde_json::Value,
}

impl CommandOutput {
    fn new<T: Serialize>(text: impl Into<String>, value: &T) -> RuntimeResult<Self> {
        Ok(Self {
            text: text.into(),
            json: serde_json::to_value(value)?,
        })
    }

    pub fn render(&self, as_json: bool) -> RuntimeResult<String> {
        if as_json {
            Ok(serde_json::to_string_pretty(&self.json)?)
        } else {
            Ok(self.text.clone())
        }
    }
}

/// Settings file, then environment, then flags.
pub fn load_settings(global: &GlobalOpts) -> RuntimeResult<RuntimeSettings> {
    let mut settings = RuntimeSettings::load(global.config.as_deref())?;
    if let Some(version) = &global.qt_version {
        settings.qt_version = version.clone();
    }
    if let Some(template) = &global.url_template {
        settings.url_template = Some(template.clone());
    }
    if let Some(dir) = &global.runtimes_dir {
        settings.user_runtimes_dir = Some(dir.clone());
    }
    if let Some(scope) = global.scope {
        settings.search_scope = scope;
    }
    if let Some(sha) = &global.sha256 {
        settings.archive_sha256 = Some(sha.clone());
    }
    Ok(settings)
}

/// The CLI records exported variables in memory, seeded from the process,
/// and prints the ones that changed so a shell can apply them.
fn build_manager(settings: &RuntimeSettings) -> RuntimeResult<RuntimeManager> {
    let config = RuntimeConfig::from_settings(settings)?;
    let mut env = MemoryEnvironment::new();
    for key in exported_keys() {
        if let Some(value) = std::env::var_os(key) {
            env.set_var(key, &value);
        }
    }
    Ok(RuntimeManager::new(config).with_environment(Box::new(env)))
}

fn exported_keys() -> [&'static str; 3] {
    [
        exported::QT_PLUGIN_PATH,
        exported::QML2_IMPORT_PATH,
        exported::PATH,
    ]
}

fn changed_environment(manager: &RuntimeManager) -> BTreeMap<&'static str, String> {
    exported_keys()
        .into_iter()
        .filter_map(|key| {
            let value = manager.environment().var(key)?;
            if std::env::var_os(key).as_ref() == Some(&value) {
                return None;
            }
            Some((key, os_to_string(value)))
        })
        .collect()
}

fn os_to_string(value: OsString) -> String {
    value.to_string_lossy().into_owned()
}

fn export_lines(vars: &BTreeMap<&'static str, String>) -> String {
    vars.iter()
        .map(|(key, value)| format!("export {key}={}", shell_quote(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// POSIX single quoting: nothing inside is expanded.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn execute(command: Commands, settings: &RuntimeSettings) -> RuntimeResult<CommandOutput> {
    let scope = settings.search_scope;
    match command {
        Commands::Target => target(),
        Commands::Locate => locate(&build_manager(settings)?, scope),
        Commands::Configure(args) => configure(&mut build_manager(settings)?, args),
        Commands::Download(args) => download(&build_manager(settings)?, settings, args),
        Commands::Install => install(&mut build_manager(settings)?, scope),
        Commands::List => list(&build_manager(settings)?, scope),
        Commands::Remove { version } => remove(&build_manager(settings)?, &version),
        Commands::Diagnostics => diagnostics(&build_manager(settings)?),
    }
}

fn target() -> RuntimeResult<CommandOutput> {
    let target = RuntimeManager::determine_current_target();
    CommandOutput::new(
        target.as_str(),
        &json!({ "target": target, "supported": target.is_supported() }),
    )
}

fn locate(manager: &RuntimeManager, scope: SearchScope) -> RuntimeResult<CommandOutput> {
    let expected = manager.expected_version().to_string();
    let found = manager.find_suitable_runtime(scope);
    let text = match &found {
        Some(path) => path.display().to_string(),
        None => format!("No {expected} runtime found (scope: {scope})"),
    };
    CommandOutput::new(text, &json!({ "expected_version": expected, "found": found }))
}

fn configure(manager: &mut RuntimeManager, args: ConfigureArgs) -> RuntimeResult<CommandOutput> {
    let runtime = match (args.directory, args.lib, args.qml, args.plugins) {
        (Some(directory), _, _, _) => manager.validate_and_configure(&directory)?,
        (None, Some(lib), Some(qml), Some(plugins)) => {
            manager.configure_custom(&lib, &qml, &plugins)?
        }
        _ => return Err(RuntimeError::MissingArgument("directory")),
    };

    let environment = changed_environment(manager);
    CommandOutput::new(
        export_lines(&environment),
        &json!({ "runtime": runtime, "environment": environment }),
    )
}

fn download(
    manager: &RuntimeManager,
    settings: &RuntimeSettings,
    args: DownloadArgs,
) -> RuntimeResult<CommandOutput> {
    let target = args.target.unwrap_or_else(|| manager.target());
    let report = manager.download_runtime(&settings.qt_version, target, &args.destination)?;
    info!("Unpacked {} into {:?}", report.url, report.destination);
    CommandOutput::new(
        format!(
            "{} ({} bytes, sha256 {})",
            report.destination.display(),
            report.bytes,
            report.sha256
        ),
        &report,
    )
}

fn install(manager: &mut RuntimeManager, scope: SearchScope) -> RuntimeResult<CommandOutput> {
    let installation = manager.discover_or_install(scope)?;
    let environment = changed_environment(manager);

    let mut text = installation.runtime.root().display().to_string();
    if !environment.is_empty() {
        text.push('\n');
        text.push_str(&export_lines(&environment));
    }
    CommandOutput::new(
        text,
        &json!({ "installation": installation, "environment": environment }),
    )
}

fn list(manager: &RuntimeManager, scope: SearchScope) -> RuntimeResult<CommandOutput> {
    let runtimes = manager.list_runtimes(scope);
    let text = if runtimes.is_empty() {
        "No runtimes installed".to_string()
    } else {
        runtimes
            .iter()
            .map(|rt| {
                let flag = if rt.compatible { "*" } else { " " };
                let marker = rt.marker.as_deref().unwrap_or("<no version.txt>");
                format!("{flag} {marker:<24} {}", rt.path.display())
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    CommandOutput::new(text, &runtimes)
}

fn remove(manager: &RuntimeManager, name: &str) -> RuntimeResult<CommandOutput> {
    let removed = manager.remove_runtime(name)?;
    let path: PathBuf = manager.config().roots().user_root().join(name.trim());
    let text = if removed {
        format!("Removed {}", path.display())
    } else {
        format!("Nothing to remove at {}", path.display())
    };
    CommandOutput::new(text, &json!({ "removed": removed, "path": path }))
}

fn diagnostics(manager: &RuntimeManager) -> RuntimeResult<CommandOutput> {
    let report = manager.diagnostics();
    let mut lines = vec![
        format!("target:           {} (supported: {})", report.target, report.supported),
        format!("qt version:       {}", report.qt_version),
        format!("expected runtime: {}", report.expected_version),
        format!("search scope:     {}", report.search_scope),
        format!(
            "executable root:  {}",
            report
                .executable_root
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("user root:        {}", report.user_root.display()),
    ];
    lines.push(format!(
        "download url:     {}",
        report.download_url.as_deref().unwrap_or("-")
    ));
    lines.push(format!(
        "found:            {}",
        report
            .found
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    CommandOutput::new(lines.join("\n"), &report)
}
