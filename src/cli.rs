use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::core::runtime::{RuntimeTarget, SearchScope};

#[derive(Parser, Debug)]
#[command(name = "qml-runtime")]
#[command(about = "Locate, download and configure the Qt runtime for QML bindings", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Settings file (defaults to {config_dir}/qml-runtime/settings.json)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Qt toolkit version the runtime must match
    #[arg(long, global = true, value_name = "VERSION")]
    pub qt_version: Option<String>,

    /// Download URL template with {host}, {version} and {target} placeholders
    #[arg(long, global = true, value_name = "TEMPLATE")]
    pub url_template: Option<String>,

    /// Per-user runtimes directory
    #[arg(long, global = true, value_name = "DIR")]
    pub runtimes_dir: Option<PathBuf>,

    /// Which roots to search: all, executable or user
    #[arg(long, global = true)]
    pub scope: Option<SearchScope>,

    /// Expected SHA-256 of the downloaded archive
    #[arg(long, global = true, value_name = "HEX")]
    pub sha256: Option<String>,

    /// Print reports as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl GlobalOpts {
    /// Filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.quiet {
            return "warn";
        }
        match self.verbose {
            0 => "info,qml_runtime_lib=debug",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the runtime target of this machine
    Target,

    /// Find an installed runtime matching the configured version
    Locate,

    /// Validate a runtime directory and print the environment it needs
    Configure(ConfigureArgs),

    /// Download and unpack a runtime archive into an empty directory
    Download(DownloadArgs),

    /// Use an installed runtime, downloading one if none is found
    Install,

    /// List runtime directories under the search roots
    List,

    /// Delete a runtime from the per-user runtimes directory
    Remove {
        /// Directory name, e.g. 5.15.2-linux-x64
        version: String,
    },

    /// Report target, roots, download URL and the runtime that would be used
    Diagnostics,
}

#[derive(Args, Debug)]
pub struct ConfigureArgs {
    /// Runtime root holding version.txt and qt/
    #[arg(required_unless_present_all = ["lib", "qml", "plugins"], conflicts_with_all = ["lib", "qml", "plugins"])]
    pub directory: Option<PathBuf>,

    /// Library directory of a custom layout
    #[arg(long, requires_all = ["qml", "plugins"])]
    pub lib: Option<PathBuf>,

    /// QML import directory of a custom layout
    #[arg(long, requires_all = ["lib", "plugins"])]
    pub qml: Option<PathBuf>,

    /// Plugin directory of a custom layout
    #[arg(long, requires_all = ["lib", "qml"])]
    pub plugins: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Existing, empty destination directory
    pub destination: PathBuf,

    /// Target to download for (defaults to this machine)
    #[arg(long)]
    pub target: Option<RuntimeTarget>,
}
