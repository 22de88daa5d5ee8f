mod cli;
mod commands;
pub mod core;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    // Reports go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.global.default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("qml-runtime {} starting", env!("CARGO_PKG_VERSION"));

    let as_json = cli.global.json;
    let result = commands::load_settings(&cli.global)
        .and_then(|settings| commands::execute(cli.command, &settings))
        .and_then(|output| output.render(as_json));

    match result {
        Ok(rendered) => {
            if !rendered.is_empty() {
                println!("{rendered}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if as_json {
                let report = serde_json::json!({ "error": err, "class": err.class() });
                println!("{report}");
            } else {
                eprintln!("error: {err}");
            }
            ExitCode::FAILURE
        }
    }
}
