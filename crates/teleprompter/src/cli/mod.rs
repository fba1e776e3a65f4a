//! Command-line interface.

mod args;
mod config;
mod demo;
mod settings;

use std::path::PathBuf;

use clap::Parser;
use teleprompter_core::error::{ConfigError, StoreError, TeleprompterError};
use thiserror::Error;

use crate::config::Config;
use args::{Cli, Commands};

/// Failure of a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] TeleprompterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Parse arguments, run the command and exit non-zero on failure.
pub fn run_cli() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let config_path = cli.config.clone().or_else(Config::config_path);
    if let Some(store) = cli.store {
        config.store_dir = store;
    }
    log::debug!("[Cli] Using store {}", config.store_dir.display());

    match cli.command {
        Commands::Show { json } => settings::handle_show(&config, json),
        Commands::Export { output } => settings::handle_export(&config, output.as_deref()),
        Commands::Import { file, dry_run } => settings::handle_import(&config, &file, dry_run),
        Commands::Demo { fallback, json } => demo::handle_demo(&config, fallback, json),
        Commands::Config { command } => config::handle_config_command(command, &config, config_path),
    }
}
