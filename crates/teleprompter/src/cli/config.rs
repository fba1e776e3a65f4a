//! CLI handler for `teleprompter config` subcommands.

use std::path::PathBuf;

use teleprompter_core::error::ConfigError;

use super::CliError;
use super::args::ConfigCommands;
use crate::config::Config;

pub fn handle_config_command(
    command: ConfigCommands,
    config: &Config,
    config_path: Option<PathBuf>,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Show => {
            let contents = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
            print!("{contents}");
            Ok(())
        }
        ConfigCommands::Path => {
            let path = config_path.ok_or(ConfigError::NoConfigDir)?;
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { store_dir, force } => {
            let path = config_path.ok_or(ConfigError::NoConfigDir)?;
            if path.exists() && !force {
                return Err(CliError::Other(format!(
                    "config already exists at {} (use --force to overwrite)",
                    path.display()
                )));
            }
            let new_config = Config {
                store_dir: store_dir.unwrap_or_else(|| config.store_dir.clone()),
                sync: config.sync.clone(),
            };
            new_config.save_to(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
