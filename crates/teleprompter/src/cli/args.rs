use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "teleprompter")]
#[command(version, about = "Manage teleprompter settings and try out view sync", long_about = None)]
pub struct Cli {
    /// Settings directory (overrides `store_dir` from the config file)
    #[arg(short, long, global = true, env = "TELEPROMPTER_STORE")]
    pub store: Option<PathBuf>,

    /// Config file to use instead of ~/.config/teleprompter/config.toml
    #[arg(long, global = true, env = "TELEPROMPTER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the persisted settings
    Show {
        /// Print as export JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Export settings, timer configuration and presenters as JSON
    Export {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a JSON file produced by `export`
    Import {
        /// File to import
        file: PathBuf,

        /// Show the resulting settings without saving them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run a control and a display view in one process and watch them sync
    Demo {
        /// Force the storage relay instead of the broadcast bus
        #[arg(long)]
        fallback: bool,

        /// Print the final display state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective config
    Show,

    /// Print the config file path
    Path,

    /// Write the default config file
    Init {
        /// Settings directory to record in the new config
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_import_with_global_store() {
        let cli = Cli::try_parse_from(["teleprompter", "import", "backup.json", "--store", "/tmp/s", "--dry-run"])
            .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Commands::Import { file, dry_run } => {
                assert_eq!(file, PathBuf::from("backup.json"));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_demo_fallback() {
        let cli = Cli::try_parse_from(["teleprompter", "demo", "--fallback"]).unwrap();
        assert!(matches!(cli.command, Commands::Demo { fallback: true, json: false }));
    }

    #[test]
    fn test_import_requires_file() {
        assert!(Cli::try_parse_from(["teleprompter", "import"]).is_err());
    }
}
