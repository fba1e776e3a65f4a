//! `teleprompter` command-line tool.

/// CLI module - argument parsing and command handlers
mod cli;

/// Config module - `~/.config/teleprompter/config.toml`
mod config;

fn main() {
    cli::run_cli();
}
