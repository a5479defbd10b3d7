//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use fas2ipa::output::OutputConfig;

use crate::commands;

/// fas2ipa - Migrate accounts from FAS instances into FreeIPA
#[derive(Parser, Debug)]
#[command(name = "fas2ipa")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull, check and push users, groups and agreements
    Migrate(commands::migrate::MigrateArgs),

    /// Print the report of a saved conflicts file
    Conflicts(commands::conflicts::ConflictsArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);
        let output = OutputConfig::from_env_and_flag(&self.color);

        match self.command {
            Commands::Migrate(args) => commands::migrate::execute(args, &output),
            Commands::Conflicts(args) => commands::conflicts::execute(args),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

fn init_logging(level: &str) {
    // Logs go to stderr so reports on stdout stay clean.
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}
