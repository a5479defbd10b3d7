//! # Conflicts Command Implementation
//!
//! Prints the report of a conflicts file saved by `migrate --check`. The file
//! may have been edited by hand; it is parsed again, so a broken edit is
//! reported here rather than in the middle of a push.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use fas2ipa::conflicts::{render_report, Conflicts};
use fas2ipa::dataset;

/// Print the report of a conflicts file
#[derive(Args, Debug)]
pub struct ConflictsArgs {
    /// Conflicts file (.json, .yaml or .toml)
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

/// Execute the `conflicts` command.
pub fn execute(args: ConflictsArgs) -> Result<()> {
    if !args.path.exists() {
        anyhow::bail!("Conflicts file not found: {}", args.path.display());
    }
    let conflicts: Conflicts = dataset::load(&args.path)
        .with_context(|| format!("Failed to read conflicts from {}", args.path.display()))?;
    print!("{}", render_report(&conflicts));
    Ok(())
}
