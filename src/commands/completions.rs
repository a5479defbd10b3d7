//! # Completions Command Implementation
//!
//! Prints a shell completion script for `fas2ipa` on stdout.
//!
//! ```bash
//! fas2ipa completions bash > ~/.local/share/bash-completion/completions/fas2ipa
//! fas2ipa completions zsh > ~/.zfunc/_fas2ipa
//! ```

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};

use crate::cli::Cli;

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// The shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "fas2ipa", out);
}

/// Execute the `completions` command.
pub fn execute(args: CompletionsArgs) -> Result<()> {
    write_completions(args.shell, &mut io::stdout());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions_name_subcommands() {
        let mut buffer = Vec::new();
        write_completions(Shell::Bash, &mut buffer);
        let script = String::from_utf8(buffer).unwrap();
        assert!(script.contains("fas2ipa"));
        assert!(script.contains("migrate"));
        assert!(script.contains("--dataset-file"));
    }
}
