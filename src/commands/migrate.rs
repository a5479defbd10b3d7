//! # Migrate Command Implementation
//!
//! The migrate command runs the three phases of a migration:
//! 1. Pull users and groups from every configured FAS instance
//! 2. Check them for conflicts between instances
//! 3. Push agreements, groups, users, memberships and signatures to FreeIPA
//!
//! Each phase can be switched off with `--no-pull`, `--no-check` and
//! `--no-push`; `--dataset-file` and `--conflicts-file` carry the data from
//! one invocation to the next.
//!
//! Credentials missing from the configuration are asked for on the terminal,
//! only for the phases that need them.

use anyhow::Result;
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use std::path::PathBuf;

use fas2ipa::config::{default_config_paths, Config};
use fas2ipa::output::OutputConfig;
use fas2ipa::phases::{self, HttpConnectors, RunOptions};

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {
    /// Configuration file; may be repeated, later files override earlier ones
    #[arg(short, long, value_name = "PATH", env = "FAS2IPA_CONFIG")]
    pub config: Vec<PathBuf>,

    /// Pull users and groups from the FAS instances (default)
    #[arg(long, overrides_with = "no_pull")]
    pub pull: bool,

    /// Don't pull; read the dataset file instead
    #[arg(long, overrides_with = "pull")]
    pub no_pull: bool,

    /// Push the dataset to FreeIPA (default)
    #[arg(long, overrides_with = "no_push")]
    pub push: bool,

    /// Don't push
    #[arg(long, overrides_with = "push")]
    pub no_push: bool,

    /// Check the dataset for conflicts between FAS instances (default)
    #[arg(long, overrides_with = "no_check")]
    pub check: bool,

    /// Don't check for conflicts
    #[arg(long, overrides_with = "check")]
    pub no_check: bool,

    /// File to save the pulled dataset to, or to read it from (.json, .yaml, .toml)
    #[arg(long, value_name = "PATH")]
    pub dataset_file: Option<PathBuf>,

    /// File to save conflicts to, or to read them from (.json, .yaml, .toml)
    #[arg(long, value_name = "PATH")]
    pub conflicts_file: Option<PathBuf>,

    /// Overwrite existing dataset and conflicts files
    #[arg(long)]
    pub force_overwrite: bool,

    /// Skip group creation
    #[arg(long)]
    pub skip_groups: bool,

    /// Don't add or update users
    #[arg(long)]
    pub skip_user_add: bool,

    /// Don't add users to groups
    #[arg(long)]
    pub skip_user_membership: bool,

    /// Don't store users' signatures of agreements
    #[arg(long)]
    pub skip_user_signature: bool,

    /// Start migrating users at that (partial) name
    #[arg(long, value_name = "KEY")]
    pub users_start_at: Option<String>,

    /// Restrict users to supplied glob pattern(s)
    #[arg(short = 'u', long, value_name = "PATTERN")]
    pub restrict_users: Vec<String>,
}

impl MigrateArgs {
    fn run_options(&self) -> RunOptions {
        RunOptions {
            pull: !self.no_pull,
            push: !self.no_push,
            check: !self.no_check,
            dataset_file: self.dataset_file.clone(),
            conflicts_file: self.conflicts_file.clone(),
            force_overwrite: self.force_overwrite,
            skip_groups: self.skip_groups,
            skip_user_add: self.skip_user_add,
            skip_user_membership: self.skip_user_membership,
            skip_user_signature: self.skip_user_signature,
            users_start_at: self.users_start_at.clone(),
            restrict_users: self.restrict_users.clone(),
        }
    }
}

/// Execute the migrate command
pub fn execute(args: MigrateArgs, output: &OutputConfig) -> Result<()> {
    let options = args.run_options();
    options.validate()?;

    let mut config = if args.config.is_empty() {
        Config::load(&default_config_paths(), false)?
    } else {
        Config::load(&args.config, true)?
    };
    if options.pull && config.sources.is_empty() {
        anyhow::bail!("No FAS instance configured: add a [fas.<name>] table to the configuration");
    }

    if console::user_attended_stderr() {
        prompt_credentials(&mut config, &options)?;
    }

    if let Some(stats) = phases::run(&config, &options, &HttpConnectors, output)? {
        print!("{}", stats.render());
    }
    Ok(())
}

/// Ask for the credentials a run needs and the configuration lacks.
fn prompt_credentials(config: &mut Config, options: &RunOptions) -> Result<()> {
    let theme = ColorfulTheme::default();

    if options.pull {
        for source in &mut config.sources {
            if source.username.is_none() {
                let username: String = Input::with_theme(&theme)
                    .with_prompt(format!("FAS username for {}", source.name))
                    .interact_text()?;
                source.username = Some(username);
            }
            if source.password.is_none() {
                let password = Password::with_theme(&theme)
                    .with_prompt(format!("FAS password for {}", source.name))
                    .interact()?;
                source.password = Some(password);
            }
        }
    }

    if options.push && !config.target.instances.is_empty() {
        if config.target.username.is_none() {
            let username: String = Input::with_theme(&theme)
                .with_prompt("FreeIPA username")
                .interact_text()?;
            config.target.username = Some(username);
        }
        if config.target.password.is_none() {
            let password = Password::with_theme(&theme)
                .with_prompt("FreeIPA password")
                .interact()?;
            config.target.password = Some(password);
        }
    }
    Ok(())
}
