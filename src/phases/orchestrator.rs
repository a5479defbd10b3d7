//! Orchestrator for a complete migration run
//!
//! This module validates the requested combination of phases and chains
//! them: pull, check, push. Everything that can be checked without network
//! I/O is checked by [`RunOptions::validate`] before the first request.

use std::path::{Path, PathBuf};

use log::{info, warn};

use super::{check, pull, push};
use crate::config::{Config, SourceConfig, TargetConfig};
use crate::conflicts::{render_report, Conflicts};
use crate::dataset;
use crate::error::{Error, Result};
use crate::output::OutputConfig;
use crate::source::fas::FasClient;
use crate::source::SourceClient;
use crate::stats::Stats;
use crate::target::ipa::IpaClient;
use crate::target::TargetDirectory;

/// Switches of one run. Pull, push and check are on by default.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub pull: bool,
    pub push: bool,
    pub check: bool,
    pub dataset_file: Option<PathBuf>,
    pub conflicts_file: Option<PathBuf>,
    pub force_overwrite: bool,
    pub skip_groups: bool,
    pub skip_user_add: bool,
    pub skip_user_membership: bool,
    pub skip_user_signature: bool,
    pub users_start_at: Option<String>,
    pub restrict_users: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            pull: true,
            push: true,
            check: true,
            dataset_file: None,
            conflicts_file: None,
            force_overwrite: false,
            skip_groups: false,
            skip_user_add: false,
            skip_user_membership: false,
            skip_user_signature: false,
            users_start_at: None,
            restrict_users: Vec::new(),
        }
    }
}

/// Where the conflicts of a run come from.
#[derive(Debug, PartialEq, Eq)]
enum ConflictsPlan<'a> {
    /// Reuse a conflicts file of a previous run.
    Load(&'a Path),
    /// Detect conflicts, optionally saving them.
    Compute(Option<&'a Path>),
    None,
}

fn exists(path: Option<&Path>) -> bool {
    path.is_some_and(Path::exists)
}

impl RunOptions {
    fn conflicts_plan(&self) -> ConflictsPlan<'_> {
        match self.conflicts_file.as_deref() {
            Some(path) if !self.pull && path.exists() => ConflictsPlan::Load(path),
            file if self.check => ConflictsPlan::Compute(file),
            _ => ConflictsPlan::None,
        }
    }

    fn needs_dataset(&self) -> bool {
        self.push || matches!(self.conflicts_plan(), ConflictsPlan::Compute(_))
    }

    /// Reject unusable combinations before any I/O.
    pub fn validate(&self) -> Result<()> {
        if !self.pull && !self.push && !self.check {
            return Err(Error::config(
                "Nothing to do: pull, push and check are all disabled",
            ));
        }

        if self.pull != self.push && self.dataset_file.is_none() {
            let message = if self.pull {
                "Pulling without pushing needs a dataset file"
            } else {
                "Pushing without pulling needs a dataset file"
            };
            return Err(Error::config_with_hint(message, "Pass --dataset-file"));
        }

        let dataset_file = self.dataset_file.as_deref();
        let conflicts_file = self.conflicts_file.as_deref();

        if self.check && !self.pull && !self.push && !exists(dataset_file) && !exists(conflicts_file) {
            return Err(Error::config_with_hint(
                "Checking alone needs an existing dataset or conflicts file",
                "Pass --dataset-file or --conflicts-file pointing at the output of a previous run",
            ));
        }

        if !self.pull && self.needs_dataset() && !exists(dataset_file) {
            return Err(Error::config(format!(
                "Dataset file not found: {}",
                dataset_file.map(|p| p.display().to_string()).unwrap_or_default()
            )));
        }

        if self.pull {
            if let Some(path) = dataset_file {
                dataset::ensure_writable(path, self.force_overwrite)?;
            }
        }
        if let ConflictsPlan::Compute(Some(path)) = self.conflicts_plan() {
            dataset::ensure_writable(path, self.force_overwrite)?;
        }
        Ok(())
    }
}

/// Builds the clients of a run.
pub trait Connectors {
    fn source(&self, config: &SourceConfig) -> Result<Box<dyn SourceClient>>;

    /// One client per target instance.
    fn targets(&self, config: &TargetConfig) -> Result<Vec<Box<dyn TargetDirectory>>>;
}

/// Connects to the configured FAS and FreeIPA servers over HTTP.
pub struct HttpConnectors;

impl Connectors for HttpConnectors {
    fn source(&self, config: &SourceConfig) -> Result<Box<dyn SourceClient>> {
        Ok(Box::new(FasClient::new(config)?))
    }

    fn targets(&self, config: &TargetConfig) -> Result<Vec<Box<dyn TargetDirectory>>> {
        config
            .instances
            .iter()
            .map(|host| Ok(Box::new(IpaClient::new(host, config)?) as Box<dyn TargetDirectory>))
            .collect()
    }
}

/// Execute a run. Returns the push statistics when the push phase ran.
pub fn run(
    config: &Config,
    options: &RunOptions,
    connectors: &dyn Connectors,
    output: &OutputConfig,
) -> Result<Option<Stats>> {
    options.validate()?;
    let plan = options.conflicts_plan();

    // Phase 1: Pull, or reload a previous pull
    let data = if options.pull {
        let data = pull::execute(config, options, connectors)?;
        if let Some(path) = &options.dataset_file {
            dataset::save(&data, path, options.force_overwrite)?;
            info!("Saved dataset to {}", path.display());
        }
        Some(data)
    } else if options.needs_dataset() {
        match options.dataset_file.as_deref() {
            Some(path) => Some(dataset::load(path)?),
            None => None,
        }
    } else {
        None
    };

    // Phase 2: Check
    let conflicts = match (plan, &data) {
        (ConflictsPlan::Load(path), _) => {
            let conflicts: Conflicts = dataset::load(path)?;
            info!("Loaded conflicts from {}", path.display());
            if options.check {
                print!("{}", render_report(&conflicts));
            }
            conflicts
        }
        (ConflictsPlan::Compute(save_to), Some(data)) => {
            check::execute(config, data, save_to, options.force_overwrite)?
        }
        _ => {
            if !config.skip.users.is_empty() || !config.skip.groups.is_empty() {
                warn!("Conflicts are not checked, skip_conflicts has no effect");
            }
            Conflicts::default()
        }
    };

    // Phase 3: Push
    match (&data, options.push) {
        (Some(data), true) => {
            push::execute(config, options, data, conflicts, connectors, output).map(Some)
        }
        _ => Ok(None),
    }
}
