//! Phase 1: Pull
//!
//! Reads every configured source into one [`Dataset`].

use log::info;

use super::orchestrator::{Connectors, RunOptions};
use crate::config::Config;
use crate::error::Result;
use crate::model::Dataset;
use crate::source;

/// Pull users (and, unless groups are skipped, groups) of every source.
pub fn execute(config: &Config, options: &RunOptions, connectors: &dyn Connectors) -> Result<Dataset> {
    let clients = config
        .sources
        .iter()
        .map(|s| connectors.source(s))
        .collect::<Result<Vec<_>>>()?;

    let dataset = source::pull(
        &config.sources,
        &clients,
        !options.skip_groups,
        options.users_start_at.as_deref(),
        &options.restrict_users,
    )?;

    for source in &config.sources {
        info!(
            "Pulled {} users and {} groups from {}",
            dataset.users.get(&source.name).map_or(0, Vec::len),
            dataset.groups.get(&source.name).map_or(0, Vec::len),
            source.name
        );
    }
    Ok(dataset)
}
