//! Phase 2: Check
//!
//! Detects conflicts in a dataset, saves them and prints the report.

use std::path::Path;

use log::info;

use crate::config::Config;
use crate::conflicts::{render_report, Conflicts};
use crate::dataset;
use crate::error::Result;
use crate::model::Dataset;

pub fn execute(
    config: &Config,
    data: &Dataset,
    save_to: Option<&Path>,
    force_overwrite: bool,
) -> Result<Conflicts> {
    let conflicts = Conflicts::detect(data, &config.email_domains());
    if let Some(path) = save_to {
        dataset::save(&conflicts, path, force_overwrite)?;
        info!("Saved conflicts to {}", path.display());
    }
    print!("{}", render_report(&conflicts));
    Ok(conflicts)
}
