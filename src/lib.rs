//! # fas2ipa Library
//!
//! This library migrates the accounts of one or more FAS (Fedora Account
//! System) instances into a FreeIPA directory: users, groups, group
//! memberships and sponsorships, agreements and their signatures. It is
//! designed to be used by the `fas2ipa` command-line tool, but every phase is
//! reachable from library code and runs against trait objects, so the
//! network clients can be swapped for in-memory ones.
//!
//! ## Quick Example
//!
//! ```
//! use fas2ipa::config::Config;
//! use fas2ipa::conflicts::Conflicts;
//! use fas2ipa::model::{Dataset, UserRecord};
//!
//! let config = Config::from_toml_str(r#"
//! [fas.fedora]
//! url = "https://fas.fedora.test/accounts"
//! email_domain = "fedoraproject.org"
//!
//! [fas.centos]
//! url = "https://fas.centos.test/accounts"
//! "#).unwrap();
//!
//! let mut fedora = UserRecord::new("alice");
//! fedora.email = Some("alice@example.test".to_string());
//! let mut centos = UserRecord::new("alice");
//! centos.email = Some("alice@fedoraproject.org".to_string());
//!
//! let mut dataset = Dataset::default();
//! dataset.users.insert("fedora".to_string(), vec![fedora]);
//! dataset.users.insert("centos".to_string(), vec![centos]);
//!
//! let conflicts = Conflicts::detect(&dataset, &config.email_domains());
//! assert_eq!(conflicts.users["alice"].email_pointing_to_other_fas.len(), 1);
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: layered TOML settings, resolved once per run.
//! - **Records (`model`, `dataset`)**: users and groups as pulled from each
//!   source, and the dataset file that carries them between runs.
//! - **Sources (`source`)**: reading users and groups from FAS instances.
//! - **Conflicts (`conflicts`)**: detecting entities that cannot be migrated
//!   safely from several sources, and the policy for skipping them.
//! - **Target (`target`, `balancer`, `writer`)**: the FreeIPA capability
//!   contract, the instance pool with session renewal, and idempotent writes.
//! - **Requirements (`requirements`)**: agreements and the groups they gate.
//! - **Phases (`phases`)**: pull, check and push, chained by the orchestrator.
//!
//! ## Execution Flow
//!
//! [`phases::run`] validates the requested phases, then:
//!
//! 1.  **Pull**: reads every source into a [`model::Dataset`], optionally saved.
//! 2.  **Check**: detects [`conflicts::Conflicts`] and prints the report.
//! 3.  **Push**: creates agreements, then the groups of every source with the
//!     groups their agreements gate, then users, signatures and memberships.

pub mod balancer;
pub mod config;
pub mod conflicts;
pub mod dataset;
pub mod error;
pub mod model;
pub mod output;
pub mod phases;
pub mod requirements;
pub mod source;
pub mod stats;
pub mod status;
pub mod target;
pub mod writer;
