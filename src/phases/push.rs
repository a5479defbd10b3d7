//! Phase 3: Push
//!
//! Writes a dataset into the target directory, in this order:
//! 1. Agreements of every source, with their signers groups
//! 2. Groups of every source, each source followed by the requirement
//!    propagation of its agreements
//! 3. Users of every source, each source followed by its signatures,
//!    memberships, sponsorships and removals
//!
//! Per-entity failures are reported and counted; they never stop the push.

use std::collections::BTreeMap;

use log::{error, info, warn};

use super::orchestrator::{Connectors, RunOptions};
use crate::balancer::LoadBalancer;
use crate::config::{Config, SourceConfig, UnapprovedPolicy};
use crate::conflicts::Conflicts;
use crate::error::Result;
use crate::model::{Dataset, UserRecord};
use crate::output::{entity_line, paint_status, OutputConfig, Progress};
use crate::requirements;
use crate::stats::{self, Stats};
use crate::status::WriteStatus;
use crate::target::MemberRole;
use crate::writer::mapping::{group_name, user_name};
use crate::writer::{DirectoryWriter, MembershipChange};

/// Membership writes collected during a user pass, by target name.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct MembershipPlan {
    pub members: BTreeMap<String, Vec<String>>,
    pub sponsors: BTreeMap<String, Vec<String>>,
    pub removals: BTreeMap<String, Vec<String>>,
    /// Signers by agreement name.
    pub signatures: BTreeMap<String, Vec<String>>,
}

impl MembershipPlan {
    /// Record what `user` should belong to.
    pub fn record(&mut self, source: &SourceConfig, user: &UserRecord) {
        let name = user_name(&source.users.prefix, &user.username);
        for (group, role) in &user.group_roles {
            if source.groups.is_ignored(group) {
                continue;
            }
            let target = group_name(&source.groups.prefix, group);
            if role.is_approved() {
                self.members
                    .entry(target.clone())
                    .or_default()
                    .push(name.clone());
                if role.is_sponsor() {
                    self.sponsors.entry(target).or_default().push(name.clone());
                }
                continue;
            }
            match source.users.unapproved {
                UnapprovedPolicy::Add => self.members.entry(target).or_default().push(name.clone()),
                UnapprovedPolicy::Remove => {
                    self.removals.entry(target).or_default().push(name.clone())
                }
                UnapprovedPolicy::Ignore => {}
            }
        }
        for agreement in &source.agreements {
            if user.is_member_of_any(&agreement.signed_groups) {
                self.signatures
                    .entry(agreement.name.clone())
                    .or_default()
                    .push(name.clone());
            }
        }
    }
}

pub fn execute(
    config: &Config,
    options: &RunOptions,
    data: &Dataset,
    conflicts: Conflicts,
    connectors: &dyn Connectors,
    output: &OutputConfig,
) -> Result<Stats> {
    let mut agreements = Vec::new();
    for (_, agreement) in config.agreements() {
        agreements.push((agreement.name.clone(), agreement.description()?));
    }

    let balancer = LoadBalancer::new(connectors.targets(&config.target)?, config.target.reauth_every)?;
    balancer.login_all()?;
    info!("Logged into {} target instance(s)", balancer.len());

    let mut writer = DirectoryWriter::new(balancer, config, conflicts)?;
    let mut stats = Stats::new();

    if !agreements.is_empty() {
        println!("Creating agreements");
        let width = agreements.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        for (name, description) in &agreements {
            let status = requirements::create_agreement(&mut writer, name, description);
            stats.record_agreement(status);
            println!("{}", entity_line(output, name, width, status));
        }
    }

    if !options.skip_groups {
        for source in &config.sources {
            stats.merge(push_groups(&mut writer, source, data, output));
        }
    }

    for source in &config.sources {
        stats.merge(push_users(&mut writer, source, data, options, output));
    }
    Ok(stats)
}

fn push_groups(
    writer: &mut DirectoryWriter,
    source: &SourceConfig,
    data: &Dataset,
    output: &OutputConfig,
) -> Stats {
    let mut stats = Stats::new();
    let groups = data.groups.get(&source.name).map(Vec::as_slice).unwrap_or_default();
    println!("Pushing {} groups of {}", groups.len(), source.name);

    let width = groups.iter().map(|g| g.name.len()).max().unwrap_or(0);
    let progress = Progress::new(output, groups.len(), &source.name);
    for group in groups {
        let status = writer.upsert_group(source, group);
        stats.record_group(status);
        progress.println(&entity_line(output, &group.name, width, status));
        progress.inc(1);
    }
    progress.finish();

    for agreement in &source.agreements {
        let closure = match requirements::compute_closure(groups, agreement) {
            Ok(closure) => closure,
            Err(e) => {
                error!("Cannot propagate the requirements of {}: {}", agreement.name, e);
                continue;
            }
        };
        println!(
            "Recording groups requiring the {} agreement: {}",
            agreement.name,
            closure.len()
        );
        for requirement in
            requirements::push_requirements(writer, &agreement.name, &source.groups.prefix, &closure)
        {
            stats.record_requirement(requirement.status);
            println!(
                "{}",
                paint_status(output, requirement.status, Some(&requirement.message))
            );
        }
    }
    stats
}

fn push_users(
    writer: &mut DirectoryWriter,
    source: &SourceConfig,
    data: &Dataset,
    options: &RunOptions,
    output: &OutputConfig,
) -> Stats {
    let mut stats = Stats::new();
    let users = data.users.get(&source.name).map(Vec::as_slice).unwrap_or_default();
    println!("Pushing {} users of {}", users.len(), source.name);

    let mut plan = MembershipPlan::default();
    let width = users.iter().map(|u| u.username.len()).max().unwrap_or(0);
    let progress = Progress::new(output, users.len(), &source.name);
    for user in users {
        if let Some(reason) = writer.user_skip_reason(source, user) {
            if options.skip_user_add {
                info!("Not recording memberships of {}: {}", user.username, reason);
            } else {
                let status = writer.upsert_user(source, user);
                stats.record_user(status);
                progress.println(&entity_line(output, &user.username, width, status));
            }
            progress.inc(1);
            continue;
        }
        if !options.skip_user_add {
            let status = writer.upsert_user(source, user);
            stats.record_user(status);
            progress.println(&entity_line(output, &user.username, width, status));
        }
        plan.record(source, user);
        progress.inc(1);
    }
    progress.finish();

    if !options.skip_user_signature {
        for (agreement, signers) in &plan.signatures {
            println!("Recording signers of the {} agreement", agreement);
            let change = writer.record_signature(agreement, signers);
            count(&mut stats, stats::SIGNATURES_ADDED, stats::SIGNATURES_FAILED, &change);
            report(output, agreement, "signers", &change);
        }
    }

    if !options.skip_user_membership {
        for (group, names) in &plan.members {
            let change = writer.add_members(group, names, MemberRole::Member);
            count(&mut stats, stats::MEMBERSHIPS_ADDED, stats::MEMBERSHIPS_FAILED, &change);
            report(output, group, MemberRole::Member.plural(), &change);
        }
        for (group, names) in &plan.sponsors {
            let change = writer.add_members(group, names, MemberRole::Sponsor);
            count(&mut stats, stats::SPONSORS_ADDED, stats::SPONSORS_FAILED, &change);
            report(output, group, MemberRole::Sponsor.plural(), &change);
        }
        for (group, names) in &plan.removals {
            let change = writer.remove_members(group, names);
            count(&mut stats, stats::REMOVALS_DONE, stats::REMOVALS_FAILED, &change);
            if !change.changed.is_empty() {
                println!(
                    "{}",
                    paint_status(
                        output,
                        WriteStatus::Removed,
                        Some(&format!(
                            "{}: {} unapproved members removed",
                            group,
                            change.changed.len()
                        ))
                    )
                );
            }
            if !change.failed.is_empty() {
                warn!("{}: {} removals failed", group, change.failed.len());
            }
        }
    }
    stats
}

fn count(stats: &mut Stats, changed: &str, failed: &str, change: &MembershipChange) {
    for (key, n) in [(changed, change.changed.len()), (failed, change.failed.len())] {
        if n > 0 {
            stats.add(key, n as u64);
        }
    }
}

fn report(output: &OutputConfig, target: &str, what: &str, change: &MembershipChange) {
    let status = if !change.failed.is_empty() {
        WriteStatus::Failed
    } else if change.changed.is_empty() {
        WriteStatus::Unmodified
    } else {
        WriteStatus::Added
    };
    let text = format!(
        "{}: {} {} added, {} failed",
        target,
        change.changed.len(),
        what,
        change.failed.len()
    );
    println!("{}", paint_status(output, status, Some(&text)));
}
