//! # Directory Writer
//!
//! Idempotent writes into the target directory.
//!
//! ## Upserts
//!
//! Users and groups follow the same protocol: create; if the entity already
//! exists, modify it with the same payload; a modify that changes nothing is
//! `UNMODIFIED`. Any other failure is `FAILED` and the payload is logged with
//! secret-shaped fields redacted. A failure never aborts the batch.
//!
//! Before writing, an entity is `SKIPPED` when the skip policy names one of
//! its conflict kinds, or when it is a spam-flagged user and spam is skipped.
//! In strict mode, a record carrying source fields the mapping does not
//! consume is `FAILED`, each leftover field logged.
//!
//! ## Membership writes
//!
//! Member lists are split in chunks of at most `chunks` names. Within a chunk,
//! members the target reports as already in the wanted state are silently
//! dropped from the changed set; other per-member rejections fail that member
//! only; an error for the whole chunk fails every member of the chunk. Each
//! chunk ticks the re-authentication counter by its size.

pub mod mapping;

use std::collections::{BTreeMap, BTreeSet};

use log::{error, warn};

use crate::balancer::LoadBalancer;
use crate::config::{Config, SourceConfig};
use crate::conflicts::{Conflicts, SkipPolicy};
use crate::error::Result;
use crate::model::{ExtraFields, GroupRecord, UserRecord};
use crate::status::WriteStatus;
use crate::target::{
    MemberOutcome, MemberRole, Payload, TargetDirectory, TargetError, TargetResult,
    ALREADY_MEMBER, NOT_MEMBER,
};

use mapping::{describe_field, redact, FieldMapper};

/// Result of a chunked member operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    /// Names actually changed.
    pub changed: BTreeSet<String>,
    /// Names that failed, with the reason.
    pub failed: BTreeMap<String, String>,
}

impl MembershipChange {
    pub fn merge(&mut self, other: MembershipChange) {
        self.changed.extend(other.changed);
        self.failed.extend(other.failed);
    }
}

/// Writes users, groups and memberships through a [`LoadBalancer`].
pub struct DirectoryWriter {
    balancer: LoadBalancer,
    mapper: FieldMapper,
    chunks: usize,
    strict: bool,
    skip: SkipPolicy,
    conflicts: Conflicts,
}

impl DirectoryWriter {
    pub fn new(balancer: LoadBalancer, config: &Config, conflicts: Conflicts) -> Result<Self> {
        Ok(Self {
            balancer,
            mapper: FieldMapper::new()?,
            chunks: config.chunks.max(1),
            strict: config.strict,
            skip: config.skip.clone(),
            conflicts,
        })
    }

    pub fn balancer(&self) -> &LoadBalancer {
        &self.balancer
    }

    /// Run a single call on a balanced instance.
    pub fn call<T, F>(&mut self, op: F) -> TargetResult<T>
    where
        F: Fn(&dyn TargetDirectory) -> TargetResult<T>,
    {
        self.balancer.call(op)
    }

    /// Count writes toward the re-authentication threshold.
    pub fn tick(&mut self, n: usize) {
        self.balancer.tick(n);
    }

    /// Why the user must not be written, if anything.
    pub fn user_skip_reason(&self, source: &SourceConfig, user: &UserRecord) -> Option<String> {
        if source.users.skip_spam && user.is_spam() {
            return Some("spam".to_string());
        }
        self.skip
            .skips_user(self.conflicts.users.get(&user.username))
            .map(|kind| format!("conflict {}", kind))
    }

    /// Why the group must not be written, if anything.
    pub fn group_skip_reason(&self, group: &GroupRecord) -> Option<String> {
        self.skip
            .skips_group(self.conflicts.groups.get(&group.name))
            .map(|kind| format!("conflict {}", kind))
    }

    pub fn upsert_user(&mut self, source: &SourceConfig, user: &UserRecord) -> WriteStatus {
        self.tick(1);
        if let Some(reason) = self.user_skip_reason(source, user) {
            warn!("Skipping user {} of {}: {}", user.username, source.name, reason);
            return WriteStatus::Skipped;
        }
        if self.has_leftovers("user", &user.username, &user.unprocessed_fields(), &user.extra) {
            return WriteStatus::Failed;
        }
        let payload = Payload::User(self.mapper.user_payload(user, &source.users));
        self.upsert(payload)
    }

    pub fn upsert_group(&mut self, source: &SourceConfig, group: &GroupRecord) -> WriteStatus {
        self.tick(1);
        if let Some(reason) = self.group_skip_reason(group) {
            warn!("Skipping group {} of {}: {}", group.name, source.name, reason);
            return WriteStatus::Skipped;
        }
        if self.has_leftovers("group", &group.name, &group.unprocessed_fields(), &group.extra) {
            return WriteStatus::Failed;
        }
        let payload = Payload::Group(self.mapper.group_payload(group, &source.groups));
        self.upsert(payload)
    }

    fn has_leftovers(&self, kind: &str, name: &str, leftovers: &[&str], extra: &ExtraFields) -> bool {
        if !self.strict || leftovers.is_empty() {
            return false;
        }
        for key in leftovers {
            error!(
                "Unprocessed field of {} {}: {}",
                kind,
                name,
                describe_field(key, extra)
            );
        }
        true
    }

    fn upsert(&mut self, payload: Payload) -> WriteStatus {
        let create = payload.for_create();
        match self.balancer.call(|t| t.create(&create)) {
            Ok(()) => WriteStatus::Added,
            Err(TargetError::AlreadyExists(_)) => match self.balancer.call(|t| t.modify(&payload)) {
                Ok(()) => WriteStatus::Updated,
                Err(TargetError::NoModifications) => WriteStatus::Unmodified,
                Err(e) => log_failure(&payload, &e),
            },
            Err(e) => log_failure(&create, &e),
        }
    }

    /// Add `usernames` to `group` with `role`.
    pub fn add_members(
        &mut self,
        group: &str,
        usernames: &[String],
        role: MemberRole,
    ) -> MembershipChange {
        let what = format!("add to the {} of {}", role.plural(), group);
        self.chunked(&what, usernames, ALREADY_MEMBER, |t, chunk| {
            t.add_members(group, chunk, role)
        })
    }

    /// Remove `usernames` from the members of `group`.
    pub fn remove_members(&mut self, group: &str, usernames: &[String]) -> MembershipChange {
        let what = format!("remove from the members of {}", group);
        self.chunked(&what, usernames, NOT_MEMBER, |t, chunk| {
            t.remove_members(group, chunk)
        })
    }

    /// Mark `usernames` as having signed `agreement`.
    pub fn record_signature(&mut self, agreement: &str, usernames: &[String]) -> MembershipChange {
        let what = format!("mark as having signed {}", agreement);
        self.chunked(&what, usernames, ALREADY_MEMBER, |t, chunk| {
            t.add_agreement_signers(agreement, chunk)
        })
    }

    fn chunked<F>(&mut self, what: &str, names: &[String], tolerated: &str, op: F) -> MembershipChange
    where
        F: Fn(&dyn TargetDirectory, &[String]) -> TargetResult<MemberOutcome>,
    {
        let mut seen = BTreeSet::new();
        let names: Vec<String> = names
            .iter()
            .filter(|n| seen.insert(n.as_str()))
            .cloned()
            .collect();

        let mut change = MembershipChange::default();
        for chunk in names.chunks(self.chunks) {
            self.balancer.tick(chunk.len());
            match self.balancer.call(|t| op(t, chunk)) {
                Ok(outcome) => {
                    let mut changed: BTreeSet<String> = chunk.iter().cloned().collect();
                    for (name, reason) in outcome.failed {
                        changed.remove(&name);
                        if reason != tolerated {
                            warn!("Failed to {} {}: {}", what, name, reason);
                            change.failed.insert(name, reason);
                        }
                    }
                    change.changed.extend(changed);
                }
                Err(e) => {
                    error!("Failed to {} {}: {}", what, chunk.join(", "), e);
                    for name in chunk {
                        change.failed.insert(name.clone(), e.to_string());
                    }
                }
            }
        }
        change
    }
}

fn log_failure(payload: &Payload, err: &TargetError) -> WriteStatus {
    let mut value = serde_json::to_value(payload).unwrap_or_default();
    redact(&mut value);
    error!(
        "Failed to write {} {}: {}; payload: {}",
        payload.kind(),
        payload.name(),
        err,
        value
    );
    WriteStatus::Failed
}
