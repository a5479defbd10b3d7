//! # Requirement Propagation
//!
//! An agreement gates a tree of groups: its top-level prerequisite group and
//! every group that (transitively) names it as prerequisite. Joining any of
//! those groups in the target directory requires having signed the agreement.
//!
//! [`compute_closure`] walks the prerequisite forest of one source depth-first,
//! in pre-order, visiting children in name order. The anchor group itself is
//! not part of the closure. [`push_requirements`] then records each group of
//! the closure as requiring the agreement.

use std::collections::BTreeMap;

use log::{error, info, warn};

use crate::config::AgreementConfig;
use crate::error::{Error, Result};
use crate::model::GroupRecord;
use crate::status::WriteStatus;
use crate::target::{GroupPayload, Payload, TargetError, ALREADY_MEMBER, NO_SUCH_ENTRY};
use crate::writer::mapping::group_name;
use crate::writer::DirectoryWriter;

/// Attribute the signers group's automember rule matches on.
pub const AUTOMEMBER_KEY: &str = "memberof";

/// Outcome of marking one group as requiring an agreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub group: String,
    pub status: WriteStatus,
    pub message: String,
}

/// Name of the group collecting the signers of `agreement`.
pub fn signers_group(agreement: &str) -> String {
    format!("signed_{}", agreement)
}

/// Regex matching the entries of the members of `agreement`.
pub fn signers_regex(agreement: &str) -> String {
    format!("^cn={},cn=fasagreements,", agreement)
}

/// Every group that transitively requires the agreement's top-level
/// prerequisite, in depth-first pre-order.
pub fn compute_closure(groups: &[GroupRecord], agreement: &AgreementConfig) -> Result<Vec<String>> {
    let top = groups
        .iter()
        .find(|g| g.name == agreement.group_prerequisite)
        .ok_or_else(|| Error::PrerequisiteNotFound {
            agreement: agreement.name.clone(),
            group: agreement.group_prerequisite.clone(),
        })?;

    let mut children: BTreeMap<i64, Vec<&GroupRecord>> = BTreeMap::new();
    for group in groups {
        if let Some(parent) = group.prerequisite_id {
            children.entry(parent).or_default().push(group);
        }
    }
    for list in children.values_mut() {
        list.sort_by(|a, b| a.name.cmp(&b.name));
    }

    let mut closure = Vec::new();
    let mut path = vec![top.id];
    visit(top.id, &children, &mut path, &mut closure)?;
    Ok(closure)
}

fn visit(
    id: i64,
    children: &BTreeMap<i64, Vec<&GroupRecord>>,
    path: &mut Vec<i64>,
    closure: &mut Vec<String>,
) -> Result<()> {
    for child in children.get(&id).into_iter().flatten() {
        if let Some(start) = path.iter().position(|&seen| seen == child.id) {
            let cycle: Vec<String> = path[start..]
                .iter()
                .chain(std::iter::once(&child.id))
                .map(i64::to_string)
                .collect();
            return Err(Error::CycleDetected {
                cycle: cycle.join(" -> "),
            });
        }
        closure.push(child.name.clone());
        path.push(child.id);
        visit(child.id, children, path, closure)?;
        path.pop();
    }
    Ok(())
}

/// Mark every group of `closure` as requiring `agreement`.
///
/// Group names are written with the source's group `prefix`.
pub fn push_requirements(
    writer: &mut DirectoryWriter,
    agreement: &str,
    prefix: &str,
    closure: &[String],
) -> Vec<Requirement> {
    closure
        .iter()
        .map(|dep| {
            let target_name = group_name(prefix, dep);
            writer.tick(1);
            let result = writer.call(|t| {
                t.add_agreement_groups(agreement, std::slice::from_ref(&target_name))
            });
            let (status, message) = match result {
                Ok(outcome) if outcome.completed > 0 => (
                    WriteStatus::Added,
                    format!("Marking {} as requiring the {}", dep, agreement),
                ),
                Ok(outcome) => match outcome.failed.first().map(|(_, reason)| reason.as_str()) {
                    Some(ALREADY_MEMBER) => (
                        WriteStatus::Skipped,
                        format!("{} already requires {}", dep, agreement),
                    ),
                    Some(NO_SUCH_ENTRY) => {
                        (WriteStatus::Failed, format!("No group named {}", dep))
                    }
                    Some(reason) => (
                        WriteStatus::Failed,
                        format!("Could not mark {} as requiring {}: {}", dep, agreement, reason),
                    ),
                    None => (
                        WriteStatus::Failed,
                        format!("Could not mark {} as requiring {}", dep, agreement),
                    ),
                },
                Err(e) => (
                    WriteStatus::Failed,
                    format!("Could not mark {} as requiring {}: {}", dep, agreement, e),
                ),
            };
            if status == WriteStatus::Failed {
                warn!("{}", message);
            }
            Requirement {
                group: dep.clone(),
                status,
                message,
            }
        })
        .collect()
}

/// Create an agreement with its signers group and automember rule.
///
/// Each piece already existing is fine; the returned status is the
/// agreement's own.
pub fn create_agreement(writer: &mut DirectoryWriter, name: &str, description: &str) -> WriteStatus {
    writer.tick(1);
    let status = match writer.call(|t| t.create_agreement(name, description)) {
        Ok(()) => WriteStatus::Added,
        Err(TargetError::AlreadyExists(what)) => {
            info!("Agreement {} already exists: {}", name, what);
            WriteStatus::Skipped
        }
        Err(e) => {
            error!("Failed to create agreement {}: {}", name, e);
            return WriteStatus::Failed;
        }
    };

    let group = signers_group(name);
    let payload = Payload::Group(GroupPayload {
        name: group.clone(),
        description: format!("Signers of the {}", name),
        url: None,
        mailing_list: None,
        irc_channel: None,
    });
    match writer.call(|t| t.create(&payload)) {
        Ok(()) | Err(TargetError::AlreadyExists(_)) => {}
        Err(e) => error!("Failed to create group {}: {}", group, e),
    }

    let regex = signers_regex(name);
    match writer.call(|t| t.add_automember_rule(&group, AUTOMEMBER_KEY, &regex)) {
        Ok(()) | Err(TargetError::AlreadyExists(_)) => {}
        Err(e) => error!("Failed to add the automember rule of {}: {}", group, e),
    }
    status
}
