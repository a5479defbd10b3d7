//! # Cross-Source Conflict Detection
//!
//! Usernames and group names are only unique within one source instance.
//! Before pushing several sources into a single target directory, this module
//! finds the names that collide and classifies each collision:
//!
//! - **`same_group_name`**: a group name exists in two or more sources. Equal
//!   names are assumed to denote the same logical group; no deeper comparison
//!   is attempted.
//! - **`circular_email`**: a source's copy of a user has an email address in
//!   that same source's email domain, with the username as mailbox.
//! - **`email_pointing_to_other_fas`**: a copy's email address is the username
//!   at *another* source's email domain, so the collision looks like an alias
//!   rather than two different people.
//! - **`email_address_conflicts`**: after the cases above are set aside, the
//!   copies still disagree about the email address.
//!
//! Conflicts are advisory. The writer consults a [`SkipPolicy`] to decide
//! which kinds make it refuse to write an entity. The [`Conflicts`] value is
//! serializable so it can be reviewed, edited and fed back to a push-only run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Dataset, GroupRecord, UserRecord};

/// The kinds of cross-source conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SameGroupName,
    CircularEmail,
    #[serde(rename = "email_pointing_to_other_fas")]
    EmailPointingToOtherFas,
    EmailAddressConflicts,
}

/// Which kind of entity a conflict kind applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    User,
    Group,
}

impl ConflictKind {
    pub const ALL: [ConflictKind; 4] = [
        ConflictKind::SameGroupName,
        ConflictKind::CircularEmail,
        ConflictKind::EmailPointingToOtherFas,
        ConflictKind::EmailAddressConflicts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::SameGroupName => "same_group_name",
            ConflictKind::CircularEmail => "circular_email",
            ConflictKind::EmailPointingToOtherFas => "email_pointing_to_other_fas",
            ConflictKind::EmailAddressConflicts => "email_address_conflicts",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            ConflictKind::SameGroupName => Scope::Group,
            ConflictKind::CircularEmail
            | ConflictKind::EmailPointingToOtherFas
            | ConflictKind::EmailAddressConflicts => Scope::User,
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source whose own copy of the user points back at its own domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularEmail {
    pub fas_name: String,
    pub email_address: String,
}

/// Copies whose address is the username at another source's domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPointer {
    pub email_address: String,
    pub src_fas_names: Vec<String>,
    pub tgt_fas_name: String,
}

/// One of several disagreeing addresses and the sources holding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressClaim {
    pub email_address: String,
    pub fas_names: Vec<String>,
}

/// Conflicts attached to one username.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConflicts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub circular_email: Vec<CircularEmail>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_pointing_to_other_fas: Vec<EmailPointer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_address_conflicts: Vec<AddressClaim>,
}

impl UserConflicts {
    pub fn kinds(&self) -> Vec<ConflictKind> {
        let mut kinds = Vec::new();
        if !self.circular_email.is_empty() {
            kinds.push(ConflictKind::CircularEmail);
        }
        if !self.email_pointing_to_other_fas.is_empty() {
            kinds.push(ConflictKind::EmailPointingToOtherFas);
        }
        if !self.email_address_conflicts.is_empty() {
            kinds.push(ConflictKind::EmailAddressConflicts);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }
}

/// Sources sharing a group name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SameGroupName {
    pub fas_names: Vec<String>,
}

/// Conflicts attached to one group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupConflicts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub same_group_name: Option<SameGroupName>,
}

impl GroupConflicts {
    pub fn kinds(&self) -> Vec<ConflictKind> {
        self.same_group_name
            .iter()
            .map(|_| ConflictKind::SameGroupName)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.same_group_name.is_none()
    }
}

/// Every conflict found, as written to the conflicts file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflicts {
    #[serde(default)]
    pub users: BTreeMap<String, UserConflicts>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupConflicts>,
}

impl Conflicts {
    /// Run both detectors over a dataset.
    pub fn detect(dataset: &Dataset, email_domains: &BTreeMap<String, String>) -> Self {
        Conflicts {
            users: find_user_conflicts(
                dataset
                    .users
                    .iter()
                    .map(|(source, users)| (source.as_str(), users.as_slice())),
                email_domains,
            ),
            groups: find_group_conflicts(
                dataset
                    .groups
                    .iter()
                    .map(|(source, groups)| (source.as_str(), groups.as_slice())),
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }
}

/// Flag every group name present in two or more sources.
pub fn find_group_conflicts<'a, I>(by_source: I) -> BTreeMap<String, GroupConflicts>
where
    I: IntoIterator<Item = (&'a str, &'a [GroupRecord])>,
{
    let mut names_to_sources: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for (source, groups) in by_source {
        for group in groups {
            names_to_sources
                .entry(group.name.as_str())
                .or_default()
                .insert(source);
        }
    }

    names_to_sources
        .into_iter()
        .filter(|(_, sources)| sources.len() > 1)
        .map(|(name, sources)| {
            (
                name.to_string(),
                GroupConflicts {
                    same_group_name: Some(SameGroupName {
                        fas_names: sources.into_iter().map(str::to_string).collect(),
                    }),
                },
            )
        })
        .collect()
}

/// Classify every username present in two or more sources.
///
/// `email_domains` maps a lower-cased email domain to the source owning it.
pub fn find_user_conflicts<'a, I>(
    by_source: I,
    email_domains: &BTreeMap<String, String>,
) -> BTreeMap<String, UserConflicts>
where
    I: IntoIterator<Item = (&'a str, &'a [UserRecord])>,
{
    let mut names_to_copies: BTreeMap<&str, BTreeMap<&str, &UserRecord>> = BTreeMap::new();
    for (source, users) in by_source {
        for user in users {
            names_to_copies
                .entry(user.username.as_str())
                .or_default()
                .entry(source)
                .or_insert(user);
        }
    }

    let mut result = BTreeMap::new();
    for (username, copies) in names_to_copies {
        if copies.len() < 2 {
            continue;
        }
        let conflicts = classify_user(username, &copies, email_domains);
        if !conflicts.is_empty() {
            result.insert(username.to_string(), conflicts);
        }
    }
    result
}

fn classify_user(
    username: &str,
    copies: &BTreeMap<&str, &UserRecord>,
    email_domains: &BTreeMap<String, String>,
) -> UserConflicts {
    let mut addresses: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (source, user) in copies {
        if let Some(email) = user.email.as_deref().map(normalize_email) {
            if !email.is_empty() {
                addresses
                    .entry(email)
                    .or_default()
                    .insert(source.to_string());
            }
        }
    }

    let mailbox_wanted = username.to_lowercase();
    let mut conflicts = UserConflicts::default();

    for (address, sources) in addresses.iter_mut() {
        let Some((mailbox, domain)) = address.rsplit_once('@') else {
            continue;
        };
        if mailbox != mailbox_wanted {
            continue;
        }
        let Some(target) = email_domains.get(domain) else {
            continue;
        };
        if sources.remove(target) {
            conflicts.circular_email.push(CircularEmail {
                fas_name: target.clone(),
                email_address: address.clone(),
            });
        }
        if !sources.is_empty() {
            conflicts.email_pointing_to_other_fas.push(EmailPointer {
                email_address: address.clone(),
                src_fas_names: sources.iter().cloned().collect(),
                tgt_fas_name: target.clone(),
            });
            sources.clear();
        }
    }

    let unresolved: Vec<AddressClaim> = addresses
        .into_iter()
        .filter(|(_, sources)| !sources.is_empty())
        .map(|(email_address, sources)| AddressClaim {
            email_address,
            fas_names: sources.into_iter().collect(),
        })
        .collect();
    if unresolved.len() > 1 {
        conflicts.email_address_conflicts = unresolved;
    }

    conflicts
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Which conflict kinds make the writer refuse an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    pub users: BTreeSet<ConflictKind>,
    pub groups: BTreeSet<ConflictKind>,
}

impl SkipPolicy {
    /// Reject kinds listed for the wrong kind of entity.
    pub fn validate(&self) -> Result<()> {
        for (kinds, scope, table) in [
            (&self.users, Scope::User, "users"),
            (&self.groups, Scope::Group, "groups"),
        ] {
            if let Some(kind) = kinds.iter().find(|k| k.scope() != scope) {
                return Err(Error::config(format!(
                    "skip_conflicts.{} cannot contain {}",
                    table, kind
                )));
            }
        }
        Ok(())
    }

    /// The first conflict kind that makes the user skipped, if any.
    pub fn skips_user(&self, conflicts: Option<&UserConflicts>) -> Option<ConflictKind> {
        conflicts?
            .kinds()
            .into_iter()
            .find(|k| self.users.contains(k))
    }

    /// The first conflict kind that makes the group skipped, if any.
    pub fn skips_group(&self, conflicts: Option<&GroupConflicts>) -> Option<ConflictKind> {
        conflicts?
            .kinds()
            .into_iter()
            .find(|k| self.groups.contains(k))
    }
}

/// Human-readable report of every conflict.
pub fn render_report(conflicts: &Conflicts) -> String {
    let mut out = String::new();

    if conflicts.is_empty() {
        out.push_str("No users or groups with conflicts found.\n");
        return out;
    }

    if !conflicts.users.is_empty() {
        out.push_str("User conflicts\n==============\n");
        for (name, user) in &conflicts.users {
            out.push_str(&format!("Conflicts for user '{}':\n", name));
            if !user.circular_email.is_empty() {
                out.push_str("\tCircular email address:\n");
                for item in &user.circular_email {
                    out.push_str(&format!("\t\t{}: {}\n", item.fas_name, item.email_address));
                }
            }
            if !user.email_pointing_to_other_fas.is_empty() {
                out.push_str("\tEmail address points to other FAS:\n");
                for item in &user.email_pointing_to_other_fas {
                    out.push_str(&format!(
                        "\t\tEmail address {} for {} points to {}.\n",
                        item.email_address,
                        item.src_fas_names.join(", "),
                        item.tgt_fas_name
                    ));
                }
            }
            if !user.email_address_conflicts.is_empty() {
                out.push_str("\tConflicting email addresses between FAS instances:\n");
                for item in &user.email_address_conflicts {
                    out.push_str(&format!(
                        "\t\t{}: {}\n",
                        item.email_address,
                        item.fas_names.join(", ")
                    ));
                }
            }
        }
        out.push_str(&format!(
            "Found {} users with conflicts.\n",
            conflicts.users.len()
        ));
    }

    if !conflicts.groups.is_empty() {
        out.push_str("Group conflicts\n===============\n");
        for (name, group) in &conflicts.groups {
            out.push_str(&format!("Conflicts for group '{}':\n", name));
            if let Some(same) = &group.same_group_name {
                out.push_str(&format!(
                    "\tSame group name between: {}\n",
                    same.fas_names.join(", ")
                ));
            }
        }
        out.push_str(&format!(
            "Found {} groups with conflicts.\n",
            conflicts.groups.len()
        ));
    }

    out
}
