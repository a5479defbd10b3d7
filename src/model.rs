//! # Source Records
//!
//! Typed shapes of the records pulled from a source instance. Every field the
//! migration understands is named; everything else the source sends lands in
//! the `extra` bucket of the record, so strict mode can tell exactly which
//! source fields were not consumed.
//!
//! Records are never mutated once pulled. The writer derives separate target
//! payloads from them (see [`crate::writer::mapping`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Leftover source fields, by name.
pub type ExtraFields = BTreeMap<String, serde_json::Value>;

/// Status of a source account that may be migrated as enabled.
pub const ACTIVE_STATUS: &str = "active";
/// Status of accounts rejected by the spam check.
pub const SPAM_STATUS: &str = "spamcheck_denied";
/// Role status of an approved group member.
pub const APPROVED_ROLE_STATUS: &str = "approved";

/// User fields the source sends that are knowingly not migrated.
pub const DISCARDED_USER_FIELDS: &[&str] = &[
    "affiliation",
    "alias_enabled",
    "approved_memberships",
    "certificate_serial",
    "comments",
    "country_code",
    "emailtoken",
    "facsimile",
    "id",
    "internal_comments",
    "last_seen",
    "latitude",
    "longitude",
    "old_password",
    "password",
    "password_changed",
    "passwordtoken",
    "postal_address",
    "privacy",
    "roles",
    "security_answer",
    "security_question",
    "status_change",
    "telephone",
    "unapproved_memberships",
    "unverified_email",
];

/// Group fields the source sends that are knowingly not migrated.
pub const DISCARDED_GROUP_FIELDS: &[&str] = &[
    "apply_rules",
    "approved_roles",
    "creation",
    "group_type",
    "invite_only",
    "joinmsg",
    "needs_sponsor",
    "owner_id",
    "unapproved_roles",
    "user_can_remove",
];

/// Read a null like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A user's role in one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRole {
    /// `user`, `sponsor` or `administrator`.
    pub role_type: String,
    /// `approved` or `unapproved`.
    pub role_status: String,
}

impl GroupRole {
    pub fn is_approved(&self) -> bool {
        self.role_status == APPROVED_ROLE_STATUS
    }

    /// Sponsors and administrators manage the group's membership.
    pub fn is_sponsor(&self) -> bool {
        matches!(self.role_type.as_str(), "sponsor" | "administrator")
    }
}

/// A group the user has joined.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Membership {
    pub name: String,
}

/// One account of one source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ircnick: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_keyid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_roles: BTreeMap<String, GroupRole>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub memberships: Vec<Membership>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl UserRecord {
    /// A bare record, mostly useful to build test data.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            human_name: None,
            status: ACTIVE_STATUS.to_string(),
            ircnick: None,
            locale: None,
            timezone: None,
            gpg_keyid: None,
            email: None,
            ssh_key: None,
            creation: None,
            group_roles: BTreeMap::new(),
            memberships: Vec::new(),
            extra: ExtraFields::new(),
        }
    }

    pub fn is_spam(&self) -> bool {
        self.status == SPAM_STATUS
    }

    /// Whether the user belongs to any of `groups`.
    pub fn is_member_of_any(&self, groups: &[String]) -> bool {
        self.memberships.iter().any(|m| groups.contains(&m.name))
    }

    /// Source fields neither mapped nor knowingly discarded.
    pub fn unprocessed_fields(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|k| !DISCARDED_USER_FIELDS.contains(k))
            .collect()
    }
}

/// One group of one source instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub name: String,
    pub id: i64,
    /// `id` of the group gating this one, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irc_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irc_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailing_list: Option<String>,
    #[serde(flatten)]
    pub extra: ExtraFields,
}

impl GroupRecord {
    pub fn new(name: impl Into<String>, id: i64) -> Self {
        Self {
            name: name.into(),
            id,
            prerequisite_id: None,
            display_name: None,
            irc_network: None,
            irc_channel: None,
            url: None,
            mailing_list: None,
            extra: ExtraFields::new(),
        }
    }

    pub fn with_prerequisite(mut self, prerequisite_id: i64) -> Self {
        self.prerequisite_id = Some(prerequisite_id);
        self
    }

    /// Source fields neither mapped nor knowingly discarded.
    pub fn unprocessed_fields(&self) -> Vec<&str> {
        self.extra
            .keys()
            .map(String::as_str)
            .filter(|k| !DISCARDED_GROUP_FIELDS.contains(k))
            .collect()
    }
}

/// Everything pulled from every source, keyed by source name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<GroupRecord>>,
    #[serde(default)]
    pub users: BTreeMap<String, Vec<UserRecord>>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.groups.values().all(Vec::is_empty) && self.users.values().all(Vec::is_empty)
    }
}
