//! # Target Directory Capability
//!
//! The writer never talks to the target directory directly. It goes through
//! [`TargetDirectory`], a fixed capability set whose errors distinguish the
//! idempotence signals ("already exists", "no modifications") from real
//! failures, and whose member operations report per-member outcomes instead
//! of an all-or-nothing result.
//!
//! [`ipa::IpaClient`] implements it over the FreeIPA JSON-RPC API. Tests use
//! the in-memory directory of the `mock` module.

pub mod ipa;
#[cfg(test)]
pub(crate) mod mock;

use serde::Serialize;
use thiserror::Error;

/// Per-member reason for an add that changed nothing.
pub const ALREADY_MEMBER: &str = "This entry is already a member";
/// Per-member reason for a removal that changed nothing.
pub const NOT_MEMBER: &str = "This entry is not a member";
/// Per-member reason for a member that does not exist.
pub const NO_SUCH_ENTRY: &str = "no such entry";

/// Errors of a target directory call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("no modifications to be performed")]
    NoModifications,

    #[error("{0} not found")]
    NotFound(String),

    #[error("session is not authorized")]
    Unauthorized,

    /// Still unauthorized after re-authenticating.
    #[error("still unauthorized after {attempts} attempt(s)")]
    AuthRetryExhausted { attempts: u32 },

    /// The directory refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type TargetResult<T> = std::result::Result<T, TargetError>;

/// Role granted by a membership write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberRole {
    Member,
    /// Member manager of the group.
    Sponsor,
}

impl MemberRole {
    pub fn plural(self) -> &'static str {
        match self {
            MemberRole::Member => "members",
            MemberRole::Sponsor => "sponsors",
        }
    }
}

/// Outcome of a member operation on one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberOutcome {
    /// Number of members actually changed.
    pub completed: usize,
    /// Members that were not changed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Attributes of a target user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserPayload {
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub gecos: String,
    pub display_name: String,
    pub home_directory: String,
    pub disabled: bool,
    /// Ask the directory to generate an initial password.
    pub random_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ircnick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gpg_keyids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ssh_keys: Vec<String>,
}

/// Attributes of a target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupPayload {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailing_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irc_channel: Option<String>,
}

/// An entity to create or modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    User(UserPayload),
    Group(GroupPayload),
}

impl Payload {
    pub fn name(&self) -> &str {
        match self {
            Payload::User(user) => &user.name,
            Payload::Group(group) => &group.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::User(_) => "user",
            Payload::Group(_) => "group",
        }
    }

    /// The payload of a creation: new users get a random password.
    pub fn for_create(&self) -> Payload {
        match self {
            Payload::User(user) => Payload::User(UserPayload {
                random_password: true,
                ..user.clone()
            }),
            Payload::Group(group) => Payload::Group(group.clone()),
        }
    }
}

/// Write capabilities of one target directory instance.
///
/// All methods take `&self`; implementations keep their session state behind
/// interior mutability.
pub trait TargetDirectory {
    /// Name of the instance, for diagnostics.
    fn name(&self) -> &str;

    fn login(&self) -> TargetResult<()>;

    fn logout(&self) -> TargetResult<()>;

    /// Create an entity. Fails with [`TargetError::AlreadyExists`] if it exists.
    fn create(&self, payload: &Payload) -> TargetResult<()>;

    /// Modify an entity. Fails with [`TargetError::NoModifications`] if
    /// nothing would change.
    fn modify(&self, payload: &Payload) -> TargetResult<()>;

    fn add_members(
        &self,
        group: &str,
        users: &[String],
        role: MemberRole,
    ) -> TargetResult<MemberOutcome>;

    fn remove_members(&self, group: &str, users: &[String]) -> TargetResult<MemberOutcome>;

    fn create_agreement(&self, name: &str, description: &str) -> TargetResult<()>;

    fn add_agreement_signers(
        &self,
        agreement: &str,
        users: &[String],
    ) -> TargetResult<MemberOutcome>;

    /// Make `groups` require the agreement.
    fn add_agreement_groups(
        &self,
        agreement: &str,
        groups: &[String],
    ) -> TargetResult<MemberOutcome>;

    /// Automatically add to `group` every user whose `key` attribute matches
    /// `regex`. Fails with [`TargetError::AlreadyExists`] if the rule exists.
    fn add_automember_rule(&self, group: &str, key: &str, regex: &str) -> TargetResult<()>;
}
