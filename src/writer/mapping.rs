//! Derivation of target payloads from source records.
//!
//! Records are never changed; every function here builds new values.

use regex::Regex;
use serde_json::Value;

use crate::config::{GroupPolicy, UserPolicy};
use crate::error::Result;
use crate::model::{ExtraFields, GroupRecord, UserRecord, ACTIVE_STATUS};
use crate::target::{GroupPayload, UserPayload};

pub const FIRST_NAME_UNSET: &str = "<first-name-unset>";
pub const LAST_NAME_UNSET: &str = "<last-name-unset>";
/// Host appended to mailing list names without one.
pub const DEFAULT_LIST_HOST: &str = "lists.fedoraproject.org";
/// Length of the short GPG key id kept by the target.
pub const GPG_KEYID_LEN: usize = 16;

const REDACTED: &str = "<redacted>";
const SENSITIVE_MARKERS: &[&str] = &["password", "secret", "token", "security"];

/// First, last and full name of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    pub first: String,
    pub last: String,
    pub full: String,
}

/// Split a human name into first and last name.
///
/// Exactly two tokens give first and last name. Any other count keeps the
/// whole name as last name. A missing name yields the placeholders.
pub fn split_human_name(human_name: Option<&str>) -> Names {
    let name = human_name.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Names {
            first: FIRST_NAME_UNSET.to_string(),
            last: LAST_NAME_UNSET.to_string(),
            full: format!("{} {}", FIRST_NAME_UNSET, LAST_NAME_UNSET),
        };
    }

    let tokens: Vec<&str> = name.split_whitespace().collect();
    match tokens.as_slice() {
        [first, last] => Names {
            first: first.to_string(),
            last: last.to_string(),
            full: name.to_string(),
        },
        _ => Names {
            first: FIRST_NAME_UNSET.to_string(),
            last: name.to_string(),
            full: name.to_string(),
        },
    }
}

/// Trimmed value, or `None` when absent or blank.
pub fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Collapse an IRC network and channel into one URI.
pub fn irc_uri(network: Option<&str>, channel: Option<&str>) -> Option<String> {
    let channel = channel.map(str::trim).filter(|c| !c.is_empty())?;
    let channel = channel.strip_prefix('#').unwrap_or(channel);
    let network = network.unwrap_or_default().to_lowercase();
    let host = if network.contains("gimp") {
        "irc.gimp.org"
    } else if network.contains("oftc") {
        "irc.oftc.net"
    } else {
        "irc.freenode.net"
    };
    Some(format!("irc://{}/#{}", host, channel))
}

/// Normalize a mailing list address.
pub fn mailing_list(value: Option<&str>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    let address = if value.contains('@') {
        value.to_string()
    } else {
        format!("{}@{}", value, DEFAULT_LIST_HOST)
    };
    Some(address.trim().trim_end_matches('.').to_lowercase())
}

/// The short form of a GPG key id.
pub fn gpg_keyid(value: Option<&str>) -> Option<String> {
    let value = value.map(str::trim).filter(|v| !v.is_empty())?;
    let skip = value.chars().count().saturating_sub(GPG_KEYID_LEN);
    let short: String = value.chars().skip(skip).collect();
    trimmed(Some(&short))
}

pub fn user_name(prefix: &str, username: &str) -> String {
    format!("{}{}", prefix, username)
}

pub fn group_name(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.to_lowercase())
}

/// Whether a field name looks like it holds a secret.
pub fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_MARKERS.iter().any(|marker| key.contains(marker))
}

/// Replace the values of secret-shaped keys, recursively.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive(key) {
                    *inner = Value::String(REDACTED.to_string());
                } else {
                    redact(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

/// A leftover field as it may be logged.
pub fn describe_field(key: &str, extra: &ExtraFields) -> String {
    if is_sensitive(key) {
        format!("{} = {}", key, REDACTED)
    } else {
        match extra.get(key) {
            Some(value) => format!("{} = {}", key, value),
            None => key.to_string(),
        }
    }
}

/// Builds target payloads.
pub struct FieldMapper {
    creation_time: Regex,
}

impl FieldMapper {
    pub fn new() -> Result<Self> {
        Ok(Self {
            creation_time: Regex::new(r"([0-9 :-]+)\.[0-9]+\+00:00")?,
        })
    }

    /// `2008-03-18 01:03:01.123456+00:00` becomes `2008-03-18 01:03:01Z`.
    pub fn creation_time(&self, value: Option<&str>) -> Option<String> {
        let value = trimmed(value)?;
        Some(self.creation_time.replace(&value, "${1}Z").into_owned())
    }

    pub fn user_payload(&self, user: &UserRecord, policy: &UserPolicy) -> UserPayload {
        let names = split_human_name(user.human_name.as_deref());
        let name = user_name(&policy.prefix, &user.username);
        UserPayload {
            home_directory: format!("{}/{}", policy.home_base.trim_end_matches('/'), name),
            name,
            first_name: names.first,
            last_name: names.last,
            gecos: names.full.clone(),
            display_name: names.full.clone(),
            full_name: names.full,
            disabled: user.status != ACTIVE_STATUS,
            random_password: false,
            ircnick: trimmed(user.ircnick.as_deref()),
            locale: trimmed(user.locale.as_deref()),
            timezone: trimmed(user.timezone.as_deref()),
            gpg_keyids: gpg_keyid(user.gpg_keyid.as_deref()).into_iter().collect(),
            status_note: trimmed(Some(&user.status)),
            creation_time: self.creation_time(user.creation.as_deref()),
            mail: trimmed(user.email.as_deref()),
            ssh_keys: trimmed(user.ssh_key.as_deref()).into_iter().collect(),
        }
    }

    pub fn group_payload(&self, group: &GroupRecord, policy: &GroupPolicy) -> GroupPayload {
        GroupPayload {
            name: group_name(&policy.prefix, &group.name),
            description: group
                .display_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            url: trimmed(group.url.as_deref()),
            mailing_list: mailing_list(group.mailing_list.as_deref()),
            irc_channel: irc_uri(group.irc_network.as_deref(), group.irc_channel.as_deref()),
        }
    }
}
