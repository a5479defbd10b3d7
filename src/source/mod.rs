//! # Source Reader
//!
//! Extracts users and groups from one source instance through the
//! [`SourceClient`] capability and normalizes them into typed records.
//!
//! The source cannot enumerate all of its users in one request, so users are
//! listed pattern by pattern (`0*`, `1*`, ..., `z*` by default). Results are
//! merged, filtered against the `--users-start-at` key and sorted by primary
//! key so that a resumed run walks the same order as the interrupted one.
//!
//! Connection failures are retried up to the source's retry budget. Any other
//! failure is reported immediately.

pub mod fas;

use std::collections::BTreeMap;

use log::{info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::model::{Dataset, GroupRecord, UserRecord};

/// Listing resource for users.
pub const USER_LIST: &str = "user/list";
/// Listing resource for groups.
pub const GROUP_LIST: &str = "group/list";

/// Failure of a single source request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The source could not be reached. Worth retrying.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The source answered with something unusable.
    #[error("bad response: {0}")]
    Response(String),
}

/// Capability to query a source instance.
pub trait SourceClient {
    /// Fetch `resource` with the given query parameters, returning the
    /// decoded JSON document.
    fn fetch(
        &self,
        resource: &str,
        params: &[(&str, &str)],
    ) -> std::result::Result<serde_json::Value, TransportError>;
}

#[derive(Deserialize)]
struct UserListResponse {
    #[serde(default)]
    people: Option<Vec<UserRecord>>,
    #[serde(default)]
    unapproved_people: Option<Vec<UserRecord>>,
}

#[derive(Deserialize)]
struct GroupListResponse {
    #[serde(default)]
    groups: Option<Vec<GroupRecord>>,
}

/// Username patterns to query.
///
/// With explicit `restrict` patterns only those are used. Otherwise one
/// `<c>*` pattern per character of `0-9a-z`. With `start_at`, patterns that
/// cannot match a username sorting at or after it are dropped.
pub fn user_patterns(start_at: Option<&str>, restrict: &[String]) -> Vec<String> {
    let start_at = start_at.filter(|s| !s.is_empty());

    if !restrict.is_empty() {
        return restrict
            .iter()
            .filter(|pattern| match start_at {
                Some(start) => pattern.replace('*', "\u{10ffff}").as_str() >= start,
                None => true,
            })
            .cloned()
            .collect();
    }

    let first = start_at
        .and_then(|s| s.chars().next())
        .map(|c| c.to_ascii_lowercase());
    ('0'..='9')
        .chain('a'..='z')
        .filter(|c| first.map_or(true, |f| *c >= f))
        .map(|c| format!("{}*", c))
        .collect()
}

/// Reads users and groups from one source instance.
pub struct SourceReader<'a> {
    config: &'a SourceConfig,
    client: &'a dyn SourceClient,
}

impl<'a> SourceReader<'a> {
    pub fn new(config: &'a SourceConfig, client: &'a dyn SourceClient) -> Self {
        Self { config, client }
    }

    /// Fetch a resource, retrying connection failures.
    fn fetch(&self, resource: &str, params: &[(&str, &str)]) -> Result<serde_json::Value> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.fetch(resource, params) {
                Ok(value) => return Ok(value),
                Err(TransportError::Connection(message)) => {
                    if attempt >= attempts {
                        return Err(Error::SourceUnavailable {
                            source_name: self.config.name.clone(),
                            attempts,
                            message,
                        });
                    }
                    warn!(
                        "{}: {} failed ({}), retry #{}",
                        self.config.name, resource, message, attempt
                    );
                }
                Err(TransportError::Response(message)) => {
                    return Err(self.source_error(resource, message));
                }
            }
        }
    }

    fn source_error(&self, resource: &str, message: impl Into<String>) -> Error {
        Error::Source {
            source_name: self.config.name.clone(),
            resource: resource.to_string(),
            message: message.into(),
        }
    }

    /// Pull every user matching the patterns, sorted by username.
    pub fn pull_users(&self, start_at: Option<&str>, restrict: &[String]) -> Result<Vec<UserRecord>> {
        let start_at = start_at.filter(|s| !s.is_empty());
        let mut by_name: BTreeMap<String, UserRecord> = BTreeMap::new();

        for pattern in user_patterns(start_at, restrict) {
            let value = self.fetch(USER_LIST, &[("search", pattern.as_str())])?;
            let response: UserListResponse = serde_json::from_value(value)
                .map_err(|e| self.source_error(USER_LIST, e.to_string()))?;

            let found = response
                .people
                .into_iter()
                .flatten()
                .chain(response.unapproved_people.into_iter().flatten())
                .filter(|u| start_at.map_or(true, |start| u.username.as_str() >= start));
            let before = by_name.len();
            for user in found {
                by_name.entry(user.username.clone()).or_insert(user);
            }
            info!(
                "{}: {} new users matching {:?}",
                self.config.name,
                by_name.len() - before,
                pattern
            );
        }

        Ok(by_name.into_values().collect())
    }

    /// Pull the groups matching the configured search, minus ignored ones.
    pub fn pull_groups(&self) -> Result<Vec<GroupRecord>> {
        let policy = &self.config.groups;
        let value = self.fetch(GROUP_LIST, &[("search", policy.search.as_str())])?;
        let response: GroupListResponse = serde_json::from_value(value)
            .map_err(|e| self.source_error(GROUP_LIST, e.to_string()))?;

        let mut groups: Vec<GroupRecord> = response
            .groups
            .unwrap_or_default()
            .into_iter()
            .filter(|g| !policy.is_ignored(&g.name))
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups.dedup_by(|a, b| a.name == b.name);
        info!("{}: got {} groups", self.config.name, groups.len());
        Ok(groups)
    }
}

/// Pull every source into one dataset. A failing source aborts the pull.
///
/// `clients` yields the client of each source in the order of `sources`.
pub fn pull(
    sources: &[SourceConfig],
    clients: &[Box<dyn SourceClient>],
    with_groups: bool,
    start_at: Option<&str>,
    restrict: &[String],
) -> Result<Dataset> {
    let mut dataset = Dataset::default();
    for (config, client) in sources.iter().zip(clients) {
        let reader = SourceReader::new(config, client.as_ref());
        if with_groups {
            dataset
                .groups
                .insert(config.name.clone(), reader.pull_groups()?);
        }
        dataset
            .users
            .insert(config.name.clone(), reader.pull_users(start_at, restrict)?);
    }
    Ok(dataset)
}


#[cfg(test)]
mod tests {
    use super::mock::MockSourceClient;
    use super::*;
    use crate::config::Config;
    use serde_json::json;

    fn source_config(retries: u32) -> SourceConfig {
        let toml = format!(
            "[fas.fedora]\nurl = \"https://fas.test/accounts\"\nretries = {}\n[fas.fedora.groups]\nignore = [\"cla_fedora\"]\n",
            retries
        );
        Config::from_toml_str(&toml).unwrap().sources.remove(0)
    }

    fn user(name: &str) -> serde_json::Value {
        json!({"username": name, "status": "active"})
    }

    #[test]
    fn test_default_patterns() {
        let patterns = user_patterns(None, &[]);
        assert_eq!(patterns.len(), 36);
        assert_eq!(patterns[0], "0*");
        assert_eq!(patterns[10], "a*");
        assert_eq!(patterns[35], "z*");
    }

    #[test]
    fn test_default_patterns_start_at() {
        let patterns = user_patterns(Some("Mallory"), &[]);
        assert_eq!(patterns.first().map(String::as_str), Some("m*"));
        assert_eq!(patterns.len(), 14);
    }

    #[test]
    fn test_restricted_patterns_start_at() {
        let restrict = vec!["alice".to_string(), "b*".to_string(), "carol".to_string()];
        assert_eq!(user_patterns(None, &restrict), restrict);
        assert_eq!(user_patterns(Some("bob"), &restrict), vec!["b*", "carol"]);
    }

    #[test]
    fn test_pull_users_merges_and_sorts() {
        let mut client = MockSourceClient::default();
        client.users = vec![user("bob"), user("alice"), user("0day")];
        client.unapproved = vec![user("anna")];
        let config = source_config(1);
        let reader = SourceReader::new(&config, &client);

        let users = reader.pull_users(None, &[]).unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["0day", "alice", "anna", "bob"]);
        assert_eq!(client.calls.borrow().len(), 36);
    }

    #[test]
    fn test_pull_users_start_at_filters() {
        let mut client = MockSourceClient::default();
        client.users = vec![user("alice"), user("bob"), user("bobby"), user("carol")];
        let config = source_config(1);
        let reader = SourceReader::new(&config, &client);

        let users = reader.pull_users(Some("bobby"), &[]).unwrap();
        let names: Vec<_> = users.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["bobby", "carol"]);
    }

    #[test]
    fn test_pull_users_overlapping_patterns_dedup() {
        let mut client = MockSourceClient::default();
        client.users = vec![user("alice"), user("alfred")];
        let config = source_config(1);
        let reader = SourceReader::new(&config, &client);

        let restrict = vec!["al*".to_string(), "alice".to_string()];
        let users = reader.pull_users(None, &restrict).unwrap();
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn test_connection_failures_are_retried() {
        let mut client = MockSourceClient::with_failures(vec![
            TransportError::Connection("refused".to_string()),
            TransportError::Connection("refused".to_string()),
        ]);
        client.groups = vec![json!({"name": "qa", "id": 1})];
        let config = source_config(3);
        let reader = SourceReader::new(&config, &client);

        let groups = reader.pull_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(client.calls.borrow().len(), 3);
    }

    #[test]
    fn test_retry_budget_exhausted() {
        let client = MockSourceClient::with_failures(vec![
            TransportError::Connection("refused".to_string()),
            TransportError::Connection("refused".to_string()),
        ]);
        let config = source_config(2);
        let reader = SourceReader::new(&config, &client);

        let err = reader.pull_groups().unwrap_err();
        assert!(matches!(
            err,
            Error::SourceUnavailable { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_bad_response_not_retried() {
        let client =
            MockSourceClient::with_failures(vec![TransportError::Response("exc".to_string())]);
        let config = source_config(5);
        let reader = SourceReader::new(&config, &client);

        let err = reader.pull_groups().unwrap_err();
        assert!(matches!(err, Error::Source { .. }));
        assert_eq!(client.calls.borrow().len(), 1);
    }

    #[test]
    fn test_pull_groups_ignores_and_sorts() {
        let mut client = MockSourceClient::default();
        client.groups = vec![
            json!({"name": "qa", "id": 2}),
            json!({"name": "cla_fedora", "id": 3}),
            json!({"name": "packager", "id": 1, "prerequisite_id": null}),
        ];
        let config = source_config(1);
        let reader = SourceReader::new(&config, &client);

        let groups = reader.pull_groups().unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["packager", "qa"]);
        assert_eq!(client.calls.borrow()[0], ("group/list".to_string(), "*".to_string()));
    }

    #[test]
    fn test_pull_builds_dataset() {
        let mut client = MockSourceClient::default();
        client.users = vec![user("alice")];
        client.groups = vec![json!({"name": "qa", "id": 2})];
        let sources = vec![source_config(1)];
        let clients: Vec<Box<dyn SourceClient>> = vec![Box::new(client)];

        let dataset = pull(&sources, &clients, true, None, &[]).unwrap();
        assert_eq!(dataset.users["fedora"].len(), 1);
        assert_eq!(dataset.groups["fedora"].len(), 1);

        let without_groups = pull(&sources, &clients, false, None, &[]).unwrap();
        assert!(without_groups.groups.is_empty());
    }
}
