//! In-memory target directory.
//!
//! Several [`MockTarget`] instances can share one [`DirectoryState`], which
//! stands in for a replicated directory served by several hosts.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use super::{
    GroupPayload, MemberOutcome, MemberRole, Payload, TargetDirectory, TargetError, TargetResult,
    UserPayload, ALREADY_MEMBER, NOT_MEMBER, NO_SUCH_ENTRY,
};

#[derive(Debug, Default)]
pub struct DirectoryState {
    pub users: BTreeMap<String, UserPayload>,
    pub groups: BTreeMap<String, GroupPayload>,
    pub members: BTreeMap<String, BTreeSet<String>>,
    pub sponsors: BTreeMap<String, BTreeSet<String>>,
    pub agreements: BTreeMap<String, String>,
    pub signers: BTreeMap<String, BTreeSet<String>>,
    pub agreement_groups: BTreeMap<String, BTreeSet<String>>,
    pub automember: BTreeMap<String, (String, String)>,
    /// Users refused by member operations, with the reason.
    pub rejected_members: BTreeMap<String, String>,
    /// Entities whose create and modify are refused.
    pub rejected_entities: BTreeSet<String>,
    /// Groups whose member operations fail as a whole.
    pub broken_groups: BTreeSet<String>,
    /// Every call, as `instance:operation:argument`.
    pub calls: Vec<String>,
    /// Whether a created user asked for a random password.
    pub random_passwords: BTreeSet<String>,
    pub logins: u32,
    pub logouts: u32,
}

impl DirectoryState {
    pub fn with_users(names: &[&str]) -> Self {
        let mut state = DirectoryState::default();
        for name in names {
            state.users.insert(name.to_string(), bare_user(name));
        }
        state
    }

    pub fn add_group(&mut self, name: &str) {
        self.groups.insert(
            name.to_string(),
            GroupPayload {
                name: name.to_string(),
                description: String::new(),
                url: None,
                mailing_list: None,
                irc_channel: None,
            },
        );
    }

    pub fn members_of(&self, group: &str) -> BTreeSet<String> {
        self.members.get(group).cloned().unwrap_or_default()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.calls
            .iter()
            .filter(|c| c.split(':').nth(1) == Some(operation))
            .count()
    }
}

pub fn bare_user(name: &str) -> UserPayload {
    UserPayload {
        name: name.to_string(),
        first_name: "<first-name-unset>".to_string(),
        last_name: "<last-name-unset>".to_string(),
        full_name: String::new(),
        gecos: String::new(),
        display_name: String::new(),
        home_directory: format!("/home/fedora/{}", name),
        disabled: false,
        random_password: false,
        ircnick: None,
        locale: None,
        timezone: None,
        gpg_keyids: vec![],
        status_note: None,
        creation_time: None,
        mail: None,
        ssh_keys: vec![],
    }
}

/// One host of the shared in-memory directory.
#[derive(Clone)]
pub struct MockTarget {
    name: String,
    pub state: Arc<Mutex<DirectoryState>>,
    /// Calls left to fail with [`TargetError::Unauthorized`].
    unauthorized: Arc<Mutex<u32>>,
}

impl MockTarget {
    pub fn new(name: &str, state: Arc<Mutex<DirectoryState>>) -> Self {
        Self {
            name: name.to_string(),
            state,
            unauthorized: Arc::new(Mutex::new(0)),
        }
    }

    /// A single host over a fresh directory.
    pub fn standalone() -> Self {
        Self::new("ipa01", Arc::new(Mutex::new(DirectoryState::default())))
    }

    /// Fail the next `calls` write calls as unauthorized.
    pub fn expire_session(&self, calls: u32) {
        *self.unauthorized.lock().unwrap() = calls;
    }

    fn record(&self, operation: &str, argument: &str) -> TargetResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(format!("{}:{}:{}", self.name, operation, argument));

        let mut remaining = self.unauthorized.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(TargetError::Unauthorized);
        }
        Ok(())
    }
}

fn strip_random(payload: &Payload) -> Payload {
    match payload {
        Payload::User(user) => Payload::User(UserPayload {
            random_password: false,
            ..user.clone()
        }),
        Payload::Group(group) => Payload::Group(group.clone()),
    }
}

impl TargetDirectory for MockTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn login(&self) -> TargetResult<()> {
        let mut state = self.state.lock().unwrap();
        state.logins += 1;
        state.calls.push(format!("{}:login:", self.name));
        Ok(())
    }

    fn logout(&self) -> TargetResult<()> {
        let mut state = self.state.lock().unwrap();
        state.logouts += 1;
        state.calls.push(format!("{}:logout:", self.name));
        Ok(())
    }

    fn create(&self, payload: &Payload) -> TargetResult<()> {
        self.record("create", payload.name())?;
        let mut state = self.state.lock().unwrap();
        let name = payload.name().to_string();
        if state.rejected_entities.contains(&name) {
            return Err(TargetError::Rejected(format!("invalid {}", payload.kind())));
        }
        match payload {
            Payload::User(user) => {
                if state.users.contains_key(&name) {
                    return Err(TargetError::AlreadyExists(format!("user {:?}", name)));
                }
                if user.random_password {
                    state.random_passwords.insert(name.clone());
                }
                if let Payload::User(stored) = strip_random(payload) {
                    state.users.insert(name, stored);
                }
            }
            Payload::Group(group) => {
                if state.groups.contains_key(&name) {
                    return Err(TargetError::AlreadyExists(format!("group {:?}", name)));
                }
                state.groups.insert(name, group.clone());
            }
        }
        Ok(())
    }

    fn modify(&self, payload: &Payload) -> TargetResult<()> {
        self.record("modify", payload.name())?;
        let mut state = self.state.lock().unwrap();
        let name = payload.name().to_string();
        if state.rejected_entities.contains(&name) {
            return Err(TargetError::Rejected(format!("invalid {}", payload.kind())));
        }
        match strip_random(payload) {
            Payload::User(user) => match state.users.get(&name) {
                None => Err(TargetError::NotFound(name)),
                Some(current) if *current == user => Err(TargetError::NoModifications),
                Some(_) => {
                    state.users.insert(name, user);
                    Ok(())
                }
            },
            Payload::Group(group) => match state.groups.get(&name) {
                None => Err(TargetError::NotFound(name)),
                Some(current) if *current == group => Err(TargetError::NoModifications),
                Some(_) => {
                    state.groups.insert(name, group);
                    Ok(())
                }
            },
        }
    }

    fn add_members(
        &self,
        group: &str,
        users: &[String],
        role: MemberRole,
    ) -> TargetResult<MemberOutcome> {
        self.record(&format!("add_{}", role.plural()), group)?;
        let mut state = self.state.lock().unwrap();
        if state.broken_groups.contains(group) {
            return Err(TargetError::Transport("connection reset".to_string()));
        }
        if !state.groups.contains_key(group) {
            return Err(TargetError::NotFound(group.to_string()));
        }

        let mut outcome = MemberOutcome::default();
        for user in users {
            if let Some(reason) = state.rejected_members.get(user) {
                outcome.failed.push((user.clone(), reason.clone()));
                continue;
            }
            if !state.users.contains_key(user) {
                outcome.failed.push((user.clone(), NO_SUCH_ENTRY.to_string()));
                continue;
            }
            let set = match role {
                MemberRole::Member => state.members.entry(group.to_string()).or_default(),
                MemberRole::Sponsor => state.sponsors.entry(group.to_string()).or_default(),
            };
            if set.insert(user.clone()) {
                outcome.completed += 1;
            } else {
                outcome.failed.push((user.clone(), ALREADY_MEMBER.to_string()));
            }
        }
        Ok(outcome)
    }

    fn remove_members(&self, group: &str, users: &[String]) -> TargetResult<MemberOutcome> {
        self.record("remove_members", group)?;
        let mut state = self.state.lock().unwrap();
        if state.broken_groups.contains(group) {
            return Err(TargetError::Transport("connection reset".to_string()));
        }
        if !state.groups.contains_key(group) {
            return Err(TargetError::NotFound(group.to_string()));
        }

        let mut outcome = MemberOutcome::default();
        for user in users {
            if let Some(reason) = state.rejected_members.get(user) {
                outcome.failed.push((user.clone(), reason.clone()));
                continue;
            }
            let removed = state
                .members
                .get_mut(group)
                .map(|set| set.remove(user))
                .unwrap_or(false);
            if removed {
                outcome.completed += 1;
            } else {
                outcome.failed.push((user.clone(), NOT_MEMBER.to_string()));
            }
        }
        Ok(outcome)
    }

    fn create_agreement(&self, name: &str, description: &str) -> TargetResult<()> {
        self.record("create_agreement", name)?;
        let mut state = self.state.lock().unwrap();
        if state.agreements.contains_key(name) {
            return Err(TargetError::AlreadyExists(format!("agreement {:?}", name)));
        }
        state
            .agreements
            .insert(name.to_string(), description.to_string());
        Ok(())
    }

    fn add_agreement_signers(
        &self,
        agreement: &str,
        users: &[String],
    ) -> TargetResult<MemberOutcome> {
        self.record("add_agreement_signers", agreement)?;
        let mut state = self.state.lock().unwrap();
        if !state.agreements.contains_key(agreement) {
            return Err(TargetError::NotFound(agreement.to_string()));
        }

        let mut outcome = MemberOutcome::default();
        for user in users {
            if let Some(reason) = state.rejected_members.get(user) {
                outcome.failed.push((user.clone(), reason.clone()));
                continue;
            }
            if !state.users.contains_key(user) {
                outcome.failed.push((user.clone(), NO_SUCH_ENTRY.to_string()));
                continue;
            }
            if state
                .signers
                .entry(agreement.to_string())
                .or_default()
                .insert(user.clone())
            {
                outcome.completed += 1;
            } else {
                outcome.failed.push((user.clone(), ALREADY_MEMBER.to_string()));
            }
        }
        Ok(outcome)
    }

    fn add_agreement_groups(
        &self,
        agreement: &str,
        groups: &[String],
    ) -> TargetResult<MemberOutcome> {
        self.record("add_agreement_groups", agreement)?;
        let mut state = self.state.lock().unwrap();
        if !state.agreements.contains_key(agreement) {
            return Err(TargetError::NotFound(agreement.to_string()));
        }

        let mut outcome = MemberOutcome::default();
        for group in groups {
            if !state.groups.contains_key(group) {
                outcome.failed.push((group.clone(), NO_SUCH_ENTRY.to_string()));
                continue;
            }
            if state
                .agreement_groups
                .entry(agreement.to_string())
                .or_default()
                .insert(group.clone())
            {
                outcome.completed += 1;
            } else {
                outcome.failed.push((group.clone(), ALREADY_MEMBER.to_string()));
            }
        }
        Ok(outcome)
    }

    fn add_automember_rule(&self, group: &str, key: &str, regex: &str) -> TargetResult<()> {
        self.record("add_automember_rule", group)?;
        let mut state = self.state.lock().unwrap();
        if state.automember.contains_key(group) {
            return Err(TargetError::AlreadyExists(format!("automember rule {:?}", group)));
        }
        state
            .automember
            .insert(group.to_string(), (key.to_string(), regex.to_string()));
        Ok(())
    }
}
