//! Blocking client for the FreeIPA JSON-RPC API.
//!
//! Each instance keeps an authenticated session in its cookie store. Calls go
//! to `<host>/ipa/session/json`; FreeIPA answers with a `result` or an `error`
//! object whose numeric `code` tells the idempotence signals apart.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use url::Url;

use super::{
    GroupPayload, MemberOutcome, MemberRole, Payload, TargetDirectory, TargetError, TargetResult,
    UserPayload,
};
use crate::config::TargetConfig;
use crate::error::{Error, Result};

/// `NotFound`
const CODE_NOT_FOUND: i64 = 4001;
/// `DuplicateEntry`
const CODE_DUPLICATE_ENTRY: i64 = 4002;
/// `EmptyModlist`
const CODE_EMPTY_MODLIST: i64 = 4202;

/// Talks to one FreeIPA server.
pub struct IpaClient {
    host: String,
    base: Url,
    username: String,
    password: String,
    http: Client,
}

impl IpaClient {
    /// Build a client for `host`, a host name or a full `https://` URL.
    pub fn new(host: &str, config: &TargetConfig) -> Result<Self> {
        let (Some(username), Some(password)) = (&config.username, &config.password) else {
            return Err(Error::config_with_hint(
                "Missing credentials for the target directory",
                "Set ipa.username and ipa.password",
            ));
        };

        let base = if host.contains("://") {
            Url::parse(host)?
        } else {
            Url::parse(&format!("https://{}/ipa/", host))?
        };

        let mut builder = Client::builder().cookie_store(true);
        if let Some(cert_path) = &config.cert_path {
            let pem = std::fs::read(cert_path)?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::config(format!("Invalid certificate {}: {}", cert_path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }
        let http = builder
            .build()
            .map_err(|e| Error::config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            host: host.to_string(),
            base,
            username: username.clone(),
            password: password.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> TargetResult<Url> {
        self.base
            .join(path)
            .map_err(|e| TargetError::Transport(e.to_string()))
    }

    fn referer(&self) -> String {
        self.base.as_str().trim_end_matches('/').to_string()
    }

    /// Run one JSON-RPC command and return its `result` object.
    fn call(&self, method: &str, args: Vec<Value>, options: Map<String, Value>) -> TargetResult<Value> {
        let body = json!({
            "method": method,
            "params": [args, options],
            "id": 0,
        });
        let response = self
            .http
            .post(self.endpoint("session/json")?)
            .header("Referer", self.referer())
            .json(&body)
            .send()
            .map_err(|e| TargetError::Transport(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(TargetError::Unauthorized);
        }
        if !response.status().is_success() {
            return Err(TargetError::Transport(format!("HTTP {}", response.status())));
        }

        let reply: Value = response
            .json()
            .map_err(|e| TargetError::Transport(e.to_string()))?;
        match reply.get("error") {
            Some(error) if !error.is_null() => Err(map_error(error)),
            _ => Ok(reply.get("result").cloned().unwrap_or(Value::Null)),
        }
    }

    fn member_call(
        &self,
        method: &str,
        target: &str,
        member_type: &str,
        failed_key: &str,
        members: &[String],
    ) -> TargetResult<MemberOutcome> {
        let mut options = Map::new();
        options.insert(member_type.to_string(), json!(members));
        if method.starts_with("group_") {
            options.insert("no_members".to_string(), json!(true));
        }
        let result = self.call(method, vec![json!(target)], options)?;
        Ok(member_outcome(&result, failed_key, member_type))
    }
}

fn map_error(error: &Value) -> TargetError {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    match code {
        CODE_DUPLICATE_ENTRY => TargetError::AlreadyExists(message),
        CODE_EMPTY_MODLIST => TargetError::NoModifications,
        CODE_NOT_FOUND => TargetError::NotFound(message),
        _ => TargetError::Rejected(message),
    }
}

/// Read `completed` and `failed.<failed_key>.<member_type>` of a member reply.
fn member_outcome(result: &Value, failed_key: &str, member_type: &str) -> MemberOutcome {
    let completed = result
        .get("completed")
        .and_then(Value::as_u64)
        .unwrap_or_default() as usize;
    let failed = result
        .pointer(&format!("/failed/{}/{}", failed_key, member_type))
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.get(0)?.as_str()?.to_string();
                    let reason = entry.get(1)?.as_str()?.to_string();
                    Some((name, reason))
                })
                .collect()
        })
        .unwrap_or_default();
    MemberOutcome { completed, failed }
}

fn set_opt(options: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        options.insert(key.to_string(), json!(value));
    }
}

fn user_options(user: &UserPayload) -> Map<String, Value> {
    let mut options = Map::new();
    options.insert("givenname".to_string(), json!(user.first_name));
    options.insert("sn".to_string(), json!(user.last_name));
    options.insert("cn".to_string(), json!(user.full_name));
    options.insert("gecos".to_string(), json!(user.gecos));
    options.insert("displayname".to_string(), json!(user.display_name));
    options.insert("homedirectory".to_string(), json!(user.home_directory));
    options.insert("nsaccountlock".to_string(), json!(user.disabled));
    if user.random_password {
        options.insert("random".to_string(), json!(true));
    }
    set_opt(&mut options, "fasircnick", &user.ircnick);
    set_opt(&mut options, "faslocale", &user.locale);
    set_opt(&mut options, "fastimezone", &user.timezone);
    if !user.gpg_keyids.is_empty() {
        options.insert("fasgpgkeyid".to_string(), json!(user.gpg_keyids));
    }
    set_opt(&mut options, "fasstatusnote", &user.status_note);
    set_opt(&mut options, "fascreationtime", &user.creation_time);
    set_opt(&mut options, "mail", &user.mail);
    if !user.ssh_keys.is_empty() {
        options.insert("ipasshpubkey".to_string(), json!(user.ssh_keys));
    }
    options
}

fn group_options(group: &GroupPayload, create: bool) -> Map<String, Value> {
    let mut options = Map::new();
    options.insert("description".to_string(), json!(group.description));
    if create {
        options.insert("fasgroup".to_string(), json!(true));
    }
    set_opt(&mut options, "fasurl", &group.url);
    set_opt(&mut options, "fasmailinglist", &group.mailing_list);
    set_opt(&mut options, "fasircchannel", &group.irc_channel);
    options
}

/// Method and options of a create or modify command.
fn entity_command(payload: &Payload, create: bool) -> (&'static str, Map<String, Value>) {
    match (payload, create) {
        (Payload::User(user), true) => ("user_add", user_options(user)),
        (Payload::User(user), false) => ("user_mod", user_options(user)),
        (Payload::Group(group), true) => ("group_add", group_options(group, true)),
        (Payload::Group(group), false) => ("group_mod", group_options(group, false)),
    }
}

impl TargetDirectory for IpaClient {
    fn name(&self) -> &str {
        &self.host
    }

    fn login(&self) -> TargetResult<()> {
        let response = self
            .http
            .post(self.endpoint("session/login_password")?)
            .header("Referer", self.referer())
            .header("Accept", "text/plain")
            .form(&[("user", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .map_err(|e| TargetError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::UNAUTHORIZED {
            Err(TargetError::Unauthorized)
        } else {
            Err(TargetError::Transport(format!("login failed: HTTP {}", status)))
        }
    }

    fn logout(&self) -> TargetResult<()> {
        match self.call("session_logout", vec![], Map::new()) {
            Ok(_) | Err(TargetError::Unauthorized) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create(&self, payload: &Payload) -> TargetResult<()> {
        let (method, options) = entity_command(payload, true);
        self.call(method, vec![json!(payload.name())], options)
            .map(|_| ())
    }

    fn modify(&self, payload: &Payload) -> TargetResult<()> {
        let (method, options) = entity_command(payload, false);
        self.call(method, vec![json!(payload.name())], options)
            .map(|_| ())
    }

    fn add_members(
        &self,
        group: &str,
        users: &[String],
        role: MemberRole,
    ) -> TargetResult<MemberOutcome> {
        match role {
            MemberRole::Member => {
                self.member_call("group_add_member", group, "user", "member", users)
            }
            MemberRole::Sponsor => self.member_call(
                "group_add_member_manager",
                group,
                "user",
                "membermanager",
                users,
            ),
        }
    }

    fn remove_members(&self, group: &str, users: &[String]) -> TargetResult<MemberOutcome> {
        self.member_call("group_remove_member", group, "user", "member", users)
    }

    fn create_agreement(&self, name: &str, description: &str) -> TargetResult<()> {
        let mut options = Map::new();
        options.insert("description".to_string(), json!(description));
        self.call("fasagreement_add", vec![json!(name)], options)
            .map(|_| ())
    }

    fn add_agreement_signers(
        &self,
        agreement: &str,
        users: &[String],
    ) -> TargetResult<MemberOutcome> {
        self.member_call("fasagreement_add_user", agreement, "user", "memberuser", users)
    }

    fn add_agreement_groups(
        &self,
        agreement: &str,
        groups: &[String],
    ) -> TargetResult<MemberOutcome> {
        self.member_call("fasagreement_add_group", agreement, "group", "member", groups)
    }

    fn add_automember_rule(&self, group: &str, key: &str, regex: &str) -> TargetResult<()> {
        let mut options = Map::new();
        options.insert("type".to_string(), json!("group"));
        self.call("automember_add", vec![json!(group)], options)?;

        let mut condition = Map::new();
        condition.insert("type".to_string(), json!("group"));
        condition.insert("key".to_string(), json!(key));
        condition.insert("automemberinclusiveregex".to_string(), json!([regex]));
        self.call("automember_add_condition", vec![json!(group)], condition)
            .map(|_| ())
    }
}
