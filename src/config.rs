//! # Configuration Model
//!
//! Configuration is read from TOML files and resolved once, at startup, into
//! an immutable [`Config`] value. Each file is parsed into a [`ConfigLayer`]
//! where every setting is optional; layers are stacked in order (later files
//! win, table by table), and the result is resolved against built-in defaults.
//!
//! ## Layers
//!
//! 1. Built-in defaults (`DEFAULT_*` constants below).
//! 2. Global tables: `[ipa]`, `[users]`, `[groups]`, `[skip_conflicts]`.
//! 3. Per-source overrides: `[fas.<name>]`, with nested `[fas.<name>.groups]`
//!    and `[fas.<name>.users]` tables that override the global ones for that
//!    source only.
//!
//! Command-line switches that tune a run (`--skip-groups`, ...) are not part of
//! this model; they are carried by [`crate::phases::orchestrator::RunOptions`].
//!
//! ## Example
//!
//! ```toml
//! chunks = 30
//!
//! [ipa]
//! instances = ["ipa01.example.test", "ipa02.example.test"]
//! reauth_every = 300
//!
//! [skip_conflicts]
//! users = ["email_address_conflicts"]
//!
//! [fas.fedora]
//! url = "https://admin.fedoraproject.org/accounts"
//! email_domain = "fedoraproject.org"
//!
//! [fas.fedora.groups]
//! ignore = ["cla_fedora"]
//!
//! [[fas.fedora.agreement]]
//! name = "FPCA"
//! description_file = "fpca.txt"
//! group_prerequisite = "cla_done"
//! signed_groups = ["cla_fpca", "cla_done"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::conflicts::{ConflictKind, SkipPolicy};
use crate::error::{Error, Result};

/// Membership requests are batched; this is the maximum batch size.
pub const DEFAULT_CHUNKS: usize = 30;
/// Sessions expire, so every instance re-authenticates after this many writes.
pub const DEFAULT_REAUTH_EVERY: usize = 300;
/// Connection attempts per source request before giving up.
pub const DEFAULT_RETRIES: u32 = 3;
/// Per-request timeout for source reads.
pub const DEFAULT_TIMEOUT_SECS: u64 = 240;
/// Group search pattern.
pub const DEFAULT_GROUP_SEARCH: &str = "*";
/// Base directory for user home directories.
pub const DEFAULT_HOME_BASE: &str = "/home/fedora";

/// Configuration files looked up when `--config` is not given, in increasing
/// order of precedence.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/fas2ipa/config.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("fas2ipa").join("config.toml"));
    }
    paths.push(PathBuf::from("config.toml"));
    paths
}

/// What to do with users whose role in a group is not approved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnapprovedPolicy {
    /// Remove them from the group in a dedicated removal pass.
    #[default]
    Remove,
    /// Leave their target membership alone.
    Ignore,
    /// Add them as members like approved users.
    Add,
}

/// `[ipa]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IpaLayer {
    pub instances: Option<Vec<String>>,
    pub cert_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reauth_every: Option<usize>,
}

/// `[users]` table, global or per source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UsersLayer {
    pub skip_spam: Option<bool>,
    pub prefix: Option<String>,
    pub home_base: Option<String>,
    pub unapproved: Option<UnapprovedPolicy>,
}

/// `[groups]` table, global or per source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupsLayer {
    pub search: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub prefix: Option<String>,
}

/// `[skip_conflicts]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkipConflictsLayer {
    pub users: Option<Vec<ConflictKind>>,
    pub groups: Option<Vec<ConflictKind>>,
}

/// An agreement hosted by a source instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgreementConfig {
    pub name: String,
    /// File holding the agreement text.
    pub description_file: PathBuf,
    /// Name of the group that anchors the agreement's required groups.
    pub group_prerequisite: String,
    /// Membership in any of these groups counts as having signed.
    #[serde(default)]
    pub signed_groups: Vec<String>,
}

impl AgreementConfig {
    /// Read the agreement text.
    pub fn description(&self) -> Result<String> {
        std::fs::read_to_string(&self.description_file).map_err(|e| {
            Error::config(format!(
                "Cannot read description of agreement {:?} from {}: {}",
                self.name,
                self.description_file.display(),
                e
            ))
        })
    }
}

/// `[fas.<name>]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceLayer {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email_domain: Option<String>,
    pub retries: Option<u32>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub groups: GroupsLayer,
    #[serde(default)]
    pub users: UsersLayer,
    pub agreement: Option<Vec<AgreementConfig>>,
}

/// One configuration file, every setting optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub chunks: Option<usize>,
    pub strict: Option<bool>,
    #[serde(default)]
    pub ipa: IpaLayer,
    #[serde(default)]
    pub users: UsersLayer,
    #[serde(default)]
    pub groups: GroupsLayer,
    #[serde(default)]
    pub skip_conflicts: SkipConflictsLayer,
    #[serde(default)]
    pub fas: BTreeMap<String, SourceLayer>,
}

impl IpaLayer {
    fn overlay(self, top: IpaLayer) -> IpaLayer {
        IpaLayer {
            instances: top.instances.or(self.instances),
            cert_path: top.cert_path.or(self.cert_path),
            username: top.username.or(self.username),
            password: top.password.or(self.password),
            reauth_every: top.reauth_every.or(self.reauth_every),
        }
    }
}

impl UsersLayer {
    fn overlay(self, top: UsersLayer) -> UsersLayer {
        UsersLayer {
            skip_spam: top.skip_spam.or(self.skip_spam),
            prefix: top.prefix.or(self.prefix),
            home_base: top.home_base.or(self.home_base),
            unapproved: top.unapproved.or(self.unapproved),
        }
    }
}

impl GroupsLayer {
    fn overlay(self, top: GroupsLayer) -> GroupsLayer {
        GroupsLayer {
            search: top.search.or(self.search),
            ignore: top.ignore.or(self.ignore),
            prefix: top.prefix.or(self.prefix),
        }
    }
}

impl SourceLayer {
    fn overlay(self, top: SourceLayer) -> SourceLayer {
        SourceLayer {
            url: top.url.or(self.url),
            username: top.username.or(self.username),
            password: top.password.or(self.password),
            email_domain: top.email_domain.or(self.email_domain),
            retries: top.retries.or(self.retries),
            timeout_secs: top.timeout_secs.or(self.timeout_secs),
            groups: self.groups.overlay(top.groups),
            users: self.users.overlay(top.users),
            agreement: top.agreement.or(self.agreement),
        }
    }
}

impl ConfigLayer {
    /// Parse one TOML document.
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Stack `top` over `self`.
    pub fn overlay(self, top: ConfigLayer) -> ConfigLayer {
        let mut fas = self.fas;
        for (name, layer) in top.fas {
            let merged = match fas.remove(&name) {
                Some(base) => base.overlay(layer),
                None => layer,
            };
            fas.insert(name, merged);
        }
        ConfigLayer {
            chunks: top.chunks.or(self.chunks),
            strict: top.strict.or(self.strict),
            ipa: self.ipa.overlay(top.ipa),
            users: self.users.overlay(top.users),
            groups: self.groups.overlay(top.groups),
            skip_conflicts: SkipConflictsLayer {
                users: top.skip_conflicts.users.or(self.skip_conflicts.users),
                groups: top.skip_conflicts.groups.or(self.skip_conflicts.groups),
            },
            fas,
        }
    }
}

/// Effective settings of the target directory.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub instances: Vec<String>,
    pub cert_path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub reauth_every: usize,
}

/// Effective group policy of one source.
#[derive(Debug, Clone)]
pub struct GroupPolicy {
    pub search: String,
    pub ignore: BTreeSet<String>,
    pub prefix: String,
}

impl GroupPolicy {
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore.contains(name)
    }
}

/// Effective user policy of one source.
#[derive(Debug, Clone)]
pub struct UserPolicy {
    pub skip_spam: bool,
    pub prefix: String,
    pub home_base: String,
    pub unapproved: UnapprovedPolicy,
}

/// Effective, immutable settings of one source instance.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub url: Url,
    pub username: Option<String>,
    pub password: Option<String>,
    pub email_domain: Option<String>,
    pub retries: u32,
    pub timeout: Duration,
    pub groups: GroupPolicy,
    pub users: UserPolicy,
    pub agreements: Vec<AgreementConfig>,
}

/// The resolved configuration of one run.
#[derive(Debug, Clone)]
pub struct Config {
    pub chunks: usize,
    /// Fail entities carrying source fields the mapping does not consume.
    pub strict: bool,
    pub target: TargetConfig,
    pub skip: SkipPolicy,
    /// Sources in name order.
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Parse and resolve a single TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::resolve(ConfigLayer::parse(content)?)
    }

    /// Load and stack every existing file of `paths`, then resolve.
    ///
    /// With `required`, a missing file is an error instead of being skipped.
    pub fn load(paths: &[PathBuf], required: bool) -> Result<Self> {
        let mut stacked = ConfigLayer::default();
        for path in paths {
            if !path.exists() {
                if required {
                    return Err(Error::config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                continue;
            }
            log::debug!("Loading configuration from {}", path.display());
            stacked = stacked.overlay(read_layer(path)?);
        }
        Self::resolve(stacked)
    }

    /// Resolve stacked layers against the built-in defaults.
    pub fn resolve(layer: ConfigLayer) -> Result<Self> {
        let chunks = layer.chunks.unwrap_or(DEFAULT_CHUNKS);
        if chunks == 0 {
            return Err(Error::config("chunks must be at least 1"));
        }
        let reauth_every = layer.ipa.reauth_every.unwrap_or(DEFAULT_REAUTH_EVERY);
        if reauth_every == 0 {
            return Err(Error::config("ipa.reauth_every must be at least 1"));
        }

        let target = TargetConfig {
            instances: layer.ipa.instances.unwrap_or_default(),
            cert_path: layer.ipa.cert_path,
            username: layer.ipa.username,
            password: layer.ipa.password,
            reauth_every,
        };

        let skip = SkipPolicy {
            users: layer
                .skip_conflicts
                .users
                .unwrap_or_default()
                .into_iter()
                .collect(),
            groups: layer
                .skip_conflicts
                .groups
                .unwrap_or_default()
                .into_iter()
                .collect(),
        };
        skip.validate()?;

        let mut sources = Vec::with_capacity(layer.fas.len());
        for (name, source) in layer.fas {
            let groups = layer.groups.clone().overlay(source.groups);
            let users = layer.users.clone().overlay(source.users);
            let raw_url = source.url.ok_or_else(|| {
                Error::config_with_hint(
                    format!("Source {:?} has no url", name),
                    format!("Add 'url = ...' to the [fas.{}] table", name),
                )
            })?;
            let url = Url::parse(&raw_url).map_err(|e| {
                Error::config(format!("Source {:?} has an invalid url: {}", name, e))
            })?;

            sources.push(SourceConfig {
                name,
                url,
                username: source.username,
                password: source.password,
                email_domain: source.email_domain.map(|d| d.trim().to_lowercase()),
                retries: source.retries.unwrap_or(DEFAULT_RETRIES).max(1),
                timeout: Duration::from_secs(source.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
                groups: GroupPolicy {
                    search: groups
                        .search
                        .unwrap_or_else(|| DEFAULT_GROUP_SEARCH.to_string()),
                    ignore: groups.ignore.unwrap_or_default().into_iter().collect(),
                    prefix: groups.prefix.unwrap_or_default(),
                },
                users: UserPolicy {
                    skip_spam: users.skip_spam.unwrap_or(true),
                    prefix: users.prefix.unwrap_or_default(),
                    home_base: users
                        .home_base
                        .unwrap_or_else(|| DEFAULT_HOME_BASE.to_string()),
                    unapproved: users.unapproved.unwrap_or_default(),
                },
                agreements: source.agreement.unwrap_or_default(),
            });
        }

        Ok(Config {
            chunks,
            strict: layer.strict.unwrap_or(false),
            target,
            skip,
            sources,
        })
    }

    /// Look a source up by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Maps each configured email domain to the source owning it.
    pub fn email_domains(&self) -> BTreeMap<String, String> {
        self.sources
            .iter()
            .filter_map(|s| s.email_domain.clone().map(|d| (d, s.name.clone())))
            .collect()
    }

    /// Every agreement of every source, with the name of its source.
    pub fn agreements(&self) -> impl Iterator<Item = (&SourceConfig, &AgreementConfig)> {
        self.sources
            .iter()
            .flat_map(|s| s.agreements.iter().map(move |a| (s, a)))
    }
}

fn read_layer(path: &Path) -> Result<ConfigLayer> {
    let content = std::fs::read_to_string(path)?;
    ConfigLayer::parse(&content).map_err(|e| {
        Error::config(format!("Invalid configuration in {}: {}", path.display(), e))
    })
}
