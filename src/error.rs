//! # Error Handling
//!
//! This module defines the error type shared by the `fas2ipa` library. It
//! uses `thiserror` to describe every failure that can abort a phase of the
//! migration: configuration problems found before any network I/O, source
//! pulls that ran out of retries, prerequisite graphs that cannot be walked,
//! and the file errors of the dataset and conflicts documents.
//!
//! Failures of a single entity write are *not* represented here. Those are
//! reported as [`crate::status::WriteStatus::Failed`] by the writer and never
//! abort a batch. The target directory's own error vocabulary lives in
//! [`crate::target::TargetError`].

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for fas2ipa operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration or the command-line flags are unusable.
    ///
    /// Raised before any network I/O happens.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Config {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A source instance could not be reached after exhausting its retry budget.
    #[error("Source {source_name} unavailable after {attempts} attempt(s): {message}")]
    SourceUnavailable {
        source_name: String,
        attempts: u32,
        message: String,
    },

    /// A source instance answered, but with something we cannot use.
    #[error("Source {source_name} error on {resource}: {message}")]
    Source {
        source_name: String,
        resource: String,
        message: String,
    },

    /// The group prerequisite graph loops back on itself.
    #[error("Cycle detected in group prerequisites: {cycle}")]
    CycleDetected { cycle: String },

    /// An agreement names a top-level prerequisite group that does not exist.
    #[error("Toplevel prerequisite {group} for agreement {agreement:?} not found")]
    PrerequisiteNotFound { agreement: String, group: String },

    /// The target directory refused a run-wide operation, such as the initial login.
    #[error("Target directory error: {0}")]
    Target(#[from] crate::target::TargetError),

    /// Refusing to overwrite an existing output file.
    #[error("File {} already exists", path.display())]
    FileExists { path: PathBuf },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A YAML (de)serialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A TOML parsing error.
    #[error("TOML parsing error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// A TOML serialization error.
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    /// An invalid regular expression.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a configuration error without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: None,
        }
    }

    /// Shorthand for a configuration error carrying a hint.
    pub fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
