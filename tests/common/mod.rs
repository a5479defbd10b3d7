//! Shared test utilities for the E2E tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_config(configs::TWO_SOURCES);
//!     fixture.command_with_config().arg("migrate").assert().failure();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::configs;
    #[allow(unused_imports)]
    pub use super::datasets;
    pub use super::TestFixture;
}

/// Configuration files for testing. None of them needs the network unless a
/// test actually pulls or pushes.
#[allow(dead_code)]
pub mod configs {
    /// Two FAS instances with their email domains, no FreeIPA server.
    pub const TWO_SOURCES: &str = r#"
[fas.fedora]
url = "https://fas.fedora.test/accounts"
email_domain = "fedoraproject.org"

[fas.centos]
url = "https://fas.centos.test/accounts"
email_domain = "centos.org"
"#;

    /// Not a valid configuration: `chunks` must be at least 1.
    pub const ZERO_CHUNKS: &str = "chunks = 0\n";

    /// An unknown top-level key.
    pub const UNKNOWN_KEY: &str = "colour = \"blue\"\n";
}

/// Dataset documents for testing.
#[allow(dead_code)]
pub mod datasets {
    /// alice exists in both sources with different addresses, and both
    /// sources have a `packager` group.
    pub const CONFLICTING: &str = r#"{
  "groups": {
    "fedora": [{"name": "packager", "id": 1}],
    "centos": [{"name": "packager", "id": 7}, {"name": "sig-cloud", "id": 8}]
  },
  "users": {
    "fedora": [{"username": "alice", "status": "active", "email": "alice@example.test"}],
    "centos": [{"username": "alice", "status": "active", "email": "alice@elsewhere.test"}]
  }
}
"#;

    /// No name is shared between sources.
    pub const CLEAN: &str = r#"{
  "groups": {
    "fedora": [{"name": "packager", "id": 1}],
    "centos": [{"name": "sig-cloud", "id": 8}]
  },
  "users": {
    "fedora": [{"username": "alice", "status": "active", "email": "alice@example.test"}],
    "centos": [{"username": "bob", "status": "active", "email": "bob@example.test"}]
  }
}
"#;
}

/// A temporary directory holding a configuration file and data files.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `config.toml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.with_file("config.toml", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Get the path to the config file.
    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("config.toml")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command running in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fas2ipa");
        cmd.current_dir(self.path());
        cmd.env_remove("FAS2IPA_CONFIG");
        cmd
    }

    /// Create a `migrate` command reading this fixture's config file.
    #[allow(dead_code)]
    pub fn migrate(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.arg("migrate").arg("--config").arg(self.config_path());
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_config() {
        let fixture = TestFixture::new().with_config(configs::TWO_SOURCES);
        assert!(fixture.config_path().exists());
    }

    #[test]
    fn test_datasets_are_valid_json() {
        for dataset in [datasets::CONFLICTING, datasets::CLEAN] {
            serde_json::from_str::<serde_json::Value>(dataset).expect("Dataset should be valid JSON");
        }
    }
}
