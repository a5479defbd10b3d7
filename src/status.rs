//! Outcome of a single entity write.

use std::fmt;

use serde::Serialize;

/// Every write returns exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteStatus {
    Added,
    Updated,
    Unmodified,
    Skipped,
    Removed,
    Failed,
}

impl WriteStatus {
    pub const ALL: [WriteStatus; 6] = [
        WriteStatus::Added,
        WriteStatus::Updated,
        WriteStatus::Unmodified,
        WriteStatus::Skipped,
        WriteStatus::Removed,
        WriteStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            WriteStatus::Added => "ADDED",
            WriteStatus::Updated => "UPDATED",
            WriteStatus::Unmodified => "UNMODIFIED",
            WriteStatus::Skipped => "SKIPPED",
            WriteStatus::Removed => "REMOVED",
            WriteStatus::Failed => "FAILED",
        }
    }

    /// Whether the target directory changed.
    pub fn is_change(self) -> bool {
        matches!(
            self,
            WriteStatus::Added | WriteStatus::Updated | WriteStatus::Removed
        )
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
