//! Run counters and the final report.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::status::WriteStatus;

pub const USERS_ADDED: &str = "users_added";
pub const USERS_EDITED: &str = "users_edited";
pub const USERS_SKIPPED: &str = "users_skipped";
pub const USERS_FAILED: &str = "users_failed";
pub const USER_COUNTER: &str = "user_counter";
pub const GROUPS_ADDED: &str = "groups_added";
pub const GROUPS_EDITED: &str = "groups_edited";
pub const GROUPS_SKIPPED: &str = "groups_skipped";
pub const GROUPS_FAILED: &str = "groups_failed";
pub const GROUPS_COUNTER: &str = "groups_counter";
pub const AGREEMENTS_ADDED: &str = "agreements_added";
pub const AGREEMENTS_FAILED: &str = "agreements_failed";
pub const REQUIREMENTS_ADDED: &str = "requirements_added";
pub const REQUIREMENTS_FAILED: &str = "requirements_failed";
pub const SIGNATURES_ADDED: &str = "signatures_added";
pub const SIGNATURES_FAILED: &str = "signatures_failed";
pub const MEMBERSHIPS_ADDED: &str = "memberships_added";
pub const MEMBERSHIPS_FAILED: &str = "memberships_failed";
pub const SPONSORS_ADDED: &str = "sponsors_added";
pub const SPONSORS_FAILED: &str = "sponsors_failed";
pub const REMOVALS_DONE: &str = "removals_done";
pub const REMOVALS_FAILED: &str = "removals_failed";

/// Relation counters in report order: key, then the report line for a
/// non-zero count.
const RELATION_LINES: &[(&str, &str)] = &[
    (AGREEMENTS_ADDED, "Successfully created {} agreements."),
    (AGREEMENTS_FAILED, "Failed to create {} agreements."),
    (REQUIREMENTS_ADDED, "Successfully added {} groups requiring an agreement."),
    (REQUIREMENTS_FAILED, "Failed to add {} groups requiring an agreement."),
    (SIGNATURES_ADDED, "Successfully recorded {} agreement signatures."),
    (SIGNATURES_FAILED, "Failed to record {} agreement signatures."),
    (MEMBERSHIPS_ADDED, "Successfully added {} group memberships."),
    (MEMBERSHIPS_FAILED, "Failed to add {} group memberships."),
    (SPONSORS_ADDED, "Successfully added {} group sponsors."),
    (SPONSORS_FAILED, "Failed to add {} group sponsors."),
    (REMOVALS_DONE, "Removed {} unapproved group members."),
    (REMOVALS_FAILED, "Failed to remove {} unapproved group members."),
];

const RULE_WIDTH: usize = 59;

/// Named non-negative counters. Absent keys read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats(BTreeMap<String, u64>);

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn add(&mut self, key: &str, n: u64) {
        *self.0.entry(key.to_string()).or_insert(0) += n;
    }

    /// Sum `other` into `self`, key by key.
    pub fn merge(&mut self, other: Stats) {
        for (key, value) in other.0 {
            *self.0.entry(key).or_insert(0) += value;
        }
    }

    /// Count one processed user.
    pub fn record_user(&mut self, status: WriteStatus) {
        self.add(USER_COUNTER, 1);
        match status {
            WriteStatus::Added => self.add(USERS_ADDED, 1),
            WriteStatus::Updated => self.add(USERS_EDITED, 1),
            WriteStatus::Skipped => self.add(USERS_SKIPPED, 1),
            WriteStatus::Failed => self.add(USERS_FAILED, 1),
            WriteStatus::Unmodified | WriteStatus::Removed => {}
        }
    }

    /// Count one processed group.
    pub fn record_group(&mut self, status: WriteStatus) {
        self.add(GROUPS_COUNTER, 1);
        match status {
            WriteStatus::Added => self.add(GROUPS_ADDED, 1),
            WriteStatus::Updated => self.add(GROUPS_EDITED, 1),
            WriteStatus::Skipped => self.add(GROUPS_SKIPPED, 1),
            WriteStatus::Failed => self.add(GROUPS_FAILED, 1),
            WriteStatus::Unmodified | WriteStatus::Removed => {}
        }
    }

    /// Count one agreement creation. An existing agreement counts as nothing.
    pub fn record_agreement(&mut self, status: WriteStatus) {
        match status {
            WriteStatus::Added => self.add(AGREEMENTS_ADDED, 1),
            WriteStatus::Failed => self.add(AGREEMENTS_FAILED, 1),
            _ => {}
        }
    }

    /// Count one group marked as requiring an agreement.
    pub fn record_requirement(&mut self, status: WriteStatus) {
        match status {
            WriteStatus::Added => self.add(REQUIREMENTS_ADDED, 1),
            WriteStatus::Failed => self.add(REQUIREMENTS_FAILED, 1),
            _ => {}
        }
    }

    pub fn render(&self) -> String {
        let rule = "~".repeat(RULE_WIDTH);
        let groups_changed = self.get(GROUPS_ADDED) + self.get(GROUPS_EDITED);
        let users_changed = self.get(USERS_ADDED) + self.get(USERS_EDITED);
        let mut lines = vec![
            rule.clone(),
            String::new(),
            format!("Successfully added {} users.", self.get(USERS_ADDED)),
            format!("Successfully edited {} users.", self.get(USERS_EDITED)),
            format!("Skipped {} users.", self.get(USERS_SKIPPED)),
        ];
        if self.get(USERS_FAILED) > 0 {
            lines.push(format!("Failed to write {} users.", self.get(USERS_FAILED)));
        }
        lines.push(String::new());
        lines.push(format!(
            "Successfully created {} groups.",
            self.get(GROUPS_ADDED)
        ));
        lines.push(format!(
            "Successfully edited {} groups.",
            self.get(GROUPS_EDITED)
        ));
        if self.get(GROUPS_FAILED) > 0 {
            lines.push(format!("Failed to write {} groups.", self.get(GROUPS_FAILED)));
        }
        let relations: Vec<String> = RELATION_LINES
            .iter()
            .filter(|(key, _)| self.get(key) > 0)
            .map(|(key, line)| line.replacen("{}", &self.get(key).to_string(), 1))
            .collect();
        if !relations.is_empty() {
            lines.push(String::new());
            lines.extend(relations);
        }
        lines.push(String::new());
        lines.push(format!(
            "Total FAS groups: {}. Total groups changed in FreeIPA: {}",
            self.get(GROUPS_COUNTER),
            groups_changed
        ));
        lines.push(format!(
            "Total FAS users: {}. Total users changed in FreeIPA: {}",
            self.get(USER_COUNTER),
            users_changed
        ));
        lines.push(String::new());
        lines.push(rule);
        let mut report = lines.join("\n");
        report.push('\n');
        report
    }
}

impl FromIterator<(String, u64)> for Stats {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut stats = Stats::new();
        for (key, value) in iter {
            stats.add(&key, value);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pairs: &[(&str, u64)]) -> Stats {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_missing_keys_are_zero() {
        assert_eq!(Stats::new().get(USERS_ADDED), 0);
    }

    #[test]
    fn test_merge_sums() {
        let mut total = stats(&[(USERS_ADDED, 2), (GROUPS_ADDED, 1)]);
        total.merge(stats(&[(USERS_ADDED, 3), (USERS_EDITED, 4)]));
        assert_eq!(total.get(USERS_ADDED), 5);
        assert_eq!(total.get(USERS_EDITED), 4);
        assert_eq!(total.get(GROUPS_ADDED), 1);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = stats(&[(USERS_ADDED, 2), (GROUPS_COUNTER, 7)]);
        let b = stats(&[(USERS_ADDED, 1), (USERS_SKIPPED, 9)]);
        let mut ab = a.clone();
        ab.merge(b.clone());
        let mut ba = b;
        ba.merge(a);
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_record_statuses() {
        let mut s = Stats::new();
        for status in WriteStatus::ALL {
            s.record_user(status);
        }
        s.record_group(WriteStatus::Updated);
        assert_eq!(s.get(USER_COUNTER), 6);
        assert_eq!(s.get(USERS_ADDED), 1);
        assert_eq!(s.get(USERS_FAILED), 1);
        assert_eq!(s.get(GROUPS_EDITED), 1);
        assert_eq!(s.get(GROUPS_COUNTER), 1);
    }

    #[test]
    fn test_render_derives_totals() {
        let s = stats(&[
            (USERS_ADDED, 3),
            (USERS_EDITED, 2),
            (GROUPS_ADDED, 1),
            (GROUPS_EDITED, 1),
            (GROUPS_COUNTER, 4),
            (USER_COUNTER, 10),
        ]);
        let report = s.render();
        assert!(report.contains("Total FAS groups: 4. Total groups changed in FreeIPA: 2"));
        assert!(report.contains("Total FAS users: 10. Total users changed in FreeIPA: 5"));
        assert!(!report.contains("Failed"));
    }

    #[test]
    fn test_record_relations() {
        let mut s = Stats::new();
        s.record_agreement(WriteStatus::Added);
        s.record_agreement(WriteStatus::Skipped);
        s.record_requirement(WriteStatus::Failed);
        s.record_requirement(WriteStatus::Skipped);
        assert_eq!(s.get(AGREEMENTS_ADDED), 1);
        assert_eq!(s.get(AGREEMENTS_FAILED), 0);
        assert_eq!(s.get(REQUIREMENTS_ADDED), 0);
        assert_eq!(s.get(REQUIREMENTS_FAILED), 1);
    }

    #[test]
    fn test_render_relation_failures() {
        let s = stats(&[
            (MEMBERSHIPS_ADDED, 4),
            (MEMBERSHIPS_FAILED, 2),
            (SIGNATURES_FAILED, 1),
            (REQUIREMENTS_FAILED, 3),
        ]);
        let report = s.render();
        assert!(report.contains("Successfully added 4 group memberships."));
        assert!(report.contains("Failed to add 2 group memberships."));
        assert!(report.contains("Failed to record 1 agreement signatures."));
        assert!(report.contains("Failed to add 3 groups requiring an agreement."));
        assert!(!report.contains("sponsors"));
        assert!(!report.contains("Removed"));
    }

    #[test]
    fn test_render_snapshot() {
        let s = stats(&[
            (USERS_ADDED, 12),
            (USERS_EDITED, 3),
            (USERS_SKIPPED, 2),
            (USERS_FAILED, 1),
            (USER_COUNTER, 18),
            (GROUPS_ADDED, 4),
            (GROUPS_EDITED, 1),
            (GROUPS_COUNTER, 5),
        ]);
        insta::assert_snapshot!("report", s.render().trim_end());
    }
}
