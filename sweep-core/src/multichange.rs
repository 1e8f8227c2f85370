//! Offline file-pair change tooling.
//!
//! A change set records whole-file before/after pairs. Applying it to a
//! directory rewrites each target whose current content equals `before`,
//! or whose diff distance from `before` falls within a fuzzy threshold
//! (default 0.25, tunable). Previous contents are recorded as backups so
//! the change can be reverted. This utility is independent of the
//! concurrent engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::fs;
use std::path::Path;

/// Default fuzzy-match threshold: a candidate is accepted when at most a
/// quarter of it differs from the recorded `before`.
pub const DEFAULT_THRESHOLD: f32 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    /// Target path, relative to the directory the set is applied in.
    pub path: String,
    pub before: String,
    pub after: String,
    /// Content replaced by the last `apply`, kept for `revert`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
}

/// Outcome of applying one entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Content matched `before` exactly.
    Applied,
    /// Content matched within the threshold; carries the distance.
    AppliedFuzzy(f32),
    /// Content was too far from `before`; carries the distance.
    Skipped(f32),
    /// Target file missing or unreadable.
    Missing,
}

impl ChangeSet {
    /// Load a change set, or an empty one if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("failed to encode change set")?;
        fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Record a new entry from a before/after file pair. The entry's path
    /// is the `after` file's path as given.
    pub fn extract(&mut self, before_file: &Path, after_file: &Path) -> Result<()> {
        let before = fs::read_to_string(before_file)
            .with_context(|| format!("failed to read {}", before_file.display()))?;
        let after = fs::read_to_string(after_file)
            .with_context(|| format!("failed to read {}", after_file.display()))?;
        self.changes.push(Change {
            path: after_file.to_string_lossy().into_owned(),
            before,
            after,
            backup: None,
        });
        Ok(())
    }

    /// Apply every entry under `dir`, returning one outcome per entry in
    /// order. Matching entries get their previous content recorded as the
    /// backup; non-matching and missing targets are left untouched.
    pub fn apply(&mut self, dir: &Path, threshold: f32) -> Vec<(String, Outcome)> {
        let mut outcomes = Vec::with_capacity(self.changes.len());
        for change in &mut self.changes {
            let target = dir.join(&change.path);
            let outcome = apply_one(change, &target, threshold);
            outcomes.push((change.path.clone(), outcome));
        }
        outcomes
    }

    /// Restore recorded backups under `dir`, clearing them on success.
    pub fn revert(&mut self, dir: &Path) -> Result<()> {
        for change in &mut self.changes {
            let Some(backup) = change.backup.take() else {
                continue;
            };
            let target = dir.join(&change.path);
            fs::write(&target, backup)
                .with_context(|| format!("failed to restore {}", target.display()))?;
        }
        Ok(())
    }
}

fn apply_one(change: &mut Change, target: &Path, threshold: f32) -> Outcome {
    let Ok(current) = fs::read_to_string(target) else {
        return Outcome::Missing;
    };

    let outcome = if current == change.before {
        Outcome::Applied
    } else {
        let distance = diff_distance(&change.before, &current);
        if distance <= threshold {
            Outcome::AppliedFuzzy(distance)
        } else {
            return Outcome::Skipped(distance);
        }
    };

    if fs::write(target, &change.after).is_err() {
        return Outcome::Missing;
    }
    change.backup = Some(current);
    outcome
}

/// Line-diff distance between two texts: 0.0 is identical, 1.0 is
/// completely different.
fn diff_distance(a: &str, b: &str) -> f32 {
    1.0 - TextDiff::from_lines(a, b).ratio()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn set_with(path: &str, before: &str, after: &str) -> ChangeSet {
        ChangeSet {
            changes: vec![Change {
                path: path.to_string(),
                before: before.to_string(),
                after: after.to_string(),
                backup: None,
            }],
        }
    }

    #[test]
    fn extract_records_the_pair() {
        let dir = TempDir::new().unwrap();
        let before = dir.path().join("config.old");
        let after = dir.path().join("config.txt");
        fs::write(&before, "old\n").unwrap();
        fs::write(&after, "new\n").unwrap();

        let mut set = ChangeSet::default();
        set.extract(&before, &after).unwrap();
        assert_eq!(set.changes.len(), 1);
        assert_eq!(set.changes[0].before, "old\n");
        assert_eq!(set.changes[0].after, "new\n");
    }

    #[test]
    fn exact_match_applies_and_reverts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "one\ntwo\n").unwrap();
        let mut set = set_with("a.txt", "one\ntwo\n", "one\nthree\n");

        let outcomes = set.apply(dir.path(), DEFAULT_THRESHOLD);
        assert_eq!(outcomes[0].1, Outcome::Applied);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\nthree\n");

        set.revert(dir.path()).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one\ntwo\n");
        assert!(set.changes[0].backup.is_none());
    }

    #[test]
    fn near_match_applies_fuzzily() {
        let dir = TempDir::new().unwrap();
        // One line out of five differs from the recorded before.
        fs::write(dir.path().join("a.txt"), "1\n2\n3\n4\nX\n").unwrap();
        let mut set = set_with("a.txt", "1\n2\n3\n4\n5\n", "done\n");

        let outcomes = set.apply(dir.path(), DEFAULT_THRESHOLD);
        match outcomes[0].1 {
            Outcome::AppliedFuzzy(d) => assert!(d > 0.0 && d <= DEFAULT_THRESHOLD),
            ref other => panic!("expected fuzzy apply, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "done\n");
    }

    #[test]
    fn distant_content_is_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "completely\nunrelated\ntext\n").unwrap();
        let mut set = set_with("a.txt", "1\n2\n3\n", "done\n");

        let outcomes = set.apply(dir.path(), DEFAULT_THRESHOLD);
        assert!(matches!(outcomes[0].1, Outcome::Skipped(_)));
        // Untouched, and nothing recorded to revert.
        assert_eq!(
            fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "completely\nunrelated\ntext\n"
        );
        assert!(set.changes[0].backup.is_none());
    }

    #[test]
    fn missing_target_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut set = set_with("absent.txt", "a\n", "b\n");
        let outcomes = set.apply(dir.path(), DEFAULT_THRESHOLD);
        assert_eq!(outcomes[0].1, Outcome::Missing);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("change.json");
        let set = set_with("a.txt", "before\n", "after\n");
        set.save(&path).unwrap();

        let loaded = ChangeSet::load(&path).unwrap();
        assert_eq!(loaded.changes.len(), 1);
        assert_eq!(loaded.changes[0].path, "a.txt");

        // Missing file loads as an empty set.
        let empty = ChangeSet::load(&dir.path().join("missing.json")).unwrap();
        assert!(empty.changes.is_empty());
    }
}
