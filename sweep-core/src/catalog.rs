//! The repository catalog: name → metadata, label → name-set.
//!
//! Loaded once per process (or per test) from `<sweep_dir>/repos.json` and
//! read-only afterwards. Configured aliases are fed into the same label
//! index as catalog labels, so an alias and a discovered label are
//! indistinguishable to the filter engine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// One catalog entry. Host, project and default branch may be empty; the
/// repo utilities fall back to the configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub project: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub default_branch: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub public: bool,
}

/// Immutable-after-load repository map plus label index.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    repos: BTreeMap<String, Repository>,
    labels: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    /// Load the catalog from a JSON file: an array of [`Repository`]
    /// entries. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let repos: Vec<Repository> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Self::from_repos(repos))
    }

    /// Build a catalog from entries, indexing every label.
    pub fn from_repos(repos: Vec<Repository>) -> Self {
        let mut catalog = Self::default();
        for repo in repos {
            catalog.insert(repo);
        }
        catalog
    }

    pub fn insert(&mut self, repo: Repository) {
        for label in &repo.labels {
            self.labels
                .entry(label.clone())
                .or_default()
                .insert(repo.name.clone());
        }
        self.repos.insert(repo.name.clone(), repo);
    }

    /// Register an alias as a label. Unknown member names are kept: the
    /// filter engine treats them as literals and a worker surfaces the
    /// missing-directory error.
    pub fn add_alias(&mut self, name: &str, members: &[String]) {
        let entry = self.labels.entry(name.to_string()).or_default();
        for member in members {
            entry.insert(member.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repos.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.repos.contains_key(name)
    }

    pub fn is_label(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// Names carrying the given label, empty for an unknown label.
    pub fn label_members(&self, label: &str) -> Vec<String> {
        self.labels
            .get(label)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// All known repository names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.repos.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repos.values()
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// True if the repo carries any of the given labels.
    pub fn has_any_label(&self, name: &str, labels: &[String]) -> bool {
        self.repos
            .get(name)
            .map(|r| labels.iter().any(|l| r.labels.contains(l)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo(name: &str, labels: &[&str]) -> Repository {
        Repository {
            name: name.to_string(),
            project: "platform".to_string(),
            host: String::new(),
            default_branch: String::new(),
            description: String::new(),
            labels: labels.iter().map(|s| s.to_string()).collect(),
            public: false,
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = Catalog::load(&dir.path().join("repos.json")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn load_parses_entries_and_indexes_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.json");
        fs::write(
            &path,
            r#"[
                {"name": "api", "project": "platform", "labels": ["backend"]},
                {"name": "worker", "project": "platform", "labels": ["backend", "deprecated"]},
                {"name": "web", "project": "platform", "labels": ["frontend"], "public": true}
            ]"#,
        )
        .unwrap();

        let catalog = Catalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.label_members("backend"), vec!["api", "worker"]);
        assert!(catalog.get("web").unwrap().public);
        assert!(catalog.get("api").unwrap().default_branch.is_empty());
    }

    #[test]
    fn load_rejects_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repos.json");
        fs::write(&path, "{not json").unwrap();
        assert!(Catalog::load(&path).is_err());
    }

    #[test]
    fn alias_joins_the_label_index() {
        let mut catalog = Catalog::from_repos(vec![repo("api", &["backend"])]);
        catalog.add_alias("mine", &["api".to_string(), "web".to_string()]);
        assert!(catalog.is_label("mine"));
        assert_eq!(catalog.label_members("mine"), vec!["api", "web"]);
        // Catalog labels are unaffected.
        assert_eq!(catalog.label_members("backend"), vec!["api"]);
    }

    #[test]
    fn has_any_label() {
        let catalog = Catalog::from_repos(vec![repo("worker", &["backend", "deprecated"])]);
        assert!(catalog.has_any_label("worker", &["deprecated".to_string()]));
        assert!(!catalog.has_any_label("worker", &["frontend".to_string()]));
        assert!(!catalog.has_any_label("ghost", &["deprecated".to_string()]));
    }
}
