//! Pull-request providers.
//!
//! The PR commands only ever see this trait; GitHub (via the `gh` CLI),
//! Bitbucket Cloud (REST) and an in-memory fake implement it. "Pull
//! request not found" is a distinguished error kind so callers can branch
//! on it without string matching.

pub mod bitbucket;
pub mod fake;
pub mod github;

use anyhow::bail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;

/// A pull-request record as the commands display it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub branch: String,
    pub reviewers: Vec<String>,
}

/// Inputs for opening a pull request.
#[derive(Debug, Clone, Default)]
pub struct NewPullRequest {
    pub title: String,
    pub description: String,
    pub reviewers: Vec<String>,
    pub draft: bool,
    pub base_branch: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("pull request not found")]
    NotFound,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One source-control host. `repo` is the `project/name` slug.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn open(
        &self,
        repo: &str,
        branch: &str,
        pr: NewPullRequest,
    ) -> ProviderResult<PullRequest>;

    /// Update title, description and reviewers of the branch's open PR.
    /// With `append_reviewers` the given reviewers are added to the
    /// existing set; otherwise they replace it.
    async fn update(
        &self,
        repo: &str,
        branch: &str,
        title: &str,
        description: &str,
        reviewers: &[String],
        append_reviewers: bool,
    ) -> ProviderResult<PullRequest>;

    async fn get(&self, repo: &str, branch: &str) -> ProviderResult<PullRequest>;

    /// Merge the branch's open PR, optionally verifying mergeability
    /// first.
    async fn merge(
        &self,
        repo: &str,
        branch: &str,
        verify_mergeable: bool,
    ) -> ProviderResult<PullRequest>;
}

/// Build the configured provider. Missing prerequisites (e.g. the
/// Bitbucket token) fail here, before any worker starts.
pub fn for_config(config: &Config) -> anyhow::Result<Arc<dyn Provider>> {
    match config.provider.as_str() {
        "github" => Ok(Arc::new(github::Github::new())),
        "bitbucket" => {
            let Some(token) = config.auth_token.clone() else {
                bail!("auth_token is required for the bitbucket provider");
            };
            Ok(Arc::new(bitbucket::Bitbucket::new(token)?))
        }
        "fake" => Ok(Arc::new(fake::Fake::default())),
        other => bail!("unknown provider '{other}'"),
    }
}

/// Merge or replace a reviewer list, preserving order and dropping
/// duplicates.
pub(crate) fn merge_reviewers(
    current: &[String],
    requested: &[String],
    append: bool,
) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    let base: Vec<&String> = if append {
        current.iter().chain(requested.iter()).collect()
    } else {
        requested.iter().collect()
    };
    for reviewer in base {
        if !merged.contains(reviewer) {
            merged.push(reviewer.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn merge_reviewers_appends_without_duplicates() {
        let current = vec!["alice".to_string(), "bob".to_string()];
        let requested = vec!["bob".to_string(), "carol".to_string()];
        assert_eq!(
            merge_reviewers(&current, &requested, true),
            vec!["alice", "bob", "carol"]
        );
        assert_eq!(
            merge_reviewers(&current, &requested, false),
            vec!["bob", "carol"]
        );
    }

    #[test]
    fn for_config_requires_bitbucket_token() {
        let mut config = Config::defaults(Path::new("/tmp"));
        config.provider = "bitbucket".to_string();
        let err = for_config(&config).err().unwrap();
        assert!(err.to_string().contains("auth_token"));

        config.auth_token = Some("token".to_string());
        assert!(for_config(&config).is_ok());
    }

    #[test]
    fn for_config_rejects_unknown_provider() {
        let mut config = Config::defaults(Path::new("/tmp"));
        config.provider = "gitlab".to_string();
        assert!(for_config(&config).is_err());
    }
}
