//! In-memory provider for tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{
    merge_reviewers, NewPullRequest, Provider, ProviderError, ProviderResult, PullRequest,
};

/// Keyed by `(repo, branch)`. Merging removes the record, so a subsequent
/// `get` reports NotFound just like the real hosts do for a closed branch.
#[derive(Default)]
pub struct Fake {
    prs: Mutex<HashMap<(String, String), PullRequest>>,
    next_number: AtomicU64,
}

impl Fake {
    pub fn open_count(&self) -> usize {
        self.prs.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for Fake {
    async fn open(
        &self,
        repo: &str,
        branch: &str,
        pr: NewPullRequest,
    ) -> ProviderResult<PullRequest> {
        let number = self.next_number.fetch_add(1, Ordering::SeqCst) + 1;
        let record = PullRequest {
            number,
            title: pr.title,
            description: pr.description,
            branch: branch.to_string(),
            reviewers: pr.reviewers,
        };
        self.prs
            .lock()
            .unwrap()
            .insert((repo.to_string(), branch.to_string()), record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        repo: &str,
        branch: &str,
        title: &str,
        description: &str,
        reviewers: &[String],
        append_reviewers: bool,
    ) -> ProviderResult<PullRequest> {
        let mut prs = self.prs.lock().unwrap();
        let record = prs
            .get_mut(&(repo.to_string(), branch.to_string()))
            .ok_or(ProviderError::NotFound)?;
        if !title.is_empty() {
            record.title = title.to_string();
        }
        if !description.is_empty() {
            record.description = description.to_string();
        }
        record.reviewers = merge_reviewers(&record.reviewers, reviewers, append_reviewers);
        Ok(record.clone())
    }

    async fn get(&self, repo: &str, branch: &str) -> ProviderResult<PullRequest> {
        self.prs
            .lock()
            .unwrap()
            .get(&(repo.to_string(), branch.to_string()))
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn merge(
        &self,
        repo: &str,
        branch: &str,
        _verify_mergeable: bool,
    ) -> ProviderResult<PullRequest> {
        self.prs
            .lock()
            .unwrap()
            .remove(&(repo.to_string(), branch.to_string()))
            .ok_or(ProviderError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_pr(title: &str) -> NewPullRequest {
        NewPullRequest {
            title: title.to_string(),
            description: "desc".to_string(),
            reviewers: vec!["alice".to_string()],
            draft: false,
            base_branch: None,
        }
    }

    #[tokio::test]
    async fn open_then_get() {
        let fake = Fake::default();
        let opened = fake.open("acme/api", "feature", new_pr("t")).await.unwrap();
        assert_eq!(opened.number, 1);
        let fetched = fake.get("acme/api", "feature").await.unwrap();
        assert_eq!(fetched, opened);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let fake = Fake::default();
        let err = fake.get("acme/api", "feature").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound));
        assert_eq!(err.to_string(), "pull request not found");
    }

    #[tokio::test]
    async fn update_replaces_or_appends_reviewers() {
        let fake = Fake::default();
        fake.open("acme/api", "feature", new_pr("t")).await.unwrap();

        let updated = fake
            .update("acme/api", "feature", "new title", "", &["bob".to_string()], true)
            .await
            .unwrap();
        assert_eq!(updated.title, "new title");
        assert_eq!(updated.description, "desc");
        assert_eq!(updated.reviewers, vec!["alice", "bob"]);

        let updated = fake
            .update("acme/api", "feature", "", "", &["carol".to_string()], false)
            .await
            .unwrap();
        assert_eq!(updated.reviewers, vec!["carol"]);
    }

    #[tokio::test]
    async fn merge_removes_the_record() {
        let fake = Fake::default();
        fake.open("acme/api", "feature", new_pr("t")).await.unwrap();
        fake.merge("acme/api", "feature", true).await.unwrap();
        assert_eq!(fake.open_count(), 0);
        assert!(matches!(
            fake.get("acme/api", "feature").await.unwrap_err(),
            ProviderError::NotFound
        ));
    }

    #[tokio::test]
    async fn numbers_increment() {
        let fake = Fake::default();
        let a = fake.open("acme/api", "b1", new_pr("t")).await.unwrap();
        let b = fake.open("acme/api", "b2", new_pr("t")).await.unwrap();
        assert_eq!((a.number, b.number), (1, 2));
    }
}
