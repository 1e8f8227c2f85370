//! Bitbucket Cloud provider (REST API 2.0).
//!
//! Talks to `api.bitbucket.org` with a bearer token from configuration.
//! Only the pull-request surface the commands need is covered.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{
    merge_reviewers, NewPullRequest, Provider, ProviderError, ProviderResult, PullRequest,
};

const API_BASE: &str = "https://api.bitbucket.org/2.0";

pub struct Bitbucket {
    client: reqwest::Client,
    base: String,
}

impl Bitbucket {
    pub fn new(token: String) -> Result<Self> {
        Self::with_base(token, API_BASE.to_string())
    }

    /// Point the provider at a different API root (tests).
    pub fn with_base(token: String, base: String) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut auth = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
            .context("invalid auth token")?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to build http client")?;
        Ok(Self { client, base })
    }

    fn pr_url(&self, repo: &str, id: Option<u64>) -> String {
        match id {
            Some(id) => format!("{}/repositories/{}/pullrequests/{}", self.base, repo, id),
            None => format!("{}/repositories/{}/pullrequests", self.base, repo),
        }
    }

    /// Find the open PR whose source branch matches.
    async fn find(&self, repo: &str, branch: &str) -> ProviderResult<BbPullRequest> {
        let query = format!("source.branch.name = \"{branch}\" AND state = \"OPEN\"");
        let response = self
            .client
            .get(self.pr_url(repo, None))
            .query(&[("q", query.as_str())])
            .send()
            .await
            .context("bitbucket request failed")?;
        let list: BbPage = parse(response).await?;
        list.values.into_iter().next().ok_or(ProviderError::NotFound)
    }
}

#[derive(Debug, Deserialize)]
struct BbPage {
    #[serde(default)]
    values: Vec<BbPullRequest>,
}

#[derive(Debug, Deserialize)]
struct BbPullRequest {
    id: u64,
    title: String,
    #[serde(default)]
    description: String,
    source: BbSource,
    #[serde(default)]
    reviewers: Vec<BbAccount>,
}

#[derive(Debug, Deserialize)]
struct BbSource {
    branch: BbBranch,
}

#[derive(Debug, Deserialize)]
struct BbBranch {
    name: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct BbAccount {
    #[serde(default)]
    username: String,
}

impl From<BbPullRequest> for PullRequest {
    fn from(pr: BbPullRequest) -> Self {
        PullRequest {
            number: pr.id,
            title: pr.title,
            description: pr.description,
            branch: pr.source.branch.name,
            reviewers: pr
                .reviewers
                .into_iter()
                .map(|a| a.username)
                .filter(|u| !u.is_empty())
                .collect(),
        }
    }
}

/// Decode a response, mapping 404 to NotFound and other non-2xx statuses
/// to errors carrying the response body.
async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ProviderResult<T> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound);
    }
    let body = response
        .text()
        .await
        .context("failed to read bitbucket response")?;
    if !status.is_success() {
        return Err(ProviderError::Other(anyhow!(
            "bitbucket returned {status}: {}",
            body.trim()
        )));
    }
    serde_json::from_str(&body)
        .context("failed to parse bitbucket response")
        .map_err(ProviderError::Other)
}

fn reviewer_payload(reviewers: &[String]) -> Vec<serde_json::Value> {
    reviewers.iter().map(|r| json!({ "username": r })).collect()
}

#[async_trait]
impl Provider for Bitbucket {
    async fn open(
        &self,
        repo: &str,
        branch: &str,
        pr: NewPullRequest,
    ) -> ProviderResult<PullRequest> {
        let mut payload = json!({
            "title": pr.title,
            "description": pr.description,
            "source": { "branch": { "name": branch } },
            "reviewers": reviewer_payload(&pr.reviewers),
        });
        if let Some(base) = &pr.base_branch {
            payload["destination"] = json!({ "branch": { "name": base } });
        }

        let response = self
            .client
            .post(self.pr_url(repo, None))
            .json(&payload)
            .send()
            .await
            .context("bitbucket request failed")?;
        let created: BbPullRequest = parse(response).await?;
        Ok(created.into())
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
        let current = self.find(repo, branch).await?;
        let current_reviewers: Vec<String> = current
            .reviewers
            .iter()
            .map(|a| a.username.clone())
            .filter(|u| !u.is_empty())
            .collect();
        let desired = merge_reviewers(&current_reviewers, reviewers, append_reviewers);

        let payload = json!({
            "title": if title.is_empty() { &current.title } else { title },
            "description": if description.is_empty() { &current.description } else { description },
            "reviewers": reviewer_payload(&desired),
        });
        let response = self
            .client
            .put(self.pr_url(repo, Some(current.id)))
            .json(&payload)
            .send()
            .await
            .context("bitbucket request failed")?;
        let updated: BbPullRequest = parse(response).await?;
        Ok(updated.into())
    }

    async fn get(&self, repo: &str, branch: &str) -> ProviderResult<PullRequest> {
        Ok(self.find(repo, branch).await?.into())
    }

    async fn merge(
        &self,
        repo: &str,
        branch: &str,
        verify_mergeable: bool,
    ) -> ProviderResult<PullRequest> {
        let current = self.find(repo, branch).await?;
        if verify_mergeable {
            // The list endpoint only returns open PRs, so finding it again
            // right before merging is the cheap staleness check available
            // on this API.
            self.find(repo, branch).await?;
        }
        let url = format!("{}/merge", self.pr_url(repo, Some(current.id)));
        let response = self
            .client
            .post(url)
            .json(&json!({ "close_source_branch": false }))
            .send()
            .await
            .context("bitbucket request failed")?;
        let merged: BbPullRequest = parse(response).await?;
        Ok(merged.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitbucket_json_maps_to_pull_request() {
        let json = r#"{
            "id": 7,
            "title": "Fix build",
            "description": "d",
            "source": { "branch": { "name": "fix/build" } },
            "reviewers": [{ "username": "alice" }, {}]
        }"#;
        let pr: BbPullRequest = serde_json::from_str(json).unwrap();
        let pr: PullRequest = pr.into();
        assert_eq!(pr.number, 7);
        assert_eq!(pr.branch, "fix/build");
        assert_eq!(pr.reviewers, vec!["alice"]);
    }

    #[test]
    fn page_defaults_to_empty() {
        let page: BbPage = serde_json::from_str("{}").unwrap();
        assert!(page.values.is_empty());
    }

    #[test]
    fn pr_urls() {
        let bb = Bitbucket::with_base("t".to_string(), "http://localhost:1".to_string()).unwrap();
        assert_eq!(
            bb.pr_url("acme/api", None),
            "http://localhost:1/repositories/acme/api/pullrequests"
        );
        assert_eq!(
            bb.pr_url("acme/api", Some(7)),
            "http://localhost:1/repositories/acme/api/pullrequests/7"
        );
    }
}
