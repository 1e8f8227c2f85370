//! GitHub provider, backed by the `gh` CLI.
//!
//! Every invocation asks for structured output (`--json`) and parses it
//! with serde into typed structs; authentication is whatever `gh auth`
//! has configured.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;

use super::{
    merge_reviewers, NewPullRequest, Provider, ProviderError, ProviderResult, PullRequest,
};

pub struct Github;

impl Github {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Github {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    number: u64,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(rename = "headRefName")]
    head_ref_name: String,
    #[serde(default, rename = "reviewRequests")]
    review_requests: Vec<GhReviewer>,
    #[serde(default)]
    mergeable: String,
}

#[derive(Debug, Deserialize)]
struct GhReviewer {
    #[serde(default)]
    login: String,
}

impl From<GhPullRequest> for PullRequest {
    fn from(pr: GhPullRequest) -> Self {
        PullRequest {
            number: pr.number,
            title: pr.title,
            description: pr.body,
            branch: pr.head_ref_name,
            reviewers: pr
                .review_requests
                .into_iter()
                .map(|r| r.login)
                .filter(|l| !l.is_empty())
                .collect(),
        }
    }
}

const PR_FIELDS: &str = "number,title,body,headRefName,reviewRequests,mergeable";

/// Run a `gh` command and return stdout. Non-zero exit surfaces stderr.
async fn run_gh(args: &[String]) -> Result<String> {
    let output = Command::new("gh")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .context("failed to spawn gh")?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(anyhow!("gh {} failed: {}", args.join(" "), stderr.trim()))
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// `gh` reports a missing PR for a branch with this phrase on stderr.
fn is_not_found(err: &anyhow::Error) -> bool {
    err.to_string().contains("no pull requests found")
}

impl Github {
    async fn view(&self, repo: &str, branch: &str) -> ProviderResult<GhPullRequest> {
        let out = run_gh(&args(&[
            "pr", "view", branch, "-R", repo, "--json", PR_FIELDS,
        ]))
        .await
        .map_err(|err| {
            if is_not_found(&err) {
                ProviderError::NotFound
            } else {
                ProviderError::Other(err)
            }
        })?;
        let pr: GhPullRequest =
            serde_json::from_str(&out).context("failed to parse gh pr view output")?;
        Ok(pr)
    }
}

#[async_trait]
impl Provider for Github {
    async fn open(
        &self,
        repo: &str,
        branch: &str,
        pr: NewPullRequest,
    ) -> ProviderResult<PullRequest> {
        let mut cmd = args(&[
            "pr",
            "create",
            "-R",
            repo,
            "--head",
            branch,
            "--title",
            pr.title.as_str(),
            "--body",
            pr.description.as_str(),
        ]);
        if pr.draft {
            cmd.push("--draft".to_string());
        }
        if let Some(base) = &pr.base_branch {
            cmd.push("--base".to_string());
            cmd.push(base.clone());
        }
        for reviewer in &pr.reviewers {
            cmd.push("--reviewer".to_string());
            cmd.push(reviewer.clone());
        }
        run_gh(&cmd).await.map_err(ProviderError::Other)?;
        Ok(self.view(repo, branch).await?.into())
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
        let current: PullRequest = self.view(repo, branch).await?.into();
        let desired = merge_reviewers(&current.reviewers, reviewers, append_reviewers);

        let mut cmd = args(&["pr", "edit", branch, "-R", repo]);
        if !title.is_empty() {
            cmd.push("--title".to_string());
            cmd.push(title.to_string());
        }
        if !description.is_empty() {
            cmd.push("--body".to_string());
            cmd.push(description.to_string());
        }
        for reviewer in &desired {
            if !current.reviewers.contains(reviewer) {
                cmd.push("--add-reviewer".to_string());
                cmd.push(reviewer.clone());
            }
        }
        for reviewer in &current.reviewers {
            if !desired.contains(reviewer) {
                cmd.push("--remove-reviewer".to_string());
                cmd.push(reviewer.clone());
            }
        }
        run_gh(&cmd).await.map_err(ProviderError::Other)?;
        Ok(self.view(repo, branch).await?.into())
    }

    async fn get(&self, repo: &str, branch: &str) -> ProviderResult<PullRequest> {
        Ok(self.view(repo, branch).await?.into())
    }

    async fn merge(
        &self,
        repo: &str,
        branch: &str,
        verify_mergeable: bool,
    ) -> ProviderResult<PullRequest> {
        let pr = self.view(repo, branch).await?;
        if verify_mergeable && pr.mergeable.eq_ignore_ascii_case("conflicting") {
            return Err(ProviderError::Other(anyhow!(
                "pull request #{} has conflicts",
                pr.number
            )));
        }
        run_gh(&args(&["pr", "merge", branch, "-R", repo, "--merge"]))
            .await
            .map_err(ProviderError::Other)?;
        Ok(pr.into())
    }
}
