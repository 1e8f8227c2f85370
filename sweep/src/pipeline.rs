//! Work-function builders for the subcommands.
//!
//! Each builder returns a pipeline the scheduler fans out; anything that
//! depends on per-repo state (default branch, stash flags, the current
//! branch) is computed inside the work function, per repo.

use anyhow::{bail, Result};
use std::process::Stdio;
use std::sync::Arc;

use sweep_core::exec::{exec, exec_with_env, run_in_repo};
use sweep_core::provider::{NewPullRequest, Provider, PullRequest};
use sweep_core::repo;
use sweep_core::{work_fn, wrap, Channel, Ctx, WorkFn};

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

// ── Git ──────────────────────────────────────────────────────────────────

pub fn git_status() -> WorkFn {
    exec("git", args(&["status", "--short", "--branch"]))
}

pub fn git_branch(branch: &str) -> WorkFn {
    exec("git", args(&["switch", "--create", branch]))
}

pub fn git_commit(message: &str, amend: bool, no_push: bool) -> WorkFn {
    let mut commit = args(&["commit", "-m", message]);
    if amend {
        commit.push("--amend".to_string());
    }
    let mut steps = vec![
        exec("git", args(&["add", "-A"])),
        exec("git", commit),
    ];
    if !no_push {
        steps.push(git_push(false));
    }
    wrap(steps)
}

pub fn git_push(force: bool) -> WorkFn {
    let mut push = args(&["push", "origin", "HEAD"]);
    if force {
        push.push("--force-with-lease".to_string());
    }
    exec("git", push)
}

/// Stash if dirty, fetch, switch to the default branch and pull, then
/// restore the stash if one was taken.
pub fn git_update() -> WorkFn {
    wrap(vec![
        stash_if_dirty(),
        exec("git", args(&["fetch", "--all", "--prune"])),
        switch_and_pull(),
        pop_if_stashed(),
    ])
}

pub fn git_stash(action: &str) -> Result<WorkFn> {
    match action {
        "push" => Ok(exec(
            "git",
            args(&["stash", "push", "--include-untracked"]),
        )),
        "pop" => Ok(exec("git", args(&["stash", "pop"]))),
        other => bail!("unknown stash action '{other}' (expected push or pop)"),
    }
}

/// Stash only when the working tree is dirty, and remember that this repo
/// stashed so [`pop_if_stashed`] can undo it later in the same run.
fn stash_if_dirty() -> WorkFn {
    work_fn(|ctx: Arc<Ctx>, chan: Arc<Channel>| async move {
        let name = chan.name().to_string();
        let output = tokio::process::Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(repo::repo_path(&ctx, &name))
            .stdin(Stdio::null())
            .output()
            .await?;
        if !output.status.success() {
            bail!(
                "git status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        if output.stdout.is_empty() {
            return Ok(());
        }
        run_in_repo(
            &ctx,
            &chan,
            "git",
            &args(&["stash", "push", "--include-untracked"]),
            &[],
        )
        .await?;
        ctx.mark_stashed(&name);
        Ok(())
    })
}

fn pop_if_stashed() -> WorkFn {
    work_fn(|ctx: Arc<Ctx>, chan: Arc<Channel>| async move {
        let name = chan.name().to_string();
        if !ctx.take_stashed(&name) {
            return Ok(());
        }
        run_in_repo(&ctx, &chan, "git", &args(&["stash", "pop"]), &[]).await
    })
}

fn switch_and_pull() -> WorkFn {
    work_fn(|ctx: Arc<Ctx>, chan: Arc<Channel>| async move {
        let name = chan.name().to_string();
        let branch = repo::default_branch(&ctx, &name);
        run_in_repo(&ctx, &chan, "git", &args(&["switch", &branch]), &[]).await?;
        run_in_repo(&ctx, &chan, "git", &args(&["pull", "--ff-only"]), &[]).await
    })
}

// ── Shell ────────────────────────────────────────────────────────────────

pub fn make(targets: Vec<String>) -> WorkFn {
    exec("make", targets)
}

pub fn shell(command: Vec<String>, env: Vec<String>) -> Result<WorkFn> {
    let Some((program, rest)) = command.split_first() else {
        bail!("no command given (pass it after --)");
    };
    Ok(exec_with_env(program, rest.to_vec(), env))
}

// ── Pull requests ────────────────────────────────────────────────────────

/// Resolve the provider-facing slug and branch for the channel's repo.
async fn pr_target(ctx: &Ctx, chan: &Channel) -> Result<(String, String)> {
    let name = chan.name().to_string();
    let slug = repo::parse_repo(ctx, &name).slug();
    let branch = repo::current_branch(ctx, &name).await?;
    Ok((slug, branch))
}

async fn print_pr(chan: &Channel, pr: &PullRequest) {
    chan.write_line(&format!("#{} {} [{}]", pr.number, pr.title, pr.branch))
        .await;
    if !pr.reviewers.is_empty() {
        chan.write_line(&format!("reviewers: {}", pr.reviewers.join(", ")))
            .await;
    }
    if !pr.description.is_empty() {
        chan.write_line(&pr.description).await;
    }
}

pub fn pr_new(
    provider: Arc<dyn Provider>,
    title: String,
    description: String,
    reviewers: Vec<String>,
    draft: bool,
    base: Option<String>,
) -> WorkFn {
    work_fn(move |ctx: Arc<Ctx>, chan: Arc<Channel>| {
        let provider = provider.clone();
        let request = NewPullRequest {
            title: title.clone(),
            description: description.clone(),
            reviewers: reviewers.clone(),
            draft,
            base_branch: base.clone(),
        };
        async move {
            let (slug, branch) = pr_target(&ctx, &chan).await?;
            let pr = provider.open(&slug, &branch, request).await?;
            chan.write_line(&format!("opened pull request #{}: {}", pr.number, pr.title))
                .await;
            Ok(())
        }
    })
}

pub fn pr_edit(
    provider: Arc<dyn Provider>,
    title: String,
    description: String,
    reviewers: Vec<String>,
    append_reviewers: bool,
) -> WorkFn {
    work_fn(move |ctx: Arc<Ctx>, chan: Arc<Channel>| {
        let provider = provider.clone();
        let title = title.clone();
        let description = description.clone();
        let reviewers = reviewers.clone();
        async move {
            let (slug, branch) = pr_target(&ctx, &chan).await?;
            let pr = provider
                .update(&slug, &branch, &title, &description, &reviewers, append_reviewers)
                .await?;
            chan.write_line(&format!("updated pull request #{}", pr.number))
                .await;
            print_pr(&chan, &pr).await;
            Ok(())
        }
    })
}

pub fn pr_get(provider: Arc<dyn Provider>) -> WorkFn {
    work_fn(move |ctx: Arc<Ctx>, chan: Arc<Channel>| {
        let provider = provider.clone();
        async move {
            let (slug, branch) = pr_target(&ctx, &chan).await?;
            let pr = provider.get(&slug, &branch).await?;
            print_pr(&chan, &pr).await;
            Ok(())
        }
    })
}

pub fn pr_merge(provider: Arc<dyn Provider>, verify_mergeable: bool) -> WorkFn {
    work_fn(move |ctx: Arc<Ctx>, chan: Arc<Channel>| {
        let provider = provider.clone();
        async move {
            let (slug, branch) = pr_target(&ctx, &chan).await?;
            let pr = provider.merge(&slug, &branch, verify_mergeable).await?;
            chan.write_line(&format!("merged pull request #{}: {}", pr.number, pr.title))
                .await;
            Ok(())
        }
    })
}
