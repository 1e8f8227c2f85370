//! Shell subprocess adapter.
//!
//! Builds work functions that run a command with working directory set to
//! the repo's on-disk path and an environment enriched with repo metadata
//! and user-supplied entries. Both stdout and stderr flow into the repo's
//! channel through the same sink, so a repo's bytes keep the order the
//! subprocess emitted them (chunks may still split or coalesce at
//! arbitrary boundaries).

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::channel::Channel;
use crate::ctx::Ctx;
use crate::repo;
use crate::work::{work_fn, WorkFn};

/// A work function running `program args…` in each repo's directory.
pub fn exec(program: &str, args: Vec<String>) -> WorkFn {
    exec_with_env(program, args, Vec::new())
}

/// Like [`exec`], with additional environment entries appended after the
/// configured ones. Each entry is either a literal `KEY=VALUE` or the path
/// of an envfile.
pub fn exec_with_env(program: &str, args: Vec<String>, extra_env: Vec<String>) -> WorkFn {
    let program = program.to_string();
    work_fn(move |ctx, chan| {
        let program = program.clone();
        let args = args.clone();
        let extra_env = extra_env.clone();
        async move { run_in_repo(&ctx, &chan, &program, &args, &extra_env).await }
    })
}

/// Run one command in the channel's repo directory with the full repo
/// environment. Building block for pipelines that compute arguments per
/// repo instead of up front.
pub async fn run_in_repo(
    ctx: &Ctx,
    chan: &Channel,
    program: &str,
    args: &[String],
    extra_env: &[String],
) -> Result<()> {
    let name = chan.name().to_string();
    let dir = repo::repo_path(ctx, &name);
    let mut env = repo_env(ctx, &name).await;
    env.extend(user_env(&ctx.config.env)?);
    env.extend(user_env(extra_env)?);
    run_command(ctx, chan, &dir, program, args, &env).await
}

/// Metadata surfaced to every subprocess.
async fn repo_env(ctx: &Ctx, name: &str) -> Vec<(String, String)> {
    let branch = match repo::current_branch(ctx, name).await {
        Ok(b) => b,
        Err(_) => repo::default_branch(ctx, name),
    };
    vec![
        ("REPO_NAME".to_string(), name.to_string()),
        ("GIT_BRANCH".to_string(), branch),
        (
            "GIT_DEFAULT_BRANCH".to_string(),
            repo::default_branch(ctx, name),
        ),
        (
            "GIT_PROJECT".to_string(),
            repo::parse_repo(ctx, name).project,
        ),
    ]
}

/// Expand user-supplied environment entries. An entry containing `=` is a
/// literal; anything else is read as an envfile whose non-empty,
/// non-`#`-comment lines are each `KEY=VALUE`.
pub fn user_env(entries: &[String]) -> Result<Vec<(String, String)>> {
    let mut env = Vec::new();
    for entry in entries {
        if let Some((key, value)) = entry.split_once('=') {
            env.push((key.to_string(), value.to_string()));
            continue;
        }
        let content = std::fs::read_to_string(entry)
            .with_context(|| format!("failed to read envfile {entry}"))?;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                env.push((key.to_string(), value.to_string()));
            }
        }
    }
    Ok(env)
}

/// Run one subprocess with its combined output streamed into the channel.
///
/// Cancellation kills the child; its remaining output still drains before
/// this returns. Non-zero exit becomes an error.
pub(crate) async fn run_command(
    ctx: &Ctx,
    chan: &Channel,
    dir: &Path,
    program: &str,
    args: &[String],
    env: &[(String, String)],
) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let cancel = ctx.cancel_token();

    let wait = async {
        tokio::select! {
            status = child.wait() => Ok::<_, anyhow::Error>((status?, false)),
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                Ok((child.wait().await?, true))
            }
        }
    };

    let (_, _, waited) = tokio::join!(pump(stdout, chan), pump(stderr, chan), wait);
    let (status, cancelled) = waited?;

    if cancelled {
        bail!("cancelled");
    }
    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

/// Copy a child stream into the channel until EOF.
async fn pump(stream: Option<impl tokio::io::AsyncRead + Unpin>, chan: &Channel) {
    let Some(mut stream) = stream else { return };
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                chan.write(&buf[..n]).await;
            }
        }
    }
}
