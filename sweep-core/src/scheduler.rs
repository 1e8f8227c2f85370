//! The fan-out scheduler.
//!
//! [`run`] resolves the user's selection tokens, creates one channel pair
//! per repo, spawns one worker per repo under a weighted semaphore, hands
//! the sink slice to the render handlers in order, and joins all workers.
//! The sink slice is the canonical presentation order.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::channel::{Channel, ChannelSink};
use crate::ctx::Ctx;
use crate::exec;
use crate::filter;
use crate::render::Render;
use crate::repo;
use crate::work::WorkFn;

/// Apply `work` across the repos selected by `tokens`, presenting output
/// through each handler in turn. Returns once every worker has finished
/// and every channel is closed; per-repo failures are reported through the
/// channels, not through this result.
pub async fn run(
    ctx: Arc<Ctx>,
    tokens: &[String],
    work: WorkFn,
    renderers: &mut [&mut dyn Render],
) -> Result<()> {
    let repos = filter::select(&ctx.catalog, &ctx.config, tokens);

    let semaphore = Arc::new(Semaphore::new(ctx.config.effective_concurrency()));
    let mut sinks: Vec<ChannelSink> = Vec::with_capacity(repos.len());
    let mut workers = Vec::with_capacity(repos.len());

    for name in &repos {
        let (channel, sink) = Channel::new(
            name,
            ctx.config.channel_buffer,
            Some(semaphore.clone()),
            ctx.cancel_token(),
        );
        sinks.push(sink);
        workers.push(tokio::spawn(run_worker(
            ctx.clone(),
            Arc::new(channel),
            work.clone(),
        )));
    }

    for renderer in renderers.iter_mut() {
        renderer.render(&ctx, &mut sinks).await?;
    }

    for worker in workers {
        let _ = worker.await;
    }
    Ok(())
}

/// One worker: acquire a slot, signal activity, clone on demand, run the
/// work function. Any error lands on the channel's error queue; the
/// channel closes on every exit path.
async fn run_worker(ctx: Arc<Ctx>, channel: Arc<Channel>, work: WorkFn) {
    if let Err(err) = worker_body(&ctx, &channel, work).await {
        channel.write_error(err).await;
    }
    channel.close();
}

async fn worker_body(ctx: &Arc<Ctx>, channel: &Arc<Channel>, work: WorkFn) -> Result<()> {
    channel.start(1).await?;
    channel.signal_start().await;
    ensure_cloned(ctx, channel).await?;
    work(ctx.clone(), channel.clone()).await
}

/// Clone the repo when its directory is absent, streaming clone output
/// through the channel. A clone failure stops the repo's pipeline before
/// the user's work function runs.
async fn ensure_cloned(ctx: &Ctx, channel: &Channel) -> Result<()> {
    let name = channel.name().to_string();
    let path = repo::repo_path(ctx, &name);
    if path.exists() {
        return Ok(());
    }

    let parent = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| ctx.config.base_dir.clone());
    tokio::fs::create_dir_all(&parent)
        .await
        .with_context(|| format!("failed to create {}", parent.display()))?;

    let url = repo::clone_url(ctx, &name);
    let args = vec![
        "clone".to_string(),
        url,
        path.to_string_lossy().into_owned(),
    ];
    exec::run_command(ctx, channel, &parent, "git", &args, &[])
        .await
        .with_context(|| format!("failed to clone {name}"))
}
