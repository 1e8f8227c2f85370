//! Output presentation.
//!
//! A render handler consumes the run's channel sinks **in slice order and
//! may not reorder them**; that contract is the only cross-repo ordering
//! mechanism. The native handler here is strictly sequential; the live TUI
//! handler lives in its own crate and implements the same trait.

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;

use crate::channel::ChannelSink;
use crate::ctx::Ctx;

/// Message shown when the selection resolves to nothing.
pub const NO_REPOS_MESSAGE: &str = "no repositories matched";

#[async_trait]
pub trait Render: Send {
    /// Present every sink, in order, returning once all queues have
    /// drained and closed.
    async fn render(&mut self, ctx: &Ctx, channels: &mut [ChannelSink]) -> Result<()>;
}

/// Sequential plain-text handler: banner, output bytes, `ERROR: ` lines,
/// next repo. A slow repo delays the presentation of later repos, but the
/// workers behind them keep running into their queue buffers.
pub struct Native<W, E> {
    out: W,
    err: E,
}

impl Native<std::io::Stdout, std::io::Stderr> {
    pub fn stdout() -> Self {
        Native {
            out: std::io::stdout(),
            err: std::io::stderr(),
        }
    }
}

impl<W: Write + Send, E: Write + Send> Native<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Native { out, err }
    }

    pub fn into_writers(self) -> (W, E) {
        (self.out, self.err)
    }
}

#[async_trait]
impl<W: Write + Send, E: Write + Send> Render for Native<W, E> {
    async fn render(&mut self, _ctx: &Ctx, channels: &mut [ChannelSink]) -> Result<()> {
        if channels.is_empty() {
            writeln!(self.out, "{NO_REPOS_MESSAGE}")?;
            return Ok(());
        }

        for sink in channels.iter_mut() {
            writeln!(self.out, "=== {} ===", sink.name())?;
            while let Some(chunk) = sink.next_chunk().await {
                self.out.write_all(&chunk)?;
            }
            self.out.flush()?;
            while let Some(err) = sink.next_error().await {
                writeln!(self.err, "ERROR: {err:#}")?;
            }
            self.err.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::channel::Channel;
    use crate::config::Config;
    use anyhow::anyhow;
    use std::path::Path;
    use tokio_util::sync::CancellationToken;

    fn test_ctx() -> Ctx {
        Ctx::new(Config::defaults(Path::new("/tmp")), Catalog::default())
    }

    #[tokio::test]
    async fn sections_follow_input_order() {
        let (c1, s1) = Channel::new("r1", 16, None, CancellationToken::new());
        let (c2, s2) = Channel::new("r2", 16, None, CancellationToken::new());
        c1.write_line("hello r1").await;
        c2.write_line("hello r2").await;
        c1.close();
        c2.close();

        let mut handler = Native::new(Vec::new(), Vec::new());
        let mut sinks = vec![s1, s2];
        handler.render(&test_ctx(), &mut sinks).await.unwrap();

        let (out, err) = handler.into_writers();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "=== r1 ===\nhello r1\n=== r2 ===\nhello r2\n"
        );
        assert!(err.is_empty());
    }

    #[tokio::test]
    async fn errors_go_to_stderr_with_prefix() {
        let (c1, s1) = Channel::new("r1", 16, None, CancellationToken::new());
        c1.write_line("partial").await;
        c1.write_error(anyhow!("command failed")).await;
        c1.close();

        let mut handler = Native::new(Vec::new(), Vec::new());
        let mut sinks = vec![s1];
        handler.render(&test_ctx(), &mut sinks).await.unwrap();

        let (out, err) = handler.into_writers();
        assert_eq!(String::from_utf8(out).unwrap(), "=== r1 ===\npartial\n");
        assert_eq!(String::from_utf8(err).unwrap(), "ERROR: command failed\n");
    }

    #[tokio::test]
    async fn empty_selection_prints_message() {
        let mut handler = Native::new(Vec::new(), Vec::new());
        handler.render(&test_ctx(), &mut []).await.unwrap();
        let (out, _) = handler.into_writers();
        assert_eq!(String::from_utf8(out).unwrap(), "no repositories matched\n");
    }
}
