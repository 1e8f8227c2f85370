//! Work functions: one logical step against one repository.
//!
//! A [`WorkFn`] receives the run context and the repo's channel and returns
//! an error on failure. [`wrap`] sequences several steps on the same
//! channel, stopping at the first error; concurrency exists only across
//! repositories, never inside a sequence.

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;

use crate::channel::Channel;
use crate::ctx::Ctx;

pub type WorkFn =
    Arc<dyn Fn(Arc<Ctx>, Arc<Channel>) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Lift an async closure into a [`WorkFn`].
pub fn work_fn<F, Fut>(f: F) -> WorkFn
where
    F: Fn(Arc<Ctx>, Arc<Channel>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |ctx, chan| f(ctx, chan).boxed())
}

/// Sequence work functions on one channel, short-circuiting on the first
/// error. Functions after the failing one are not invoked.
pub fn wrap(funcs: Vec<WorkFn>) -> WorkFn {
    Arc::new(move |ctx, chan| {
        let funcs = funcs.clone();
        async move {
            for f in funcs {
                f(ctx.clone(), chan.clone()).await?;
            }
            Ok(())
        }
        .boxed()
    })
}
