//! Core engine for sweep: select a set of repositories, fan a unit of
//! work out across them with bounded parallelism, and stream each repo's
//! output back without interleaving.

pub mod catalog;
pub mod channel;
pub mod config;
pub mod ctx;
pub mod exec;
pub mod filter;
pub mod multichange;
pub mod provider;
pub mod render;
pub mod repo;
pub mod scheduler;
pub mod work;

pub use channel::{Channel, ChannelSink};
pub use tokio_util::sync::CancellationToken;
pub use config::{Config, OutputMode};
pub use ctx::Ctx;
pub use render::{Native, Render};
pub use work::{work_fn, wrap, WorkFn};
