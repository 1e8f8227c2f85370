//! Per-invocation context threaded through work functions.
//!
//! Carries the configuration, the catalog, the cancellation token and the
//! small pieces of per-run mutable state (branch cache, stash flags) so
//! parallel invocations and parallel tests never share globals.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::config::Config;

pub struct Ctx {
    pub config: Config,
    pub catalog: Catalog,
    cancel: CancellationToken,
    branch_cache: Mutex<HashMap<String, String>>,
    stashed: Mutex<HashSet<String>>,
}

impl Ctx {
    /// Build a context. Configured aliases are folded into the catalog's
    /// label index here, so the filter engine sees one uniform index.
    pub fn new(config: Config, mut catalog: Catalog) -> Self {
        for (name, members) in &config.aliases {
            catalog.add_alias(name, members);
        }
        Self {
            config,
            catalog,
            cancel: CancellationToken::new(),
            branch_cache: Mutex::new(HashMap::new()),
            stashed: Mutex::new(HashSet::new()),
        }
    }

    /// A child handle on the run's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the run: pending slot acquisitions fail and in-flight
    /// subprocesses are signalled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    // ── Branch cache ─────────────────────────────────────────────────────

    pub fn cached_branch(&self, repo: &str) -> Option<String> {
        self.branch_cache.lock().unwrap().get(repo).cloned()
    }

    pub fn cache_branch(&self, repo: &str, branch: &str) {
        self.branch_cache
            .lock()
            .unwrap()
            .insert(repo.to_string(), branch.to_string());
    }

    // ── Stash flags ──────────────────────────────────────────────────────
    // Each flag is written only by its own repo's worker, read back by the
    // same worker later in the pipeline.

    pub fn mark_stashed(&self, repo: &str) {
        self.stashed.lock().unwrap().insert(repo.to_string());
    }

    /// Consume the stash flag for a repo, returning whether it was set.
    pub fn take_stashed(&self, repo: &str) -> bool {
        self.stashed.lock().unwrap().remove(repo)
    }
}
