//! Repo name parsing and derived locations.
//!
//! A full repo reference is `host/project/name`. Missing parts are filled
//! from the catalog entry for the name, then from configuration. The
//! on-disk tree is partitioned as `base_dir/host/project/name`, so
//! concurrent workers never touch each other's subtrees.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::ctx::Ctx;

/// A fully resolved `host/project/name` triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub host: String,
    pub project: String,
    pub name: String,
}

impl RepoRef {
    /// Canonical `host/project/name` form with redundant slashes removed.
    pub fn canonical(&self) -> String {
        [&self.host, &self.project, &self.name]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// `project/name`, the slug form providers expect.
    pub fn slug(&self) -> String {
        if self.project.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.project, self.name)
        }
    }
}

/// Split an input on `/`, trimming leading/trailing slashes, and fill
/// missing components from the catalog entry for the name, then from
/// configuration.
pub fn parse_repo(ctx: &Ctx, input: &str) -> RepoRef {
    let parts: Vec<&str> = input.split('/').filter(|s| !s.is_empty()).collect();

    let (host, project, name) = match parts.as_slice() {
        [] => (None, None, String::new()),
        [name] => (None, None, name.to_string()),
        [project, name] => (None, Some(project.to_string()), name.to_string()),
        [host, rest @ .., name] => (
            Some(host.to_string()),
            Some(rest.join("/")),
            name.to_string(),
        ),
    };

    let entry = ctx.catalog.get(&name);
    let host = host
        .or_else(|| entry.map(|r| r.host.clone()).filter(|h| !h.is_empty()))
        .unwrap_or_else(|| ctx.config.host.clone());
    let project = project
        .or_else(|| entry.map(|r| r.project.clone()).filter(|p| !p.is_empty()))
        .unwrap_or_else(|| ctx.config.project.clone());

    RepoRef { host, project, name }
}

/// Absolute on-disk location: `base_dir/host/project/name`.
pub fn repo_path(ctx: &Ctx, name: &str) -> PathBuf {
    let r = parse_repo(ctx, name);
    let mut path = ctx.config.base_dir.clone();
    for part in [&r.host, &r.project, &r.name] {
        if !part.is_empty() {
            path.push(part);
        }
    }
    path
}

/// Clone URL from the configured template, substituting `{host}`,
/// `{project}` and `{name}`.
pub fn clone_url(ctx: &Ctx, name: &str) -> String {
    let r = parse_repo(ctx, name);
    ctx.config
        .clone_url
        .replace("{host}", &r.host)
        .replace("{project}", &r.project)
        .replace("{name}", &r.name)
}

/// Default branch for a repo: its catalog entry, else the configured
/// fallback.
pub fn default_branch(ctx: &Ctx, name: &str) -> String {
    ctx.catalog
        .get(name)
        .map(|r| r.default_branch.clone())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| ctx.config.default_branch.clone())
}

/// Current branch for a repo: the configured override, else the per-run
/// cache, else `git rev-parse --abbrev-ref HEAD` in the repo's directory.
pub async fn current_branch(ctx: &Ctx, name: &str) -> Result<String> {
    if let Some(branch) = &ctx.config.branch {
        return Ok(branch.clone());
    }
    if let Some(branch) = ctx.cached_branch(name) {
        return Ok(branch);
    }

    let dir = repo_path(ctx, name);
    let output = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(&dir)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("failed to run git in {}", dir.display()))?;

    if !output.status.success() {
        bail!(
            "git rev-parse failed in {}: {}",
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let branch = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if branch.is_empty() {
        bail!("no current branch in {}", dir.display());
    }
    ctx.cache_branch(name, &branch);
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Repository};
    use crate::config::Config;
    use std::path::Path;

    fn ctx_with(catalog: Catalog) -> Ctx {
        let mut config = Config::defaults(Path::new("/tmp"));
        config.host = "github.com".to_string();
        config.project = "acme".to_string();
        config.base_dir = PathBuf::from("/src");
        Ctx::new(config, catalog)
    }

    fn catalog_entry() -> Repository {
        Repository {
            name: "api".to_string(),
            project: "platform".to_string(),
            host: "git.example.com".to_string(),
            default_branch: "trunk".to_string(),
            description: String::new(),
            labels: Default::default(),
            public: false,
        }
    }

    #[test]
    fn parse_full_triple() {
        let ctx = ctx_with(Catalog::default());
        let r = parse_repo(&ctx, "git.example.com/platform/api");
        assert_eq!(
            r,
            RepoRef {
                host: "git.example.com".to_string(),
                project: "platform".to_string(),
                name: "api".to_string(),
            }
        );
    }

    #[test]
    fn parse_trims_redundant_slashes() {
        let ctx = ctx_with(Catalog::default());
        let r = parse_repo(&ctx, "/git.example.com//platform/api/");
        assert_eq!(r.canonical(), "git.example.com/platform/api");
    }

    #[test]
    fn parse_fills_from_catalog_then_config() {
        let ctx = ctx_with(Catalog::from_repos(vec![catalog_entry()]));
        // Known name: catalog supplies host and project.
        let r = parse_repo(&ctx, "api");
        assert_eq!(r.canonical(), "git.example.com/platform/api");
        // Unknown name: config supplies both.
        let r = parse_repo(&ctx, "web");
        assert_eq!(r.canonical(), "github.com/acme/web");
        // Partial input: only the host is filled in.
        let r = parse_repo(&ctx, "platform/api");
        assert_eq!(r.canonical(), "git.example.com/platform/api");
    }

    #[test]
    fn canonical_roundtrip() {
        let ctx = ctx_with(Catalog::default());
        let first = parse_repo(&ctx, "/github.com/acme/web/");
        let second = parse_repo(&ctx, &first.canonical());
        assert_eq!(first, second);
    }

    #[test]
    fn repo_path_partitions_by_triple() {
        let ctx = ctx_with(Catalog::from_repos(vec![catalog_entry()]));
        assert_eq!(
            repo_path(&ctx, "api"),
            PathBuf::from("/src/git.example.com/platform/api")
        );
    }

    #[test]
    fn clone_url_substitutes_template() {
        let mut ctx = ctx_with(Catalog::default());
        ctx.config.clone_url = "ssh://git@{host}/{project}/{name}.git".to_string();
        assert_eq!(clone_url(&ctx, "web"), "ssh://git@github.com/acme/web.git");
    }

    #[test]
    fn default_branch_prefers_catalog() {
        let ctx = ctx_with(Catalog::from_repos(vec![catalog_entry()]));
        assert_eq!(default_branch(&ctx, "api"), "trunk");
        assert_eq!(default_branch(&ctx, "web"), "main");
    }

    #[tokio::test]
    async fn current_branch_uses_override_and_cache() {
        let mut ctx = ctx_with(Catalog::default());
        ctx.config.branch = Some("release/1.0".to_string());
        assert_eq!(current_branch(&ctx, "web").await.unwrap(), "release/1.0");

        let mut ctx = ctx_with(Catalog::default());
        ctx.config.branch = None;
        ctx.cache_branch("web", "feature/x");
        assert_eq!(current_branch(&ctx, "web").await.unwrap(), "feature/x");
    }

    #[test]
    fn slug_drops_empty_project() {
        let r = RepoRef {
            host: "github.com".to_string(),
            project: String::new(),
            name: "web".to_string(),
        };
        assert_eq!(r.slug(), "web");
    }
}
