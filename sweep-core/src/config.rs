//! Runtime configuration for sweep.
//!
//! Resolution order: **env var > `~/.sweep/config` file > hardcoded default**.
//!
//! ```text
//! Field             Env Var                  Config Key         Default
//! ───────────────── ──────────────────────── ────────────────── ─────────────────
//! max_concurrency   SWEEP_MAX_CONCURRENCY    max_concurrency    0 (logical CPUs)
//! channel_buffer    SWEEP_CHANNEL_BUFFER     channel_buffer     100
//! output            SWEEP_OUTPUT             output             tui
//! superset_label    SWEEP_SUPERSET_LABEL     superset_label     "all"
//! sort_repos        SWEEP_SORT_REPOS         sort_repos         false
//! skip_unwanted     SWEEP_SKIP_UNWANTED      skip_unwanted      true
//! unwanted_labels   SWEEP_UNWANTED_LABELS    unwanted_labels    "deprecated"
//! sigils            —                        sigil_*            ! + ~
//! base_dir          SWEEP_BASE_DIR           base_dir           current dir
//! host              SWEEP_HOST               host               github.com
//! project           SWEEP_PROJECT            project            ""
//! default_branch    SWEEP_DEFAULT_BRANCH     default_branch     main
//! branch            SWEEP_BRANCH             branch             — (git rev-parse)
//! env               SWEEP_ENV                env                —
//! clone_url         SWEEP_CLONE_URL          clone_url          https://{host}/{project}/{name}.git
//! print_results     SWEEP_PRINT_RESULTS      print_results      false
//! wait_on_exit      SWEEP_WAIT_ON_EXIT       wait_on_exit       true
//! provider          SWEEP_PROVIDER           provider           github
//! auth_token        SWEEP_AUTH_TOKEN         auth_token         —
//! aliases           —                        alias.<name>       —
//! sweep_dir         SWEEP_DIR                —                  ~/.sweep
//! ```
//!
//! List values (`unwanted_labels`, `env`, alias members) are comma-separated.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::{env, fs};

/// Which render handler presents the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Full-screen live view with progress bar (default).
    Tui,
    /// Plain sequential output, one repo section after another.
    Native,
}

impl OutputMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "tui" => Some(OutputMode::Tui),
            "native" => Some(OutputMode::Native),
            _ => None,
        }
    }
}

/// Runtime configuration, loaded once per invocation and read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for sweep state (`~/.sweep` by default).
    pub sweep_dir: PathBuf,
    /// Concurrent worker bound; 0 or negative falls back to the logical CPU count.
    pub max_concurrency: i64,
    /// Capacity of each repo's output queue.
    pub channel_buffer: usize,
    /// Render handler selection.
    pub output: OutputMode,
    /// Label name that expands to every known repository.
    pub superset_label: String,
    /// Emit the selected repos sorted lexicographically instead of in input order.
    pub sort_repos: bool,
    /// Drop repos carrying an unwanted label unless force-included.
    pub skip_unwanted: bool,
    /// Labels filtered out by `skip_unwanted`.
    pub unwanted_labels: Vec<String>,
    /// Token prefix marking an exclusion.
    pub sigil_exclude: char,
    /// Token prefix marking a forced inclusion.
    pub sigil_force: char,
    /// Token prefix marking a label reference.
    pub sigil_label: char,
    /// Root of the on-disk repo tree (`base_dir/host/project/name`).
    pub base_dir: PathBuf,
    /// Default host for repos that don't carry one.
    pub host: String,
    /// Default project for repos that don't carry one.
    pub project: String,
    /// Fallback default branch for repos that don't carry one.
    pub default_branch: String,
    /// Branch override; when unset the current branch is read from git.
    pub branch: Option<String>,
    /// Extra subprocess environment: `KEY=VALUE` literals or envfile paths.
    pub env: Vec<String>,
    /// Clone URL template with `{host}`, `{project}` and `{name}` placeholders.
    pub clone_url: String,
    /// Print the full log to stdout after the TUI exits.
    pub print_results: bool,
    /// Keep the TUI open after the run completes until a key is pressed.
    pub wait_on_exit: bool,
    /// Pull-request provider: `github`, `bitbucket` or `fake`.
    pub provider: String,
    /// Bearer token for REST providers.
    pub auth_token: Option<String>,
    /// Configured aliases; each behaves exactly like a catalog label.
    pub aliases: Vec<(String, Vec<String>)>,
}

impl Config {
    /// Load config from env vars, `<sweep_dir>/config`, and hardcoded defaults.
    pub fn load(sweep_dir: &Path) -> Result<Self> {
        Self::load_with_env(sweep_dir, |k| env::var(k).ok())
    }

    pub fn load_with_env(
        sweep_dir: &Path,
        get_env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut cfg = Self::defaults(sweep_dir);

        // 1. Apply config file overrides
        let config_file = sweep_dir.join("config");
        if config_file.exists() {
            parse_config_file(&config_file, |key, value| {
                cfg.apply_file_entry(key, value);
            })?;
        }

        // 2. Apply env var overrides (env wins over file)
        cfg.apply_env_overrides(get_env);

        Ok(cfg)
    }

    pub fn defaults(sweep_dir: &Path) -> Self {
        Self {
            sweep_dir: sweep_dir.to_path_buf(),
            max_concurrency: 0,
            channel_buffer: 100,
            output: OutputMode::Tui,
            superset_label: "all".to_string(),
            sort_repos: false,
            skip_unwanted: true,
            unwanted_labels: vec!["deprecated".to_string()],
            sigil_exclude: '!',
            sigil_force: '+',
            sigil_label: '~',
            base_dir: PathBuf::from("."),
            host: "github.com".to_string(),
            project: String::new(),
            default_branch: "main".to_string(),
            branch: None,
            env: Vec::new(),
            clone_url: "https://{host}/{project}/{name}.git".to_string(),
            print_results: false,
            wait_on_exit: true,
            provider: "github".to_string(),
            auth_token: None,
            aliases: Vec::new(),
        }
    }

    /// Path of the repository catalog file.
    pub fn catalog_path(&self) -> PathBuf {
        self.sweep_dir.join("repos.json")
    }

    /// Effective worker bound: the configured value, or the logical CPU
    /// count when the configured value is zero or negative.
    pub fn effective_concurrency(&self) -> usize {
        if self.max_concurrency > 0 {
            self.max_concurrency as usize
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    fn apply_file_entry(&mut self, key: &str, value: &str) {
        if let Some(name) = key.strip_prefix("alias.") {
            self.aliases
                .push((name.to_string(), parse_list(value)));
            return;
        }
        match key {
            "max_concurrency" => {
                if let Ok(n) = value.parse::<i64>() {
                    self.max_concurrency = n;
                }
            }
            "channel_buffer" => {
                if let Ok(n) = value.parse::<usize>() {
                    self.channel_buffer = n.max(1);
                }
            }
            "output" => {
                if let Some(mode) = OutputMode::parse(value) {
                    self.output = mode;
                }
            }
            "superset_label" => self.superset_label = value.to_string(),
            "sort_repos" => self.sort_repos = value == "true",
            "skip_unwanted" => self.skip_unwanted = value == "true",
            "unwanted_labels" => self.unwanted_labels = parse_list(value),
            "sigil_exclude" => {
                if let Some(c) = single_char(value) {
                    self.sigil_exclude = c;
                }
            }
            "sigil_force" => {
                if let Some(c) = single_char(value) {
                    self.sigil_force = c;
                }
            }
            "sigil_label" => {
                if let Some(c) = single_char(value) {
                    self.sigil_label = c;
                }
            }
            "base_dir" => self.base_dir = PathBuf::from(value),
            "host" => self.host = value.to_string(),
            "project" => self.project = value.to_string(),
            "default_branch" => self.default_branch = value.to_string(),
            "branch" => self.branch = Some(value.to_string()),
            "env" => self.env = parse_list(value),
            "clone_url" => self.clone_url = value.to_string(),
            "print_results" => self.print_results = value == "true",
            "wait_on_exit" => self.wait_on_exit = value == "true",
            "provider" => self.provider = value.to_string(),
            "auth_token" => self.auth_token = Some(value.to_string()),
            _ => {}
        }
    }

    fn apply_env_overrides(&mut self, get_env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get_env("SWEEP_MAX_CONCURRENCY") {
            if let Ok(n) = v.parse::<i64>() {
                self.max_concurrency = n;
            }
        }
        if let Some(v) = get_env("SWEEP_CHANNEL_BUFFER") {
            if let Ok(n) = v.parse::<usize>() {
                self.channel_buffer = n.max(1);
            }
        }
        if let Some(v) = get_env("SWEEP_OUTPUT") {
            if let Some(mode) = OutputMode::parse(&v) {
                self.output = mode;
            }
        }
        if let Some(v) = get_env("SWEEP_SUPERSET_LABEL") {
            self.superset_label = v;
        }
        if let Some(v) = get_env("SWEEP_SORT_REPOS") {
            self.sort_repos = v == "true";
        }
        if let Some(v) = get_env("SWEEP_SKIP_UNWANTED") {
            self.skip_unwanted = v == "true";
        }
        if let Some(v) = get_env("SWEEP_UNWANTED_LABELS") {
            self.unwanted_labels = parse_list(&v);
        }
        if let Some(v) = get_env("SWEEP_BASE_DIR") {
            self.base_dir = PathBuf::from(v);
        }
        if let Some(v) = get_env("SWEEP_HOST") {
            self.host = v;
        }
        if let Some(v) = get_env("SWEEP_PROJECT") {
            self.project = v;
        }
        if let Some(v) = get_env("SWEEP_DEFAULT_BRANCH") {
            self.default_branch = v;
        }
        if let Some(v) = get_env("SWEEP_BRANCH") {
            if !v.is_empty() {
                self.branch = Some(v);
            }
        }
        if let Some(v) = get_env("SWEEP_ENV") {
            self.env = parse_list(&v);
        }
        if let Some(v) = get_env("SWEEP_CLONE_URL") {
            self.clone_url = v;
        }
        if let Some(v) = get_env("SWEEP_PRINT_RESULTS") {
            self.print_results = v == "true";
        }
        if let Some(v) = get_env("SWEEP_WAIT_ON_EXIT") {
            self.wait_on_exit = v == "true";
        }
        if let Some(v) = get_env("SWEEP_PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = get_env("SWEEP_AUTH_TOKEN") {
            if !v.is_empty() {
                self.auth_token = Some(v);
            }
        }
    }
}

/// Default sweep directory: `$SWEEP_DIR`, else `$HOME/.sweep`.
pub fn default_sweep_dir() -> PathBuf {
    if let Ok(dir) = env::var("SWEEP_DIR") {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME").unwrap_or_else(|_| String::from("."));
    PathBuf::from(home).join(".sweep")
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn single_char(value: &str) -> Option<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Parse a `key=value` config file, calling `f` for each entry.
///
/// Lines starting with `#` and empty lines are skipped.
fn parse_config_file(path: &Path, mut f: impl FnMut(&str, &str)) -> Result<()> {
    let content = fs::read_to_string(path)?;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            f(k.trim(), v.trim());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn config_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(cfg.max_concurrency, 0);
        assert_eq!(cfg.channel_buffer, 100);
        assert_eq!(cfg.output, OutputMode::Tui);
        assert_eq!(cfg.superset_label, "all");
        assert!(!cfg.sort_repos);
        assert!(cfg.skip_unwanted);
        assert_eq!(cfg.unwanted_labels, vec!["deprecated".to_string()]);
        assert_eq!(
            (cfg.sigil_exclude, cfg.sigil_force, cfg.sigil_label),
            ('!', '+', '~')
        );
        assert_eq!(cfg.default_branch, "main");
        assert_eq!(cfg.provider, "github");
        assert!(cfg.wait_on_exit);
    }

    #[test]
    fn config_file_override() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "max_concurrency=4\nchannel_buffer=10\noutput=native\nsort_repos=true\n\
             unwanted_labels=archived,legacy\nsigil_exclude=-\nhost=git.example.com\n\
             project=platform\nclone_url=ssh://git@{host}/{project}/{name}.git\n",
        )
        .unwrap();

        let cfg = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(cfg.max_concurrency, 4);
        assert_eq!(cfg.channel_buffer, 10);
        assert_eq!(cfg.output, OutputMode::Native);
        assert!(cfg.sort_repos);
        assert_eq!(cfg.unwanted_labels, vec!["archived", "legacy"]);
        assert_eq!(cfg.sigil_exclude, '-');
        assert_eq!(cfg.host, "git.example.com");
        assert_eq!(cfg.project, "platform");
        assert_eq!(cfg.clone_url, "ssh://git@{host}/{project}/{name}.git");
    }

    #[test]
    fn config_env_overrides_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "output=native\nmax_concurrency=2\n",
        )
        .unwrap();

        let cfg = Config::load_with_env(dir.path(), |k| match k {
            "SWEEP_OUTPUT" => Some("tui".to_string()),
            "SWEEP_MAX_CONCURRENCY" => Some("8".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.output, OutputMode::Tui);
        assert_eq!(cfg.max_concurrency, 8);
    }

    #[test]
    fn config_aliases_collected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "alias.backend=api,worker\nalias.web=frontend\n",
        )
        .unwrap();

        let cfg = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(
            cfg.aliases,
            vec![
                ("backend".to_string(), vec!["api".to_string(), "worker".to_string()]),
                ("web".to_string(), vec!["frontend".to_string()]),
            ]
        );
    }

    #[test]
    fn config_comments_and_blank_lines_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config"),
            "# comment\n\nsuperset_label=everything\n",
        )
        .unwrap();

        let cfg = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(cfg.superset_label, "everything");
    }

    #[test]
    fn effective_concurrency_fallback() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::defaults(dir.path());
        cfg.max_concurrency = -1;
        assert!(cfg.effective_concurrency() >= 1);
        cfg.max_concurrency = 3;
        assert_eq!(cfg.effective_concurrency(), 3);
    }

    #[test]
    fn invalid_output_mode_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config"), "output=fancy\n").unwrap();
        let cfg = Config::load_with_env(dir.path(), no_env).unwrap();
        assert_eq!(cfg.output, OutputMode::Tui);
    }
}
