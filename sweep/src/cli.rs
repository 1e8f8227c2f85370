use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use sweep_core::catalog::Catalog;
use sweep_core::config::{default_sweep_dir, Config, OutputMode};
use sweep_core::multichange::{ChangeSet, Outcome, DEFAULT_THRESHOLD};
use sweep_core::provider;
use sweep_core::scheduler;
use sweep_core::{Ctx, Native, Render, WorkFn};

use crate::pipeline;

#[derive(Parser)]
#[command(
    name = "sweep",
    version,
    about = "Run one operation across many repositories",
    long_about = "sweep fans a git action, a pull-request call or an arbitrary shell command \
out across a selected set of repositories, streaming each repo's output back without \
interleaving.\n\nRepositories are selected by name or label: '!' excludes, '+' \
force-includes, '~' marks a label, and 'all' selects every known repository."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Git operations across the selected repositories
    Git {
        #[command(subcommand)]
        command: GitCommands,
    },

    /// Pull-request operations via the configured provider
    Pr {
        #[command(subcommand)]
        command: PrCommands,
    },

    /// Run `make` in every selected repository
    Make {
        /// Repo names, labels and sigil tokens
        tokens: Vec<String>,

        /// Make targets, after `--`
        #[arg(last = true)]
        targets: Vec<String>,
    },

    /// Run an arbitrary command in every selected repository
    Exec {
        /// Repo names, labels and sigil tokens
        tokens: Vec<String>,

        /// Extra environment: KEY=VALUE or an envfile path. Repeatable.
        #[arg(short = 'e', long = "env")]
        env: Vec<String>,

        /// The command and its arguments, after `--`
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Print the repository catalog
    Repos {
        /// Only repositories carrying this label
        #[arg(long)]
        label: Option<String>,
    },

    /// Record, apply or revert a multi-file change set
    Multichange {
        #[command(subcommand)]
        command: MultichangeCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum GitCommands {
    /// Show the working-tree status of each repository
    Status {
        tokens: Vec<String>,
    },

    /// Create and switch to a branch in each repository
    Branch {
        tokens: Vec<String>,

        /// Branch name to create
        #[arg(short, long, required = true)]
        branch: String,
    },

    /// Commit staged and unstaged changes, then push (default)
    Commit {
        tokens: Vec<String>,

        /// Commit message
        #[arg(short, long, required = true)]
        message: String,

        /// Amend the previous commit instead of creating a new one
        #[arg(long)]
        amend: bool,

        /// Commit only; skip the push step
        #[arg(long)]
        no_push: bool,
    },

    /// Push the current branch of each repository
    Push {
        tokens: Vec<String>,

        /// Force-push (with lease)
        #[arg(long)]
        force: bool,
    },

    /// Stash, pull the default branch up to date, unstash
    Update {
        tokens: Vec<String>,
    },

    /// Stash or unstash each repository's working tree
    Stash {
        tokens: Vec<String>,

        /// Either `push` or `pop`
        #[arg(short, long, required = true)]
        action: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum PrCommands {
    /// Open a pull request for each repository's current branch
    New {
        tokens: Vec<String>,

        #[arg(short, long, required = true)]
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Reviewer to request. Repeatable.
        #[arg(short, long = "reviewer")]
        reviewers: Vec<String>,

        /// Open as a draft
        #[arg(long)]
        draft: bool,

        /// Base branch to merge into (defaults to the host's default)
        #[arg(long)]
        base: Option<String>,
    },

    /// Update the open pull request on each repository's current branch
    Edit {
        tokens: Vec<String>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Reviewer to request. Repeatable.
        #[arg(short, long = "reviewer")]
        reviewers: Vec<String>,

        /// Add the given reviewers instead of replacing the current set
        #[arg(long)]
        append_reviewers: bool,
    },

    /// Show the open pull request on each repository's current branch
    Get {
        tokens: Vec<String>,
    },

    /// Merge the open pull request on each repository's current branch
    Merge {
        tokens: Vec<String>,

        /// Merge without checking mergeability first
        #[arg(long)]
        skip_verify: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum MultichangeCommands {
    /// Record a before/after file pair into the change set
    Extract {
        /// Change-set file (created if missing)
        #[arg(short, long, required = true)]
        change: PathBuf,

        /// File with the original content
        before: PathBuf,

        /// File with the new content; its path names the target
        after: PathBuf,
    },

    /// Apply the change set to matching files
    Apply {
        #[arg(short, long, required = true)]
        change: PathBuf,

        /// Directory to apply in (default: current directory)
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Fuzzy-match threshold; 0 requires exact matches
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f32,
    },

    /// Restore the contents recorded by the last apply
    Revert {
        #[arg(short, long, required = true)]
        change: PathBuf,

        /// Directory to revert in (default: current directory)
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let sweep_dir = default_sweep_dir();
    let config = Config::load(&sweep_dir)?;
    let catalog = Catalog::load(&config.catalog_path())?;
    let ctx = Arc::new(Ctx::new(config, catalog));

    match cli.command {
        Commands::Git { command } => run_git(ctx, command).await,
        Commands::Pr { command } => run_pr(ctx, command).await,
        Commands::Make { tokens, targets } => {
            run_batch(ctx, &tokens, pipeline::make(targets)).await
        }
        Commands::Exec {
            tokens,
            env,
            command,
        } => {
            let work = pipeline::shell(command, env)?;
            run_batch(ctx, &tokens, work).await
        }
        Commands::Repos { label } => cmd_repos(&ctx, label.as_deref()),
        Commands::Multichange { command } => cmd_multichange(command),
    }
}

async fn run_git(ctx: Arc<Ctx>, command: GitCommands) -> Result<()> {
    match command {
        GitCommands::Status { tokens } => run_batch(ctx, &tokens, pipeline::git_status()).await,
        GitCommands::Branch { tokens, branch } => {
            run_batch(ctx, &tokens, pipeline::git_branch(&branch)).await
        }
        GitCommands::Commit {
            tokens,
            message,
            amend,
            no_push,
        } => run_batch(ctx, &tokens, pipeline::git_commit(&message, amend, no_push)).await,
        GitCommands::Push { tokens, force } => {
            run_batch(ctx, &tokens, pipeline::git_push(force)).await
        }
        GitCommands::Update { tokens } => run_batch(ctx, &tokens, pipeline::git_update()).await,
        GitCommands::Stash { tokens, action } => {
            let work = pipeline::git_stash(&action)?;
            run_batch(ctx, &tokens, work).await
        }
    }
}

async fn run_pr(ctx: Arc<Ctx>, command: PrCommands) -> Result<()> {
    // Provider construction validates prerequisites (e.g. the bitbucket
    // token) before any worker starts.
    let provider = provider::for_config(&ctx.config)?;

    match command {
        PrCommands::New {
            tokens,
            title,
            description,
            reviewers,
            draft,
            base,
        } => {
            let work = pipeline::pr_new(provider, title, description, reviewers, draft, base);
            run_batch(ctx, &tokens, work).await
        }
        PrCommands::Edit {
            tokens,
            title,
            description,
            reviewers,
            append_reviewers,
        } => {
            let work = pipeline::pr_edit(
                provider,
                title.unwrap_or_default(),
                description.unwrap_or_default(),
                reviewers,
                append_reviewers,
            );
            run_batch(ctx, &tokens, work).await
        }
        PrCommands::Get { tokens } => {
            run_batch(ctx, &tokens, pipeline::pr_get(provider)).await
        }
        PrCommands::Merge {
            tokens,
            skip_verify,
        } => {
            let work = pipeline::pr_merge(provider, !skip_verify);
            run_batch(ctx, &tokens, work).await
        }
    }
}

/// Hand the selection and work function to the scheduler with the
/// configured render handler.
async fn run_batch(ctx: Arc<Ctx>, tokens: &[String], work: WorkFn) -> Result<()> {
    match ctx.config.output {
        OutputMode::Tui => {
            let mut handler = sweep_tui::Tui::new();
            let mut renderers: [&mut dyn Render; 1] = [&mut handler];
            scheduler::run(ctx, tokens, work, &mut renderers).await
        }
        OutputMode::Native => {
            let mut handler = Native::stdout();
            let mut renderers: [&mut dyn Render; 1] = [&mut handler];
            scheduler::run(ctx, tokens, work, &mut renderers).await
        }
    }
}

fn cmd_repos(ctx: &Ctx, label: Option<&str>) -> Result<()> {
    let repos: Vec<_> = ctx
        .catalog
        .iter()
        .filter(|r| label.is_none_or(|l| r.labels.contains(l)))
        .collect();

    if repos.is_empty() {
        println!("no repositories known");
        return Ok(());
    }

    println!("{:<24} {:<16} {:<24} DESCRIPTION", "NAME", "PROJECT", "LABELS");
    for repo in repos {
        let labels: Vec<&str> = repo.labels.iter().map(|s| s.as_str()).collect();
        println!(
            "{:<24} {:<16} {:<24} {}",
            repo.name,
            repo.project,
            labels.join(","),
            repo.description,
        );
    }
    Ok(())
}

fn cmd_multichange(command: MultichangeCommands) -> Result<()> {
    match command {
        MultichangeCommands::Extract {
            change,
            before,
            after,
        } => {
            let mut set = ChangeSet::load(&change)?;
            set.extract(&before, &after)?;
            set.save(&change)?;
            println!("recorded {} -> {}", before.display(), after.display());
            Ok(())
        }
        MultichangeCommands::Apply {
            change,
            dir,
            threshold,
        } => {
            let mut set = ChangeSet::load(&change)?;
            for (path, outcome) in set.apply(&dir, threshold) {
                match outcome {
                    Outcome::Applied => println!("applied {path}"),
                    Outcome::AppliedFuzzy(d) => println!("applied {path} (fuzzy, distance {d:.2})"),
                    Outcome::Skipped(d) => println!("skipped {path} (distance {d:.2})"),
                    Outcome::Missing => println!("skipped {path} (missing)"),
                }
            }
            set.save(&change)
        }
        MultichangeCommands::Revert { change, dir } => {
            let mut set = ChangeSet::load(&change)?;
            set.revert(&dir)?;
            set.save(&change)?;
            println!("reverted {}", change.display());
            Ok(())
        }
    }
}
