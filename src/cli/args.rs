//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! Available on all actions:
//! - `--force`: override ownership and warning-grade guards
//! - `--verbose` / `-v`: debug traces of every subprocess
//! - `--quiet` / `-q`: minimal output
//! - `--no-check-clean`: skip the working-tree cleanliness check
//! - `--no-remote`: no fetching, pulling, or pushing
//! - `--no-hooks`: skip lifecycle hooks (emits a warning per phase)
//! - `--remote-site=` / `--remote-branch=`: remote selection overrides
//! - `--message=` / `-m`: message for created tags and the deploy file
//! - `--date-fmt=`: strftime format for dated tag names

use clap::{Parser, Subcommand};

/// git-deploy - sequence rollouts using git tags and refs as the record
#[derive(Parser, Debug)]
#[command(name = "git-deploy")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Override ownership and warning-grade guards
    #[arg(long, global = true)]
    pub force: bool,

    /// Debug traces of every subprocess invocation
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Skip the working-tree cleanliness check
    #[arg(long, global = true)]
    pub no_check_clean: bool,

    /// Skip all remote operations (fetch, pull, push)
    #[arg(long, global = true)]
    pub no_remote: bool,

    /// Skip lifecycle hooks
    #[arg(long, global = true)]
    pub no_hooks: bool,

    /// Remote to fetch from and push to (default: deploy.remote-site)
    #[arg(long, global = true, value_name = "REMOTE")]
    pub remote_site: Option<String>,

    /// Branch to roll out (default: the current branch)
    #[arg(long, global = true, value_name = "BRANCH")]
    pub remote_branch: Option<String>,

    /// Message for created tags and the deploy file
    #[arg(short, long, global = true, value_name = "TEXT")]
    pub message: Option<String>,

    /// strftime format for dated tag names
    #[arg(long, global = true, value_name = "FMT")]
    pub date_fmt: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available actions.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Begin a rollout: update the tree, tag the starting point, take the lock
    Start,

    /// Push the prepared revision to the target (runs the sync hook)
    Sync,

    /// Conclude a synced rollout: push tags and release the lock
    Finish,

    /// Someone will make this typo sooner or later.
    #[command(name = "finnish", hide = true)]
    Finnish,

    /// Abandon the rollout and restore the starting point
    Abort,

    /// Sync variant for boxes that deploy without a manual sync step
    Release,

    /// Roll the working tree back to an earlier rollout tag
    Revert {
        /// The tag to revert to (see --list)
        tag: Option<String>,

        /// List candidate tags instead of reverting
        #[arg(long)]
        list: bool,

        /// Hide tags older than this date
        #[arg(long, value_name = "YYYYMMDD")]
        ignore_older_than: Option<String>,

        /// Show at most this many candidates
        #[arg(long, value_name = "N")]
        count: Option<usize>,
    },

    /// Create (and push) a dated rollout tag outside a session
    Tag,

    /// Begin a rollout of the current tree as-is, skipping the trunk pull
    Hotfix,

    /// Show rollout tags for HEAD (or all rollout tags)
    Show {
        /// List all rollout tags, not only those matching HEAD
        #[arg(long)]
        list_all: bool,

        /// Also list branches whose history contains HEAD
        #[arg(long)]
        include_branches: bool,

        /// Print full 40-hex commit ids
        #[arg(long)]
        long_digest: bool,

        /// Show at most this many tags
        #[arg(long, value_name = "N")]
        count: Option<usize>,

        /// Hide tags older than this date
        #[arg(long, value_name = "YYYYMMDD")]
        ignore_older_than: Option<String>,
    },

    /// Print the first rollout tag matching HEAD
    #[command(name = "show-tag")]
    ShowTag,

    /// Show the rollout session state
    Status {
        /// Print only the most recent session step
        #[arg(long)]
        show_step: bool,

        /// Print only the resolved tag prefix
        #[arg(long)]
        show_prefix: bool,

        /// Print the authenticated deploy file contents
        #[arg(long)]
        show_deploy_file: bool,

        /// Print the resolved deploy file path
        #[arg(long)]
        deploy_file_name: bool,
    },

    /// Show commits between the last two rollouts (or since start)
    Log {
        /// Limit the number of commits shown
        #[arg(long, value_name = "N")]
        count: Option<usize>,

        /// Extra arguments passed through to `git log`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show the diff between the last two rollouts (or since start)
    Diff {
        /// Extra arguments passed through to `git diff`
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}
