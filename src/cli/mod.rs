//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Build the per-invocation [`DeployContext`](crate::ops::DeployContext)
//! - Delegate to action handlers
//! - Flush the timing ledger exactly once, at top level
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers in [`commands`] own the action
//! workflows; everything they need arrives through the context.

pub mod args;
pub mod commands;

pub use args::{Cli, Command};

use anyhow::{bail, Result};

use crate::ops::{DeployContext, GlobalOpts};

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    // The typo guard predates every repository check on purpose.
    if matches!(cli.command, Command::Finnish) {
        bail!("'finnish' is not an action; did you mean 'finish'?");
    }

    let opts = GlobalOpts {
        force: cli.force,
        verbose: cli.verbose,
        quiet: cli.quiet,
        no_check_clean: cli.no_check_clean,
        no_remote: cli.no_remote,
        no_hooks: cli.no_hooks,
        remote_site: cli.remote_site.clone(),
        remote_branch: cli.remote_branch.clone(),
        message: cli.message.clone(),
        date_fmt: cli.date_fmt.clone(),
    };

    let ctx = DeployContext::new(opts)?;
    let result = commands::dispatch(&cli.command, &ctx);

    // Deterministic flush: the ledger must not rely on destructors.
    let invocation: Vec<String> = std::env::args().collect();
    ctx.timings.borrow().flush(&invocation);

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            let hint = ctx.support_hint();
            if hint.is_empty() {
                Err(err)
            } else {
                Err(anyhow::anyhow!("{:#}{}", err, hint))
            }
        }
    }
}
