//! cli::commands
//!
//! Action dispatch and handlers.
//!
//! # Architecture
//!
//! Each handler composes the subsystems through the
//! [`DeployContext`](crate::ops::DeployContext): guard the session state
//! machine, dispatch the phase hooks, perform the git mutations, update
//! the step log. Timing records bracket every action.

mod abort;
mod finish;
mod log_cmd;
mod revert;
mod show;
mod start;
mod status_cmd;
mod sync;
mod tag_cmd;

pub use abort::abort;
pub use finish::finish;
pub use log_cmd::{diff, log};
pub use revert::revert;
pub use show::{show, show_tag};
pub use start::{hotfix, start};
pub use status_cmd::status;
pub use sync::{release, sync};
pub use tag_cmd::tag;

use anyhow::Result;

use crate::cli::Command;
use crate::ops::DeployContext;

/// Dispatch a parsed action to its handler.
pub fn dispatch(command: &Command, ctx: &DeployContext) -> Result<()> {
    match command {
        Command::Start => mutating(ctx, "start", || start(ctx)),
        Command::Sync => mutating(ctx, "sync", || sync(ctx)),
        Command::Finish => mutating(ctx, "finish", || finish(ctx)),
        Command::Abort => mutating(ctx, "abort", || abort(ctx)),
        Command::Release => mutating(ctx, "release", || release(ctx)),
        Command::Hotfix => mutating(ctx, "hotfix", || hotfix(ctx)),
        Command::Tag => mutating(ctx, "tag", || tag(ctx)),
        Command::Revert {
            tag,
            list,
            ignore_older_than,
            count,
        } => mutating(ctx, "revert", || {
            revert(ctx, tag.as_deref(), *list, ignore_older_than.as_deref(), *count)
        }),
        Command::Show {
            list_all,
            include_branches,
            long_digest,
            count,
            ignore_older_than,
        } => timed(ctx, "show", || {
            show(
                ctx,
                *list_all,
                *include_branches,
                *long_digest,
                *count,
                ignore_older_than.as_deref(),
            )
        }),
        Command::ShowTag => timed(ctx, "show_tag", || show_tag(ctx)),
        Command::Status {
            show_step,
            show_prefix,
            show_deploy_file,
            deploy_file_name,
        } => timed(ctx, "status", || {
            status(
                ctx,
                *show_step,
                *show_prefix,
                *show_deploy_file,
                *deploy_file_name,
            )
        }),
        Command::Log { count, args } => timed(ctx, "log", || log(ctx, *count, args)),
        Command::Diff { args } => timed(ctx, "diff", || diff(ctx, args)),
        // Rejected before dispatch; unreachable by construction.
        Command::Finnish => unreachable!("finnish is rejected in cli::run"),
    }
}

/// Bracket an action with timing records.
fn timed<F>(ctx: &DeployContext, name: &str, action: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    ctx.push_timing(&format!("action_{}_start", name));
    let result = action();
    ctx.push_timing(&format!("action_{}_end", name));
    result
}

/// Bracket a state-changing action and mark the run as deserving a
/// timing dump. Read-only actions skip the dump so `status` in a
/// monitoring loop does not spam `/var/log/deploy`.
fn mutating<F>(ctx: &DeployContext, name: &str, action: F) -> Result<()>
where
    F: FnOnce() -> Result<()>,
{
    ctx.enable_timing_flush();
    let result = timed(ctx, name, action);
    if result.is_ok() {
        ctx.mail_notice(name);
    }
    result
}
