//! start / hotfix - begin a rollout session
//!
//! `start` brings the working tree up to date from the remote, tags the
//! starting point so `abort` can return to it, and takes the session
//! lock. `hotfix` is the same transition but deploys the tree as-is:
//! no fetch, no unpushed-commit guard, no pull.

use anyhow::{Context as _, Result};
use chrono::Local;

use crate::hooks::Phase;
use crate::ops::{self, DeployContext};
use crate::session::{SidecarKind, TagSidecar};
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StartMode {
    Start,
    Hotfix,
}

/// Begin a rollout: update the tree, tag the starting point, take the lock.
pub fn start(ctx: &DeployContext) -> Result<()> {
    begin(ctx, StartMode::Start)
}

/// Begin a hotfix rollout of the current tree as-is.
pub fn hotfix(ctx: &DeployContext) -> Result<()> {
    begin(ctx, StartMode::Hotfix)
}

fn begin(ctx: &DeployContext, mode: StartMode) -> Result<()> {
    let prefix = ctx.tag_prefix()?;

    ctx.hooks.dispatch(Phase::PreStart, &prefix, false)?;

    if !ctx.opts.no_check_clean {
        ops::check_clean(&ctx.git)?;
    }

    let remote = ctx.remote_site()?;
    if mode == StartMode::Start {
        if let Some(remote) = &remote {
            let branch = ctx.remote_branch()?;
            ops::fetch_remote(&ctx.git, remote, &branch)?;
            ops::check_unpushed(&ctx.git, remote, &branch, ctx.opts.force)?;
        }
    }

    ctx.hooks.dispatch(Phase::PrePull, &prefix, false)?;

    if mode == StartMode::Start {
        if let Some(remote) = &remote {
            let branch = ctx.remote_branch()?;
            ctx.git
                .result(&["pull", remote, &branch], &[0])
                .context("git pull failed; resolve and retry")?;
        }
    }

    ctx.hooks.dispatch(Phase::PostPull, &prefix, false)?;
    ctx.hooks.dispatch(Phase::PostTreeUpdate, &prefix, false)?;

    let infix = match mode {
        StartMode::Start => "start",
        StartMode::Hotfix => "hotfix",
    };
    let name = format!(
        "{}-{}-{}",
        prefix,
        infix,
        Local::now().format(ctx.date_fmt())
    );
    let tag = ctx.make_tag(&name, &ctx.message_lines("rollout start of %TAG"))?;
    let commit = ctx
        .refs
        .name_to_commit(&tag)?
        .with_context(|| format!("freshly created tag '{}' does not resolve", tag))?;
    TagSidecar::new(&ctx.session).store(SidecarKind::Rollback, &commit, &tag)?;

    let line = ctx.status_line("start")?;
    ctx.session
        .start(ctx.block_file()?.as_deref(), &line, || {
            ctx.tagging_preconditions()
        })?;

    ui::print(
        format!("rollout started at {} ({})", tag, &commit[..12]),
        ctx.verbosity,
    );
    ui::print("next step: 'git-deploy sync'", ctx.verbosity);
    Ok(())
}
