//! sync / release - push the prepared revision to the target
//!
//! Both transitions move the session from STARTED to SYNCED. `sync` runs
//! the sync-style hook for the app prefix; a missing hook records the
//! step as `manual-sync` so the operator knows the tree still has to be
//! distributed by hand. `release` is for boxes that deploy without a
//! separate distribution step and never consults the sync hook.

use anyhow::{bail, Result};
use chrono::Local;

use crate::deploy_file;
use crate::hooks::Phase;
use crate::ops::DeployContext;
use crate::session::{SessionError, SessionState, SidecarKind, TagSidecar};
use crate::ui;

/// Sync the rollout to the target.
pub fn sync(ctx: &DeployContext) -> Result<()> {
    advance_to_synced(ctx, true)
}

/// Mark the rollout released without a manual sync step.
pub fn release(ctx: &DeployContext) -> Result<()> {
    advance_to_synced(ctx, false)
}

fn advance_to_synced(ctx: &DeployContext, use_sync_hook: bool) -> Result<()> {
    // Peek before tagging; the step log is the final authority when the
    // line is appended, but nobody wants a rollout tag created for a
    // session that never existed.
    if !ctx.opts.force {
        match ctx.session.state()? {
            SessionState::Started => {}
            SessionState::Absent => {
                return Err(SessionError::NotStarted {
                    action: if use_sync_hook { "sync" } else { "release" }.to_string(),
                }
                .into());
            }
            _ => {
                return Err(SessionError::AlreadySynced {
                    log: ctx.session.log_text(),
                }
                .into());
            }
        }
    }

    let prefix = ctx.tag_prefix()?;
    let name = format!("{}-{}", prefix, Local::now().format(ctx.date_fmt()));
    let tag = ctx.make_tag(&name, &ctx.message_lines("rollout of %TAG"))?;
    let commit = match ctx.refs.name_to_commit(&tag)? {
        Some(commit) => commit,
        None => bail!("freshly created tag '{}' does not resolve", tag),
    };
    TagSidecar::new(&ctx.session).store(SidecarKind::Rollout, &commit, &tag)?;

    let path = deploy_file::deploy_file_path(&ctx.config, &ctx.worktree)?;
    deploy_file::write_deploy_file(
        &path,
        &commit,
        &tag,
        &ctx.message_lines("deployed %TAG"),
    )?;

    ctx.hooks.dispatch(Phase::PreSync, &prefix, false)?;

    let action = if use_sync_hook {
        match ctx.hooks.sync_hook(&prefix) {
            Some(hook) => {
                ctx.hooks.run_hook(&hook, "sync", &prefix, false)?;
                "sync"
            }
            None => {
                ui::warn(format!(
                    "no sync hook for '{}'; recording a manual sync",
                    prefix
                ));
                "manual-sync"
            }
        }
    } else {
        "release"
    };

    ctx.hooks.dispatch(Phase::PostSync, &prefix, false)?;

    let line = ctx.status_line(action)?;
    ctx.session
        .advance(action, &line, &ctx.current_user(), ctx.opts.force)?;

    ui::print(
        format!("synced {} ({})", tag, &commit[..12]),
        ctx.verbosity,
    );
    ui::print("next step: 'git-deploy finish'", ctx.verbosity);
    Ok(())
}
