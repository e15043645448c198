//! abort - abandon the rollout and restore the starting point
//!
//! Resets the working tree to the start tag recorded in the `rollback`
//! sidecar (when the tree has moved), runs the rollback phases with
//! ignored exits, and removes the session.

use anyhow::{bail, Result};

use crate::hooks::Phase;
use crate::ops::DeployContext;
use crate::session::{SessionError, SessionState, SidecarKind, TagSidecar};
use crate::ui;

/// Abandon the current rollout.
pub fn abort(ctx: &DeployContext) -> Result<()> {
    if ctx.session.state()? == SessionState::Absent {
        bail!("no rollout in progress, nothing to abort");
    }

    if !ctx.opts.force {
        if let Some(owner) = ctx.session.owner()? {
            if owner != ctx.current_user() {
                return Err(SessionError::NotOwner { owner }.into());
            }
        }
    }

    let prefix = ctx.tag_prefix()?;
    let sidecar = TagSidecar::new(&ctx.session);
    match sidecar.fetch(SidecarKind::Rollback, &ctx.refs)? {
        Some((sha1, tag)) => {
            let head = ctx.refs.name_to_commit("HEAD")?;
            if head.as_deref() != Some(sha1.as_str()) {
                ui::print(format!("rolling the tree back to {}", tag), ctx.verbosity);
                ctx.git.result(&["reset", "--hard", &tag], &[0])?;
                ctx.hooks.dispatch(Phase::PostRollback, &prefix, true)?;
                ctx.hooks.dispatch(Phase::PostTreeUpdate, &prefix, true)?;
            }
        }
        None => {
            ui::warn("no usable rollback tag recorded; leaving the tree as it is");
        }
    }

    ctx.session.cleanup()?;

    ui::print("rollout aborted", ctx.verbosity);
    Ok(())
}
