//! finish - conclude a synced rollout
//!
//! Appends the third step-log line (the transient FINISHING state),
//! pushes the branch and the rollout tags to the remote, and removes the
//! session. A push failure leaves the session in FINISHING so the next
//! attempt is diagnosed instead of silently double-finishing; recover
//! with `--force` or `abort`.

use anyhow::{Context as _, Result};

use crate::ops::{self, DeployContext};
use crate::ui;

/// Conclude a synced rollout.
pub fn finish(ctx: &DeployContext) -> Result<()> {
    let line = ctx.status_line("finish")?;
    ctx.session
        .advance("finish", &line, &ctx.current_user(), ctx.opts.force)?;

    if let Some(remote) = ctx.remote_site()? {
        let branch = ctx.remote_branch()?;
        ops::push_remote(&ctx.git, &remote, &branch)
            .context("push failed; the session is left in place, retry with --force")?;
    }

    ctx.session.cleanup()?;

    ui::print("rollout finished", ctx.verbosity);
    Ok(())
}
