//! tag - create a dated rollout tag outside a session
//!
//! Marks manually synced revisions: creates `<prefix>-<date>` at HEAD
//! and pushes tags to the remote unless remote operations are disabled.

use anyhow::Result;
use chrono::Local;

use crate::ops::DeployContext;
use crate::ui;

/// Create (and push) a dated rollout tag at HEAD.
pub fn tag(ctx: &DeployContext) -> Result<()> {
    let prefix = ctx.tag_prefix()?;
    let name = format!("{}-{}", prefix, Local::now().format(ctx.date_fmt()));
    let tag = ctx.make_tag(&name, &ctx.message_lines("tagged %TAG"))?;

    if let Some(remote) = ctx.remote_site()? {
        ctx.git.result(&["push", "--tags", &remote], &[0])?;
    }

    ui::print(format!("created {}", tag), ctx.verbosity);
    Ok(())
}
