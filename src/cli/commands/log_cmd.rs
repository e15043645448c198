//! log / diff - what changed between rollouts?
//!
//! While a session is active the range runs from the recorded start tag
//! to HEAD (what this rollout will ship). Otherwise it runs from the
//! previous rollout tag to the one matching HEAD, or - when HEAD carries
//! no rollout tag - from the most recent rollout tag to HEAD (what has
//! not shipped yet).

use anyhow::{bail, Result};

use crate::ops::DeployContext;
use crate::refs::MatchMode;
use crate::session::{SessionState, SidecarKind, TagSidecar};
use crate::ui;

/// `(older, newer)` endpoints for the rollout range.
fn rollout_range(ctx: &DeployContext) -> Result<(String, String)> {
    if ctx.session.state()? != SessionState::Absent {
        let sidecar = TagSidecar::new(&ctx.session);
        if let Some((_, tag)) = sidecar.fetch(SidecarKind::Rollback, &ctx.refs)? {
            return Ok((tag, "HEAD".to_string()));
        }
    }

    let prefix = ctx.tag_prefix()?;
    let mut names = ctx.refs.sorted_tags()?;
    names.retain(|name| name.starts_with(&prefix));
    if names.is_empty() {
        bail!("no rollout tags with prefix '{}'", prefix);
    }

    match ctx
        .refs
        .names_matching_head(MatchMode::First, &names)?
        .into_iter()
        .next()
    {
        Some(current) => {
            let position = names.iter().position(|n| *n == current).unwrap_or(0);
            match names.get(position + 1) {
                Some(previous) => Ok((previous.clone(), current)),
                None => bail!("'{}' is the oldest rollout tag; nothing before it", current),
            }
        }
        None => Ok((names[0].clone(), "HEAD".to_string())),
    }
}

/// Show commits in the rollout range.
pub fn log(ctx: &DeployContext, count: Option<usize>, extra: &[String]) -> Result<()> {
    let (older, newer) = rollout_range(ctx)?;
    let range = format!("{}..{}", older, newer);
    let limit = count.map(|n| n.to_string());

    let mut args = vec!["log"];
    if let Some(limit) = &limit {
        args.push("-n");
        args.push(limit);
    }
    args.push(&range);
    for arg in extra {
        args.push(arg);
    }

    let output = ctx.git.result(&args, &[0])?;
    ui::print(output, ctx.verbosity);
    Ok(())
}

/// Show the diff across the rollout range.
pub fn diff(ctx: &DeployContext, extra: &[String]) -> Result<()> {
    let (older, newer) = rollout_range(ctx)?;

    let mut args = vec!["diff"];
    for arg in extra {
        args.push(arg);
    }
    args.push(&older);
    args.push(&newer);

    let output = ctx.git.result(&args, &[0])?;
    ui::print(output, ctx.verbosity);
    Ok(())
}
