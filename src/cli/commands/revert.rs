//! revert - roll the working tree back to an earlier rollout tag
//!
//! For the bad-deploy-discovered-after-finish case: no session exists,
//! something already shipped, and the tree must return to a known-good
//! tag. The reverted state is marked with its own dated tag so later
//! `show`/`log` runs explain what happened.

use anyhow::{bail, Context as _, Result};
use chrono::Local;

use crate::hooks::Phase;
use crate::ops::{self, DeployContext};
use crate::refs::{MatchMode, RefDb};
use crate::session::SessionState;
use crate::ui;

/// Default number of candidates shown by `revert --list`.
const DEFAULT_LIST_COUNT: usize = 10;

/// Roll the working tree back to `target`, or list candidates.
pub fn revert(
    ctx: &DeployContext,
    target: Option<&str>,
    list: bool,
    ignore_older_than: Option<&str>,
    count: Option<usize>,
) -> Result<()> {
    let prefix = ctx.tag_prefix()?;

    if list || target.is_none() {
        return list_candidates(ctx, &prefix, ignore_older_than, count);
    }
    let target = target.expect("checked above");

    if ctx.session.state()? != SessionState::Absent {
        bail!("a rollout is in progress; finish or abort it before reverting");
    }
    if !ctx.opts.no_check_clean {
        ops::check_clean(&ctx.git)?;
    }

    let commit = ctx
        .refs
        .name_to_commit(target)?
        .with_context(|| format!("'{}' does not name a commit", target))?;
    let head = ctx.refs.name_to_commit("HEAD")?;
    if head.as_deref() == Some(commit.as_str()) {
        ui::print(
            format!("HEAD is already at {} ({})", target, &commit[..12]),
            ctx.verbosity,
        );
        return Ok(());
    }

    ctx.git.result(&["reset", "--hard", target], &[0])?;
    ctx.hooks.dispatch(Phase::PostRollback, &prefix, true)?;
    ctx.hooks.dispatch(Phase::PostTreeUpdate, &prefix, true)?;

    let name = format!(
        "{}-revert-{}",
        prefix,
        Local::now().format(ctx.date_fmt())
    );
    let marker = ctx.make_tag(
        &name,
        &ctx.message_lines(&format!("revert to {} as %TAG", target)),
    )?;

    ui::print(
        format!("tree reverted to {} ({}), marked {}", target, &commit[..12], marker),
        ctx.verbosity,
    );
    Ok(())
}

fn list_candidates(
    ctx: &DeployContext,
    prefix: &str,
    ignore_older_than: Option<&str>,
    count: Option<usize>,
) -> Result<()> {
    let mut names = ctx.refs.sorted_tags()?;
    names.retain(|name| name.starts_with(prefix));
    if let Some(cutoff) = ignore_older_than {
        names = RefDb::filter_by_date(cutoff, names);
    }
    names.truncate(count.unwrap_or(DEFAULT_LIST_COUNT));

    if names.is_empty() {
        bail!("no rollout tags with prefix '{}' to revert to", prefix);
    }

    let current = ctx.refs.names_matching_head(MatchMode::First, &names)?;
    for name in &names {
        let marker = if current.first() == Some(name) { "*" } else { " " };
        ui::print(format!("{} {}", marker, name), ctx.verbosity);
    }
    ui::print(
        "run 'git-deploy revert <tag>' to roll the tree back",
        ctx.verbosity,
    );
    Ok(())
}
