//! show / show-tag - what is deployed here?
//!
//! `show` lists rollout tags matching HEAD (or, with `--list-all`, every
//! rollout tag) newest first; `show-tag` prints just the first match,
//! for scripting.

use anyhow::{bail, Result};

use crate::ops::DeployContext;
use crate::refs::{MatchMode, RefDb};
use crate::ui;

/// Abbreviated digest length used without `--long-digest`.
const SHORT_DIGEST: usize = 12;

/// List rollout tags for HEAD (or all rollout tags).
pub fn show(
    ctx: &DeployContext,
    list_all: bool,
    include_branches: bool,
    long_digest: bool,
    count: Option<usize>,
    ignore_older_than: Option<&str>,
) -> Result<()> {
    let prefix = ctx.tag_prefix()?;
    let mut names = ctx.refs.sorted_tags()?;
    names.retain(|name| name.starts_with(&prefix));
    if let Some(cutoff) = ignore_older_than {
        names = RefDb::filter_by_date(cutoff, names);
    }

    let mut selected = if list_all {
        names
    } else {
        ctx.refs.names_matching_head(MatchMode::All, &names)?
    };
    if let Some(count) = count {
        selected.truncate(count);
    }

    if selected.is_empty() {
        ui::print(
            if list_all {
                format!("no rollout tags with prefix '{}'", prefix)
            } else {
                "no rollout tag matches HEAD".to_string()
            },
            ctx.verbosity,
        );
    }

    for name in &selected {
        match ctx.refs.name_to_commit(name)? {
            Some(commit) => {
                let digest = if long_digest {
                    commit.as_str()
                } else {
                    &commit[..SHORT_DIGEST.min(commit.len())]
                };
                ui::print(format!("{} {}", digest, name), ctx.verbosity);
            }
            None => ui::warn(format!("tag '{}' does not resolve, skipping", name)),
        }
    }

    if include_branches {
        for branch in ctx.refs.branches_reaching_head()? {
            ui::print(format!("branch {}", branch), ctx.verbosity);
        }
    }
    Ok(())
}

/// Print the first rollout tag matching HEAD.
pub fn show_tag(ctx: &DeployContext) -> Result<()> {
    let prefix = ctx.tag_prefix()?;
    let mut names = ctx.refs.sorted_tags()?;
    names.retain(|name| name.starts_with(&prefix));

    match ctx
        .refs
        .names_matching_head(MatchMode::First, &names)?
        .into_iter()
        .next()
    {
        Some(name) => {
            // Plain println: the tag is the output, quiet mode or not.
            println!("{}", name);
            Ok(())
        }
        None => bail!("no rollout tag matches HEAD"),
    }
}
