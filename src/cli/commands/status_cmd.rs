//! status - show the rollout session state
//!
//! The human view prints a one-line summary plus the step log; the
//! `--show-*` variants print exactly one value each, for scripting.

use anyhow::Result;

use crate::deploy_file;
use crate::ops::DeployContext;
use crate::session::SessionState;
use crate::ui;

/// Show the session state, or one scripted facet of it.
pub fn status(
    ctx: &DeployContext,
    show_step: bool,
    show_prefix: bool,
    show_deploy_file: bool,
    deploy_file_name: bool,
) -> Result<()> {
    if show_prefix {
        println!("{}", ctx.tag_prefix()?);
        return Ok(());
    }
    if deploy_file_name {
        println!(
            "{}",
            deploy_file::deploy_file_path(&ctx.config, &ctx.worktree)?.display()
        );
        return Ok(());
    }
    if show_deploy_file {
        let path = deploy_file::deploy_file_path(&ctx.config, &ctx.worktree)?;
        print!("{}", deploy_file::read_deploy_file(&path, &ctx.refs, false));
        return Ok(());
    }
    if show_step {
        let step = ctx
            .session
            .read_log()?
            .last()
            .map(|line| line.action.clone())
            .unwrap_or_else(|| "none".to_string());
        println!("{}", step);
        return Ok(());
    }

    match ctx.session.state()? {
        SessionState::Absent => {
            ui::print("no rollout in progress", ctx.verbosity);
        }
        state => {
            let summary = match state {
                SessionState::Started => "rollout started, not yet synced",
                SessionState::Synced => "rollout synced, waiting for finish",
                SessionState::Finishing => "rollout finishing (or orphaned mid-finish)",
                SessionState::Corrupt => "session state is corrupt; fix it or abort --force",
                SessionState::Absent => unreachable!(),
            };
            ui::print(summary, ctx.verbosity);
            for line in ctx.session.log_text().lines() {
                ui::print(format!("  {}", line), ctx.verbosity);
            }
        }
    }
    Ok(())
}
