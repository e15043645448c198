//! ops
//!
//! Orchestration context and shared workflow steps.
//!
//! # Architecture
//!
//! Every action handler receives a [`DeployContext`]: the process-wide
//! caches (git runner, config store, ref inventory, timing ledger) plus
//! the resolved repository layout, threaded explicitly rather than held
//! as global state. The context is built once per invocation; building it
//! locates the repository, changes into the worktree root, and applies
//! `deploy.restrict-umask`.
//!
//! The free helpers here are the steps every action composes: clean-tree
//! verification, remote fetch/push, the unpushed-commit guard, and
//! status-line assembly.

use std::cell::RefCell;
use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use chrono::Local;

use crate::config::{keys, ConfigStore};
use crate::git::GitRunner;
use crate::hooks::HookEngine;
use crate::refs::{self, RefDb};
use crate::session::{Session, SessionError, StatusLine};
use crate::timing::TimingLedger;
use crate::ui::{self, Verbosity};

/// Default leading token of rollout tags when `deploy.tag-prefix` is unset.
const DEFAULT_TAG_PREFIX: &str = "deploy";

/// Default strftime format for dated tag names.
pub const DEFAULT_DATE_FMT: &str = "%Y%m%d-%H%M";

/// Global options shared by every action, resolved from CLI flags.
#[derive(Debug, Clone, Default)]
pub struct GlobalOpts {
    pub force: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub no_check_clean: bool,
    pub no_remote: bool,
    pub no_hooks: bool,
    pub remote_site: Option<String>,
    pub remote_branch: Option<String>,
    pub message: Option<String>,
    pub date_fmt: Option<String>,
}

/// The per-invocation orchestration context.
#[derive(Debug)]
pub struct DeployContext {
    pub verbosity: Verbosity,
    pub opts: GlobalOpts,
    pub git: GitRunner,
    pub config: ConfigStore,
    pub refs: RefDb,
    pub hooks: HookEngine,
    pub session: Session,
    pub timings: RefCell<TimingLedger>,
    pub git_dir: PathBuf,
    pub worktree: PathBuf,
}

impl DeployContext {
    /// Build the context: locate the repository, chdir to the worktree
    /// root, and wire up every subsystem.
    pub fn new(opts: GlobalOpts) -> Result<Self> {
        let verbosity = Verbosity::from_flags(opts.quiet, opts.verbose);
        let git = GitRunner::new(verbosity);

        let git_dir = git.git_dir().context("cannot locate the git directory")?;
        let worktree = git
            .worktree_root()
            .context("cannot locate the worktree root")?;
        std::env::set_current_dir(&worktree)
            .with_context(|| format!("cannot chdir to {}", worktree.display()))?;

        let config = ConfigStore::new(git.clone());

        if let Some(raw) = config.get_opt(keys::RESTRICT_UMASK, crate::config::Accessor::Raw)? {
            let bits = u32::from_str_radix(&raw, 8)
                .with_context(|| format!("bad deploy.restrict-umask value '{}'", raw))?;
            nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(bits));
        }

        let hooks = HookEngine::new(config.get_path(keys::HOOK_DIR)?, opts.no_hooks, verbosity);
        let session = Session::new(&git_dir);

        Ok(Self {
            verbosity,
            opts,
            refs: RefDb::new(git.clone()),
            hooks,
            session,
            timings: RefCell::new(TimingLedger::new()),
            config,
            git,
            git_dir,
            worktree,
        })
    }

    /// Record a timing tag.
    pub fn push_timing(&self, tag: &str) {
        self.timings.borrow_mut().push(tag);
    }

    /// Mark this run as worth a timing dump.
    pub fn enable_timing_flush(&self) {
        self.timings.borrow_mut().enable_flush();
    }

    /// The rollout tag prefix for this repository.
    pub fn tag_prefix(&self) -> Result<String> {
        Ok(self.config.get_or(keys::TAG_PREFIX, DEFAULT_TAG_PREFIX)?)
    }

    /// The dated-tag format for this invocation.
    pub fn date_fmt(&self) -> &str {
        self.opts.date_fmt.as_deref().unwrap_or(DEFAULT_DATE_FMT)
    }

    /// The message lines for created tags and the deploy file.
    pub fn message_lines(&self, default: &str) -> Vec<String> {
        match &self.opts.message {
            Some(message) => message.lines().map(String::from).collect(),
            None => vec![default.to_string()],
        }
    }

    /// The remote to fetch from and push to.
    ///
    /// `--no-remote` and `deploy.remote-site = none` both disable remote
    /// operations entirely.
    pub fn remote_site(&self) -> Result<Option<String>> {
        if self.opts.no_remote {
            return Ok(None);
        }
        let site = match &self.opts.remote_site {
            Some(site) => site.clone(),
            None => self.config.get_or(keys::REMOTE_SITE, "origin")?,
        };
        Ok((site != "none").then_some(site))
    }

    /// The branch used for remote fetch/push.
    pub fn remote_branch(&self) -> Result<String> {
        match &self.opts.remote_branch {
            Some(branch) => Ok(branch.clone()),
            None => current_branch(&self.git),
        }
    }

    /// The invoking user, from the environment.
    pub fn current_user(&self) -> String {
        std::env::var("USER").unwrap_or_else(|_| "unknown".to_string())
    }

    /// Assemble a step-log record for `action` at the current HEAD.
    pub fn status_line(&self, action: &str) -> Result<StatusLine> {
        let head = self
            .refs
            .name_to_commit("HEAD")?
            .context("repository has no commits; nothing to roll out")?;
        Ok(StatusLine {
            action: action.to_string(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            branch: current_branch(&self.git)?,
            head,
            uid: nix::unistd::getuid().as_raw(),
            username: self.current_user(),
        })
    }

    /// The `deploy.block-file` path, if configured.
    pub fn block_file(&self) -> Result<Option<PathBuf>> {
        Ok(self.config.get_path(keys::BLOCK_FILE)?)
    }

    /// Precondition for tag-creating actions: mandatory identity present
    /// and tagging allowed on this host.
    pub fn tagging_preconditions(&self) -> Result<(), SessionError> {
        let check = |key: &str| {
            self.config
                .get(key)
                .map(|_| ())
                .map_err(|err| SessionError::Precondition(err.to_string()))
        };
        check("user.name")?;
        check("user.email")?;
        match self.config.get_bool(keys::CAN_MAKE_TAGS, true) {
            Ok(true) => Ok(()),
            Ok(false) => Err(SessionError::Precondition(
                "this host is not allowed to make rollout tags (deploy.can-make-tags is false)"
                    .to_string(),
            )),
            Err(err) => Err(SessionError::Precondition(err.to_string())),
        }
    }

    /// Create a tag named `<name>` at HEAD, gated by the tagging
    /// preconditions.
    pub fn make_tag(&self, name: &str, message_lines: &[String]) -> Result<String> {
        self.tagging_preconditions()
            .map_err(|err| anyhow::anyhow!("{}", err))?;
        Ok(refs::make_tag(&self.git, &self.refs, name, message_lines)?)
    }

    /// Surface a requested mail notification.
    ///
    /// Mail transports live in site wrappers, not here. When
    /// `deploy.send-mail-on-<action>` asks for mail, say so and name the
    /// configured `deploy.mail-tool` instead of dropping the request
    /// silently.
    pub fn mail_notice(&self, action: &str) {
        let key = keys::send_mail_on(action);
        if let Ok(true) = self.config.get_bool(&key, false) {
            let tool = self
                .config
                .get_or(keys::MAIL_TOOL, "sendmail")
                .unwrap_or_else(|_| "sendmail".to_string());
            ui::warn(format!(
                "deploy.{} is set; mail delivery is left to the site wrapper ({})",
                key, tool
            ));
        }
    }

    /// Append a fatal-error contact hint when one is configured.
    pub fn support_hint(&self) -> String {
        match self.config.get_opt(keys::SUPPORT_EMAIL, crate::config::Accessor::Raw) {
            Ok(Some(email)) => format!("\nif you are stuck, contact {}", email),
            _ => String::new(),
        }
    }
}

/// The currently checked-out branch, `"(no branch)"` when detached.
pub fn current_branch(git: &GitRunner) -> Result<String> {
    let output = git.result(&["branch"], &[0])?;
    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("* ") {
            if rest.starts_with('(') {
                return Ok("(no branch)".to_string());
            }
            return Ok(rest.trim().to_string());
        }
    }
    Ok("(no branch)".to_string())
}

/// Verify the working tree is clean.
///
/// Passes iff `git status` reports a clean tree; git's phrasing changed
/// over the years, so both the historical and the current sentence are
/// accepted.
pub fn check_clean(git: &GitRunner) -> Result<()> {
    let (output, _) = git.run(&["status"])?;
    if output.contains("(working directory clean)") || output.contains("working tree clean") {
        Ok(())
    } else {
        bail!(
            "working tree is not clean; commit or stash your changes first:\n{}",
            output
        );
    }
}

/// Fetch tags and the rollout branch from the remote.
///
/// `git fetch` exiting 1 means "nothing to fetch" and is not an error.
pub fn fetch_remote(git: &GitRunner, remote: &str, branch: &str) -> Result<()> {
    git.result(&["fetch", "--tags", remote], &[0, 1])?;
    git.result(&["fetch", remote, branch], &[0, 1])?;
    Ok(())
}

/// Guard against rolling out with commits the remote has never seen.
///
/// Fatal without `--force`; a warning with it. When `git cherry` cannot
/// answer (no upstream), the guard is inconclusive and passes.
pub fn check_unpushed(git: &GitRunner, remote: &str, branch: &str, force: bool) -> Result<()> {
    let upstream = format!("{}/{}", remote, branch);
    let (output, code) = git.run(&["cherry", &upstream])?;
    if code != 0 {
        ui::debug(
            format!("git cherry {} inconclusive (exit {})", upstream, code),
            git.verbosity(),
        );
        return Ok(());
    }
    let unpushed: Vec<&str> = output
        .lines()
        .filter(|line| line.starts_with('+'))
        .collect();
    if unpushed.is_empty() {
        return Ok(());
    }
    if force {
        ui::warn(format!(
            "you have {} commit(s) not pushed to {}, rolling out anyway",
            unpushed.len(),
            upstream
        ));
        Ok(())
    } else {
        bail!(
            "you have {} commit(s) not pushed to {}; push them or use --force:\n{}",
            unpushed.len(),
            upstream,
            unpushed.join("\n")
        );
    }
}

/// Push the rollout branch and all tags to the remote.
pub fn push_remote(git: &GitRunner, remote: &str, branch: &str) -> Result<()> {
    git.result(&["push", remote, branch], &[0])?;
    git.result(&["push", "--tags", remote], &[0])?;
    Ok(())
}
