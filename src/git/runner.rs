//! git::runner
//!
//! Git subprocess executor.
//!
//! # Error Handling
//!
//! Git failures are categorized into typed variants:
//! - [`GitError::NotARepo`]: the working directory is not inside a repository
//! - [`GitError::Exec`]: the subprocess could not be spawned
//! - [`GitError::Signalled`]: the subprocess died to a signal
//! - [`GitError::UnexpectedExit`]: the exit code was outside the accepted set
//!
//! # Example
//!
//! ```ignore
//! use gitdeploy::git::GitRunner;
//! use gitdeploy::ui::Verbosity;
//!
//! let git = GitRunner::new(Verbosity::Normal);
//! let head = git.result(&["rev-parse", "HEAD"], &[0])?;
//! ```

use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

use crate::ui;
use crate::ui::Verbosity;

/// Errors from git subprocess invocations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The current directory is not inside a git repository.
    #[error("not a git repository (or any of the parent directories)")]
    NotARepo,

    /// The git binary could not be spawned.
    #[error("failed to execute `git {cmd}`: {source}")]
    Exec {
        /// The argument vector that failed to spawn
        cmd: String,
        /// The underlying spawn error
        source: std::io::Error,
    },

    /// The subprocess died to a signal.
    #[error("`git {cmd}` died to signal {signal} (core dumped: {core_dumped})")]
    Signalled {
        /// The argument vector
        cmd: String,
        /// Signal number that killed the process
        signal: i32,
        /// Whether a core dump was produced
        core_dumped: bool,
    },

    /// The exit code was outside the accepted set.
    #[error("`git {cmd}` exited with code {code}:\n{output}")]
    UnexpectedExit {
        /// The argument vector
        cmd: String,
        /// The unaccepted exit code
        code: i32,
        /// Captured stdout + stderr
        output: String,
    },
}

/// Runs `git` subprocesses and normalizes their results.
///
/// The runner is cheap to clone; every subsystem that talks to git holds
/// its own copy. It carries only the verbosity (for debug traces) and an
/// optional working-directory override.
#[derive(Debug, Clone)]
pub struct GitRunner {
    verbosity: Verbosity,
    cwd: Option<PathBuf>,
}

impl GitRunner {
    /// Create a runner operating in the process working directory.
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            cwd: None,
        }
    }

    /// Create a runner pinned to a specific directory.
    pub fn with_cwd(verbosity: Verbosity, cwd: PathBuf) -> Self {
        Self {
            verbosity,
            cwd: Some(cwd),
        }
    }

    /// The verbosity this runner traces at.
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Run a git command, returning `(output, exit_code)`.
    ///
    /// stdout and stderr are captured together (stderr appended after
    /// stdout) and the trailing newline is stripped. Spawn failures and
    /// signal deaths are errors; any exit code is returned as data.
    pub fn run(&self, args: &[&str]) -> Result<(String, i32), GitError> {
        let cmd_str = args.join(" ");
        ui::debug(format!("running: git {}", cmd_str), self.verbosity);

        let mut command = Command::new("git");
        command.args(args);
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let output = command.output().map_err(|source| GitError::Exec {
            cmd: cmd_str.clone(),
            source,
        })?;

        let code = match output.status.code() {
            Some(code) => code,
            None => {
                return Err(GitError::Signalled {
                    cmd: cmd_str,
                    signal: output.status.signal().unwrap_or(0),
                    core_dumped: output.status.core_dumped(),
                });
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        while text.ends_with('\n') || text.ends_with('\r') {
            text.pop();
        }

        ui::debug(format!("git {} => {}", cmd_str, code), self.verbosity);
        Ok((text, code))
    }

    /// Run a git command whose exit code must be in `accepted`.
    ///
    /// Returns the captured output; an unaccepted code fails with
    /// [`GitError::UnexpectedExit`] carrying the output.
    pub fn result(&self, args: &[&str], accepted: &[i32]) -> Result<String, GitError> {
        let (output, code) = self.run(args)?;
        if accepted.contains(&code) {
            Ok(output)
        } else {
            Err(GitError::UnexpectedExit {
                cmd: args.join(" "),
                code,
                output,
            })
        }
    }

    /// Run a git command purely for its exit code.
    pub fn errcode(&self, args: &[&str]) -> Result<i32, GitError> {
        let (_, code) = self.run(args)?;
        Ok(code)
    }

    /// Locate the repository's git directory.
    ///
    /// Exit code 128 from `git rev-parse --git-dir` means "not a repo".
    /// The returned path is absolute.
    pub fn git_dir(&self) -> Result<PathBuf, GitError> {
        let (output, code) = self.run(&["rev-parse", "--git-dir"])?;
        if code == 128 {
            return Err(GitError::NotARepo);
        }
        if code != 0 {
            return Err(GitError::UnexpectedExit {
                cmd: "rev-parse --git-dir".to_string(),
                code,
                output,
            });
        }
        let path = PathBuf::from(output);
        if path.is_absolute() {
            Ok(path)
        } else {
            let base = match &self.cwd {
                Some(dir) => dir.clone(),
                None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            };
            Ok(base.join(path))
        }
    }

    /// Locate the root of the working tree.
    pub fn worktree_root(&self) -> Result<PathBuf, GitError> {
        let (output, code) = self.run(&["rev-parse", "--show-toplevel"])?;
        if code == 128 {
            return Err(GitError::NotARepo);
        }
        if code != 0 {
            return Err(GitError::UnexpectedExit {
                cmd: "rev-parse --show-toplevel".to_string(),
                code,
                output,
            });
        }
        Ok(PathBuf::from(output))
    }
}
