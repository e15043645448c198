//! hooks
//!
//! Lifecycle hook discovery and dispatch.
//!
//! # Layout
//!
//! Under the configured root (`deploy.hook-dir`):
//!
//! - `apps/common/<phase>.<NNN_name>[.ext]` - run for every rollout
//! - `apps/<prefix>/<phase>.<NNN_name>[.ext]` - run when the app prefix matches
//! - `sync/<prefix>.sync` - single-file sync-style hook
//!
//! # Dispatch
//!
//! For a `(phase, prefix)` pair the common pass runs first, then the
//! app pass, each in ascending lexicographic order. Non-executable
//! candidates are skipped with a warning. Hooks are invoked through a
//! shell with stderr merged into stdout and the phase/prefix exported in
//! the environment.
//!
//! # Failure policy
//!
//! Exit 0 is success. Anything else terminates the invocation with
//! [`HookError::HookFailed`] unless the caller asked for ignored exits
//! (tree-rollback phases), in which case a warning is emitted and the
//! dispatch continues.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::ui;
use crate::ui::Verbosity;

/// A named point in the rollout at which hooks are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    PreStart,
    PrePull,
    PostPull,
    PreSync,
    PostSync,
    PostTreeUpdate,
    PostRollback,
}

impl Phase {
    /// The on-disk and environment-variable spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreStart => "pre-start",
            Phase::PrePull => "pre-pull",
            Phase::PostPull => "post-pull",
            Phase::PreSync => "pre-sync",
            Phase::PostSync => "post-sync",
            Phase::PostTreeUpdate => "post-tree-update",
            Phase::PostRollback => "post-rollback",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from hook execution.
#[derive(Debug, Error)]
pub enum HookError {
    /// A hook exited non-zero (or died to a signal).
    #[error("hook {hook} failed with status {status}:\n{output}")]
    HookFailed {
        /// Path of the failing hook
        hook: PathBuf,
        /// Exit code, or -1 for a signal death
        status: i32,
        /// Captured stdout + stderr
        output: String,
    },

    /// A hook could not be spawned at all.
    #[error("failed to execute hook {hook}: {source}")]
    ExecFailed {
        /// Path of the hook
        hook: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The hook directory could not be read.
    #[error("cannot read hook directory {dir}: {source}")]
    BadHookDir {
        /// The unreadable directory
        dir: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },
}

/// The hook engine for one invocation.
#[derive(Debug)]
pub struct HookEngine {
    /// Hook root; `None` disables all hooks.
    root: Option<PathBuf>,
    /// Global skip switch; disables hooks with a warning per dispatch.
    skip: bool,
    verbosity: Verbosity,
}

impl HookEngine {
    pub fn new(root: Option<PathBuf>, skip: bool, verbosity: Verbosity) -> Self {
        Self {
            root,
            skip,
            verbosity,
        }
    }

    /// Dispatch one phase for the given app prefix.
    pub fn dispatch(&self, phase: Phase, prefix: &str, ignore_exit: bool) -> Result<(), HookError> {
        let root = match &self.root {
            Some(root) => root.clone(),
            None => return Ok(()),
        };
        if self.skip {
            ui::warn(format!("skipping {} hooks as requested", phase));
            return Ok(());
        }

        for pass in ["common", prefix] {
            let dir = root.join("apps").join(pass);
            for hook in Self::candidates(&dir, phase)? {
                if !Self::is_executable(&hook) {
                    ui::warn(format!(
                        "hook {} is not executable, skipping",
                        hook.display()
                    ));
                    continue;
                }
                self.run_hook(&hook, phase.as_str(), pass, ignore_exit)?;
            }
        }
        Ok(())
    }

    /// The sync-style hook for a prefix, if present and executable.
    ///
    /// A present but non-executable hook warns and counts as absent.
    pub fn sync_hook(&self, prefix: &str) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        if self.skip {
            return None;
        }
        let path = root.join("sync").join(format!("{}.sync", prefix));
        if !path.is_file() {
            return None;
        }
        if !Self::is_executable(&path) {
            ui::warn(format!(
                "sync hook {} is not executable, ignoring",
                path.display()
            ));
            return None;
        }
        Some(path)
    }

    /// Run a single hook with the phase environment exported.
    ///
    /// Public so the orchestrator can run the sync-style hook through the
    /// same invocation and failure policy as phase hooks.
    pub fn run_hook(
        &self,
        hook: &Path,
        phase: &str,
        hook_prefix: &str,
        ignore_exit: bool,
    ) -> Result<(), HookError> {
        ui::debug(format!("running hook {}", hook.display()), self.verbosity);

        let output = Command::new("sh")
            .arg("-c")
            .arg(format!("'{}' 2>&1", hook.display()))
            .env("GIT_DEPLOYTOOL_PHASE", phase)
            .env("GIT_DEPLOY_PHASE", phase)
            .env("GIT_DEPLOYTOOL_HOOK_PREFIX", hook_prefix)
            .env("GIT_DEPLOY_HOOK_PREFIX", hook_prefix)
            .output()
            .map_err(|source| HookError::ExecFailed {
                hook: hook.to_path_buf(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        let text = text.trim_end().to_string();
        if !text.is_empty() {
            ui::print(&text, self.verbosity);
        }

        if output.status.success() {
            return Ok(());
        }
        let status = output.status.code().unwrap_or(-1);
        if ignore_exit {
            ui::warn(format!(
                "hook {} failed with status {} (ignored)",
                hook.display(),
                status
            ));
            return Ok(());
        }
        Err(HookError::HookFailed {
            hook: hook.to_path_buf(),
            status,
            output: text,
        })
    }

    /// Hook files for one phase in one directory, ascending lexicographic.
    fn candidates(dir: &Path, phase: Phase) -> Result<Vec<PathBuf>, HookError> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HookError::BadHookDir {
                    dir: dir.to_path_buf(),
                    source,
                });
            }
        };

        let wanted = format!("{}.", phase.as_str());
        let mut hooks: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(&wanted))
            })
            .collect();
        hooks.sort();
        Ok(hooks)
    }

    fn is_executable(path: &Path) -> bool {
        std::fs::metadata(path)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_hook(dir: &Path, name: &str, body: &str, executable: bool) -> PathBuf {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mode = if executable { 0o755 } else { 0o644 };
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[test]
    fn phases_spell_like_files() {
        assert_eq!(Phase::PreStart.as_str(), "pre-start");
        assert_eq!(Phase::PostTreeUpdate.as_str(), "post-tree-update");
    }

    #[test]
    fn candidates_sorted_and_filtered_by_phase() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("apps/common");
        write_hook(&dir, "pre-pull.020_b.sh", "true", true);
        write_hook(&dir, "pre-pull.010_a.sh", "true", true);
        write_hook(&dir, "post-pull.005_x.sh", "true", true);

        let found = HookEngine::candidates(&dir, Phase::PrePull).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["pre-pull.010_a.sh", "pre-pull.020_b.sh"]);
    }

    #[test]
    fn missing_directory_is_no_hooks() {
        let root = TempDir::new().unwrap();
        let found =
            HookEngine::candidates(&root.path().join("apps/common"), Phase::PreSync).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn common_runs_before_app_and_failure_stops_dispatch() {
        let root = TempDir::new().unwrap();
        let witness = root.path().join("order.txt");
        let common = root.path().join("apps/common");
        let app = root.path().join("apps/myapp");

        write_hook(
            &common,
            "pre-pull.010_a.sh",
            &format!("echo 010_a >> '{}'", witness.display()),
            true,
        );
        write_hook(
            &common,
            "pre-pull.020_b.sh",
            &format!("echo 020_b >> '{}'; exit 1", witness.display()),
            true,
        );
        write_hook(
            &app,
            "pre-pull.005_c.sh",
            &format!("echo 005_c >> '{}'", witness.display()),
            true,
        );

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        let err = engine.dispatch(Phase::PrePull, "myapp", false).unwrap_err();
        assert!(matches!(err, HookError::HookFailed { status: 1, .. }));

        // 010_a then 020_b ran; the app hook never did.
        let order = fs::read_to_string(&witness).unwrap();
        assert_eq!(order, "010_a\n020_b\n");
    }

    #[test]
    fn app_pass_runs_after_common_even_with_lower_sort_key() {
        let root = TempDir::new().unwrap();
        let witness = root.path().join("order.txt");
        write_hook(
            &root.path().join("apps/common"),
            "pre-pull.010_a.sh",
            &format!("echo 010_a >> '{}'", witness.display()),
            true,
        );
        write_hook(
            &root.path().join("apps/myapp"),
            "pre-pull.005_c.sh",
            &format!("echo 005_c >> '{}'", witness.display()),
            true,
        );

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        engine.dispatch(Phase::PrePull, "myapp", false).unwrap();
        assert_eq!(fs::read_to_string(&witness).unwrap(), "010_a\n005_c\n");
    }

    #[test]
    fn ignore_exit_continues_past_failure() {
        let root = TempDir::new().unwrap();
        let witness = root.path().join("order.txt");
        let common = root.path().join("apps/common");
        write_hook(&common, "post-rollback.010_f.sh", "exit 7", true);
        write_hook(
            &common,
            "post-rollback.020_g.sh",
            &format!("echo 020_g >> '{}'", witness.display()),
            true,
        );

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        engine.dispatch(Phase::PostRollback, "myapp", true).unwrap();
        assert_eq!(fs::read_to_string(&witness).unwrap(), "020_g\n");
    }

    #[test]
    fn non_executable_hook_is_skipped() {
        let root = TempDir::new().unwrap();
        let witness = root.path().join("order.txt");
        let common = root.path().join("apps/common");
        write_hook(&common, "pre-sync.010_n.sh", "echo ran >> nowhere", false);
        write_hook(
            &common,
            "pre-sync.020_y.sh",
            &format!("echo 020_y >> '{}'", witness.display()),
            true,
        );

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        engine.dispatch(Phase::PreSync, "myapp", false).unwrap();
        assert_eq!(fs::read_to_string(&witness).unwrap(), "020_y\n");
    }

    #[test]
    fn hooks_see_phase_environment() {
        let root = TempDir::new().unwrap();
        let witness = root.path().join("env.txt");
        write_hook(
            &root.path().join("apps/myapp"),
            "pre-sync.010_env.sh",
            &format!(
                "echo \"$GIT_DEPLOY_PHASE $GIT_DEPLOY_HOOK_PREFIX $GIT_DEPLOYTOOL_PHASE\" >> '{}'",
                witness.display()
            ),
            true,
        );

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        engine.dispatch(Phase::PreSync, "myapp", false).unwrap();
        assert_eq!(
            fs::read_to_string(&witness).unwrap(),
            "pre-sync myapp pre-sync\n"
        );
    }

    #[test]
    fn sync_hook_lookup() {
        let root = TempDir::new().unwrap();
        let sync = root.path().join("sync");
        write_hook(&sync, "myapp.sync", "true", true);
        write_hook(&sync, "noexec.sync", "true", false);

        let engine = HookEngine::new(Some(root.path().to_path_buf()), false, Verbosity::Quiet);
        assert!(engine.sync_hook("myapp").is_some());
        assert!(engine.sync_hook("noexec").is_none());
        assert!(engine.sync_hook("missing").is_none());

        let disabled = HookEngine::new(None, false, Verbosity::Quiet);
        assert!(disabled.sync_hook("myapp").is_none());
    }

    #[test]
    fn disabled_engine_dispatches_nothing() {
        let engine = HookEngine::new(None, false, Verbosity::Quiet);
        engine.dispatch(Phase::PreStart, "myapp", false).unwrap();
    }
}
