//! session::status
//!
//! The step log, its lock discipline, and the transition validator.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from session operations.
///
/// The concurrency/session taxonomy: every variant a user can hit names
/// the situation and, where useful, carries the step log so the error
/// message shows who did what when.
#[derive(Debug, Error)]
pub enum SessionError {
    /// `deploy.block-file` exists; rollouts are administratively blocked.
    #[error("rollouts are currently blocked by the sysadmin:\n{text}")]
    SysadminBlocked {
        /// Contents of the block file
        text: String,
    },

    /// A session already exists on disk.
    #[error("cannot start a new rollout, one is already in progress:\n{log}")]
    SessionExists {
        /// Contents of the existing step log
        log: String,
    },

    /// Another process holds the advisory lock right now.
    #[error("another process is updating the rollout status, try again")]
    LockContended,

    /// No session has been started.
    #[error("cannot '{action}', you havent started yet (run 'start' first)")]
    NotStarted {
        /// The rejected action
        action: String,
    },

    /// The session belongs to someone else.
    #[error("this rollout was started by {owner}, not you (use --force to override)")]
    NotOwner {
        /// The owning username from the start line
        owner: String,
    },

    /// `sync` was attempted on an already-synced session.
    #[error("the rollout has already been synced:\n{log}")]
    AlreadySynced {
        /// Contents of the step log
        log: String,
    },

    /// `finish` was attempted before `sync`.
    #[error("cannot '{action}', the rollout has not been synced yet")]
    NotSyncedYet {
        /// The rejected action
        action: String,
    },

    /// The step log already has three lines.
    #[error("it looks like someone is just finishing a rollout:\n{log}")]
    FinishInProgress {
        /// Contents of the step log
        log: String,
    },

    /// The step log contents fit no known state.
    #[error("the rollout status file looks wrong, fix it or --force:\n{log}")]
    BadState {
        /// Contents of the step log
        log: String,
    },

    /// A caller-supplied start precondition failed.
    #[error("{0}")]
    Precondition(String),

    /// A step-log line did not parse.
    #[error("malformed status line: {line}")]
    MalformedLine {
        /// The offending line
        line: String,
    },

    /// Filesystem failure underneath the session directory.
    #[error("session file error at {path}: {source}")]
    Io {
        /// The path involved
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },
}

impl SessionError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One record of the step log.
///
/// Serialized as
/// `<action>:\t<timestamp>\t<branch-or-"(no branch)">\t<HEAD sha1>\t<uid>\t<username>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub action: String,
    /// `YYYY-MM-DD HH:MM:SS`, local time.
    pub timestamp: String,
    pub branch: String,
    pub head: String,
    pub uid: u32,
    pub username: String,
}

impl StatusLine {
    /// Render the on-disk form, without a trailing newline.
    pub fn render(&self) -> String {
        format!(
            "{}:\t{}\t{}\t{}\t{}\t{}",
            self.action, self.timestamp, self.branch, self.head, self.uid, self.username
        )
    }

    /// Parse one log line.
    pub fn parse(line: &str) -> Result<Self, SessionError> {
        let malformed = || SessionError::MalformedLine {
            line: line.to_string(),
        };
        let mut fields = line.split('\t');
        let action = fields
            .next()
            .and_then(|f| f.strip_suffix(':'))
            .ok_or_else(malformed)?;
        let timestamp = fields.next().ok_or_else(malformed)?;
        let branch = fields.next().ok_or_else(malformed)?;
        let head = fields.next().ok_or_else(malformed)?;
        let uid = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(malformed)?;
        let username = fields.next().ok_or_else(malformed)?;
        Ok(Self {
            action: action.to_string(),
            timestamp: timestamp.to_string(),
            branch: branch.to_string(),
            head: head.to_string(),
            uid,
            username: username.to_string(),
        })
    }
}

/// The session state, as decoded from the step log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No `deploy/` directory or no step log.
    Absent,
    /// Exactly one `start:` line.
    Started,
    /// Two lines; the second is `sync:`, `release:`, or `manual-sync:`.
    Synced,
    /// Three lines; a `finish` write is underway (or was orphaned).
    Finishing,
    /// The log exists but fits no known shape.
    Corrupt,
}

/// Actions that may follow `start` as the second line of the log.
const SYNC_ACTIONS: [&str; 3] = ["sync", "release", "manual-sync"];

/// Handle on the on-disk session for one repository.
#[derive(Debug)]
pub struct Session {
    deploy_dir: PathBuf,
}

impl Session {
    /// Session rooted under the given git directory.
    pub fn new(git_dir: &Path) -> Self {
        Self {
            deploy_dir: git_dir.join("deploy"),
        }
    }

    /// The session directory, `<gitdir>/deploy/`.
    pub fn deploy_dir(&self) -> &Path {
        &self.deploy_dir
    }

    /// The step log path.
    pub fn lock_file(&self) -> PathBuf {
        self.deploy_dir.join("lock")
    }

    /// Raw step-log text, empty when absent.
    pub fn log_text(&self) -> String {
        fs::read_to_string(self.lock_file()).unwrap_or_default()
    }

    /// Parse the step log into records.
    pub fn read_log(&self) -> Result<Vec<StatusLine>, SessionError> {
        self.log_text()
            .lines()
            .filter(|line| !line.is_empty())
            .map(StatusLine::parse)
            .collect()
    }

    /// Decode the current state.
    pub fn state(&self) -> Result<SessionState, SessionError> {
        if !self.lock_file().exists() {
            return Ok(SessionState::Absent);
        }
        let lines = match self.read_log() {
            Ok(lines) => lines,
            Err(SessionError::MalformedLine { .. }) => return Ok(SessionState::Corrupt),
            Err(err) => return Err(err),
        };
        match lines.as_slice() {
            [] => Ok(SessionState::Absent),
            [first] if first.action == "start" => Ok(SessionState::Started),
            [first, second]
                if first.action == "start"
                    && SYNC_ACTIONS.contains(&second.action.as_str()) =>
            {
                Ok(SessionState::Synced)
            }
            [_, _, _] => Ok(SessionState::Finishing),
            _ => Ok(SessionState::Corrupt),
        }
    }

    /// Begin a new session: the `start` transition.
    ///
    /// 1. If `block_file` is set and exists, fail with its contents.
    /// 2. Create `deploy/` (non-recursive). If that fails and a non-empty
    ///    step log exists, the session exists; an empty leftover
    ///    directory is fine.
    /// 3. Create the step log with `O_EXCL`.
    /// 4. Take the non-blocking advisory lock.
    /// 5. Run the caller's precondition checks.
    /// 6. Append the `start:` line.
    ///
    /// If anything fails after the log was created, the empty log is
    /// removed so a later `start` is not misdiagnosed.
    pub fn start<F>(
        &self,
        block_file: Option<&Path>,
        line: &StatusLine,
        other_checks: F,
    ) -> Result<(), SessionError>
    where
        F: FnOnce() -> Result<(), SessionError>,
    {
        if let Some(block) = block_file {
            if block.exists() {
                let text = fs::read_to_string(block).map_err(|e| SessionError::io(block, e))?;
                return Err(SessionError::SysadminBlocked { text });
            }
        }

        if let Err(err) = fs::create_dir(&self.deploy_dir) {
            let log = self.log_text();
            if !log.is_empty() {
                return Err(SessionError::SessionExists { log });
            }
            if !self.deploy_dir.is_dir() {
                return Err(SessionError::io(&self.deploy_dir, err));
            }
            // Leftover empty directory from an interrupted cleanup.
        }

        let lock_path = self.lock_file();
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(SessionError::SessionExists {
                    log: self.log_text(),
                });
            }
            Err(err) => return Err(SessionError::io(&lock_path, err)),
        };

        let result = (|| {
            Self::flock(&file)?;
            other_checks()?;
            writeln!(file, "{}", line.render()).map_err(|e| SessionError::io(&lock_path, e))?;
            file.flush().map_err(|e| SessionError::io(&lock_path, e))
        })();

        if result.is_err() {
            // Do not leave an empty log behind; the next start would
            // misread it as an existing session.
            drop(file);
            let _ = fs::remove_file(&lock_path);
            let _ = fs::remove_dir(&self.deploy_dir);
        }
        result
    }

    /// Append a subsequent step: `sync`, `release`, `manual-sync`,
    /// `finish`, or `rollback`.
    ///
    /// The step log is opened read-write, the advisory lock taken, the
    /// log validated against the requested transition, and the new line
    /// appended. `force` skips the ownership and state validation but
    /// not the existence check or the lock.
    pub fn advance(
        &self,
        action: &str,
        line: &StatusLine,
        current_user: &str,
        force: bool,
    ) -> Result<(), SessionError> {
        let lock_path = self.lock_file();
        let mut file = match OpenOptions::new().read(true).write(true).open(&lock_path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotStarted {
                    action: action.to_string(),
                });
            }
            Err(err) => return Err(SessionError::io(&lock_path, err)),
        };

        Self::flock(&file)?;

        let mut log = String::new();
        file.read_to_string(&mut log)
            .map_err(|e| SessionError::io(&lock_path, e))?;
        let lines: Vec<StatusLine> = log
            .lines()
            .filter(|l| !l.is_empty())
            .map(StatusLine::parse)
            .collect::<Result<_, _>>()?;

        if !force {
            self.validate(action, &lines, current_user, &log)?;
        } else if lines.is_empty() {
            return Err(SessionError::NotStarted {
                action: action.to_string(),
            });
        }

        file.seek(SeekFrom::End(0))
            .map_err(|e| SessionError::io(&lock_path, e))?;
        writeln!(file, "{}", line.render()).map_err(|e| SessionError::io(&lock_path, e))?;
        file.flush().map_err(|e| SessionError::io(&lock_path, e))
    }

    /// The "somethings wrong" validator for non-start transitions.
    fn validate(
        &self,
        action: &str,
        lines: &[StatusLine],
        current_user: &str,
        log: &str,
    ) -> Result<(), SessionError> {
        let first = lines.first().ok_or_else(|| SessionError::NotStarted {
            action: action.to_string(),
        })?;
        if first.action != "start" {
            return Err(SessionError::BadState {
                log: log.to_string(),
            });
        }
        if first.username != current_user {
            return Err(SessionError::NotOwner {
                owner: first.username.clone(),
            });
        }

        match action {
            "sync" | "release" | "manual-sync" => {
                if lines.len() != 1 {
                    return Err(SessionError::AlreadySynced {
                        log: log.to_string(),
                    });
                }
            }
            "finish" | "rollback" => match lines.len() {
                1 => {
                    return Err(SessionError::NotSyncedYet {
                        action: action.to_string(),
                    });
                }
                2 => {
                    if !SYNC_ACTIONS.contains(&lines[1].action.as_str()) {
                        return Err(SessionError::BadState {
                            log: log.to_string(),
                        });
                    }
                }
                _ => {
                    return Err(SessionError::FinishInProgress {
                        log: log.to_string(),
                    });
                }
            },
            _ => {
                return Err(SessionError::BadState {
                    log: log.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Owner of the session, from the `start:` line.
    pub fn owner(&self) -> Result<Option<String>, SessionError> {
        Ok(self.read_log()?.first().map(|l| l.username.clone()))
    }

    /// Remove every session artifact.
    ///
    /// Deletes the sidecars, the step log, a stale editor backup of the
    /// step log if one exists, and finally the directory itself.
    pub fn cleanup(&self) -> Result<(), SessionError> {
        for name in ["rollout", "rollback", "lock", "lock~"] {
            let path = self.deploy_dir.join(name);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(SessionError::io(&path, err)),
            }
        }
        match fs::remove_dir(&self.deploy_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::io(&self.deploy_dir, err)),
        }
    }

    fn flock(file: &File) -> Result<(), SessionError> {
        // Fully-qualified call: std::fs::File has grown an inherent method
        // of the same name whose error type differs.
        match fs2::FileExt::try_lock_exclusive(file) {
            Ok(()) => Ok(()),
            Err(_) => Err(SessionError::LockContended),
        }
    }
}
