//! session::sidecar
//!
//! Tag sidecars: `rollout` and `rollback` under `<gitdir>/deploy/`.
//!
//! Each holds a single line `<sha1> <tagname>` recording the tag created
//! for that step. Reads re-validate the recorded sha1 against the tag's
//! current commit; a mismatch (the tag moved, or HEAD-relative state
//! changed underneath us) reads as absent rather than as stale truth.

use std::fs;
use std::path::PathBuf;

use crate::refs::{RefDb, RefError};
use crate::session::{Session, SessionError};

/// Which sidecar a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    /// The tag created at `sync` time, marking what went out.
    Rollout,
    /// The tag created at `start` time, marking the pre-rollout tree.
    Rollback,
}

impl SidecarKind {
    fn file_name(&self) -> &'static str {
        match self {
            SidecarKind::Rollout => "rollout",
            SidecarKind::Rollback => "rollback",
        }
    }
}

/// Reader/writer for the tag sidecars of one session.
#[derive(Debug)]
pub struct TagSidecar<'a> {
    session: &'a Session,
}

impl<'a> TagSidecar<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    fn path(&self, kind: SidecarKind) -> PathBuf {
        self.session.deploy_dir().join(kind.file_name())
    }

    /// Record `<sha1> <tag>` for the given step.
    ///
    /// Creates the session directory if the tag is written before the
    /// step log exists (the start tag is made before the status line).
    pub fn store(&self, kind: SidecarKind, sha1: &str, tag: &str) -> Result<(), SessionError> {
        let dir = self.session.deploy_dir();
        if !dir.is_dir() {
            fs::create_dir_all(dir).map_err(|e| SessionError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        let path = self.path(kind);
        fs::write(&path, format!("{} {}\n", sha1, tag)).map_err(|e| SessionError::Io {
            path,
            source: e,
        })
    }

    /// Fetch `(sha1, tag)` for the given step.
    ///
    /// Returns `None` when the sidecar is missing, malformed, or when the
    /// recorded sha1 no longer equals the tag's resolved commit.
    pub fn fetch(
        &self,
        kind: SidecarKind,
        refs: &RefDb,
    ) -> Result<Option<(String, String)>, RefError> {
        let raw = match fs::read_to_string(self.path(kind)) {
            Ok(raw) => raw,
            Err(_) => return Ok(None),
        };
        let mut fields = raw.split_whitespace();
        let (Some(sha1), Some(tag)) = (fields.next(), fields.next()) else {
            return Ok(None);
        };
        match refs.name_to_commit(tag)? {
            Some(commit) if commit == sha1 => Ok(Some((sha1.to_string(), tag.to_string()))),
            _ => Ok(None),
        }
    }
}
