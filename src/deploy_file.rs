//! deploy_file
//!
//! The human-readable artifact that identifies the deployed commit on the
//! target.
//!
//! # Format
//!
//! ```text
//! commit: <40-hex>
//! tag: <tagname>
//! deploy-date: <YYYY-MM-DD HH:MM:SS local>
//! deployed-from: <hostname>
//! deployed-by: <user>
//! <blank line>
//! <message lines>
//! <trailing blank line>
//! ```
//!
//! The `commit` key is bit-exact 40-hex; its presence and match against
//! the current HEAD is how consumers authenticate the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use chrono::Local;
use regex::Regex;
use thiserror::Error;

use crate::config::{keys, ConfigError, ConfigStore};
use crate::refs::RefDb;

/// Errors from deploy file writes. Reads never error; a file that cannot
/// be read or does not authenticate reads as empty.
#[derive(Debug, Error)]
pub enum DeployFileError {
    /// The file could not be written.
    #[error("failed to write deploy file {path}: {source}")]
    WriteFailed {
        /// The target path
        path: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The configured path could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn commit_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\Acommit: ([0-9a-f]{40})").expect("commit pattern"))
}

/// Resolve the deploy file path: `deploy.deploy-file`, else `.deploy` in
/// the repository root.
pub fn deploy_file_path(
    config: &ConfigStore,
    worktree: &Path,
) -> Result<PathBuf, DeployFileError> {
    Ok(config
        .get_path(keys::DEPLOY_FILE)?
        .unwrap_or_else(|| worktree.join(".deploy")))
}

/// This machine's name, for the `deployed-from` line.
fn local_hostname() -> String {
    Command::new("hostname")
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|name| !name.is_empty())
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string())
}

/// Write the deploy file for a rollout.
///
/// `%TAG` in the message lines is replaced with the tag name.
pub fn write_deploy_file(
    path: &Path,
    commit: &str,
    tag: &str,
    message_lines: &[String],
) -> Result<(), DeployFileError> {
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    let mut text = String::new();
    text.push_str(&format!("commit: {}\n", commit));
    text.push_str(&format!("tag: {}\n", tag));
    text.push_str(&format!(
        "deploy-date: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    text.push_str(&format!("deployed-from: {}\n", local_hostname()));
    text.push_str(&format!("deployed-by: {}\n", user));
    text.push('\n');
    for line in message_lines {
        text.push_str(&line.replace("%TAG", tag));
        text.push('\n');
    }
    text.push('\n');

    fs::write(path, text).map_err(|source| DeployFileError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the deploy file, authenticating it against HEAD.
///
/// Returns the file contents only if the leading `commit:` line matches
/// the current HEAD commit; `skip_check` suppresses the match test. Any
/// I/O error reads as an empty string.
pub fn read_deploy_file(path: &Path, refs: &RefDb, skip_check: bool) -> String {
    let Ok(contents) = fs::read_to_string(path) else {
        return String::new();
    };
    if skip_check {
        return contents;
    }
    let Some(caps) = commit_pattern().captures(&contents) else {
        return String::new();
    };
    match refs.name_to_commit("HEAD") {
        Ok(Some(head)) if head == caps[1] => contents,
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn written_file_has_expected_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".deploy");
        let commit = "d".repeat(40);
        write_deploy_file(
            &path,
            &commit,
            "sheep-20240131-1200",
            &["hello %TAG".to_string(), "second line".to_string()],
        )
        .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), format!("commit: {}", commit));
        assert_eq!(lines.next().unwrap(), "tag: sheep-20240131-1200");
        assert!(lines.next().unwrap().starts_with("deploy-date: "));
        assert!(lines.next().unwrap().starts_with("deployed-from: "));
        assert!(lines.next().unwrap().starts_with("deployed-by: "));
        assert_eq!(lines.next().unwrap(), "");
        assert_eq!(lines.next().unwrap(), "hello sheep-20240131-1200");
        assert_eq!(lines.next().unwrap(), "second line");
        assert!(text.ends_with("\n\n"));
    }

    #[test]
    fn commit_pattern_is_anchored_to_file_start() {
        assert!(commit_pattern()
            .captures(&format!("commit: {}\ntag: x\n", "a".repeat(40)))
            .is_some());
        assert!(commit_pattern()
            .captures(&format!("\ncommit: {}\n", "a".repeat(40)))
            .is_none());
        assert!(commit_pattern().captures("commit: tooshort\n").is_none());
    }

    #[test]
    fn missing_file_reads_empty_with_skip_check() {
        let dir = TempDir::new().unwrap();
        // skip_check never touches git, so a throwaway RefDb is fine here.
        let refs = RefDb::new(crate::git::GitRunner::new(crate::ui::Verbosity::Quiet));
        let text = read_deploy_file(&dir.path().join("missing"), &refs, true);
        assert_eq!(text, "");
    }
}
