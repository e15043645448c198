//! Integration tests for the rollout session against real repositories.
//!
//! These tests use real git repositories created via tempfile to verify
//! the session state machine, the tag sidecars, and the deploy file
//! end to end.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use gitdeploy::deploy_file::{read_deploy_file, write_deploy_file};
use gitdeploy::git::GitRunner;
use gitdeploy::refs::{self, RefDb};
use gitdeploy::session::{Session, SessionError, SessionState, SidecarKind, StatusLine, TagSidecar};
use gitdeploy::ui::Verbosity;

/// Test fixture that creates a real git repository.
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a new test repository with an initial commit.
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");

        run_git(dir.path(), &["init", "-b", "master"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["config", "user.name", "Test User"]);

        fs::write(dir.path().join("README.md"), "# Test Repo\n").unwrap();
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "Initial commit"]);

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn git_dir(&self) -> PathBuf {
        self.path().join(".git")
    }

    fn runner(&self) -> GitRunner {
        GitRunner::with_cwd(Verbosity::Quiet, self.path().to_path_buf())
    }

    fn refs(&self) -> RefDb {
        RefDb::new(self.runner())
    }

    fn session(&self) -> Session {
        Session::new(&self.git_dir())
    }

    /// Create a file and commit it, returning the new HEAD commit.
    fn commit_file(&self, path: &str, content: &str, message: &str) -> String {
        fs::write(self.path().join(path), content).unwrap();
        run_git(self.path(), &["add", path]);
        run_git(self.path(), &["commit", "-m", message]);
        self.head()
    }

    fn head(&self) -> String {
        let output = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(self.path())
            .output()
            .expect("git rev-parse failed");
        String::from_utf8(output.stdout).unwrap().trim().to_string()
    }

    fn status_line(&self, action: &str, user: &str) -> StatusLine {
        StatusLine {
            action: action.to_string(),
            timestamp: "2024-01-31 12:00:00".to_string(),
            branch: "master".to_string(),
            head: self.head(),
            uid: 1000,
            username: user.to_string(),
        }
    }
}

/// Run a git command in the given directory.
fn run_git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git command failed");

    if !output.status.success() {
        panic!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
}

// =============================================================================
// Start artifacts
// =============================================================================

#[test]
fn start_leaves_expected_artifacts() {
    let repo = TestRepo::new();
    let refs_db = repo.refs();
    let session = repo.session();

    // The start tag is made and recorded before the status line, the way
    // the start action sequences it.
    let tag = refs::make_dated_tag(
        &repo.runner(),
        &refs_db,
        "sheep-start",
        "%Y%m%d-%H%M",
        &["rollout start of %TAG".to_string()],
    )
    .unwrap();
    let commit = refs_db.name_to_commit(&tag).unwrap().unwrap();
    TagSidecar::new(&session)
        .store(SidecarKind::Rollback, &commit, &tag)
        .unwrap();

    session
        .start(None, &repo.status_line("start", "alice"), || Ok(()))
        .unwrap();

    // Exactly one start line with the expected field shape.
    let log = session.log_text();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 1);
    let fields: Vec<&str> = lines[0].split('\t').collect();
    assert_eq!(fields.len(), 6);
    assert_eq!(fields[0], "start:");
    assert_eq!(fields[2], "master");
    assert_eq!(fields[3].len(), 40);
    assert!(fields[3].chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(fields[5], "alice");

    // The rollback sidecar holds `<sha1> <tag>` for a dated start tag.
    let sidecar = fs::read_to_string(session.deploy_dir().join("rollback")).unwrap();
    let (sha1, tagname) = sidecar.trim_end().split_once(' ').unwrap();
    assert_eq!(sha1, commit);
    assert!(tagname.starts_with("sheep-start-"));
    assert_eq!(session.state().unwrap(), SessionState::Started);
}

// =============================================================================
// Concurrency and ordering
// =============================================================================

#[test]
fn concurrent_start_loses_without_touching_the_log() {
    let repo = TestRepo::new();
    let session_a = repo.session();
    session_a
        .start(None, &repo.status_line("start", "alice"), || Ok(()))
        .unwrap();
    let log_before = session_a.log_text();

    // Process B: a second handle on the same repository.
    let session_b = repo.session();
    let err = session_b
        .start(None, &repo.status_line("start", "bob"), || Ok(()))
        .unwrap_err();
    assert!(err.to_string().contains("one is already in progress"));
    assert_eq!(session_a.log_text(), log_before);
}

#[test]
fn abort_cleanup_removes_the_session_directory() {
    let repo = TestRepo::new();
    let session = repo.session();
    session
        .start(None, &repo.status_line("start", "alice"), || Ok(()))
        .unwrap();
    fs::write(session.deploy_dir().join("rollback"), "x y\n").unwrap();

    session.cleanup().unwrap();
    assert!(!session.deploy_dir().exists());
}

#[test]
fn sync_without_start_names_the_problem() {
    let repo = TestRepo::new();
    let session = repo.session();
    let err = session
        .advance("sync", &repo.status_line("sync", "alice"), "alice", false)
        .unwrap_err();
    assert!(err.to_string().contains("havent started yet"));
}

#[test]
fn foreign_user_cannot_advance_without_force() {
    let repo = TestRepo::new();
    let session = repo.session();
    session
        .start(None, &repo.status_line("start", "alice"), || Ok(()))
        .unwrap();

    let err = session
        .advance("sync", &repo.status_line("sync", "bob"), "bob", false)
        .unwrap_err();
    assert!(matches!(err, SessionError::NotOwner { .. }));

    session
        .advance("sync", &repo.status_line("sync", "bob"), "bob", true)
        .unwrap();
    assert_eq!(session.state().unwrap(), SessionState::Synced);
}

// =============================================================================
// Tag sidecars
// =============================================================================

#[test]
fn sidecar_roundtrip_and_head_move_invalidation() {
    let repo = TestRepo::new();
    let refs_db = repo.refs();
    let session = repo.session();
    let sidecar = TagSidecar::new(&session);

    run_git(repo.path(), &["tag", "sheep-20240131-1200"]);
    refs_db.clear();
    let commit = repo.head();

    sidecar
        .store(SidecarKind::Rollout, &commit, "sheep-20240131-1200")
        .unwrap();
    let fetched = sidecar.fetch(SidecarKind::Rollout, &refs_db).unwrap();
    assert_eq!(fetched, Some((commit, "sheep-20240131-1200".to_string())));

    // Move the tag; the recorded sha1 no longer matches and the sidecar
    // reads as absent.
    repo.commit_file("next.txt", "x", "next");
    run_git(repo.path(), &["tag", "-f", "sheep-20240131-1200"]);
    refs_db.clear();
    assert_eq!(sidecar.fetch(SidecarKind::Rollout, &refs_db).unwrap(), None);
}

// =============================================================================
// Deploy file
// =============================================================================

#[test]
fn deploy_file_roundtrip_against_head() {
    let repo = TestRepo::new();
    let refs_db = repo.refs();
    let commit = repo.head();
    run_git(repo.path(), &["tag", "sheep-20240131-1200"]);
    refs_db.clear();

    let path = repo.path().join(".deploy");
    write_deploy_file(
        &path,
        &commit,
        "sheep-20240131-1200",
        &["hello %TAG".to_string()],
    )
    .unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with(&format!("commit: {}\n", commit)));
    assert!(text.contains("tag: sheep-20240131-1200\n"));
    assert!(text.contains("hello sheep-20240131-1200"));

    // HEAD unchanged: the reader authenticates and returns the same text.
    assert_eq!(read_deploy_file(&path, &refs_db, false), text);

    // HEAD moves: the file no longer authenticates.
    repo.commit_file("next.txt", "x", "next");
    refs_db.clear();
    assert_eq!(read_deploy_file(&path, &refs_db, false), "");
    // ... unless the check is skipped.
    assert_eq!(read_deploy_file(&path, &refs_db, true), text);
}
