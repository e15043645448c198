//! Integration tests for the ref inventory and tag service against real
//! repositories.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use gitdeploy::git::GitRunner;
use gitdeploy::refs::{self, MatchMode, RefCategory, RefDb, RefKind};
use gitdeploy::ui::Verbosity;

struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
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

    fn runner(&self) -> GitRunner {
        GitRunner::with_cwd(Verbosity::Quiet, self.path().to_path_buf())
    }

    fn refs(&self) -> RefDb {
        RefDb::new(self.runner())
    }

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
}

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
// Name resolution
// =============================================================================

#[test]
fn name_to_commit_agrees_with_git_log() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["branch", "feature"]);
    run_git(repo.path(), &["tag", "light"]);

    let db = repo.refs();
    let head = repo.head();

    for name in ["HEAD", "master", "feature", "light"] {
        assert_eq!(
            db.name_to_commit(name).unwrap().as_deref(),
            Some(head.as_str()),
            "resolution mismatch for {name}"
        );
    }
    assert_eq!(db.name_to_commit("no-such-name").unwrap(), None);
}

#[test]
fn head_is_never_answered_from_stale_cache() {
    let repo = TestRepo::new();
    let db = repo.refs();
    let first = db.name_to_commit("HEAD").unwrap().unwrap();

    let second_commit = repo.commit_file("next.txt", "x", "next");
    // No clear(): HEAD must bypass the memoized inventory.
    assert_eq!(
        db.name_to_commit("HEAD").unwrap().unwrap(),
        second_commit
    );
    assert_ne!(first, second_commit);
}

// =============================================================================
// Annotated vs. lightweight tags
// =============================================================================

#[test]
fn annotated_and_lightweight_tags_are_distinguished() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["tag", "light"]);
    run_git(repo.path(), &["tag", "-a", "-m", "annotated tag", "annot"]);

    let db = repo.refs();
    let head = repo.head();

    assert_eq!(db.is_annotated_tag("light").unwrap(), None);

    let (commit, sha1) = db.is_annotated_tag("annot").unwrap().unwrap();
    assert_eq!(commit, head);
    assert_ne!(sha1, commit);

    // Entry invariants: sha1 == commit exactly for non-annotated refs.
    let light = db.entry("light").unwrap().unwrap();
    assert_eq!(light.kind, RefKind::Symbolic);
    assert_eq!(light.sha1, light.commit);

    let annot = db.entry("annot").unwrap().unwrap();
    assert_eq!(annot.category, RefCategory::Tag);
    assert_eq!(annot.kind, RefKind::Object);
    assert!(annot.message.is_some());
}

#[test]
fn commit_records_carry_ref_backlist() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["tag", "light"]);

    let db = repo.refs();
    let head = repo.head();
    let record = db.commit_record(&head).unwrap().unwrap();
    assert!(record
        .refs
        .iter()
        .any(|name| name == "refs/heads/master"));
    assert!(record.refs.iter().any(|name| name == "refs/tags/light"));
    assert_eq!(record.message.subject, "Initial commit");
    assert_eq!(record.author.email, "<test@example.com>");
}

// =============================================================================
// Tag sorting and HEAD matching
// =============================================================================

#[test]
fn sorted_tags_descend_by_date_with_undated_last() {
    let repo = TestRepo::new();
    for tag in [
        "sheep-20240101-1200",
        "sheep-20240301-0900",
        "sheep-20231225-1800",
        "zebra",
        "alpha",
    ] {
        run_git(repo.path(), &["tag", tag]);
    }

    let db = repo.refs();
    assert_eq!(
        db.sorted_tags().unwrap(),
        vec![
            "sheep-20240301-0900",
            "sheep-20240101-1200",
            "sheep-20231225-1800",
            "alpha",
            "zebra",
        ]
    );
}

#[test]
fn sorted_tags_keep_name_order_for_equal_date_keys() {
    let repo = TestRepo::new();
    for tag in ["goat-20240101", "ant-20240101", "moth-20240101"] {
        run_git(repo.path(), &["tag", tag]);
    }

    let db = repo.refs();
    assert_eq!(
        db.sorted_tags().unwrap(),
        vec!["ant-20240101", "goat-20240101", "moth-20240101"]
    );
}

#[test]
fn names_matching_head_first_and_all() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["tag", "sheep-20240101-1200"]);
    repo.commit_file("next.txt", "x", "next");
    run_git(repo.path(), &["tag", "sheep-20240201-1200"]);
    run_git(repo.path(), &["tag", "sheep-20240201-1300"]);

    let db = repo.refs();
    let names = db.sorted_tags().unwrap();

    let all = db.names_matching_head(MatchMode::All, &names).unwrap();
    assert_eq!(all, vec!["sheep-20240201-1300", "sheep-20240201-1200"]);

    let first = db.names_matching_head(MatchMode::First, &names).unwrap();
    assert_eq!(first, vec!["sheep-20240201-1300"]);

    let none = db
        .names_matching_head(MatchMode::First, &[])
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn branches_reaching_head_prioritizes_trunk_names() {
    let repo = TestRepo::new();
    run_git(repo.path(), &["branch", "aardvark"]);
    run_git(repo.path(), &["branch", "trunk"]);

    let db = repo.refs();
    let branches = db.branches_reaching_head().unwrap();
    assert_eq!(branches[0], "trunk");
    assert!(branches.contains(&"master".to_string()));
    assert!(branches.contains(&"aardvark".to_string()));
    // Non-priority names stay alphabetical after the priority block.
    let aardvark = branches.iter().position(|b| b == "aardvark").unwrap();
    let master = branches.iter().position(|b| b == "master").unwrap();
    assert!(master < aardvark);
}

// =============================================================================
// Tag creation
// =============================================================================

#[test]
fn make_tag_lands_on_head_and_substitutes_name() {
    let repo = TestRepo::new();
    let db = repo.refs();
    let tag = refs::make_tag(
        &repo.runner(),
        &db,
        "sheep-20240131-1200",
        &["rollout of %TAG".to_string()],
    )
    .unwrap();
    assert_eq!(tag, "sheep-20240131-1200");

    // The inventory was invalidated and sees the new tag at HEAD.
    assert_eq!(
        db.name_to_commit(&tag).unwrap().unwrap(),
        db.name_to_commit("HEAD").unwrap().unwrap()
    );

    // Annotated, with the substituted message.
    let entry = db.entry(&tag).unwrap().unwrap();
    assert_eq!(entry.kind, RefKind::Object);
    assert_eq!(
        entry.message.as_ref().unwrap().subject,
        "rollout of sheep-20240131-1200"
    );
}

#[test]
fn make_tag_probes_collision_suffixes() {
    let repo = TestRepo::new();
    let db = repo.refs();

    let first = refs::make_tag(&repo.runner(), &db, "sheep-20240131", &[]).unwrap();
    assert_eq!(first, "sheep-20240131");

    let second = refs::make_tag(&repo.runner(), &db, "sheep-20240131", &[]).unwrap();
    assert_eq!(second, "sheep-20240131_A");

    let third = refs::make_tag(&repo.runner(), &db, "sheep-20240131", &[]).unwrap();
    assert_eq!(third, "sheep-20240131_B");
}
