//! Integration tests for the config store against real repositories.

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use gitdeploy::config::{Accessor, ConfigError, ConfigStore, ConfigTree};
use gitdeploy::git::GitRunner;
use gitdeploy::ui::Verbosity;

struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        run_git(dir.path(), &["init", "-b", "master"]);
        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn store(&self) -> ConfigStore {
        ConfigStore::new(GitRunner::with_cwd(
            Verbosity::Quiet,
            self.path().to_path_buf(),
        ))
    }

    fn set(&self, key: &str, value: &str) {
        run_git(self.path(), &["config", key, value]);
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

#[test]
fn bare_keys_resolve_under_the_deploy_prefix() {
    let repo = TestRepo::new();
    repo.set("deploy.tag-prefix", "sheep");

    let config = repo.store();
    assert_eq!(config.get("tag-prefix").unwrap(), "sheep");
    assert_eq!(config.get(".tag-prefix").unwrap(), "sheep");
    assert_eq!(config.get("deploy.tag-prefix").unwrap(), "sheep");
}

#[test]
fn missing_mandatory_key_names_the_key() {
    let repo = TestRepo::new();
    let config = repo.store();
    let err = config.get("hook-dir").unwrap_err();
    match err {
        ConfigError::Missing { key } => assert_eq!(key, "deploy.hook-dir"),
        other => panic!("expected Missing, got {other:?}"),
    }
    assert_eq!(config.get_or("hook-dir", "/srv/hooks").unwrap(), "/srv/hooks");
}

#[test]
fn typed_accessors_canonicalize() {
    let repo = TestRepo::new();
    repo.set("deploy.can-make-tags", "yes");
    repo.set("deploy.some-count", "2k");

    let config = repo.store();
    // git canonicalizes both the bool spelling and the 2k suffix.
    assert!(config.get_bool("can-make-tags", false).unwrap());
    assert_eq!(config.get_int("some-count").unwrap(), Some(2048));
    assert!(config.get_bool("no-such-flag", true).unwrap());
}

#[test]
fn multivalued_key_is_ambiguous() {
    let repo = TestRepo::new();
    repo.set("deploy.block-file", "/tmp/one");
    run_git(
        repo.path(),
        &["config", "--add", "deploy.block-file", "/tmp/two"],
    );

    let config = repo.store();
    assert!(matches!(
        config.get("block-file").unwrap_err(),
        ConfigError::Ambiguous { .. }
    ));
}

#[test]
fn override_file_wins_for_deploy_keys() {
    let repo = TestRepo::new();
    let override_path = repo.path().join("deploy.config");
    fs::write(&override_path, "[deploy]\n\ttag-prefix = goat\n").unwrap();
    repo.set("deploy.tag-prefix", "sheep");
    repo.set(
        "deploy.config-file",
        override_path.to_str().unwrap(),
    );

    let config = repo.store();
    assert_eq!(config.get("tag-prefix").unwrap(), "goat");
    // Keys absent from the override fall back to the standard chain.
    repo.set("deploy.remote-site", "none");
    assert_eq!(config.get("remote-site").unwrap(), "none");
}

#[test]
fn dump_fans_out_dotted_keys() {
    let repo = TestRepo::new();
    repo.set("deploy.tag-prefix", "sheep");
    repo.set("deploy.hook-dir", "/srv/hooks");

    let config = repo.store();
    let tree = config.dump().unwrap();
    assert_eq!(
        tree.get("deploy.tag-prefix"),
        Some(&ConfigTree::Leaf("sheep".to_string()))
    );
    assert!(matches!(tree.get("deploy"), Some(ConfigTree::Node(_))));
}

#[test]
fn resolutions_are_memoized_per_accessor() {
    let repo = TestRepo::new();
    repo.set("deploy.can-make-tags", "true");

    let config = repo.store();
    assert_eq!(
        config.get_opt("can-make-tags", Accessor::Raw).unwrap(),
        Some("true".to_string())
    );
    // A second read must not re-shell; deleting the key underneath the
    // cache proves the answer comes from memory.
    run_git(repo.path(), &["config", "--unset", "deploy.can-make-tags"]);
    assert_eq!(
        config.get_opt("can-make-tags", Accessor::Raw).unwrap(),
        Some("true".to_string())
    );
}
