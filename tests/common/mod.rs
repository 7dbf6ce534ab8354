// Helpers are shared across test binaries; each binary uses a subset.
#![allow(dead_code)]

//! Test harness for gitalong's end-to-end scenarios.
//!
//! Builds the three-repository topology the tool lives in: a bare
//! "remote" for the managed repository, a working clone of it, and a
//! bare store repository for the side channel. Everything sits inside
//! one temporary directory that disappears with the fixture.
//!
//! Git identity is configured locally in every clone (including the
//! store clone the library creates) so the tests do not depend on
//! global git configuration.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

use gitalong::commit::Commit;
use gitalong::config::Config;
use gitalong::repository::Repository;

pub struct GitalongFixture {
    pub temp: TempDir,
    pub remote_dir: PathBuf,
    pub store_dir: PathBuf,
    pub clone_dir: PathBuf,
}

impl GitalongFixture {
    /// A bare managed remote, a bare store and one working clone.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("temp dir");
        let remote_dir = temp.path().join("managed.git");
        let store_dir = temp.path().join("store.git");
        let clone_dir = temp.path().join("managed");

        // Pin the initial branch so clones agree on the branch name
        // regardless of the machine's init.defaultBranch.
        git_in(
            temp.path(),
            &["init", "--bare", "--initial-branch=master", "managed.git"],
        );
        git_in(
            temp.path(),
            &["init", "--bare", "--initial-branch=master", "store.git"],
        );
        git_in(
            temp.path(),
            &["clone", remote_dir.to_str().unwrap(), "managed"],
        );
        configure_identity(&clone_dir);
        // The clone of an empty remote starts on the machine's default
        // branch name; align it with the remote's pinned one.
        git_in(&clone_dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);

        seed_store(temp.path(), &store_dir);

        Self {
            temp,
            remote_dir,
            store_dir,
            clone_dir,
        }
    }

    /// Set up gitalong on the working clone and return the repository.
    pub async fn setup(&self, modify_permissions: bool) -> Repository {
        let repository = setup_in(&self.store_dir, &self.clone_dir, modify_permissions).await;
        // The store directory must not show up as an uncommitted change.
        std::fs::write(self.clone_dir.join(".gitignore"), ".gitalong/\n").expect("gitignore");
        repository
    }

    /// A second working clone of the same remote, set up and with its
    /// own identity, to play the part of another collaborator.
    pub async fn second_clone(&self, modify_permissions: bool) -> (PathBuf, Repository) {
        let clone_dir = self.temp.path().join("managed2");
        git_in(
            self.temp.path(),
            &["clone", self.remote_dir.to_str().unwrap(), "managed2"],
        );
        configure_identity(&clone_dir);
        let repository = setup_in(&self.store_dir, &clone_dir, modify_permissions).await;
        std::fs::write(clone_dir.join(".gitignore"), ".gitalong/\n").expect("gitignore");
        (clone_dir, repository)
    }

    /// Run git in the working clone, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        git_in(&self.clone_dir, args)
    }

    pub fn abs(&self, relative: &str) -> PathBuf {
        self.clone_dir.join(relative)
    }

    /// Write a small binary image (JPEG magic plus NUL padding).
    pub fn save_image(&self, relative: &str) {
        save_image(&self.abs(relative));
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-m", message]);
    }

    pub fn push(&self) {
        self.git(&["push", "origin", "HEAD"]);
    }

    pub fn head_sha(&self) -> String {
        self.git(&["rev-parse", "HEAD"]).trim().to_string()
    }

    /// The records currently sitting in this clone's store checkout.
    pub fn store_records(&self) -> Vec<Commit> {
        store_records_in(&self.clone_dir)
    }

    pub fn store_json(&self) -> String {
        std::fs::read_to_string(self.clone_dir.join(".gitalong").join("commits.json"))
            .unwrap_or_default()
    }
}

async fn setup_in(store_dir: &Path, clone_dir: &Path, modify_permissions: bool) -> Repository {
    let config = Config {
        modify_permissions,
        store_url: store_dir.to_str().unwrap().to_string(),
        track_binaries: true,
        track_uncommitted: true,
        tracked_extensions: vec![".jpg".to_string(), ".json".to_string()],
        ..Config::default()
    };
    let repository = Repository::setup(config, clone_dir)
        .await
        .expect("setup repository");
    configure_identity(&clone_dir.join(".gitalong"));
    repository
}

pub fn store_records_in(clone_dir: &Path) -> Vec<Commit> {
    let json_path = clone_dir.join(".gitalong").join("commits.json");
    match std::fs::read_to_string(json_path) {
        Ok(raw) => serde_json::from_str(&raw).expect("valid commits.json"),
        Err(_) => Vec::new(),
    }
}

pub fn save_image(path: &Path) {
    let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00];
    bytes.extend(std::iter::repeat_n(0u8, 64));
    bytes.extend([0xFF, 0xD9]);
    std::fs::write(path, bytes).expect("write image");
}

/// Give the bare store a `master` branch with an empty record list so
/// that every later clone checks out real content.
fn seed_store(temp: &Path, store_dir: &Path) {
    let seed_dir = temp.join("store-seed");
    git_in(temp, &["clone", store_dir.to_str().unwrap(), "store-seed"]);
    configure_identity(&seed_dir);
    git_in(&seed_dir, &["symbolic-ref", "HEAD", "refs/heads/master"]);
    std::fs::write(seed_dir.join("commits.json"), "[]\n").expect("seed commits.json");
    git_in(&seed_dir, &["add", "commits.json"]);
    git_in(&seed_dir, &["commit", "-m", "Initialize commits.json"]);
    git_in(&seed_dir, &["push", "origin", "HEAD:master"]);
}

pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        dir.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn configure_identity(repo_dir: &Path) {
    git_in(repo_dir, &["config", "user.name", "Test User"]);
    git_in(repo_dir, &["config", "user.email", "test@example.com"]);
    git_in(repo_dir, &["config", "commit.gpgsign", "false"]);
}
