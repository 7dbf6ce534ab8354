//! Async adapter over the `git` binary.
//!
//! Every operation is a function of `(working_dir, args)` returning
//! stdout. Git is treated as an opaque subprocess; this module owns the
//! exact arguments and the parsing of its textual output, so the rest
//! of the crate never sees raw git plumbing.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{GitalongError, Result};

mod parse;

pub use parse::expand_rename_path;

/// Handle for running git commands inside one working directory.
///
/// Cloning is cheap; the handle carries no state beyond the directory.
#[derive(Debug, Clone)]
pub struct Git {
    working_dir: PathBuf,
}

impl Git {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: path.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    async fn output(&self, args: &[&str]) -> Result<std::process::Output> {
        log::debug!("$ git {} [{}]", args.join(" "), self.working_dir.display());
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| GitalongError::Git {
                command: format!("git {}", args.join(" ")),
                exit_code: None,
                stderr: err.to_string(),
            })
    }

    /// Run a git command and return its stdout.
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(GitalongError::from_git_output(
                format!("git {}", args.join(" ")),
                &output,
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a git command and return whether it exited with code 0.
    ///
    /// Useful for commands whose exit code is the answer, like
    /// `check-ignore` or `rev-parse --verify`.
    pub async fn run_command_check(&self, args: &[&str]) -> Result<bool> {
        Ok(self.output(args).await?.status.success())
    }

    /// Run a git command, returning empty output on any failure.
    async fn run_command_safe(&self, args: &[&str]) -> String {
        match self.output(args).await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(_) => String::new(),
            Err(err) => {
                log::debug!("git {} failed: {err}", args.join(" "));
                String::new()
            }
        }
    }

    /// The top of the working tree containing this directory, or `None`
    /// when the directory is not inside one.
    pub async fn work_tree_root(&self) -> Result<Option<PathBuf>> {
        let output = self.output(&["rev-parse", "--show-toplevel"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Some(PathBuf::from(stdout.trim())))
    }

    /// The repository's git directory, as an absolute path.
    pub async fn git_dir(&self) -> Result<PathBuf> {
        let stdout = self.run_command(&["rev-parse", "--git-dir"]).await?;
        let path = PathBuf::from(stdout.trim());
        if path.is_absolute() {
            Ok(path)
        } else {
            Ok(self.working_dir.join(path))
        }
    }

    /// The checked-out branch name; empty in detached HEAD state.
    pub async fn active_branch(&self) -> Result<String> {
        let stdout = self.run_command(&["branch", "--show-current"]).await?;
        Ok(stdout.trim().to_string())
    }

    /// The tracked remote as `(name, url)`, or `None` when the
    /// repository has no remote configured.
    pub async fn primary_remote(&self) -> Result<Option<(String, String)>> {
        let remotes = self.run_command(&["remote"]).await?;
        let Some(name) = remotes.lines().next().map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(None);
        };
        let url = self.run_command(&["remote", "get-url", name]).await?;
        Ok(Some((name.to_string(), url.trim().to_string())))
    }

    /// SHAs of every commit touching `path` on any local or remote
    /// branch, newest first in date order.
    pub async fn file_log_shas(&self, path: &str) -> Result<Vec<String>> {
        let stdout = self
            .run_command(&[
                "log",
                "--all",
                "--remotes",
                "--date-order",
                "--pretty=format:%H",
                "--",
                path,
            ])
            .await?;
        Ok(parse::parse_log_shas(&stdout))
    }

    /// Paths changed by `sha`, rename notation expanded.
    pub async fn commit_changes(&self, sha: &str) -> Result<Vec<String>> {
        let parent = format!("{sha}^");
        let has_parent = self
            .run_command_check(&["rev-parse", "--verify", "--quiet", &parent])
            .await?;
        let stdout = if has_parent {
            self.run_command(&["diff-tree", "--no-commit-id", "--name-only", "-r", sha])
                .await?
        } else {
            // The first commit has no parent to diff against.
            self.run_command(&["show", "--pretty=format:", "--name-only", sha])
                .await?
        };
        Ok(parse::parse_name_only_changes(&stdout))
    }

    /// Committer epoch and author name of `sha`.
    pub async fn commit_meta(&self, sha: &str) -> Result<(i64, String)> {
        let stdout = self
            .run_command(&["show", "-s", "--format=%ct%x09%an", sha])
            .await?;
        let line = stdout.trim();
        let (epoch, author) = line.split_once('\t').unwrap_or((line, ""));
        let epoch = epoch.trim().parse::<i64>().map_err(|err| GitalongError::Git {
            command: format!("git show -s --format=%ct%x09%an {sha}"),
            exit_code: None,
            stderr: format!("unparseable committer date {epoch:?}: {err}"),
        })?;
        Ok((epoch, author.trim().to_string()))
    }

    /// Parent SHAs of `sha`.
    pub async fn parents(&self, sha: &str) -> Result<Vec<String>> {
        let stdout = self
            .run_command(&["rev-list", "--parents", "-n", "1", sha])
            .await?;
        Ok(parse::parse_parents(&stdout))
    }

    /// Branches containing `sha`, sanitized and sorted. Failures count
    /// as "contained nowhere" rather than erroring; the callers use
    /// this for advisory placement checks only.
    pub async fn branches_containing(&self, sha: &str, remote: bool) -> Vec<String> {
        let output = if remote {
            self.run_command_safe(&["branch", "--remote", "--contains", sha])
                .await
        } else {
            self.run_command_safe(&["branch", "--contains", sha]).await
        };
        parse::parse_contains_branches(&output, remote)
    }

    /// Heads of all local branches as `(branch, sha)`.
    pub async fn local_branch_heads(&self) -> Result<Vec<(String, String)>> {
        let stdout = self
            .run_command(&[
                "for-each-ref",
                "--format=%(refname:short) %(objectname)",
                "refs/heads",
            ])
            .await?;
        Ok(parse::parse_branch_heads(&stdout))
    }

    /// Relative paths with uncommitted modifications: untracked files
    /// plus unstaged and staged changes, de-duplicated and sorted.
    pub async fn uncommitted_paths(&self) -> Result<Vec<String>> {
        let mut paths = BTreeSet::new();
        let untracked = self
            .run_command(&["ls-files", "--exclude-standard", "--others"])
            .await?;
        let unstaged = self.run_command(&["diff", "--name-only"]).await?;
        let staged = self.run_command(&["diff", "--staged", "--name-only"]).await?;
        for output in [untracked, unstaged, staged] {
            paths.extend(
                output
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(paths.into_iter().collect())
    }

    /// Relative paths tracked at HEAD; empty when HEAD is unborn.
    pub async fn head_files(&self) -> Vec<String> {
        let stdout = self
            .run_command_safe(&["ls-tree", "-r", "--name-only", "--full-tree", "HEAD"])
            .await;
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether `path` is excluded by the repository's ignore rules.
    pub async fn is_ignored(&self, path: &str) -> bool {
        self.run_command_check(&["check-ignore", "--quiet", path])
            .await
            .unwrap_or(false)
    }

    /// Fetch the tracked remote, optionally pruning deleted branches.
    pub async fn fetch(&self, remote: &str, prune: bool) -> Result<()> {
        if prune {
            self.run_command(&["fetch", "--prune", remote]).await?;
        } else {
            self.run_command(&["fetch", remote]).await?;
        }
        Ok(())
    }

    /// Fast-forward/rebase pull with autostash, used by the store clone.
    pub async fn pull_autostash(&self) -> Result<()> {
        self.run_command(&["pull", "--ff", "--rebase", "--autostash", "--quiet"])
            .await?;
        Ok(())
    }

    /// Read a config value; `None` when the key is not set.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let output = self.output(&["config", "--get", key]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(Some(
            String::from_utf8_lossy(&output.stdout).trim().to_string(),
        ))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.run_command(&["config", key, value]).await?;
        Ok(())
    }

    /// Clone `url` into `destination`.
    pub async fn clone_repository(url: &str, destination: &Path) -> Result<()> {
        let parent = destination.parent().unwrap_or(Path::new("."));
        let destination_str = destination.to_string_lossy();
        Git::at(parent)
            .run_command(&["clone", url, destination_str.as_ref()])
            .await?;
        Ok(())
    }

    /// Stage `path`, commit with `message` and push. Committing is
    /// skipped when staging produced no diff, so republishing identical
    /// content is a no-op.
    pub async fn commit_file_and_push(&self, path: &str, message: &str) -> Result<bool> {
        self.run_command(&["add", path]).await?;
        let staged = !self
            .run_command_check(&["diff", "--staged", "--quiet", "--exit-code"])
            .await?;
        if !staged {
            return Ok(false);
        }
        self.run_command(&["commit", "-m", message]).await?;
        self.run_command(&["push", "origin", "HEAD"]).await?;
        Ok(true)
    }
}
