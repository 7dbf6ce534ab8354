//! The managed repository: a working tree, its tracked remote, and its
//! store handle.
//!
//! A [`Repository`] owns the configuration, knows which files gitalong
//! tracks, builds the synthetic uncommitted-changes record, walks
//! local-only history and republishes the clone's records to the store.
//! Instances are cached per working-tree root in an explicit
//! [`Registry`] passed to the batch operations, so resolving many paths
//! from the same clone constructs the store handle once.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use path_slash::PathExt as _;

use crate::commit::{Branches, Commit, ContextIdentity};
use crate::config::Config;
use crate::error::{GitalongError, Result};
use crate::git::Git;
use crate::store::{Store, open_store};
use crate::utils::{format_epoch_iso8601, is_binary_file, modified_within, now_iso8601};

pub struct Repository {
    root: PathBuf,
    config: Config,
    git: Git,
    store: Box<dyn Store>,
    remote_name: String,
    remote_url: String,
    fetch_head: PathBuf,
    identity: ContextIdentity,
}

impl Repository {
    /// Resolve `path` to its managed repository.
    ///
    /// Ascends to the enclosing working tree; `None` when there is no
    /// working tree or the repository is not set up.
    pub async fn find(path: &Path) -> Result<Option<Repository>> {
        let Some(dir) = discovery_dir(path) else {
            return Ok(None);
        };
        let Some(root) = Git::at(&dir).work_tree_root().await? else {
            return Ok(None);
        };
        let root = dunce::canonicalize(&root).unwrap_or(root);
        let Some(config) = Config::load(&root)? else {
            return Ok(None);
        };
        Ok(Some(Self::open(root, config).await?))
    }

    /// Write the configuration at the working-tree root containing
    /// `path` and return a configured instance. Idempotent.
    pub async fn setup(config: Config, path: &Path) -> Result<Repository> {
        let dir = discovery_dir(path).ok_or_else(|| GitalongError::RepositoryNotFound {
            path: path.to_path_buf(),
        })?;
        let root = Git::at(&dir)
            .work_tree_root()
            .await?
            .ok_or_else(|| GitalongError::RepositoryNotFound {
                path: path.to_path_buf(),
            })?;
        let root = dunce::canonicalize(&root).unwrap_or(root);
        config.write(&root)?;
        Self::open(root, config).await
    }

    async fn open(root: PathBuf, config: Config) -> Result<Repository> {
        let git = Git::at(&root);
        let (remote_name, remote_url) =
            git.primary_remote()
                .await?
                .ok_or_else(|| GitalongError::InvalidConfig {
                    path: Config::path_for(&root),
                    reason: "repository has no remote".to_string(),
                })?;
        let fetch_head = git.git_dir().await?.join("FETCH_HEAD");
        let store = open_store(&root, &config).await?;

        // Permission flips must not show up as content changes.
        if config.modify_permissions {
            let file_mode = git.config_get("core.fileMode").await?;
            if file_mode.as_deref() != Some("false") {
                git.config_set("core.fileMode", "false").await?;
            }
        }

        let identity = ContextIdentity::current(&root);
        Ok(Repository {
            root,
            config,
            git,
            store,
            remote_name,
            remote_url,
            fetch_head,
            identity,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn identity(&self) -> &ContextIdentity {
        &self.identity
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub async fn active_branch(&self) -> Result<String> {
        self.git.active_branch().await
    }

    /// Whether the managed clone fetched within the last `seconds`.
    pub fn pulled_within(&self, seconds: f64) -> bool {
        modified_within(&self.fetch_head, seconds)
    }

    /// `path` relative to the working-tree root.
    ///
    /// A relative input is assumed to already be root-relative; an
    /// absolute input outside the tree comes back unchanged.
    pub fn relative_path(&self, path: &Path) -> PathBuf {
        if !path.is_absolute() {
            return path.to_path_buf();
        }
        if let Ok(relative) = path.strip_prefix(&self.root) {
            return relative.to_path_buf();
        }
        if let Ok(canonical) = dunce::canonicalize(path)
            && let Ok(relative) = canonical.strip_prefix(&self.root)
        {
            return relative.to_path_buf();
        }
        path.to_path_buf()
    }

    /// `path` relative to the root, as a forward-slash string.
    pub fn relative_path_str(&self, path: &Path) -> String {
        self.relative_path(path).to_slash_lossy().into_owned()
    }

    /// `path` as an absolute path under the working tree.
    pub fn absolute_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Whether gitalong watches this file: not ignored, and either its
    /// extension is configured or binary auto-detection matches.
    pub async fn is_tracked(&self, path: &Path) -> Result<bool> {
        let relative = self.relative_path_str(path);
        if self.git.is_ignored(&relative).await {
            return Ok(false);
        }
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            let dotted = format!(".{extension}");
            if self.config.tracked_extensions.iter().any(|e| *e == dotted) {
                return Ok(true);
            }
        }
        // The content probe is the expensive check, so it runs last.
        if self.config.track_binaries {
            let absolute = self.absolute_path(path);
            if absolute.is_file() {
                return Ok(is_binary_file(&absolute).unwrap_or(false));
            }
        }
        Ok(false)
    }

    /// Relative paths with uncommitted modifications (untracked,
    /// unstaged and staged), unique and sorted.
    pub async fn uncommitted_changes(&self) -> Result<Vec<String>> {
        self.git.uncommitted_paths().await
    }

    /// Relative paths tracked by git at HEAD.
    pub async fn head_files(&self) -> Vec<String> {
        self.git.head_files().await
    }

    /// The synthetic record standing for this clone's working-tree
    /// changes plus the given claimed paths. Empty when there is
    /// nothing to report.
    pub async fn uncommitted_changes_commit(&self, claims: &[String]) -> Result<Commit> {
        let mut changes: BTreeSet<String> = self.uncommitted_changes().await?.into_iter().collect();
        for claim in claims {
            if self.absolute_path(Path::new(claim)).is_file() {
                changes.insert(self.relative_path_str(Path::new(claim)));
            }
        }
        if changes.is_empty() {
            return Ok(Commit::empty());
        }
        let mut commit = Commit {
            changes: Some(changes.into_iter().collect()),
            date: Some(now_iso8601()),
            remote: Some(self.remote_url.clone()),
            ..Commit::default()
        };
        self.identity.apply(&mut commit);
        Ok(commit)
    }

    /// Commits reachable from local branch heads that no remote branch
    /// contains, newest first, annotated with changes, local branch
    /// membership and this clone's identity. With `track_uncommitted`
    /// the synthetic record leads the list.
    pub async fn local_only_commits(&self, claims: &[String]) -> Result<Vec<Commit>> {
        let mut commits: Vec<Commit> = Vec::new();
        let mut visited: BTreeSet<String> = BTreeSet::new();
        for (_branch, head) in self.git.local_branch_heads().await? {
            let mut stack = vec![head];
            while let Some(sha) = stack.pop() {
                if !visited.insert(sha.clone()) {
                    continue;
                }
                // Anything a remote branch contains is published; the
                // walk stops there, parents included.
                if !self.git.branches_containing(&sha, true).await.is_empty() {
                    continue;
                }
                commits.push(self.local_commit_record(&sha).await?);
                stack.extend(self.git.parents(&sha).await?);
            }
        }
        if self.config.track_uncommitted {
            let uncommitted = self.uncommitted_changes_commit(claims).await?;
            if !uncommitted.is_empty() {
                commits.insert(0, uncommitted);
            }
        }
        commits.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(commits)
    }

    async fn local_commit_record(&self, sha: &str) -> Result<Commit> {
        let (epoch, author) = self.git.commit_meta(sha).await?;
        let changes = self.git.commit_changes(sha).await?;
        let local_branches = self.git.branches_containing(sha, false).await;
        let mut commit = Commit {
            author: Some(author),
            changes: Some(changes),
            date: Some(format_epoch_iso8601(epoch)),
            remote: Some(self.remote_url.clone()),
            sha: Some(sha.to_string()),
            ..Commit::default()
        };
        if !local_branches.is_empty() {
            commit.branches = Some(Branches {
                local: local_branches,
                remote: Vec::new(),
            });
        }
        self.identity.apply(&mut commit);
        Ok(commit)
    }

    /// Read the store's record list, freshness-gated.
    pub async fn tracked_commits(&self) -> Result<Vec<Commit>> {
        self.store.read().await
    }

    /// Replace our records in the store with freshly computed ground
    /// truth: keep everybody else's records, drop ours, append our
    /// current local-only commits (and claims), publish.
    pub async fn recompute_tracked_commits(&self, claims: &[String]) -> Result<()> {
        let existing = self.store.read().await?;
        let mut kept: Vec<Commit> = existing
            .into_iter()
            .filter(|commit| keep_on_republish(commit, &self.remote_url, &self.identity))
            .collect();
        kept.extend(self.local_only_commits(claims).await?);
        self.store.write(&kept).await
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("root", &self.root)
            .field("remote_url", &self.remote_url)
            .finish_non_exhaustive()
    }
}

/// Whether a store record survives our republish: everything from other
/// remotes, everything we did not issue, and our own records that carry
/// no change list. Our regenerable records are dropped and rebuilt.
fn keep_on_republish(commit: &Commit, remote_url: &str, identity: &ContextIdentity) -> bool {
    let other_remote = commit.remote.as_deref() != Some(remote_url);
    other_remote || !identity.issued(commit) || commit.changes.is_none()
}

/// The instance cache for [`Repository`], keyed by working-tree root.
///
/// Deliberately an explicit value handed to the batch operations
/// instead of process-global state; one registry per logical operation.
#[derive(Default)]
pub struct Registry {
    cache: RefCell<HashMap<PathBuf, Rc<Repository>>>,
}

impl Registry {
    /// Resolve `path` to its managed repository, reusing a cached
    /// instance for the same working tree.
    pub async fn find(&self, path: &Path) -> Result<Option<Rc<Repository>>> {
        let Some(dir) = discovery_dir(path) else {
            return Ok(None);
        };
        let Some(root) = Git::at(&dir).work_tree_root().await? else {
            return Ok(None);
        };
        let root = dunce::canonicalize(&root).unwrap_or(root);
        if let Some(repository) = self.cache.borrow().get(&root).cloned() {
            return Ok(Some(repository));
        }
        let Some(config) = Config::load(&root)? else {
            return Ok(None);
        };
        let repository = Rc::new(Repository::open(root.clone(), config).await?);
        self.cache.borrow_mut().insert(root, repository.clone());
        Ok(Some(repository))
    }

    /// Like [`find`](Self::find), but reports why resolution failed.
    pub async fn require(&self, path: &Path) -> Result<Rc<Repository>> {
        if let Some(repository) = self.find(path).await? {
            return Ok(repository);
        }
        let not_found = GitalongError::RepositoryNotFound {
            path: path.to_path_buf(),
        };
        let Some(dir) = discovery_dir(path) else {
            return Err(not_found);
        };
        match Git::at(&dir).work_tree_root().await? {
            Some(root) => Err(GitalongError::RepositoryNotSetup { path: root }),
            None => Err(not_found),
        }
    }
}

/// The closest existing directory to start repository discovery from.
/// For a file that is the containing directory; for a path that does
/// not exist yet, the nearest existing ancestor.
fn discovery_dir(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    let mut current = absolute.as_path();
    loop {
        if current.is_dir() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}
