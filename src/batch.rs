//! Concurrent batch operations over many file paths.
//!
//! Every operation takes a slice of paths and returns a parallel,
//! positionally matching result list. The per-path resolution runs
//! sequentially (it may mutate the store during post-push cleanup);
//! the expensive git queries for change lists and branch membership
//! fan out as one cooperative task set joined back by slot, with
//! ready-made placeholders where a commit has no SHA.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use futures::future::join_all;

use crate::commit::{Branches, Commit, CommitSpread};
use crate::error::Result;
use crate::perms::{is_read_only, set_write_bit_checked, set_write_bit_safe};
use crate::repository::{Registry, Repository};
use crate::utils::{format_epoch_iso8601, normalize_path_str};

type Entry = (Option<Rc<Repository>>, Commit);

/// The outcome of one write-bit adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionUpdate {
    pub path: PathBuf,
    pub writable: bool,
    pub changed: bool,
}

/// For each path, the last relevant commit across the whole topology:
/// the store's records first (they describe in-flight changes, which
/// are by nature newer), falling back to git history across all local
/// and remote branches.
pub async fn last_commits(
    registry: &Registry,
    paths: &[PathBuf],
    prune: bool,
) -> Result<Vec<Commit>> {
    let entries = last_commits_with_repositories(registry, paths, prune).await?;
    Ok(entries.into_iter().map(|(_, commit)| commit).collect())
}

async fn last_commits_with_repositories(
    registry: &Registry,
    paths: &[PathBuf],
    prune: bool,
) -> Result<Vec<Entry>> {
    let mut fetched: BTreeSet<PathBuf> = BTreeSet::new();
    let mut entries: Vec<Entry> = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(repository) = registry.find(path).await? else {
            entries.push((None, Commit::empty()));
            continue;
        };
        if !repository.is_tracked(path).await? {
            entries.push((Some(repository), Commit::empty()));
            continue;
        }
        let commit = resolve_last_commit(&repository, path, prune, &mut fetched).await?;
        entries.push((Some(repository), commit));
    }
    annotate_changes(&mut entries).await?;
    annotate_branches(&mut entries, false).await;
    annotate_branches(&mut entries, true).await;
    Ok(entries)
}

async fn resolve_last_commit(
    repository: &Rc<Repository>,
    path: &Path,
    prune: bool,
    fetched: &mut BTreeSet<PathBuf>,
) -> Result<Commit> {
    let relative = repository.relative_path_str(path);
    let normalized = normalize_path_str(&relative);
    let track_uncommitted = repository.config().track_uncommitted;

    let store_commits = repository.store().read().await?;
    let candidate = store_commits
        .iter()
        .filter(|commit| {
            // Uncommitted records only count when the configuration
            // tracks them; records of other remotes never do.
            (track_uncommitted || commit.sha.is_some())
                && commit.remote.as_deref() == Some(repository.remote_url())
                && commit
                    .changes()
                    .iter()
                    .any(|change| normalize_path_str(change) == normalized)
        })
        .max_by(|a, b| a.date.cmp(&b.date))
        .cloned();

    if let Some(mut best) = candidate {
        if let Some(sha) = best.sha.clone() {
            let on_remote = !repository.git().branches_containing(&sha, true).await.is_empty();
            if on_remote {
                // There is no post-push hook, so a pushed commit can
                // linger in the store. Drop the stale record and expose
                // the commit as a plain remote one.
                let remaining: Vec<Commit> = store_commits
                    .into_iter()
                    .filter(|commit| *commit != best)
                    .collect();
                repository.store().write(&remaining).await?;
                best.strip_context();
            }
        }
        return Ok(best);
    }

    let threshold = repository.config().pull_threshold;
    if !repository.pulled_within(threshold) && !fetched.contains(repository.root()) {
        match repository.git().fetch(repository.remote_name(), prune).await {
            Ok(()) => {
                fetched.insert(repository.root().to_path_buf());
            }
            Err(err) => log::debug!("opportunistic fetch failed: {err}"),
        }
    }

    let shas = repository.git().file_log_shas(&relative).await?;
    let Some(sha) = shas.first() else {
        return Ok(Commit::empty());
    };
    let (epoch, author) = repository.git().commit_meta(sha).await?;
    Ok(Commit {
        author: Some(author),
        clone: Some(repository.identity().clone.clone()),
        date: Some(format_epoch_iso8601(epoch)),
        remote: Some(repository.remote_url().to_string()),
        sha: Some(sha.clone()),
        ..Commit::default()
    })
}

/// Fill in change lists for commits that do not carry one yet.
async fn annotate_changes(entries: &mut [Entry]) -> Result<()> {
    let results = join_all(entries.iter().map(|(repository, commit)| {
        let repository = repository.clone();
        let sha = commit.sha.clone();
        let needs_changes = commit.changes.is_none();
        async move {
            match (repository, sha) {
                (Some(repository), Some(sha)) if needs_changes => {
                    repository.git().commit_changes(&sha).await.map(Some)
                }
                _ => Ok(None),
            }
        }
    }))
    .await;
    for (entry, changes) in entries.iter_mut().zip(results) {
        if let Some(changes) = changes?
            && !changes.is_empty()
        {
            entry.1.changes = Some(changes);
        }
    }
    Ok(())
}

/// Fill in local or remote branch membership for commits with a SHA.
async fn annotate_branches(entries: &mut [Entry], remote: bool) {
    let results = join_all(entries.iter().map(|(repository, commit)| {
        let repository = repository.clone();
        let sha = commit.sha.clone();
        async move {
            match (repository, sha) {
                (Some(repository), Some(sha)) => {
                    repository.git().branches_containing(&sha, remote).await
                }
                _ => Vec::new(),
            }
        }
    }))
    .await;
    for (entry, branches) in entries.iter_mut().zip(results) {
        if branches.is_empty() {
            continue;
        }
        let slot = entry.1.branches.get_or_insert_with(Branches::default);
        if remote {
            slot.remote = branches;
        } else {
            slot.local = branches;
        }
    }
}

/// Whether the commit blocking a path still allows this clone to edit
/// it: nothing relevant anywhere, or the latest change is already ours.
async fn held_by_us(entry: &Entry) -> Result<bool> {
    let (repository, commit) = entry;
    let Some(repository) = repository else {
        return Ok(true);
    };
    let active_branch = repository.active_branch().await?;
    let spread = commit.spread(&active_branch, repository.identity());
    let ours = CommitSpread::MINE_UNCOMMITTED
        | CommitSpread::MINE_CLAIMED
        | CommitSpread::MINE_ACTIVE_BRANCH;
    Ok(spread.is_empty() || spread.intersects(ours))
}

/// Claim `paths`: publish them as part of our synthetic uncommitted
/// record so other clones see them as in flight. Returns the blocking
/// commit per path, or the empty record when the claim succeeded.
///
/// Only claimable paths are published; a repository whose whole group
/// is blocked is left untouched, store and permissions included.
pub async fn claim(registry: &Registry, paths: &[PathBuf], prune: bool) -> Result<Vec<Commit>> {
    let entries = last_commits_with_repositories(registry, paths, prune).await?;
    let mut blockers: Vec<Commit> = Vec::with_capacity(paths.len());
    let mut groups: HashMap<PathBuf, (Rc<Repository>, Vec<PathBuf>)> = HashMap::new();
    for (path, entry) in paths.iter().zip(&entries) {
        if held_by_us(entry).await? {
            blockers.push(Commit::empty());
            if let (Some(repository), _) = entry {
                groups
                    .entry(repository.root().to_path_buf())
                    .or_insert_with(|| (repository.clone(), Vec::new()))
                    .1
                    .push(path.clone());
            }
        } else {
            blockers.push(entry.1.clone());
        }
    }
    for (repository, group) in groups.into_values() {
        let claims: Vec<String> = group
            .iter()
            .map(|path| repository.relative_path_str(path))
            .collect();
        repository.recompute_tracked_commits(&claims).await?;
        if repository.config().modify_permissions {
            for path in &group {
                set_write_bit_checked(&repository.absolute_path(path), true)?;
            }
        }
    }
    Ok(blockers)
}

/// Release previously claimed `paths`: drop them from our synthetic
/// record and republish. Mirrors [`claim`]; returns any blocker per
/// path for symmetry.
pub async fn release(registry: &Registry, paths: &[PathBuf]) -> Result<Vec<Commit>> {
    let entries = last_commits_with_repositories(registry, paths, false).await?;
    let mut blockers: Vec<Commit> = Vec::with_capacity(paths.len());
    let mut groups: HashMap<PathBuf, (Rc<Repository>, Vec<PathBuf>)> = HashMap::new();
    for (path, entry) in paths.iter().zip(&entries) {
        if held_by_us(entry).await? {
            blockers.push(Commit::empty());
            if let (Some(repository), _) = entry {
                groups
                    .entry(repository.root().to_path_buf())
                    .or_insert_with(|| (repository.clone(), Vec::new()))
                    .1
                    .push(path.clone());
            }
        } else {
            blockers.push(entry.1.clone());
        }
    }
    for (repository, group) in groups.into_values() {
        let released: BTreeSet<String> = group
            .iter()
            .map(|path| normalize_path_str(&repository.relative_path_str(path)))
            .collect();
        // Claims that are neither released here nor backed by an
        // actual working-tree change are carried forward.
        let store_commits = repository.store().read().await?;
        let ours = store_commits
            .iter()
            .find(|commit| commit.is_synthetic_uncommitted() && repository.identity().issued(commit));
        let diff: BTreeSet<String> = repository
            .uncommitted_changes()
            .await?
            .iter()
            .map(|change| normalize_path_str(change))
            .collect();
        let carried: Vec<String> = ours
            .map(|commit| {
                commit
                    .changes()
                    .iter()
                    .filter(|change| {
                        let normalized = normalize_path_str(change);
                        !released.contains(&normalized) && !diff.contains(&normalized)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        repository.recompute_tracked_commits(&carried).await?;
        if repository.config().modify_permissions {
            for path in &group {
                set_write_bit_checked(&repository.absolute_path(path), false)?;
            }
        }
    }
    Ok(blockers)
}

/// Align the write bit of each path with its spread: writable only when
/// we own the latest change and nothing newer lives elsewhere. Paths
/// with no placement facts and missing files are left alone.
pub async fn update_permissions(
    registry: &Registry,
    paths: &[PathBuf],
) -> Result<Vec<PermissionUpdate>> {
    let entries = last_commits_with_repositories(registry, paths, true).await?;
    let mut decisions: Vec<(PathBuf, bool)> = Vec::new();
    for (path, (repository, commit)) in paths.iter().zip(&entries) {
        let Some(repository) = repository else {
            continue;
        };
        let active_branch = repository.active_branch().await?;
        let spread = commit.spread(&active_branch, repository.identity());
        if spread.is_empty() {
            continue;
        }
        let in_sync = CommitSpread::MINE_ACTIVE_BRANCH | CommitSpread::REMOTE_MATCHING_BRANCH;
        let writable = spread == CommitSpread::MINE_UNCOMMITTED
            || spread == CommitSpread::MINE_ACTIVE_BRANCH
            || spread.contains(in_sync);
        decisions.push((repository.absolute_path(path), writable));
    }
    let updates = join_all(decisions.into_iter().map(|(path, writable)| async move {
        let was_writable = !is_read_only(&path).ok()?;
        if !set_write_bit_safe(&path, writable) {
            return None;
        }
        Some(PermissionUpdate {
            path,
            writable,
            changed: was_writable != writable,
        })
    }))
    .await;
    Ok(updates.into_iter().flatten().collect())
}
