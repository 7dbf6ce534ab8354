//! Commit records and their placement across the distributed topology.
//!
//! A record describes either a real commit (it has a `sha`), the
//! synthetic pseudo-commit standing for one clone's uncommitted changes
//! and claims (it has context identity but no `sha`), or nothing at all
//! (the empty record, used when a path resolves to no managed
//! repository or no relevant commit). The store exchanges these records
//! between clones as loose JSON objects whose keys are all optional, so
//! the type keeps every field optional and derives the variant from key
//! presence.

use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Where a commit lives across branches and clones.
    ///
    /// Bits combine: a commit that is both on our active branch and on
    /// the matching remote branch carries both facts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommitSpread: u16 {
        /// Our local uncommitted changes.
        const MINE_UNCOMMITTED = 1 << 0;
        /// Our claimed files.
        const MINE_CLAIMED = 1 << 1;
        /// On our local active branch.
        const MINE_ACTIVE_BRANCH = 1 << 2;
        /// On one or more of our other local branches.
        const MINE_OTHER_BRANCH = 1 << 3;
        /// On the remote branch matching our active branch.
        const REMOTE_MATCHING_BRANCH = 1 << 4;
        /// On another remote branch.
        const REMOTE_OTHER_BRANCH = 1 << 5;
        /// On another clone, on a branch not named like our active one.
        const THEIR_OTHER_BRANCH = 1 << 6;
        /// On another clone, on a branch named like our active one.
        const THEIR_MATCHING_BRANCH = 1 << 7;
        /// Someone else's claimed files.
        const THEIR_CLAIMED = 1 << 8;
        /// Someone else's uncommitted changes.
        const THEIR_UNCOMMITTED = 1 << 9;
    }
}

impl CommitSpread {
    /// The ten-character `+`/`-` status glyph, one character per bit in
    /// wire order.
    pub fn glyph(&self) -> String {
        const ORDER: [CommitSpread; 10] = [
            CommitSpread::MINE_UNCOMMITTED,
            CommitSpread::MINE_CLAIMED,
            CommitSpread::MINE_ACTIVE_BRANCH,
            CommitSpread::MINE_OTHER_BRANCH,
            CommitSpread::REMOTE_MATCHING_BRANCH,
            CommitSpread::REMOTE_OTHER_BRANCH,
            CommitSpread::THEIR_OTHER_BRANCH,
            CommitSpread::THEIR_MATCHING_BRANCH,
            CommitSpread::THEIR_CLAIMED,
            CommitSpread::THEIR_UNCOMMITTED,
        ];
        ORDER
            .iter()
            .map(|bit| if self.contains(*bit) { '+' } else { '-' })
            .collect()
    }
}

/// The identity of this clone, attached to every record it issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextIdentity {
    pub host: String,
    pub user: String,
    pub clone: String,
}

impl ContextIdentity {
    /// Identity for the clone rooted at `working_tree`.
    ///
    /// The clone path is canonicalized so that two processes reaching
    /// the same working tree through different spellings (symlinks,
    /// substituted drives) agree on who "we" are.
    pub fn current(working_tree: &Path) -> Self {
        let clone = dunce::canonicalize(working_tree)
            .unwrap_or_else(|_| working_tree.to_path_buf())
            .to_string_lossy()
            .into_owned();
        Self {
            host: whoami::fallible::hostname().unwrap_or_default(),
            user: whoami::username(),
            clone,
        }
    }

    /// Stamp this identity onto a record.
    pub fn apply(&self, commit: &mut Commit) {
        commit.host = Some(self.host.clone());
        commit.user = Some(self.user.clone());
        commit.clone = Some(self.clone.clone());
    }

    /// Whether `commit` was issued by this identity.
    ///
    /// Only keys present on the record are compared; a record that
    /// omits a key cannot conflict on it.
    pub fn issued(&self, commit: &Commit) -> bool {
        let conflicting = [
            commit.host.as_deref().is_some_and(|host| host != self.host),
            commit.user.as_deref().is_some_and(|user| user != self.user),
            commit
                .clone
                .as_deref()
                .is_some_and(|clone| clone != self.clone),
        ];
        !conflicting.contains(&true)
    }
}

/// Branch membership of a real commit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branches {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote: Vec<String>,
}

impl Branches {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }
}

/// One tracked-commit record, real or synthetic.
///
/// Fields are declared in sorted key order; together with two-space
/// pretty printing this keeps the serialized store stable so that
/// republishing produces minimal diffs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branches: Option<Branches>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl Commit {
    /// The null object: no managed repository or no relevant commit.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// A record with a `sha` describes a commit that exists in git.
    pub fn is_real(&self) -> bool {
        self.sha.is_some()
    }

    /// A record with context identity but no `sha` stands for one
    /// clone's uncommitted changes.
    pub fn is_synthetic_uncommitted(&self) -> bool {
        self.user.is_some() && self.sha.is_none()
    }

    pub fn local_branches(&self) -> &[String] {
        self.branches.as_ref().map(|b| b.local.as_slice()).unwrap_or(&[])
    }

    pub fn remote_branches(&self) -> &[String] {
        self.branches
            .as_ref()
            .map(|b| b.remote.as_slice())
            .unwrap_or(&[])
    }

    /// The changed paths named by this record.
    pub fn changes(&self) -> &[String] {
        self.changes.as_deref().unwrap_or(&[])
    }

    /// Remove the context-identity keys, leaving a plain remote-visible
    /// commit. Used by the post-push cleanup.
    pub fn strip_context(&mut self) {
        self.host = None;
        self.user = None;
        self.clone = None;
    }

    /// Where this commit lives, relative to `active_branch` and the
    /// given clone identity.
    pub fn spread(&self, active_branch: &str, identity: &ContextIdentity) -> CommitSpread {
        let mut spread = CommitSpread::empty();
        if self.user.as_deref().is_some_and(|user| !user.is_empty()) {
            // A store record from some clone, ours or theirs.
            let is_mine = identity.issued(self);
            if self.sha.is_some() {
                let on_active = self.local_branches().iter().any(|b| b == active_branch);
                spread |= match (is_mine, on_active) {
                    (true, true) => CommitSpread::MINE_ACTIVE_BRANCH,
                    (true, false) => CommitSpread::MINE_OTHER_BRANCH,
                    (false, true) => CommitSpread::THEIR_MATCHING_BRANCH,
                    (false, false) => CommitSpread::THEIR_OTHER_BRANCH,
                };
            } else if is_mine {
                spread |= CommitSpread::MINE_UNCOMMITTED;
            } else {
                spread |= CommitSpread::THEIR_UNCOMMITTED;
            }
        } else if !self.is_empty() {
            // A remote-visible commit with no issuing clone attached.
            let remote_branches = self.remote_branches();
            if remote_branches.iter().any(|b| b == active_branch) {
                spread |= CommitSpread::REMOTE_MATCHING_BRANCH;
            }
            if self.local_branches().iter().any(|b| b == active_branch) {
                spread |= CommitSpread::MINE_ACTIVE_BRANCH;
            }
            if remote_branches.iter().any(|b| b != active_branch) {
                spread |= CommitSpread::REMOTE_OTHER_BRANCH;
            }
        }
        spread
    }
}
