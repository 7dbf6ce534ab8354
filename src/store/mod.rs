//! The shared side-channel store.
//!
//! A store holds the flat list of tracked-commit records for every
//! clone of one managed repository. Two interchangeable backends exist:
//! one over a second git clone, one over a JSON-document HTTP endpoint.
//! The backend is picked from the `store_url` shape at construction and
//! lives for the lifetime of its [`Repository`](crate::repository::Repository).

use std::path::Path;

use async_trait::async_trait;

use crate::commit::Commit;
use crate::config::{Config, StoreKind};
use crate::error::Result;

mod git_store;
mod http_store;

pub use git_store::GitStore;
pub use http_store::HttpStore;

/// Directory under the managed working tree holding store state (the
/// store clone, or the HTTP cache and its freshness sentinel).
pub const STORE_DIRNAME: &str = ".gitalong";

/// The two-method capability every backend provides.
///
/// `read` is freshness-gated: within the pull threshold it answers from
/// local state without touching the network. `write` replaces the full
/// record list, best effort.
#[async_trait(?Send)]
pub trait Store {
    async fn read(&self) -> Result<Vec<Commit>>;
    async fn write(&self, commits: &[Commit]) -> Result<()>;
}

/// Build the backend selected by the configuration for the managed
/// working tree at `root`. The git backend clones on first use.
pub async fn open_store(root: &Path, config: &Config) -> Result<Box<dyn Store>> {
    match config.store_kind()? {
        StoreKind::Git => Ok(Box::new(GitStore::open(root, config).await?)),
        StoreKind::Http => Ok(Box::new(HttpStore::new(root, config)?)),
    }
}
