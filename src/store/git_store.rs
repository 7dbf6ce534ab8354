//! Store backend over a dedicated git clone.
//!
//! State is a single `commits.json` at the clone root. Reads pull the
//! clone when it is stale; writes overwrite the file, commit it with a
//! fixed message and push. A failed push surfaces as
//! [`GitalongError::StoreUnreachable`] so callers can treat it like any
//! other unreachable store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::commit::Commit;
use crate::config::Config;
use crate::error::{GitalongError, Result};
use crate::git::Git;
use crate::store::{STORE_DIRNAME, Store};
use crate::utils::modified_within;

const COMMITS_BASENAME: &str = "commits.json";

pub struct GitStore {
    git: Git,
    json_path: PathBuf,
    fetch_head: PathBuf,
    pull_threshold: f64,
}

impl GitStore {
    /// Open the store clone under `<root>/.gitalong`, cloning it from
    /// `store_url` on first use.
    pub async fn open(root: &Path, config: &Config) -> Result<Self> {
        let clone_dir = root.join(STORE_DIRNAME);
        if !clone_dir.join(".git").exists() {
            Git::clone_repository(&config.store_url, &clone_dir).await?;
        }
        let git = Git::at(&clone_dir);
        let fetch_head = git.git_dir().await?.join("FETCH_HEAD");
        Ok(Self {
            git,
            json_path: clone_dir.join(COMMITS_BASENAME),
            fetch_head,
            pull_threshold: config.pull_threshold,
        })
    }

    fn parse_commits(&self) -> Result<Vec<Commit>> {
        let raw = match std::fs::read_to_string(&self.json_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

#[async_trait(?Send)]
impl Store for GitStore {
    async fn read(&self) -> Result<Vec<Commit>> {
        if !modified_within(&self.fetch_head, self.pull_threshold) {
            // Degrade to the cached contents when the pull fails; a
            // stale answer beats no answer for an advisory check.
            if let Err(err) = self.git.pull_autostash().await {
                log::debug!("store pull failed, using cached commits: {err}");
            }
        }
        self.parse_commits()
    }

    async fn write(&self, commits: &[Commit]) -> Result<()> {
        let mut document = serde_json::to_string_pretty(commits)?;
        document.push('\n');
        std::fs::write(&self.json_path, document)?;
        self.git
            .commit_file_and_push(COMMITS_BASENAME, &format!("Update {COMMITS_BASENAME}"))
            .await
            .map_err(|err| GitalongError::StoreUnreachable {
                reason: err.to_string(),
            })?;
        Ok(())
    }
}
