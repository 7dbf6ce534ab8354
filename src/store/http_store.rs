//! Store backend over a JSON-document HTTP endpoint.
//!
//! GET answers `{"record": [...]}`, PUT accepts the bare array. A
//! sentinel file's mtime throttles GETs the same way `FETCH_HEAD`
//! throttles the git backend; within the threshold the last payload is
//! served from a local cache file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::commit::Commit;
use crate::config::Config;
use crate::error::{GitalongError, Result};
use crate::store::{STORE_DIRNAME, Store};
use crate::utils::{modified_within, touch_file};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
struct RecordEnvelope {
    #[serde(default)]
    record: Vec<Commit>,
}

pub struct HttpStore {
    url: String,
    headers: BTreeMap<String, String>,
    client: reqwest::Client,
    cache_path: PathBuf,
    sentinel_path: PathBuf,
    pull_threshold: f64,
}

impl HttpStore {
    pub fn new(root: &Path, config: &Config) -> Result<Self> {
        let state_dir = root.join(STORE_DIRNAME);
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GitalongError::StoreUnreachable {
                reason: err.to_string(),
            })?;
        Ok(Self {
            url: config.store_url.clone(),
            headers: config.store_headers.clone(),
            client,
            cache_path: state_dir.join("commits.json"),
            sentinel_path: state_dir.join(".pull"),
            pull_threshold: config.pull_threshold,
        })
    }

    /// Header values may reference environment variables; they are
    /// expanded on every request so rotated tokens are picked up
    /// without restarting.
    fn expanded_headers(&self) -> BTreeMap<String, String> {
        self.headers
            .iter()
            .map(|(key, value)| {
                let expanded = shellexpand::env(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.clone());
                (key.clone(), expanded)
            })
            .collect()
    }

    fn read_cache(&self) -> Result<Vec<Commit>> {
        let raw = match std::fs::read_to_string(&self.cache_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_cache(&self, commits: &[Commit]) -> Result<()> {
        if let Some(parent) = self.cache_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut document = serde_json::to_string_pretty(commits)?;
        document.push('\n');
        std::fs::write(&self.cache_path, document)?;
        Ok(())
    }

    fn unreachable(reason: impl std::fmt::Display) -> GitalongError {
        GitalongError::StoreUnreachable {
            reason: reason.to_string(),
        }
    }
}

#[async_trait(?Send)]
impl Store for HttpStore {
    async fn read(&self) -> Result<Vec<Commit>> {
        if modified_within(&self.sentinel_path, self.pull_threshold) {
            return self.read_cache();
        }
        let mut request = self.client.get(&self.url);
        for (key, value) in self.expanded_headers() {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(Self::unreachable)?;
        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::unreachable(format!("GET returned {status}: {body}")));
        }
        let envelope: RecordEnvelope = response
            .json()
            .await
            .map_err(|err| Self::unreachable(format!("invalid store payload: {err}")))?;
        touch_file(&self.sentinel_path)?;
        self.write_cache(&envelope.record)?;
        Ok(envelope.record)
    }

    async fn write(&self, commits: &[Commit]) -> Result<()> {
        let mut request = self.client.put(&self.url).json(&commits);
        for (key, value) in self.expanded_headers() {
            request = request.header(key, value);
        }
        let response = request.send().await.map_err(Self::unreachable)?;
        let status = response.status();
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::unreachable(format!("PUT returned {status}: {body}")));
        }
        self.write_cache(commits)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_at(dir: &Path, headers: BTreeMap<String, String>) -> HttpStore {
        let config = Config {
            store_url: "https://example.invalid/store".to_string(),
            store_headers: headers,
            ..Config::default()
        };
        HttpStore::new(dir, &config).unwrap()
    }

    #[test]
    fn expands_environment_references_per_request() {
        let dir = tempfile::tempdir().unwrap();
        let headers = BTreeMap::from([
            ("X-Access-Key".to_string(), "token ${PATH}".to_string()),
            ("X-Plain".to_string(), "as-is".to_string()),
        ]);
        let store = store_at(dir.path(), headers);
        let expanded = store.expanded_headers();
        assert_eq!(
            expanded["X-Access-Key"],
            format!("token {}", std::env::var("PATH").unwrap())
        );
        assert_eq!(expanded["X-Plain"], "as-is");
    }

    #[test]
    fn undefined_variables_are_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let headers = BTreeMap::from([(
            "X-Access-Key".to_string(),
            "$GITALONG_TEST_UNDEFINED_VARIABLE".to_string(),
        )]);
        let store = store_at(dir.path(), headers);
        assert_eq!(
            store.expanded_headers()["X-Access-Key"],
            "$GITALONG_TEST_UNDEFINED_VARIABLE"
        );
    }

    #[tokio::test]
    async fn fresh_sentinel_serves_the_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), BTreeMap::new());
        let cached = vec![Commit {
            remote: Some("git@example.com:game.git".to_string()),
            changes: Some(vec!["a.png".to_string()]),
            ..Commit::default()
        }];
        store.write_cache(&cached).unwrap();
        touch_file(&store.sentinel_path).unwrap();

        // The URL is unresolvable; reaching the network would error.
        let commits = store.read().await.unwrap();
        assert_eq!(commits, cached);
    }

    #[tokio::test]
    async fn stale_sentinel_makes_unreachable_hosts_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_at(dir.path(), BTreeMap::new());
        assert!(matches!(
            store.read().await,
            Err(GitalongError::StoreUnreachable { .. })
        ));
    }
}
