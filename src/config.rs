//! The `.gitalong.json` configuration document.
//!
//! Written once by `setup` at the managed working-tree root, read on
//! every instance construction and treated as immutable afterwards.
//! Unknown keys are ignored so newer and older clients can share a
//! repository.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GitalongError, Result};

pub const CONFIG_BASENAME: &str = ".gitalong.json";

/// Which kind of store a `store_url` selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// A second git clone, `store_url` names a repository (`…​.git`).
    Git,
    /// A JSON-document HTTP endpoint.
    Http,
}

/// Fields are declared in sorted key order so the serialized document
/// is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable write-bit enforcement on tracked files.
    pub modify_permissions: bool,
    /// Minimum interval in seconds between opportunistic network
    /// refreshes (fetches and store pulls).
    pub pull_threshold: f64,
    /// Headers applied to HTTP-store requests. Values may reference
    /// environment variables, expanded at request time.
    pub store_headers: BTreeMap<String, String>,
    /// Where the shared side-channel lives; selects the backend.
    pub store_url: String,
    /// Auto-detect binary files as tracked.
    pub track_binaries: bool,
    /// Publish a synthetic record for uncommitted changes and claims.
    pub track_uncommitted: bool,
    /// Extensions (with leading dot) that are always tracked.
    pub tracked_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            modify_permissions: false,
            pull_threshold: 60.0,
            store_headers: BTreeMap::new(),
            store_url: String::new(),
            track_binaries: false,
            track_uncommitted: false,
            tracked_extensions: Vec::new(),
        }
    }
}

impl Config {
    /// Path of the configuration document inside `working_tree`.
    pub fn path_for(working_tree: &Path) -> PathBuf {
        working_tree.join(CONFIG_BASENAME)
    }

    /// Load the configuration of the working tree at `working_tree`.
    ///
    /// Returns `Ok(None)` when the repository is not set up.
    pub fn load(working_tree: &Path) -> Result<Option<Config>> {
        let path = Self::path_for(working_tree);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let config: Config =
            serde_json::from_str(&raw).map_err(|err| GitalongError::InvalidConfig {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        config.validate(&path)?;
        Ok(Some(config))
    }

    /// Write the configuration document at the working-tree root.
    pub fn write(&self, working_tree: &Path) -> Result<()> {
        let path = Self::path_for(working_tree);
        self.validate(&path)?;
        let mut document = serde_json::to_string_pretty(self)?;
        document.push('\n');
        std::fs::write(&path, document)?;
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if self.store_url.is_empty() {
            return Err(GitalongError::InvalidConfig {
                path: path.to_path_buf(),
                reason: "missing \"store_url\"".to_string(),
            });
        }
        self.store_kind().map(|_| ()).map_err(|_| {
            GitalongError::InvalidConfig {
                path: path.to_path_buf(),
                reason: format!("unrecognized store_url {:?}", self.store_url),
            }
        })
    }

    /// Which backend the `store_url` selects, by shape alone.
    pub fn store_kind(&self) -> Result<StoreKind> {
        if self.store_url.ends_with(".git") {
            Ok(StoreKind::Git)
        } else if self.store_url.starts_with("http://") || self.store_url.starts_with("https://") {
            Ok(StoreKind::Http)
        } else {
            Err(GitalongError::InvalidConfig {
                path: PathBuf::new(),
                reason: format!("unrecognized store_url {:?}", self.store_url),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert!(!config.modify_permissions);
        assert_eq!(config.pull_threshold, 60.0);
        assert!(!config.track_binaries);
        assert!(!config.track_uncommitted);
        assert!(config.tracked_extensions.is_empty());
        assert!(config.store_headers.is_empty());
    }

    #[test]
    fn round_trips_through_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            store_url: "https://api.jsonbin.io/v3/b/abc123".to_string(),
            track_uncommitted: true,
            tracked_extensions: vec![".jpg".to_string(), ".psd".to_string()],
            ..Config::default()
        };
        config.write(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_file_means_not_set_up() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            Config::path_for(dir.path()),
            r#"{"store_url": "ssh://example.com/store.git", "future_flag": true}"#,
        )
        .unwrap();
        let config = Config::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.store_url, "ssh://example.com/store.git");
    }

    #[test]
    fn missing_store_url_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_for(dir.path()), r#"{"track_binaries": true}"#).unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(GitalongError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn malformed_json_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_for(dir.path()), "{not json").unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(GitalongError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn store_kind_follows_url_shape() {
        let git = Config {
            store_url: "git@example.com:store.git".to_string(),
            ..Config::default()
        };
        assert_eq!(git.store_kind().unwrap(), StoreKind::Git);

        let http = Config {
            store_url: "https://api.jsonbin.io/v3/b/abc123".to_string(),
            ..Config::default()
        };
        assert_eq!(http.store_kind().unwrap(), StoreKind::Http);

        let bogus = Config {
            store_url: "ftp://example.com/store".to_string(),
            ..Config::default()
        };
        assert!(bogus.store_kind().is_err());
    }

    #[test]
    fn serialized_keys_are_sorted() {
        let config = Config {
            store_url: "https://example.com/store".to_string(),
            ..Config::default()
        };
        let json = serde_json::to_string_pretty(&config).unwrap();
        let keys: Vec<usize> = [
            "modify_permissions",
            "pull_threshold",
            "store_headers",
            "store_url",
            "track_binaries",
            "track_uncommitted",
            "tracked_extensions",
        ]
        .iter()
        .map(|key| json.find(&format!("\"{key}\"")).unwrap())
        .collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }
}
