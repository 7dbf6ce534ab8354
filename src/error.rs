//! Error types shared by the library.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GitalongError>;

#[derive(Debug)]
pub enum GitalongError {
    /// The path is not inside a git working tree.
    RepositoryNotFound { path: PathBuf },
    /// The working tree has no `.gitalong.json` configuration.
    RepositoryNotSetup { path: PathBuf },
    /// The configuration exists but cannot be used (malformed JSON,
    /// unrecognized `store_url` shape, ...).
    InvalidConfig { path: PathBuf, reason: String },
    /// The store could not be read from or written to.
    StoreUnreachable { reason: String },
    /// A git invocation returned a non-zero exit code.
    Git {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    /// A write-bit change failed on a path that exists.
    PermissionDenied {
        path: PathBuf,
        source: std::io::Error,
    },
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl GitalongError {
    /// Build a `Git` error from a finished `std::process::Output`.
    pub(crate) fn from_git_output(command: String, output: &std::process::Output) -> Self {
        GitalongError::Git {
            command,
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

impl std::fmt::Display for GitalongError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitalongError::RepositoryNotFound { path } => {
                write!(f, "{} is not inside a git working tree", path.display())
            }
            GitalongError::RepositoryNotSetup { path } => {
                write!(
                    f,
                    "gitalong is not set up on the repository at {}",
                    path.display()
                )
            }
            GitalongError::InvalidConfig { path, reason } => {
                write!(f, "invalid configuration at {}: {}", path.display(), reason)
            }
            GitalongError::StoreUnreachable { reason } => {
                write!(f, "store unreachable: {reason}")
            }
            GitalongError::Git {
                command,
                exit_code,
                stderr,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " with exit code {code}")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            GitalongError::PermissionDenied { path, source } => {
                write!(
                    f,
                    "could not change permissions of {}: {source}",
                    path.display()
                )
            }
            GitalongError::Io(err) => write!(f, "{err}"),
            GitalongError::Json(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for GitalongError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GitalongError::PermissionDenied { source, .. } => Some(source),
            GitalongError::Io(err) => Some(err),
            GitalongError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GitalongError {
    fn from(err: std::io::Error) -> Self {
        GitalongError::Io(err)
    }
}

impl From<serde_json::Error> for GitalongError {
    fn from(err: serde_json::Error) -> Self {
        GitalongError::Json(err)
    }
}
