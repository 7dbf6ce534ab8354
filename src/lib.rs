//! Coordinate binary-file editing across clones of a shared git
//! repository.
//!
//! Git merges text but not opaque binaries: when two collaborators edit
//! the same binary asset in parallel, one edit is lost at integration
//! time. Gitalong publishes each clone's in-flight changes (local-only
//! commits and uncommitted modifications) through a shared
//! side-channel store, and uses that knowledge to tell whether a file
//! is safe to edit, to claim and release files explicitly, and
//! optionally to enforce the answer through filesystem write
//! permissions.
//!
//! The CLI is a thin layer over this library; see [`batch`] for the
//! operations it exposes.

pub mod batch;
pub mod commit;
pub mod config;
pub mod error;
pub mod git;
pub mod perms;
pub mod repository;
pub mod store;
pub mod utils;

pub use commit::{Branches, Commit, CommitSpread, ContextIdentity};
pub use config::Config;
pub use error::{GitalongError, Result};
pub use repository::{Registry, Repository};
