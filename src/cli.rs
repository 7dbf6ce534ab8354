use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gitalong")]
#[command(about = "Coordinate binary-file editing across clones of a shared git repository")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Repository to apply operations to (defaults to the current directory)
    #[arg(short = 'C', long = "repository", global = true, value_name = "path")]
    pub repository: Option<PathBuf>,

    /// Show git commands and debug info
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up gitalong in a repository
    Setup {
        /// URL of the repository or HTTP endpoint that stores gitalong records
        store_url: String,

        /// Header applied to HTTP-store requests (repeatable). Values
        /// may reference environment variables, expanded per request.
        #[arg(long = "store-header", value_name = "KEY=VALUE")]
        store_headers: Vec<String>,

        /// Manage write permissions of tracked files to prevent editing
        /// of files that are modified elsewhere
        #[arg(long)]
        modify_permissions: bool,

        /// Track all auto-detected binary files. Prefer
        /// --tracked-extensions where possible; the content probe has a
        /// per-file cost
        #[arg(long)]
        track_binaries: bool,

        /// Track uncommitted changes. Better for collaboration but
        /// requires republishing after each file system operation
        #[arg(long)]
        track_uncommitted: bool,

        /// Comma-separated list of file extensions to track
        #[arg(long, value_delimiter = ',', value_name = "EXT")]
        tracked_extensions: Vec<String>,

        /// Seconds that must pass before gitalong pulls or fetches again
        #[arg(long, default_value_t = 60.0, value_name = "SECONDS")]
        pull_threshold: f64,
    },

    /// Print the requested configuration property value
    Config {
        /// The configuration property key to look for
        key: String,
    },

    /// Print where the last change of each file lives
    ///
    /// One line per file:
    /// `<spread> <path> <commit> <local-branches> <remote-branches> <host> <author>`
    Status {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Claim files for editing and make them writable if possible
    ///
    /// Exits with code 1 when one or more files are blocked by a change
    /// living elsewhere.
    Claim {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Release previously claimed files
    Release {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Republish this clone's tracked commits and refresh permissions
    Update,

    /// Print the gitalong version
    Version,
}
