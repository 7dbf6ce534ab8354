use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use gitalong::commit::{Commit, CommitSpread};
use gitalong::config::Config;
use gitalong::repository::{Registry, Repository};
use gitalong::batch;

mod cli;

use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("gitalong: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let base = match &cli.repository {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("could not determine the current directory")?,
    };
    let registry = Registry::default();

    match cli.command {
        Commands::Setup {
            store_url,
            store_headers,
            modify_permissions,
            track_binaries,
            track_uncommitted,
            tracked_extensions,
            pull_threshold,
        } => {
            let config = Config {
                modify_permissions,
                pull_threshold,
                store_headers: parse_headers(&store_headers)?,
                store_url,
                track_binaries,
                track_uncommitted,
                tracked_extensions: tracked_extensions
                    .into_iter()
                    .filter(|extension| !extension.is_empty())
                    .collect(),
            };
            let repository = Repository::setup(config, &base).await?;
            println!("Set up gitalong in {}", repository.root().display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Config { key } => {
            let repository = registry.require(&base).await?;
            let key = key.replace('-', "_");
            let document = serde_json::to_value(repository.config())?;
            if let Some(value) = document.get(&key) {
                match value {
                    serde_json::Value::String(text) => println!("{text}"),
                    other => println!("{other}"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Status { paths } => {
            let resolved = resolve_paths(&paths, &base);
            let commits = batch::last_commits(&registry, &resolved, true).await?;
            for line in status_lines(&registry, &paths, &resolved, &commits).await? {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Claim { paths } => {
            let resolved = resolve_paths(&paths, &base);
            let blockers = batch::claim(&registry, &resolved, true).await?;
            for line in status_lines(&registry, &paths, &resolved, &blockers).await? {
                println!("{line}");
            }
            let blocked = blockers.iter().any(|blocker| !blocker.is_empty());
            Ok(if blocked {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Release { paths } => {
            let resolved = resolve_paths(&paths, &base);
            let blockers = batch::release(&registry, &resolved).await?;
            for line in status_lines(&registry, &paths, &resolved, &blockers).await? {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Update => {
            let repository = registry.require(&base).await?;
            repository.recompute_tracked_commits(&[]).await?;
            if repository.config().modify_permissions {
                let files: Vec<PathBuf> = repository
                    .head_files()
                    .await
                    .iter()
                    .map(|file| repository.absolute_path(Path::new(file)))
                    .collect();
                let updates = batch::update_permissions(&registry, &files).await?;
                for update in updates.iter().filter(|update| update.changed) {
                    let mode = if update.writable { "W" } else { "R" };
                    println!("{mode} {}", repository.relative_path_str(&update.path));
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Version => {
            println!("gitalong version {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Render one status line per path, in input order.
async fn status_lines(
    registry: &Registry,
    given: &[PathBuf],
    resolved: &[PathBuf],
    commits: &[Commit],
) -> anyhow::Result<Vec<String>> {
    let mut lines = Vec::with_capacity(commits.len());
    for index in 0..commits.len() {
        let commit = &commits[index];
        let spread = match registry.find(&resolved[index]).await? {
            Some(repository) => {
                let active_branch = repository.active_branch().await?;
                commit.spread(&active_branch, repository.identity())
            }
            None => CommitSpread::empty(),
        };
        lines.push(status_line(spread, &given[index], commit));
    }
    Ok(lines)
}

/// `<spread> <path> <commit> <local-branches> <remote-branches> <host> <author>`
fn status_line(spread: CommitSpread, path: &Path, commit: &Commit) -> String {
    let join = |branches: &[String]| {
        if branches.is_empty() {
            "-".to_string()
        } else {
            branches.join(",")
        }
    };
    format!(
        "{} {} {} {} {} {} {}",
        spread.glyph(),
        path.display(),
        commit.sha.as_deref().unwrap_or("-"),
        join(commit.local_branches()),
        join(commit.remote_branches()),
        commit.host.as_deref().unwrap_or("-"),
        commit
            .author
            .as_deref()
            .or(commit.user.as_deref())
            .unwrap_or("-"),
    )
}

fn resolve_paths(paths: &[PathBuf], base: &Path) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                base.join(path)
            }
        })
        .collect()
}

fn parse_headers(entries: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    entries
        .iter()
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                .ok_or_else(|| anyhow::anyhow!("invalid --store-header {entry:?}, expected KEY=VALUE"))
        })
        .collect()
}
