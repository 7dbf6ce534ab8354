//! End-to-end spread transitions on a single clone: from uncommitted,
//! to committed, to pushed, to remote-only after a hard reset.

mod common;

use gitalong::batch;
use gitalong::commit::{Commit, CommitSpread};
use gitalong::repository::Registry;

use common::GitalongFixture;

async fn spread_of(registry: &Registry, path: &std::path::Path, commit: &Commit) -> CommitSpread {
    let repository = registry.find(path).await.unwrap().expect("managed path");
    let active_branch = repository.active_branch().await.unwrap();
    commit.spread(&active_branch, repository.identity())
}

#[tokio::test]
async fn fresh_setup_reports_config_as_uncommitted_mine() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    repository.recompute_tracked_commits(&[]).await.unwrap();

    let registry = Registry::default();
    let path = fixture.abs(".gitalong.json");
    let commits = batch::last_commits(&registry, &[path.clone()], true)
        .await
        .unwrap();
    assert_eq!(commits.len(), 1);
    let commit = &commits[0];
    assert!(commit.is_synthetic_uncommitted());
    assert_eq!(
        spread_of(&registry, &path, commit).await,
        CommitSpread::MINE_UNCOMMITTED
    );
}

#[tokio::test]
async fn committed_but_unpushed_image_is_on_my_active_branch() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.push();

    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");
    repository.recompute_tracked_commits(&[]).await.unwrap();

    let registry = Registry::default();
    let path = fixture.abs("image.jpg");
    let commits = batch::last_commits(&registry, &[path.clone()], true)
        .await
        .unwrap();
    let commit = &commits[0];
    assert_eq!(commit.sha.as_deref(), Some(fixture.head_sha().as_str()));
    assert_eq!(
        spread_of(&registry, &path, commit).await,
        CommitSpread::MINE_ACTIVE_BRANCH
    );
}

#[tokio::test]
async fn pushed_image_is_also_on_the_matching_remote_branch() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");
    fixture.push();
    repository.recompute_tracked_commits(&[]).await.unwrap();

    let registry = Registry::default();
    let path = fixture.abs("image.jpg");
    let commits = batch::last_commits(&registry, &[path.clone()], true)
        .await
        .unwrap();
    assert_eq!(
        spread_of(&registry, &path, &commits[0]).await,
        CommitSpread::MINE_ACTIVE_BRANCH | CommitSpread::REMOTE_MATCHING_BRANCH
    );
}

#[tokio::test]
async fn stale_store_record_is_cleaned_up_after_a_push() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.push();
    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");
    // Publish while the commit is local-only, then push without
    // republishing: the store now holds a stale record.
    repository.recompute_tracked_commits(&[]).await.unwrap();
    fixture.push();
    assert!(
        fixture
            .store_records()
            .iter()
            .any(|record| record.user.is_some() && record.sha.is_some())
    );

    let registry = Registry::default();
    let path = fixture.abs("image.jpg");
    let commits = batch::last_commits(&registry, &[path.clone()], true)
        .await
        .unwrap();
    // The record was dropped from the store and stripped of identity.
    let commit = &commits[0];
    assert!(commit.user.is_none());
    assert_eq!(
        spread_of(&registry, &path, commit).await,
        CommitSpread::MINE_ACTIVE_BRANCH | CommitSpread::REMOTE_MATCHING_BRANCH
    );
    assert!(
        fixture
            .store_records()
            .iter()
            .all(|record| record.user.is_none() || record.sha.is_none())
    );
}

#[tokio::test]
async fn hard_reset_leaves_the_change_remote_only() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.push();
    let base_sha = fixture.head_sha();

    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");
    fixture.push();
    repository.recompute_tracked_commits(&[]).await.unwrap();

    fixture.git(&["reset", "--hard", &base_sha]);
    repository.recompute_tracked_commits(&[]).await.unwrap();

    let registry = Registry::default();
    let path = fixture.abs("image.jpg");
    let commits = batch::last_commits(&registry, &[path.clone()], true)
        .await
        .unwrap();
    assert_eq!(
        spread_of(&registry, &path, &commits[0]).await,
        CommitSpread::REMOTE_MATCHING_BRANCH
    );
}

#[tokio::test]
async fn republishing_without_changes_is_a_logical_no_op() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.push();
    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");

    repository.recompute_tracked_commits(&[]).await.unwrap();
    let first = fixture.store_json();
    repository.recompute_tracked_commits(&[]).await.unwrap();
    let second = fixture.store_json();
    assert_eq!(first, second);
}

#[tokio::test]
async fn results_match_inputs_positionally() {
    let fixture = GitalongFixture::new();
    let repository = fixture.setup(false).await;
    fixture.commit_all("Set up gitalong");
    fixture.save_image("image.jpg");
    fixture.commit_all("Add image.jpg");
    fixture.push();
    repository.recompute_tracked_commits(&[]).await.unwrap();

    let registry = Registry::default();
    let paths = vec![
        fixture.abs("image.jpg"),
        fixture.abs("untracked.xyz"),
        fixture.temp.path().join("outside.jpg"),
    ];
    let commits = batch::last_commits(&registry, &paths, true).await.unwrap();
    assert_eq!(commits.len(), paths.len());
    assert!(commits[0].is_real());
    assert!(
        commits[0]
            .changes()
            .iter()
            .any(|change| change == "image.jpg")
    );
    // An extension gitalong does not track.
    assert!(commits[1].is_empty());
    // Outside any managed working tree.
    assert!(commits[2].is_empty());
}
