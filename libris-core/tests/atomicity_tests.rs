//! Failure-path tests: storage errors roll back whole operations and search
//! index outages never fail a committed write

mod helpers;

use async_trait::async_trait;
use helpers::{credit, draft, full_draft, TestCatalog, TEST_SECRET};
use libris_common::config::{ActivationConfig, DuplicateConfig};
use libris_core::activation::ActivationTokens;
use libris_core::models::{ModerationState, SegmentDraft};
use libris_core::privileges::Role;
use libris_core::search::{SearchDocument, SearchError, SearchHit, SearchIndex, SearchOptions};
use libris_core::{store, Catalog, ErrorKind};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Index whose every call fails
struct UnavailableIndex;

#[async_trait]
impl SearchIndex for UnavailableIndex {
    async fn search(&self, _query: &str, _options: &SearchOptions) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::Unavailable("connection refused".to_string()))
    }

    async fn upsert(&self, _document: SearchDocument) -> Result<(), SearchError> {
        Err(SearchError::Unavailable("connection refused".to_string()))
    }

    async fn remove(&self, _id: Uuid) -> Result<(), SearchError> {
        Err(SearchError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_failed_child_insert_leaves_no_work_row() {
    let t = TestCatalog::new().await;
    let reader = t.actor("reader", Role::Default).await;

    sqlx::query("DROP TABLE segment_contributors")
        .execute(t.pool())
        .await
        .unwrap();

    let mut audiobook = full_draft("The Dispossessed");
    audiobook.segments = vec![SegmentDraft {
        title: Some("Chapter 1".to_string()),
        contributors: vec![credit("Don Leslie", "narrator")],
        ..Default::default()
    }];

    let err = t.catalog.create_work(audiobook, &reader).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageFailure);
    assert_eq!(t.count("SELECT COUNT(*) FROM works").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM segments").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM images").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM contributors").await, 0);
    assert_eq!(t.count("SELECT COUNT(*) FROM moderation_log").await, 0);
}

#[tokio::test]
async fn test_failed_tombstone_leaves_children_live() {
    let t = TestCatalog::new().await;
    let contributor = t.actor("contrib", Role::Contributor).await;
    let moderator = t.actor("mod", Role::Moderator).await;
    let work = t
        .catalog
        .create_work(helpers::segmented_draft("Lavinia"), &contributor)
        .await
        .unwrap()
        .work;

    // The audit write is the last statement of a tombstone
    sqlx::query("DROP TABLE moderation_log")
        .execute(t.pool())
        .await
        .unwrap();

    let err = t.catalog.cascade().tombstone_work(work.id, &moderator).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFailure);

    assert!(t.catalog.load_work(work.id).await.unwrap().unwrap().is_live());
    assert!(t.catalog.segments(work.id).await.unwrap().iter().all(|s| s.is_live()));
    assert!(t.catalog.images(work.id).await.unwrap().iter().all(|i| i.is_live()));
}

#[tokio::test]
async fn test_search_outage_does_not_fail_writes() {
    let dir = TempDir::new().unwrap();
    let pool = libris_common::db::init_database(&dir.path().join("libris.db"))
        .await
        .unwrap();
    let tokens = ActivationTokens::new(TEST_SECRET.to_vec(), &ActivationConfig::default());
    let catalog = Catalog::new(pool, Arc::new(UnavailableIndex), tokens, &DuplicateConfig::default());

    let (reader, contributor, moderator) = {
        let mut conn = catalog.db().acquire().await.unwrap();
        (
            store::actors::insert_user(&mut conn, "reader", Role::Default, &[]).await.unwrap(),
            store::actors::insert_user(&mut conn, "contrib", Role::Contributor, &[]).await.unwrap(),
            store::actors::insert_user(&mut conn, "mod", Role::Moderator, &[]).await.unwrap(),
        )
    };

    // Fuzzy search failing counts as no hits
    let pending = catalog.create_work(draft("Always Coming Home"), &reader).await.unwrap();
    assert_eq!(pending.state, ModerationState::Pending);
    assert!(pending.fuzzy_matches.is_empty());

    // Index update failing after commit keeps the committed work
    let approved = catalog.create_work(draft("Searoad"), &contributor).await.unwrap();
    assert_eq!(approved.state, ModerationState::Approved);
    assert!(catalog.load_work(approved.work.id).await.unwrap().is_some());

    let report = catalog.cascade().tombstone_work(approved.work.id, &moderator).await.unwrap();
    assert_eq!(report.work_id, approved.work.id);
    assert!(!catalog.load_work(approved.work.id).await.unwrap().unwrap().is_live());
}
