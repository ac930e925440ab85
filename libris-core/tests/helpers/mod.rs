//! Shared fixtures for libris-core integration tests
//!
//! - TestCatalog: catalog over a temp-file database and an in-memory index
//! - Actor seeding for each role
//! - Draft builders

#![allow(dead_code)]

use libris_common::config::{ActivationConfig, DuplicateConfig};
use libris_core::activation::ActivationTokens;
use libris_core::models::{ContributorCredit, ImageDraft, SegmentDraft, SeriesEntry, WorkDraft};
use libris_core::privileges::{Actor, Capability, Role};
use libris_core::search::{MemorySearchIndex, SearchIndex};
use libris_core::{store, Catalog};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_SECRET: &[u8] = b"libris-test-signing-secret";

/// Catalog plus the handles tests poke at directly
///
/// Holds the temp dir so the database file outlives the test body.
pub struct TestCatalog {
    pub catalog: Catalog,
    pub index: Arc<MemorySearchIndex>,
    _dir: TempDir,
}

impl TestCatalog {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let pool = libris_common::db::init_database(&dir.path().join("libris.db"))
            .await
            .unwrap();

        let index = Arc::new(MemorySearchIndex::new());
        let search: Arc<dyn SearchIndex> = index.clone();
        let tokens = ActivationTokens::new(TEST_SECRET.to_vec(), &ActivationConfig::default());
        let catalog = Catalog::new(pool, search, tokens, &DuplicateConfig::default());

        Self {
            catalog,
            index,
            _dir: dir,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.catalog.db()
    }

    pub async fn actor(&self, username: &str, role: Role) -> Actor {
        self.actor_with_grants(username, role, &[]).await
    }

    pub async fn actor_with_grants(&self, username: &str, role: Role, grants: &[Capability]) -> Actor {
        let mut conn = self.pool().acquire().await.unwrap();
        store::actors::insert_user(&mut conn, username, role, grants)
            .await
            .unwrap()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(self.pool()).await.unwrap()
    }
}

pub fn draft(title: &str) -> WorkDraft {
    WorkDraft::new(title)
}

/// A work with one author, a series, a genre, a publisher and a cover
pub fn full_draft(title: &str) -> WorkDraft {
    let mut draft = WorkDraft::new(title);
    draft.publisher = Some("Tor".to_string());
    draft.contributors = vec![credit("Ursula K. Le Guin", "author")];
    draft.series = vec![SeriesEntry {
        name: "Earthsea".to_string(),
        position: Some("1".to_string()),
    }];
    draft.genres = vec!["Fantasy".to_string()];
    draft.images = vec![ImageDraft::cover("covers/earthsea.jpg")];
    draft
}

/// Two top-level segments, the first with a nested child; every segment
/// has one image
pub fn segmented_draft(title: &str) -> WorkDraft {
    let mut draft = WorkDraft::new(title);
    draft.images = vec![ImageDraft::cover(format!("covers/{}.jpg", title))];
    draft.segments = vec![
        segment("Part One", 0, None, "p1.jpg"),
        segment("Chapter 1", 1, Some(0), "c1.jpg"),
        segment("Part Two", 2, None, "p2.jpg"),
    ];
    draft
}

pub fn segment(title: &str, position: i64, parent: Option<usize>, image: &str) -> SegmentDraft {
    SegmentDraft {
        title: Some(title.to_string()),
        position,
        duration_ms: Some(60_000),
        parent,
        contributors: Vec::new(),
        images: vec![ImageDraft {
            uri: format!("segments/{}", image),
            kind: "chapter".to_string(),
        }],
    }
}

pub fn credit(name: &str, role: &str) -> ContributorCredit {
    ContributorCredit {
        name: name.to_string(),
        role: role.to_string(),
    }
}
