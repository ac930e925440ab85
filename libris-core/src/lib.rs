//! libris-core: entity lifecycle engine for the Libris catalog
//!
//! Decides whether new works are visible, pending moderation or flagged as
//! likely duplicates, drives the moderation state machine and its activation
//! links, soft-deletes and restores works with their owned children, and runs
//! the reclamation sweeps that retire unreferenced vocabulary.

pub mod activation;
pub mod audit;
pub mod cascade;
pub mod duplicates;
pub mod error;
pub mod identifiers;
pub mod lifecycle;
pub mod models;
pub mod privileges;
pub mod reclaim;
pub mod scheduler;
pub mod search;
pub mod store;

pub use crate::error::{CoreError, CoreResult, ErrorKind};

use crate::activation::ActivationTokens;
use crate::audit::{AuditTarget, ModerationRecord};
use crate::cascade::CascadeEngine;
use crate::duplicates::DuplicateDetector;
use crate::models::{Image, Segment, Work};
use crate::privileges::Actor;
use crate::reclaim::ReclamationSweeper;
use crate::search::SearchIndex;
use libris_common::config::{DuplicateConfig, LibrisConfig};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Handle on one catalog database and its collaborators
///
/// Cheap to clone; every clone shares the pool, the search index and the
/// token signer.
#[derive(Clone)]
pub struct Catalog {
    db: SqlitePool,
    search: Arc<dyn SearchIndex>,
    tokens: Arc<ActivationTokens>,
    detector: Arc<DuplicateDetector>,
}

impl Catalog {
    pub fn new(
        db: SqlitePool,
        search: Arc<dyn SearchIndex>,
        tokens: ActivationTokens,
        duplicates: &DuplicateConfig,
    ) -> Self {
        let detector = DuplicateDetector::new(Arc::clone(&search), duplicates);
        Self {
            db,
            search,
            tokens: Arc::new(tokens),
            detector: Arc::new(detector),
        }
    }

    /// Open (or create) the database at `db_path` and wire collaborators
    ///
    /// The signing secret comes from config when set, otherwise from the
    /// settings table (generated on first open).
    pub async fn open(config: &LibrisConfig, db_path: &Path, search: Arc<dyn SearchIndex>) -> CoreResult<Self> {
        let db = libris_common::db::init_database(db_path).await?;
        let secret =
            libris_common::db::load_signing_secret(&db, config.activation.secret.as_deref()).await?;
        let tokens = ActivationTokens::new(secret, &config.activation);

        tracing::info!(database = %db_path.display(), "Catalog opened");

        Ok(Self::new(db, search, tokens, &config.duplicates))
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn search(&self) -> &Arc<dyn SearchIndex> {
        &self.search
    }

    pub fn tokens(&self) -> &ActivationTokens {
        &self.tokens
    }

    pub fn cascade(&self) -> CascadeEngine {
        CascadeEngine::new(self.db.clone(), Arc::clone(&self.search))
    }

    pub fn sweeper(&self) -> ReclamationSweeper {
        ReclamationSweeper::new(self.db.clone())
    }

    pub async fn load_work(&self, id: Uuid) -> CoreResult<Option<Work>> {
        let mut conn = self.db.acquire().await?;
        store::works::load(&mut conn, id).await
    }

    pub async fn load_segment(&self, id: Uuid) -> CoreResult<Option<Segment>> {
        let mut conn = self.db.acquire().await?;
        store::segments::load(&mut conn, id).await
    }

    /// Segments of a work in position order, tombstoned included
    pub async fn segments(&self, work_id: Uuid) -> CoreResult<Vec<Segment>> {
        let mut conn = self.db.acquire().await?;
        store::segments::list_for_work(&mut conn, work_id).await
    }

    /// Images of a work and its segments, tombstoned included
    pub async fn images(&self, work_id: Uuid) -> CoreResult<Vec<Image>> {
        let mut conn = self.db.acquire().await?;
        store::images::list_for_work(&mut conn, work_id).await
    }

    pub async fn load_actor(&self, id: Uuid) -> CoreResult<Actor> {
        let mut conn = self.db.acquire().await?;
        store::actors::load_actor(&mut conn, id).await
    }

    /// Moderation records for one target, oldest first
    pub async fn history(&self, target: AuditTarget) -> CoreResult<Vec<ModerationRecord>> {
        let mut conn = self.db.acquire().await?;
        audit::history(&mut conn, target).await
    }
}
