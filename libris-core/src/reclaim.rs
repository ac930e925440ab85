//! Reclamation sweeps
//!
//! Retires live vocabulary entries (contributors, series, genres,
//! publishers) that no association joins to a live work. Reachability is
//! computed at sweep time, not reference counted; each tombstone statement
//! re-checks it, so an entry that became reachable after the scan is skipped
//! and left for a later sweep.

use crate::audit::{self, AuditAction, Auditable};
use crate::error::CoreResult;
use crate::models::{VocabularyEntry, VocabularyKind};
use crate::privileges::{Actor, Capability};
use crate::store;
use libris_common::db::begin_monitored;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Entries tombstoned by one sweep, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub contributors: u64,
    pub series: u64,
    pub genres: u64,
    pub publishers: u64,
}

impl SweepReport {
    pub fn total(&self) -> u64 {
        self.contributors + self.series + self.genres + self.publishers
    }

    fn slot(&mut self, kind: VocabularyKind) -> &mut u64 {
        match kind {
            VocabularyKind::Contributor => &mut self.contributors,
            VocabularyKind::Series => &mut self.series,
            VocabularyKind::Genre => &mut self.genres,
            VocabularyKind::Publisher => &mut self.publishers,
        }
    }
}

/// Entries a sweep would retire right now
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnusedPreview {
    pub contributors: Vec<VocabularyEntry>,
    pub series: Vec<VocabularyEntry>,
    pub genres: Vec<VocabularyEntry>,
    pub publishers: Vec<VocabularyEntry>,
}

impl UnusedPreview {
    pub fn get(&self, kind: VocabularyKind) -> &[VocabularyEntry] {
        match kind {
            VocabularyKind::Contributor => &self.contributors,
            VocabularyKind::Series => &self.series,
            VocabularyKind::Genre => &self.genres,
            VocabularyKind::Publisher => &self.publishers,
        }
    }

    pub fn total(&self) -> usize {
        VocabularyKind::ALL.iter().map(|k| self.get(*k).len()).sum()
    }
}

#[derive(Clone)]
pub struct ReclamationSweeper {
    db: SqlitePool,
}

impl ReclamationSweeper {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Tombstone every unreachable live vocabulary entry in one transaction
    pub async fn sweep_unused(&self, actor: &Actor) -> CoreResult<SweepReport> {
        actor.require(Capability::Admin)?;

        let start = Instant::now();
        let mut tx = begin_monitored(&self.db, "reclaim::sweep_unused").await?;
        let event_id = Uuid::new_v4();
        let at = libris_common::time::now();
        let mut report = SweepReport::default();

        for kind in VocabularyKind::ALL {
            let candidates = store::vocabulary::unreachable(tx.conn(), kind).await?;
            debug!(kind = %kind, candidates = candidates.len(), "Reclamation candidates");

            for entry in candidates {
                if store::vocabulary::tombstone_unreachable(tx.conn(), kind, entry.id, at, event_id).await? == 0 {
                    continue;
                }
                *report.slot(kind) += 1;
                audit::record(
                    tx.conn(),
                    entry.audit_target(),
                    AuditAction::Reclaim,
                    Some(actor.id),
                    json!({ "deleted_at": { "from": null, "to": at }, "event_id": event_id, "name": entry.name }),
                    None,
                )
                .await?;
            }
        }

        tx.commit().await?;

        info!(
            contributors = report.contributors,
            series = report.series,
            genres = report.genres,
            publishers = report.publishers,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Unused vocabulary sweep complete"
        );

        Ok(report)
    }

    /// Same reachability computation as `sweep_unused`, without writing
    pub async fn preview_unused(&self, actor: &Actor) -> CoreResult<UnusedPreview> {
        actor.require(Capability::Admin)?;

        let mut conn = self.db.acquire().await?;
        let preview = UnusedPreview {
            contributors: store::vocabulary::unreachable(&mut conn, VocabularyKind::Contributor).await?,
            series: store::vocabulary::unreachable(&mut conn, VocabularyKind::Series).await?,
            genres: store::vocabulary::unreachable(&mut conn, VocabularyKind::Genre).await?,
            publishers: store::vocabulary::unreachable(&mut conn, VocabularyKind::Publisher).await?,
        };

        debug!(candidates = preview.total(), "Unused vocabulary preview");
        Ok(preview)
    }
}
