//! Cascade engine: tombstone and restore works with their owned children
//!
//! Each tombstone operation mints an event id. The root row and every child
//! it tombstones carry that id in `tombstone_id`, and a restore clears only
//! rows stamped with the root's event. A segment tombstoned on its own before
//! its work was deleted keeps its own event id and stays tombstoned when the
//! work is restored.
//!
//! Every operation runs in one monitored transaction; a failure anywhere
//! rolls the whole operation back.

use crate::audit::{self, AuditAction, AuditTarget, Auditable};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::owns_draft;
use crate::models::{EntityKind, ImageOwner, VocabularyKind};
use crate::privileges::{Actor, Capability};
use crate::search::{self, SearchIndex};
use crate::store;
use chrono::{DateTime, Utc};
use libris_common::db::begin_monitored;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstoneReport {
    pub work_id: Uuid,
    pub event_id: Uuid,
    pub deleted_at: DateTime<Utc>,
    pub segments: u64,
    pub images: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTombstoneReport {
    pub segment_id: Uuid,
    pub event_id: Uuid,
    pub child_segments: u64,
    pub images: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub work_id: Uuid,
    /// False when the work was already live
    pub restored: bool,
    pub segments: u64,
    pub images: u64,
    /// Vocabulary entries brought back because the work references them
    pub vocabulary: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRestoreReport {
    pub segment_id: Uuid,
    pub segments: u64,
    pub images: u64,
}

/// Rows repaired by one reconciliation sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub segments: u64,
    pub images: u64,
}

impl ReconcileReport {
    /// Orphaned images repaired
    pub fn count(&self) -> u64 {
        self.images
    }
}

/// Tombstone a work and its children under a new event
///
/// Order: segment images, work images, segments, then the work itself.
/// Callers check the work is live; this only touches live rows.
pub(crate) async fn tombstone_work_rows(conn: &mut SqliteConnection, work_id: Uuid) -> CoreResult<TombstoneReport> {
    let event_id = Uuid::new_v4();
    let deleted_at = libris_common::time::now();

    let segment_images = store::images::tombstone_for_work_segments(conn, work_id, deleted_at, event_id).await?;
    let work_images = store::images::tombstone_owned(conn, ImageOwner::Work(work_id), deleted_at, event_id).await?;
    let segments = store::segments::tombstone_for_work(conn, work_id, deleted_at, event_id).await?;
    let rows = store::works::tombstone(conn, work_id, deleted_at, event_id).await?;
    if rows == 0 {
        return Err(CoreError::incompatible(EntityKind::Work, work_id, "work is already tombstoned"));
    }

    Ok(TombstoneReport {
        work_id,
        event_id,
        deleted_at,
        segments,
        images: segment_images + work_images,
    })
}

/// Soft-delete and restore operations
#[derive(Clone)]
pub struct CascadeEngine {
    db: SqlitePool,
    search: Arc<dyn SearchIndex>,
}

impl CascadeEngine {
    pub fn new(db: SqlitePool, search: Arc<dyn SearchIndex>) -> Self {
        Self { db, search }
    }

    pub async fn tombstone_work(&self, work_id: Uuid, actor: &Actor) -> CoreResult<TombstoneReport> {
        self.tombstone_work_cancellable(work_id, actor, &CancellationToken::new())
            .await
    }

    /// Tombstone a work, rolling back if `cancel` fires before commit
    pub async fn tombstone_work_cancellable(
        &self,
        work_id: Uuid,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> CoreResult<TombstoneReport> {
        let start = Instant::now();
        let mut tx = begin_monitored(&self.db, "cascade::tombstone_work").await?;

        let work = store::works::require(tx.conn(), work_id).await?;
        if let Err(e) = actor.require_either(Capability::Delete, Capability::DraftDelete, owns_draft(&work, actor)) {
            return tx.reject(e).await;
        }
        if !work.is_live() {
            return tx
                .reject(CoreError::incompatible(EntityKind::Work, work_id, "work is already tombstoned"))
                .await;
        }

        let report = tombstone_work_rows(tx.conn(), work_id).await?;
        audit::record(
            tx.conn(),
            work.audit_target(),
            AuditAction::Tombstone,
            Some(actor.id),
            json!({
                "deleted_at": { "from": null, "to": report.deleted_at },
                "event_id": report.event_id,
                "segments": report.segments,
                "images": report.images,
            }),
            work.audit_state(),
        )
        .await?;

        if cancel.is_cancelled() {
            tx.rollback().await?;
            info!(work_id = %work_id, "Tombstone cancelled before commit");
            return Err(CoreError::Cancelled);
        }
        tx.commit().await?;

        if let Err(e) = self.search.remove(work_id).await {
            warn!(work_id = %work_id, error = %e, "Search index removal failed after tombstone");
        }

        info!(
            work_id = %work_id,
            event_id = %report.event_id,
            segments = report.segments,
            images = report.images,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Work tombstoned"
        );

        Ok(report)
    }

    /// Tombstone a segment, its own images and its direct child segments
    ///
    /// Images of the child segments are left alone; the reconciliation sweep
    /// picks them up.
    pub async fn tombstone_segment(&self, segment_id: Uuid, actor: &Actor) -> CoreResult<SegmentTombstoneReport> {
        let mut tx = begin_monitored(&self.db, "cascade::tombstone_segment").await?;

        let segment = store::segments::require(tx.conn(), segment_id).await?;
        let work = store::works::require(tx.conn(), segment.work_id).await?;
        if let Err(e) = actor.require_either(Capability::Delete, Capability::DraftDelete, owns_draft(&work, actor)) {
            return tx.reject(e).await;
        }
        if !segment.is_live() {
            return tx
                .reject(CoreError::incompatible(
                    EntityKind::Segment,
                    segment_id,
                    "segment is already tombstoned",
                ))
                .await;
        }

        let event_id = Uuid::new_v4();
        let at = libris_common::time::now();
        let images = store::images::tombstone_owned(tx.conn(), ImageOwner::Segment(segment_id), at, event_id).await?;
        let child_segments = store::segments::tombstone_children(tx.conn(), segment_id, at, event_id).await?;
        store::segments::tombstone(tx.conn(), segment_id, at, event_id).await?;

        audit::record(
            tx.conn(),
            segment.audit_target(),
            AuditAction::Tombstone,
            Some(actor.id),
            json!({
                "deleted_at": { "from": null, "to": at },
                "event_id": event_id,
                "child_segments": child_segments,
                "images": images,
            }),
            None,
        )
        .await?;
        tx.commit().await?;

        info!(
            segment_id = %segment_id,
            work_id = %segment.work_id,
            child_segments = child_segments,
            images = images,
            "Segment tombstoned"
        );

        Ok(SegmentTombstoneReport {
            segment_id,
            event_id,
            child_segments,
            images,
        })
    }

    /// Restore a work and exactly what its own tombstone event retired
    ///
    /// Restoring a live work is a no-op reporting `restored = false`.
    pub async fn restore_work(&self, work_id: Uuid, actor: &Actor) -> CoreResult<RestoreReport> {
        actor.require(Capability::Delete)?;

        let mut tx = begin_monitored(&self.db, "cascade::restore_work").await?;
        let mut work = store::works::require(tx.conn(), work_id).await?;

        if work.is_live() {
            tx.rollback().await?;
            debug!(work_id = %work_id, "Restore requested for live work");
            return Ok(RestoreReport {
                work_id,
                restored: false,
                segments: 0,
                images: 0,
                vocabulary: 0,
            });
        }

        // A merged work's associations now live on its target
        if let Some(target) = work.merged_into {
            debug!(work_id = %work_id, target_id = %target, "Restore refused for merged work");
            return tx
                .reject(CoreError::incompatible(EntityKind::Work, work_id, "work was merged into another work"))
                .await;
        }

        let event = work.tombstone_id;
        store::works::clear_tombstone(tx.conn(), work_id).await?;
        let (segments, images) = match event {
            Some(event) => (
                store::segments::restore_event(tx.conn(), event).await?,
                store::images::restore_event(tx.conn(), event).await?,
            ),
            None => (0, 0),
        };

        // Vocabulary reclaimed while the work was tombstoned is reachable again
        let mut vocabulary = 0;
        for kind in VocabularyKind::ALL {
            for entry in store::vocabulary::tombstoned_for_work(tx.conn(), kind, work_id).await? {
                vocabulary += store::vocabulary::clear_tombstone(tx.conn(), kind, entry.id).await?;
                audit::record(
                    tx.conn(),
                    entry.audit_target(),
                    AuditAction::Restore,
                    Some(actor.id),
                    json!({ "deleted_at": { "from": entry.deleted_at, "to": null }, "work_id": work_id }),
                    None,
                )
                .await?;
            }
        }

        let before = work.clone();
        work.deleted_at = None;
        work.tombstone_id = None;
        audit::record_change(tx.conn(), &before, &work, AuditAction::Restore, Some(actor.id)).await?;
        tx.commit().await?;

        search::sync_document(self.search.as_ref(), &work).await;

        info!(
            work_id = %work_id,
            segments = segments,
            images = images,
            vocabulary = vocabulary,
            "Work restored"
        );

        Ok(RestoreReport {
            work_id,
            restored: true,
            segments,
            images,
            vocabulary,
        })
    }

    /// Restore a segment and what its own tombstone event retired
    ///
    /// Only the segment that started an event can reverse it. A child segment
    /// retired with its parent comes back when the parent is restored.
    pub async fn restore_segment(&self, segment_id: Uuid, actor: &Actor) -> CoreResult<SegmentRestoreReport> {
        actor.require(Capability::Delete)?;

        let mut tx = begin_monitored(&self.db, "cascade::restore_segment").await?;
        let segment = store::segments::require(tx.conn(), segment_id).await?;
        if segment.is_live() {
            return tx
                .reject(CoreError::incompatible(EntityKind::Segment, segment_id, "segment is live"))
                .await;
        }
        let work = store::works::require(tx.conn(), segment.work_id).await?;
        if !work.is_live() {
            return tx
                .reject(CoreError::incompatible(
                    EntityKind::Segment,
                    segment_id,
                    "owning work is tombstoned",
                ))
                .await;
        }
        if let Some(parent_id) = segment.parent_id {
            let parent_live = store::segments::load(tx.conn(), parent_id)
                .await?
                .map_or(false, |parent| parent.is_live());
            if !parent_live {
                return tx
                    .reject(CoreError::incompatible(
                        EntityKind::Segment,
                        segment_id,
                        "parent segment is tombstoned",
                    ))
                    .await;
            }
        }

        let Some(event) = segment.tombstone_id else {
            return tx
                .reject(CoreError::incompatible(
                    EntityKind::Segment,
                    segment_id,
                    "segment has no tombstone event",
                ))
                .await;
        };
        let segments = store::segments::restore_event(tx.conn(), event).await?;
        let images = store::images::restore_event(tx.conn(), event).await?;

        audit::record(
            tx.conn(),
            segment.audit_target(),
            AuditAction::Restore,
            Some(actor.id),
            json!({
                "deleted_at": { "from": segment.deleted_at, "to": null },
                "event_id": event,
                "segments": segments,
                "images": images,
            }),
            None,
        )
        .await?;
        tx.commit().await?;

        info!(segment_id = %segment_id, segments = segments, images = images, "Segment restored");

        Ok(SegmentRestoreReport {
            segment_id,
            segments,
            images,
        })
    }

    /// Tombstone live children whose owner is tombstoned
    ///
    /// Segments are repaired first so their images are then seen as orphans
    /// too. Repaired rows take the owner's event id, so restoring the owner
    /// later brings them back.
    pub async fn reconcile_orphans(&self, actor: &Actor) -> CoreResult<ReconcileReport> {
        actor.require(Capability::Admin)?;

        let start = Instant::now();
        let mut tx = begin_monitored(&self.db, "cascade::reconcile_orphans").await?;
        let at = libris_common::time::now();
        let mut report = ReconcileReport::default();

        for (segment_id, owner_event) in store::segments::orphaned(tx.conn()).await? {
            if store::segments::tombstone_orphan(tx.conn(), segment_id, at, owner_event).await? == 0 {
                continue;
            }
            report.segments += 1;
            audit::record(
                tx.conn(),
                AuditTarget::new(EntityKind::Segment, segment_id),
                AuditAction::Reconcile,
                Some(actor.id),
                json!({ "deleted_at": { "from": null, "to": at }, "owner_event": owner_event }),
                None,
            )
            .await?;
        }

        for (image_id, owner_event) in store::images::orphaned(tx.conn()).await? {
            if store::images::tombstone_orphan(tx.conn(), image_id, at, owner_event).await? == 0 {
                continue;
            }
            report.images += 1;
            audit::record(
                tx.conn(),
                AuditTarget::new(EntityKind::Image, image_id),
                AuditAction::Reconcile,
                Some(actor.id),
                json!({ "deleted_at": { "from": null, "to": at }, "owner_event": owner_event }),
                None,
            )
            .await?;
        }

        tx.commit().await?;

        if report.segments > 0 || report.images > 0 {
            info!(
                segments = report.segments,
                images = report.images,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Orphan reconciliation repaired drift"
            );
        } else {
            debug!("Orphan reconciliation found nothing to repair");
        }

        Ok(report)
    }
}
