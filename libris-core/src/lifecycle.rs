//! Lifecycle state machine
//!
//! ```text
//! create ──► APPROVED            (elevated-create)
//!        ──► DUPLICATE_FOUND     (fuzzy hits) ──confirm──► APPROVED
//!        ──► PENDING ──flag──► PENDING_DUPLICATE ──confirm──► APPROVED
//!               │
//!               └──approve/reject──► APPROVED / REJECTED
//! ```
//!
//! Initial state and visibility are decided before the write transaction
//! opens; creation then commits exactly once. Every write that changes a
//! persisted field adds one moderation record in the same transaction.

use crate::activation::{ActivationLink, TokenPurpose};
use crate::audit::{self, AuditAction, Auditable, ModerationRecord};
use crate::cascade::{self, TombstoneReport};
use crate::duplicates::FuzzyMatch;
use crate::error::{CoreError, CoreResult};
use crate::identifiers::{self, Identifier};
use crate::models::{
    ContributorCredit, EntityKind, Image, ImageDraft, ImageOwner, ModerationState, Segment,
    VocabularyKind, Work, WorkDraft, WorkPatch,
};
use crate::privileges::{Actor, Capability};
use crate::search;
use crate::store;
use crate::store::vocabulary::Resolution;
use crate::Catalog;
use libris_common::db::begin_monitored;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqliteConnection;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of a successful create
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOutcome {
    pub work: Work,
    pub state: ModerationState,
    pub visible: bool,
    /// Confirmation link, issued for `DUPLICATE_FOUND` outcomes
    pub activation_link: Option<ActivationLink>,
    /// Informational fuzzy duplicate candidates
    pub fuzzy_matches: Vec<FuzzyMatch>,
}

/// Result of following a confirmation link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Confirmation {
    Approved(Work),
    /// Benign repeat of an earlier confirmation or approval
    AlreadyEnabled(Work),
}

impl Confirmation {
    pub fn work(&self) -> &Work {
        match self {
            Confirmation::Approved(work) | Confirmation::AlreadyEnabled(work) => work,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Confirmation::Approved(_) => "Record approved and enabled",
            Confirmation::AlreadyEnabled(_) => "Record already enabled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlaggedDuplicate {
    pub work: Work,
    /// Link for the submitter to confirm the record is not a duplicate
    pub activation_link: ActivationLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub work: Work,
    /// `None` when the patch changed nothing
    pub record: Option<ModerationRecord>,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        self.record.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub source: Work,
    pub target: Work,
    pub associations_copied: u64,
    pub tombstone: TombstoneReport,
}

/// Initial state for a new work
pub fn initial_state(elevated: bool, fuzzy_hits: bool) -> ModerationState {
    if elevated {
        ModerationState::Approved
    } else if fuzzy_hits {
        ModerationState::DuplicateFound
    } else {
        ModerationState::Pending
    }
}

impl Catalog {
    /// Create a work from a validated draft
    pub async fn create_work(&self, draft: WorkDraft, actor: &Actor) -> CoreResult<CreateOutcome> {
        self.create_work_cancellable(draft, actor, &CancellationToken::new())
            .await
    }

    /// Create a work, rolling back if `cancel` fires before commit
    pub async fn create_work_cancellable(
        &self,
        mut draft: WorkDraft,
        actor: &Actor,
        cancel: &CancellationToken,
    ) -> CoreResult<CreateOutcome> {
        let start = Instant::now();

        let elevated = actor.has(Capability::ElevatedCreate);
        if !elevated {
            actor.require(Capability::DraftCreate)?;
        }

        draft.validate()?;
        let identifiers = identifiers::normalize_all(&draft.identifiers)?;

        // Blocking checks on a pooled connection before anything else runs
        {
            let mut conn = self.db().acquire().await?;
            self.detector
                .find_blocking(&mut conn, &draft, &identifiers)
                .await?
                .reject_blocking()?;
        }

        let fuzzy_matches = self.detector.find_fuzzy(&draft).await;
        let state = initial_state(elevated, !fuzzy_matches.is_empty());

        debug!(
            title = %draft.title,
            actor_id = %actor.id,
            elevated = elevated,
            fuzzy_hits = fuzzy_matches.len(),
            state = %state,
            "Creation outcome decided"
        );

        let mut tx = begin_monitored(self.db(), "lifecycle::create_work").await?;

        // Re-run the blocking checks under the write transaction
        let blocking = self.detector.find_blocking(tx.conn(), &draft, &identifiers).await?;
        if let Err(e) = blocking.reject_blocking() {
            return tx.reject(e).await;
        }

        let work = insert_draft(tx.conn(), &draft, &identifiers, state, actor).await?;

        if cancel.is_cancelled() {
            tx.rollback().await?;
            info!(title = %draft.title, "Work creation cancelled before commit");
            return Err(CoreError::Cancelled);
        }
        tx.commit().await?;

        if work.is_visible() {
            search::sync_document(self.search().as_ref(), &work).await;
        }

        let activation_link = (state == ModerationState::DuplicateFound)
            .then(|| self.tokens().issue_confirm_link(EntityKind::Work, work.id));

        info!(
            work_id = %work.id,
            state = %state,
            enabled = work.enabled,
            segments = draft.segments.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Work created"
        );

        Ok(CreateOutcome {
            visible: work.is_visible(),
            state,
            work,
            activation_link,
            fuzzy_matches,
        })
    }

    /// Follow a creation-confirmation link
    pub async fn confirm(&self, token: &str) -> CoreResult<Confirmation> {
        let claims = self.tokens().verify_for(token, TokenPurpose::CreateConfirm)?;
        if claims.kind != EntityKind::Work {
            return Err(CoreError::incompatible(claims.kind, claims.id, "not a work"));
        }

        let mut tx = begin_monitored(self.db(), "lifecycle::confirm").await?;
        let mut work = store::works::require(tx.conn(), claims.id).await?;

        if !work.is_live() {
            return tx.reject(CoreError::incompatible(EntityKind::Work, work.id, "work is tombstoned")).await;
        }
        if work.moderation_state == ModerationState::Approved {
            tx.rollback().await?;
            debug!(work_id = %work.id, "Confirmation repeated for approved work");
            return Ok(Confirmation::AlreadyEnabled(work));
        }
        if !work.moderation_state.is_confirmable() {
            return tx
                .reject(CoreError::incompatible(
                    EntityKind::Work,
                    work.id,
                    "work is not awaiting confirmation",
                ))
                .await;
        }

        let before = work.clone();
        work.moderation_state = ModerationState::Approved;
        work.enabled = true;
        store::works::set_state(tx.conn(), work.id, work.moderation_state, work.enabled).await?;
        // Confirmation needs no login; attribute it to the submitter
        audit::record_change(tx.conn(), &before, &work, AuditAction::Confirm, work.created_by).await?;
        tx.commit().await?;

        search::sync_document(self.search().as_ref(), &work).await;
        info!(work_id = %work.id, from = %before.moderation_state, "Work confirmed");

        Ok(Confirmation::Approved(work))
    }

    pub async fn moderator_approve(&self, work_id: Uuid, actor: &Actor) -> CoreResult<Work> {
        self.moderate(work_id, actor, ModerationState::Approved, AuditAction::Approve)
            .await
    }

    pub async fn moderator_reject(&self, work_id: Uuid, actor: &Actor) -> CoreResult<Work> {
        self.moderate(work_id, actor, ModerationState::Rejected, AuditAction::Reject)
            .await
    }

    /// Move a pending work to `PENDING_DUPLICATE` and hand back a link for
    /// the submitter to confirm it
    pub async fn moderator_flag_duplicate(&self, work_id: Uuid, actor: &Actor) -> CoreResult<FlaggedDuplicate> {
        let work = self
            .moderate(work_id, actor, ModerationState::PendingDuplicate, AuditAction::FlagDuplicate)
            .await?;
        let activation_link = self.tokens().issue_confirm_link(EntityKind::Work, work.id);
        Ok(FlaggedDuplicate {
            work,
            activation_link,
        })
    }

    async fn moderate(
        &self,
        work_id: Uuid,
        actor: &Actor,
        to: ModerationState,
        action: AuditAction,
    ) -> CoreResult<Work> {
        actor.require(Capability::Moderate)?;

        let mut tx = begin_monitored(self.db(), "lifecycle::moderate").await?;
        let mut work = store::works::require(tx.conn(), work_id).await?;

        if !work.is_live() {
            return tx.reject(CoreError::incompatible(EntityKind::Work, work_id, "work is tombstoned")).await;
        }
        let allowed = match to {
            ModerationState::PendingDuplicate => work.moderation_state == ModerationState::Pending,
            _ => work.moderation_state.is_moderatable(),
        };
        if !allowed {
            return tx
                .reject(CoreError::incompatible(
                    EntityKind::Work,
                    work_id,
                    "work is not awaiting moderation",
                ))
                .await;
        }

        let before = work.clone();
        work.moderation_state = to;
        work.enabled = to.enables();
        store::works::set_state(tx.conn(), work.id, work.moderation_state, work.enabled).await?;
        audit::record_change(tx.conn(), &before, &work, action, Some(actor.id)).await?;
        tx.commit().await?;

        search::sync_document(self.search().as_ref(), &work).await;
        info!(
            work_id = %work.id,
            actor_id = %actor.id,
            from = %before.moderation_state,
            to = %to,
            "Moderation transition applied"
        );

        Ok(work)
    }

    /// Edit a work's fields; an empty diff writes nothing
    pub async fn update_work(&self, work_id: Uuid, mut patch: WorkPatch, actor: &Actor) -> CoreResult<UpdateOutcome> {
        patch.validate()?;

        let mut tx = begin_monitored(self.db(), "lifecycle::update_work").await?;
        let mut work = store::works::require(tx.conn(), work_id).await?;
        if !work.is_live() {
            return tx.reject(CoreError::incompatible(EntityKind::Work, work_id, "work is tombstoned")).await;
        }
        if let Err(e) = actor.require_either(Capability::Edit, Capability::DraftEdit, owns_draft(&work, actor)) {
            return tx.reject(e).await;
        }

        let before = work.clone();
        if let Some(title) = patch.title {
            work.title = title;
        }
        if let Some(subtitle) = patch.subtitle {
            work.subtitle = subtitle;
        }
        if let Some(language) = patch.language {
            work.language = language;
        }
        if let Some(description) = patch.description {
            work.description = description;
        }
        if let Some(publisher) = patch.publisher {
            work.publisher_id = match publisher {
                Some(name) => {
                    Some(resolve_vocabulary(tx.conn(), VocabularyKind::Publisher, &name, actor).await?)
                }
                None => None,
            };
        }

        let record = audit::record_change(tx.conn(), &before, &work, AuditAction::Update, Some(actor.id)).await?;
        if record.is_none() {
            tx.rollback().await?;
            debug!(work_id = %work_id, "Update changed nothing");
            return Ok(UpdateOutcome { work: before, record });
        }

        store::works::update_fields(tx.conn(), &work).await?;
        tx.commit().await?;

        let search_relevant = before.title != work.title
            || before.subtitle != work.subtitle
            || before.description != work.description
            || before.language != work.language;
        if work.is_visible() && search_relevant {
            search::sync_document(self.search().as_ref(), &work).await;
        }

        info!(work_id = %work.id, actor_id = %actor.id, "Work updated");
        Ok(UpdateOutcome { work, record })
    }

    /// Fold `source` into `target`: associations move over, source is
    /// tombstoned with its children
    pub async fn merge_works(&self, source_id: Uuid, target_id: Uuid, actor: &Actor) -> CoreResult<MergeOutcome> {
        if source_id == target_id {
            return Err(CoreError::InvalidDraft("cannot merge a work into itself".to_string()));
        }

        let mut tx = begin_monitored(self.db(), "lifecycle::merge_works").await?;
        let mut source = store::works::require(tx.conn(), source_id).await?;
        let target = store::works::require(tx.conn(), target_id).await?;
        if !source.is_live() {
            return tx.reject(CoreError::incompatible(EntityKind::Work, source_id, "work is tombstoned")).await;
        }
        if !target.is_live() {
            return tx.reject(CoreError::incompatible(EntityKind::Work, target_id, "work is tombstoned")).await;
        }
        if let Err(e) = actor.require_either(Capability::Merge, Capability::DraftMerge, owns_draft(&source, actor)) {
            return tx.reject(e).await;
        }

        let associations_copied = store::works::copy_associations(tx.conn(), source_id, target_id).await?;
        store::works::set_merged_into(tx.conn(), source_id, target_id).await?;

        let before = source.clone();
        let tombstone = cascade::tombstone_work_rows(tx.conn(), source_id).await?;
        source.merged_into = Some(target_id);
        source.deleted_at = Some(tombstone.deleted_at);
        source.tombstone_id = Some(tombstone.event_id);

        audit::record_change(tx.conn(), &before, &source, AuditAction::Merge, Some(actor.id)).await?;
        audit::record(
            tx.conn(),
            target.audit_target(),
            AuditAction::Merge,
            Some(actor.id),
            json!({
                "merged_from": source_id,
                "associations_copied": associations_copied,
            }),
            target.audit_state(),
        )
        .await?;
        tx.commit().await?;

        search::sync_document(self.search().as_ref(), &source).await;
        info!(
            source_id = %source_id,
            target_id = %target_id,
            associations_copied = associations_copied,
            segments = tombstone.segments,
            images = tombstone.images,
            "Works merged"
        );

        Ok(MergeOutcome {
            source,
            target,
            associations_copied,
            tombstone,
        })
    }
}

/// Submitter acting on their own not-yet-approved record
pub(crate) fn owns_draft(work: &Work, actor: &Actor) -> bool {
    work.created_by == Some(actor.id) && work.moderation_state != ModerationState::Approved
}

/// Vocabulary id for `name`, auditing revivals of tombstoned entries
async fn resolve_vocabulary(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    name: &str,
    actor: &Actor,
) -> CoreResult<Uuid> {
    let (entry, resolution) = store::vocabulary::get_or_create(conn, kind, name).await?;
    if resolution == Resolution::Revived {
        audit::record(
            conn,
            entry.audit_target(),
            AuditAction::Restore,
            Some(actor.id),
            json!({ "revived_by": "create", "name": entry.name }),
            None,
        )
        .await?;
        debug!(kind = %kind, id = %entry.id, name = %entry.name, "Vocabulary entry revived");
    }
    Ok(entry.id)
}

/// Where a contributor credit is recorded
#[derive(Clone, Copy)]
enum Credited {
    Work(Uuid),
    Segment(Uuid),
}

async fn link_contributors(
    conn: &mut SqliteConnection,
    credits: &[ContributorCredit],
    actor: &Actor,
    credited: Credited,
) -> CoreResult<()> {
    for credit in credits {
        let id = resolve_vocabulary(conn, VocabularyKind::Contributor, &credit.name, actor).await?;
        match credited {
            Credited::Work(work_id) => store::works::link_contributor(conn, work_id, id, &credit.role).await?,
            Credited::Segment(segment_id) => {
                store::segments::credit_contributor(conn, segment_id, id, &credit.role).await?
            }
        }
    }
    Ok(())
}

async fn insert_images(conn: &mut SqliteConnection, owner: ImageOwner, drafts: &[ImageDraft]) -> CoreResult<usize> {
    for draft in drafts {
        let image = Image {
            id: Uuid::new_v4(),
            owner,
            uri: draft.uri.trim().to_string(),
            kind: draft.kind.clone(),
            deleted_at: None,
            tombstone_id: None,
        };
        store::images::insert(conn, &image).await?;
    }
    Ok(drafts.len())
}

/// Write the work, its children and associations, and the create record
async fn insert_draft(
    conn: &mut SqliteConnection,
    draft: &WorkDraft,
    identifiers: &[Identifier],
    state: ModerationState,
    actor: &Actor,
) -> CoreResult<Work> {
    let publisher_id = match &draft.publisher {
        Some(name) => Some(resolve_vocabulary(conn, VocabularyKind::Publisher, name, actor).await?),
        None => None,
    };

    let work = Work {
        id: Uuid::new_v4(),
        title: draft.title.clone(),
        subtitle: draft.subtitle.clone(),
        language: draft.language.clone(),
        description: draft.description.clone(),
        metadata: draft.metadata.clone(),
        publisher_id,
        enabled: state.enables(),
        moderation_state: state,
        created_by: Some(actor.id),
        merged_into: None,
        deleted_at: None,
        tombstone_id: None,
    };
    store::works::insert(conn, &work).await?;

    link_contributors(conn, &draft.contributors, actor, Credited::Work(work.id)).await?;
    for entry in &draft.series {
        let id = resolve_vocabulary(conn, VocabularyKind::Series, &entry.name, actor).await?;
        store::works::link_series(conn, work.id, id, entry.position.as_deref()).await?;
    }
    for genre in &draft.genres {
        let id = resolve_vocabulary(conn, VocabularyKind::Genre, genre, actor).await?;
        store::works::link_genre(conn, work.id, id).await?;
    }
    for identifier in identifiers {
        let id = store::identifiers::get_or_create(conn, identifier).await?;
        store::identifiers::link(conn, work.id, id).await?;
    }

    let mut segment_ids: Vec<Uuid> = Vec::with_capacity(draft.segments.len());
    let mut image_count = insert_images(conn, ImageOwner::Work(work.id), &draft.images).await?;
    for segment_draft in &draft.segments {
        let segment = Segment {
            id: Uuid::new_v4(),
            work_id: work.id,
            // Parents are validated to be earlier entries
            parent_id: segment_draft.parent.and_then(|p| segment_ids.get(p).copied()),
            title: segment_draft.title.clone(),
            position: segment_draft.position,
            duration_ms: segment_draft.duration_ms,
            deleted_at: None,
            tombstone_id: None,
        };
        store::segments::insert(conn, &segment).await?;
        link_contributors(conn, &segment_draft.contributors, actor, Credited::Segment(segment.id)).await?;
        image_count += insert_images(conn, ImageOwner::Segment(segment.id), &segment_draft.images).await?;
        segment_ids.push(segment.id);
    }

    let mut changes = work.audit_snapshot();
    if let Some(fields) = changes.as_object_mut() {
        fields.insert("segments".to_string(), json!(segment_ids.len()));
        fields.insert("images".to_string(), json!(image_count));
        fields.insert(
            "identifiers".to_string(),
            json!(identifiers.iter().map(ToString::to_string).collect::<Vec<_>>()),
        );
    }
    audit::record(conn, work.audit_target(), AuditAction::Create, Some(actor.id), changes, Some(state)).await?;

    Ok(work)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_precedence() {
        assert_eq!(initial_state(true, true), ModerationState::Approved);
        assert_eq!(initial_state(false, true), ModerationState::DuplicateFound);
        assert_eq!(initial_state(false, false), ModerationState::Pending);
    }

    #[test]
    fn test_only_approved_is_enabled_initially() {
        for (elevated, fuzzy) in [(true, false), (false, true), (false, false)] {
            let state = initial_state(elevated, fuzzy);
            assert_eq!(state.enables(), state == ModerationState::Approved);
        }
    }
}
