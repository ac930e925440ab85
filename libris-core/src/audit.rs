//! Moderation audit log
//!
//! Append-only records bound to one target row. Every state-affecting write
//! adds exactly one record inside the same transaction as the write itself;
//! a write that changes nothing adds none.

use crate::error::{CoreError, CoreResult};
use crate::models::{EntityKind, ModerationState, Segment, VocabularyEntry, Work};
use crate::store::{parse_opt_uuid, parse_uuid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Record a log entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditTarget {
    pub kind: EntityKind,
    pub id: Uuid,
}

impl AuditTarget {
    pub fn new(kind: EntityKind, id: Uuid) -> Self {
        Self { kind, id }
    }
}

impl std::fmt::Display for AuditTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Confirm,
    Approve,
    Reject,
    FlagDuplicate,
    Merge,
    Tombstone,
    Restore,
    Reconcile,
    Reclaim,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Confirm => "confirm",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::FlagDuplicate => "flag_duplicate",
            AuditAction::Merge => "merge",
            AuditAction::Tombstone => "tombstone",
            AuditAction::Restore => "restore",
            AuditAction::Reconcile => "reconcile",
            AuditAction::Reclaim => "reclaim",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "create" => AuditAction::Create,
            "update" => AuditAction::Update,
            "confirm" => AuditAction::Confirm,
            "approve" => AuditAction::Approve,
            "reject" => AuditAction::Reject,
            "flag_duplicate" => AuditAction::FlagDuplicate,
            "merge" => AuditAction::Merge,
            "tombstone" => AuditAction::Tombstone,
            "restore" => AuditAction::Restore,
            "reconcile" => AuditAction::Reconcile,
            "reclaim" => AuditAction::Reclaim,
            _ => return None,
        })
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRecord {
    pub id: Uuid,
    pub target: AuditTarget,
    pub action: AuditAction,
    pub actor_id: Option<Uuid>,
    /// Changed-field snapshot: `{field: {from, to}}` or an action payload
    pub changes: Value,
    /// Target's moderation state at write time (works only)
    pub moderation_state: Option<ModerationState>,
    pub created_at: DateTime<Utc>,
}

/// Entities whose writes are recorded in the moderation log
pub trait Auditable {
    fn audit_target(&self) -> AuditTarget;

    /// Flat JSON object of the fields a moderator reviews
    fn audit_snapshot(&self) -> Value;

    /// Moderation state to stamp on records, for entities that have one
    fn audit_state(&self) -> Option<ModerationState> {
        None
    }
}

impl Auditable for Work {
    fn audit_target(&self) -> AuditTarget {
        AuditTarget::new(EntityKind::Work, self.id)
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "title": self.title,
            "subtitle": self.subtitle,
            "language": self.language,
            "description": self.description,
            "publisher_id": self.publisher_id,
            "enabled": self.enabled,
            "moderation_state": self.moderation_state.to_string(),
            "merged_into": self.merged_into,
            "deleted_at": self.deleted_at,
        })
    }

    fn audit_state(&self) -> Option<ModerationState> {
        Some(self.moderation_state)
    }
}

impl Auditable for Segment {
    fn audit_target(&self) -> AuditTarget {
        AuditTarget::new(EntityKind::Segment, self.id)
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "work_id": self.work_id,
            "parent_id": self.parent_id,
            "title": self.title,
            "position": self.position,
            "deleted_at": self.deleted_at,
        })
    }
}

impl Auditable for VocabularyEntry {
    fn audit_target(&self) -> AuditTarget {
        AuditTarget::new(self.kind.entity_kind(), self.id)
    }

    fn audit_snapshot(&self) -> Value {
        json!({
            "name": self.name,
            "deleted_at": self.deleted_at,
        })
    }
}

/// Field-level diff of two snapshots, `None` when nothing changed
pub fn diff_snapshots(before: &Value, after: &Value) -> Option<Value> {
    let empty = Map::new();
    let before = before.as_object().unwrap_or(&empty);
    let after = after.as_object().unwrap_or(&empty);

    let mut changes = Map::new();
    for (field, new) in after {
        let old = before.get(field).unwrap_or(&Value::Null);
        if old != new {
            changes.insert(field.clone(), json!({ "from": old, "to": new }));
        }
    }
    for (field, old) in before {
        if !after.contains_key(field) && !old.is_null() {
            changes.insert(field.clone(), json!({ "from": old, "to": Value::Null }));
        }
    }

    if changes.is_empty() {
        None
    } else {
        Some(Value::Object(changes))
    }
}

/// Append one record
pub async fn record(
    conn: &mut SqliteConnection,
    target: AuditTarget,
    action: AuditAction,
    actor_id: Option<Uuid>,
    changes: Value,
    moderation_state: Option<ModerationState>,
) -> CoreResult<ModerationRecord> {
    let entry = ModerationRecord {
        id: Uuid::new_v4(),
        target,
        action,
        actor_id,
        changes,
        moderation_state,
        created_at: libris_common::time::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO moderation_log (
            id, target_kind, target_id, action, actor_id, changes, moderation_state, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.target.kind.as_str())
    .bind(entry.target.id.to_string())
    .bind(entry.action.as_str())
    .bind(entry.actor_id.map(|id| id.to_string()))
    .bind(entry.changes.to_string())
    .bind(entry.moderation_state.map(ModerationState::code))
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(
        target_kind = %entry.target.kind,
        target_id = %entry.target.id,
        action = %entry.action,
        "Moderation record written"
    );

    Ok(entry)
}

/// Append a record of what changed between two versions of one entity
///
/// Returns `None`, writing nothing, when the snapshots are identical.
pub async fn record_change<T: Auditable>(
    conn: &mut SqliteConnection,
    before: &T,
    after: &T,
    action: AuditAction,
    actor_id: Option<Uuid>,
) -> CoreResult<Option<ModerationRecord>> {
    match diff_snapshots(&before.audit_snapshot(), &after.audit_snapshot()) {
        Some(changes) => {
            let entry = record(
                conn,
                after.audit_target(),
                action,
                actor_id,
                changes,
                after.audit_state(),
            )
            .await?;
            Ok(Some(entry))
        }
        None => Ok(None),
    }
}

/// Every record for `target`, oldest first
pub async fn history(conn: &mut SqliteConnection, target: AuditTarget) -> CoreResult<Vec<ModerationRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, action, actor_id, changes, moderation_state, created_at
        FROM moderation_log
        WHERE target_kind = ? AND target_id = ?
        ORDER BY rowid
        "#,
    )
    .bind(target.kind.as_str())
    .bind(target.id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter()
        .map(|row| {
            let id: String = row.get("id");
            let action: String = row.get("action");
            let changes: String = row.get("changes");
            let state: Option<i64> = row.get("moderation_state");

            Ok(ModerationRecord {
                id: parse_uuid(&id)?,
                target,
                action: AuditAction::parse(&action)
                    .ok_or_else(|| CoreError::corrupt(format!("audit action '{}'", action)))?,
                actor_id: parse_opt_uuid(row.get("actor_id"))?,
                changes: serde_json::from_str(&changes)
                    .map_err(|e| CoreError::corrupt(format!("audit changes: {}", e)))?,
                moderation_state: match state {
                    Some(code) => Some(
                        ModerationState::from_code(code)
                            .ok_or_else(|| CoreError::corrupt(format!("moderation state {}", code)))?,
                    ),
                    None => None,
                },
                created_at: row.get("created_at"),
            })
        })
        .collect()
}
