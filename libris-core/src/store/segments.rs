//! Segment rows and segment contributor credits

use super::{parse_opt_uuid, parse_uuid};
use crate::error::{CoreError, CoreResult};
use crate::models::{EntityKind, Segment};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

const SEGMENT_COLUMNS: &str =
    "id, work_id, parent_id, title, position, duration_ms, deleted_at, tombstone_id";

fn segment_from_row(row: &SqliteRow) -> CoreResult<Segment> {
    let id: String = row.get("id");
    let work_id: String = row.get("work_id");

    Ok(Segment {
        id: parse_uuid(&id)?,
        work_id: parse_uuid(&work_id)?,
        parent_id: parse_opt_uuid(row.get("parent_id"))?,
        title: row.get("title"),
        position: row.get("position"),
        duration_ms: row.get("duration_ms"),
        deleted_at: row.get("deleted_at"),
        tombstone_id: parse_opt_uuid(row.get("tombstone_id"))?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, segment: &Segment) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO segments (
            id, work_id, parent_id, title, position, duration_ms, deleted_at, tombstone_id
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(segment.id.to_string())
    .bind(segment.work_id.to_string())
    .bind(segment.parent_id.map(|id| id.to_string()))
    .bind(&segment.title)
    .bind(segment.position)
    .bind(segment.duration_ms)
    .bind(segment.deleted_at)
    .bind(segment.tombstone_id.map(|id| id.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn load(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Option<Segment>> {
    let query = format!("SELECT {} FROM segments WHERE id = ?", SEGMENT_COLUMNS);
    let row = sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(segment_from_row).transpose()
}

pub async fn require(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Segment> {
    load(conn, id)
        .await?
        .ok_or_else(|| CoreError::not_found(EntityKind::Segment, id))
}

/// All segments of a work, tombstoned included, in position order
pub async fn list_for_work(conn: &mut SqliteConnection, work_id: Uuid) -> CoreResult<Vec<Segment>> {
    let query = format!(
        "SELECT {} FROM segments WHERE work_id = ? ORDER BY position, rowid",
        SEGMENT_COLUMNS
    );
    let rows = sqlx::query(&query)
        .bind(work_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(segment_from_row).collect()
}

pub async fn credit_contributor(
    conn: &mut SqliteConnection,
    segment_id: Uuid,
    contributor_id: Uuid,
    role: &str,
) -> CoreResult<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO segment_contributors (segment_id, contributor_id, role) VALUES (?, ?, ?)",
    )
    .bind(segment_id.to_string())
    .bind(contributor_id.to_string())
    .bind(role)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Tombstone every live segment of a work
pub async fn tombstone_for_work(
    conn: &mut SqliteConnection,
    work_id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE segments SET deleted_at = ?, tombstone_id = ? WHERE work_id = ? AND deleted_at IS NULL",
    )
    .bind(at)
    .bind(event.to_string())
    .bind(work_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Tombstone the live direct children of a segment
pub async fn tombstone_children(
    conn: &mut SqliteConnection,
    parent_id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE segments SET deleted_at = ?, tombstone_id = ? WHERE parent_id = ? AND deleted_at IS NULL",
    )
    .bind(at)
    .bind(event.to_string())
    .bind(parent_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn tombstone(
    conn: &mut SqliteConnection,
    id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE segments SET deleted_at = ?, tombstone_id = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(at)
    .bind(event.to_string())
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Clear every segment tombstone stamped by `event`
pub async fn restore_event(conn: &mut SqliteConnection, event: Uuid) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE segments SET deleted_at = NULL, tombstone_id = NULL WHERE tombstone_id = ?",
    )
    .bind(event.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Live segments whose work is tombstoned, with the work's tombstone event
pub async fn orphaned(conn: &mut SqliteConnection) -> CoreResult<Vec<(Uuid, Option<Uuid>)>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id AS id, w.tombstone_id AS owner_event
        FROM segments s
        JOIN works w ON w.id = s.work_id
        WHERE s.deleted_at IS NULL AND w.deleted_at IS NOT NULL
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            Ok((parse_uuid(&id)?, parse_opt_uuid(row.get("owner_event"))?))
        })
        .collect()
}

/// Tombstone one row as drift repair; the guard keeps concurrent restores intact
pub async fn tombstone_orphan(
    conn: &mut SqliteConnection,
    id: Uuid,
    at: DateTime<Utc>,
    owner_event: Option<Uuid>,
) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE segments SET deleted_at = ?, tombstone_id = ?
        WHERE id = ? AND deleted_at IS NULL
          AND EXISTS (SELECT 1 FROM works w WHERE w.id = segments.work_id AND w.deleted_at IS NOT NULL)
        "#,
    )
    .bind(at)
    .bind(owner_event.map(|id| id.to_string()))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
