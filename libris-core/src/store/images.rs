//! Image rows
//!
//! The table's CHECK constraint rejects rows with zero or two owners; the
//! `ImageOwner` enum makes such rows unrepresentable on the Rust side.

use super::{parse_opt_uuid, parse_uuid};
use crate::error::{CoreError, CoreResult};
use crate::models::{Image, ImageOwner};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

fn image_from_row(row: &SqliteRow) -> CoreResult<Image> {
    let id: String = row.get("id");
    let owner = ImageOwner::from_columns(
        parse_opt_uuid(row.get("work_id"))?,
        parse_opt_uuid(row.get("segment_id"))?,
    )
    .ok_or_else(|| CoreError::corrupt(format!("image {} owner", id)))?;

    Ok(Image {
        id: parse_uuid(&id)?,
        owner,
        uri: row.get("uri"),
        kind: row.get("kind"),
        deleted_at: row.get("deleted_at"),
        tombstone_id: parse_opt_uuid(row.get("tombstone_id"))?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, image: &Image) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO images (id, work_id, segment_id, uri, kind, deleted_at, tombstone_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(image.id.to_string())
    .bind(image.owner.work_id().map(|id| id.to_string()))
    .bind(image.owner.segment_id().map(|id| id.to_string()))
    .bind(&image.uri)
    .bind(&image.kind)
    .bind(image.deleted_at)
    .bind(image.tombstone_id.map(|id| id.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn load(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Option<Image>> {
    let row = sqlx::query(
        "SELECT id, work_id, segment_id, uri, kind, deleted_at, tombstone_id FROM images WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(image_from_row).transpose()
}

/// Images of a work and of all its segments, tombstoned included
pub async fn list_for_work(conn: &mut SqliteConnection, work_id: Uuid) -> CoreResult<Vec<Image>> {
    let rows = sqlx::query(
        r#"
        SELECT id, work_id, segment_id, uri, kind, deleted_at, tombstone_id
        FROM images
        WHERE work_id = ?
           OR segment_id IN (SELECT id FROM segments WHERE work_id = ?)
        ORDER BY rowid
        "#,
    )
    .bind(work_id.to_string())
    .bind(work_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(image_from_row).collect()
}

/// Tombstone live images owned by any segment of the work
pub async fn tombstone_for_work_segments(
    conn: &mut SqliteConnection,
    work_id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE images SET deleted_at = ?, tombstone_id = ?
        WHERE deleted_at IS NULL
          AND segment_id IN (SELECT id FROM segments WHERE work_id = ?)
        "#,
    )
    .bind(at)
    .bind(event.to_string())
    .bind(work_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Tombstone live images owned directly by `owner`
pub async fn tombstone_owned(
    conn: &mut SqliteConnection,
    owner: ImageOwner,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let (column, id) = match owner {
        ImageOwner::Work(id) => ("work_id", id),
        ImageOwner::Segment(id) => ("segment_id", id),
    };
    let query = format!(
        "UPDATE images SET deleted_at = ?, tombstone_id = ? WHERE {} = ? AND deleted_at IS NULL",
        column
    );
    let result = sqlx::query(&query)
        .bind(at)
        .bind(event.to_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Clear every image tombstone stamped by `event`
pub async fn restore_event(conn: &mut SqliteConnection, event: Uuid) -> CoreResult<u64> {
    let result =
        sqlx::query("UPDATE images SET deleted_at = NULL, tombstone_id = NULL WHERE tombstone_id = ?")
            .bind(event.to_string())
            .execute(&mut *conn)
            .await?;

    Ok(result.rows_affected())
}

/// Live images whose owning work, or owning segment, is tombstoned
///
/// Returns each image id with the owner's tombstone event.
pub async fn orphaned(conn: &mut SqliteConnection) -> CoreResult<Vec<(Uuid, Option<Uuid>)>> {
    let rows = sqlx::query(
        r#"
        SELECT i.id AS id, w.tombstone_id AS owner_event
        FROM images i
        JOIN works w ON w.id = i.work_id
        WHERE i.deleted_at IS NULL AND w.deleted_at IS NOT NULL
        UNION ALL
        SELECT i.id AS id, s.tombstone_id AS owner_event
        FROM images i
        JOIN segments s ON s.id = i.segment_id
        WHERE i.deleted_at IS NULL AND s.deleted_at IS NOT NULL
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

pub async fn tombstone_orphan(
    conn: &mut SqliteConnection,
    id: Uuid,
    at: DateTime<Utc>,
    owner_event: Option<Uuid>,
) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE images SET deleted_at = ?, tombstone_id = ?
        WHERE id = ? AND deleted_at IS NULL
          AND (
            EXISTS (SELECT 1 FROM works w WHERE w.id = images.work_id AND w.deleted_at IS NOT NULL)
            OR EXISTS (SELECT 1 FROM segments s WHERE s.id = images.segment_id AND s.deleted_at IS NOT NULL)
          )
        "#,
    )
    .bind(at)
    .bind(owner_event.map(|id| id.to_string()))
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}
