//! Work rows and their vocabulary associations

use super::{parse_opt_uuid, parse_uuid};
use crate::error::{CoreError, CoreResult};
use crate::models::{EntityKind, ModerationState, Work};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

const WORK_COLUMNS: &str = "id, title, subtitle, language, description, metadata, publisher_id, \
     enabled, moderation_state, created_by, merged_into, deleted_at, tombstone_id";

fn work_from_row(row: &SqliteRow) -> CoreResult<Work> {
    let id: String = row.get("id");
    let metadata: String = row.get("metadata");
    let state: i64 = row.get("moderation_state");

    Ok(Work {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        subtitle: row.get("subtitle"),
        language: row.get("language"),
        description: row.get("description"),
        metadata: serde_json::from_str(&metadata)
            .map_err(|e| CoreError::corrupt(format!("work {} metadata: {}", id, e)))?,
        publisher_id: parse_opt_uuid(row.get("publisher_id"))?,
        enabled: row.get("enabled"),
        moderation_state: ModerationState::from_code(state)
            .ok_or_else(|| CoreError::corrupt(format!("moderation state {}", state)))?,
        created_by: parse_opt_uuid(row.get("created_by"))?,
        merged_into: parse_opt_uuid(row.get("merged_into"))?,
        deleted_at: row.get("deleted_at"),
        tombstone_id: parse_opt_uuid(row.get("tombstone_id"))?,
    })
}

pub async fn insert(conn: &mut SqliteConnection, work: &Work) -> CoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO works (
            id, title, subtitle, language, description, metadata, publisher_id,
            enabled, moderation_state, created_by, merged_into, deleted_at, tombstone_id,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(work.id.to_string())
    .bind(&work.title)
    .bind(&work.subtitle)
    .bind(&work.language)
    .bind(&work.description)
    .bind(work.metadata.to_string())
    .bind(work.publisher_id.map(|id| id.to_string()))
    .bind(work.enabled)
    .bind(work.moderation_state.code())
    .bind(work.created_by.map(|id| id.to_string()))
    .bind(work.merged_into.map(|id| id.to_string()))
    .bind(work.deleted_at)
    .bind(work.tombstone_id.map(|id| id.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn load(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Option<Work>> {
    let query = format!("SELECT {} FROM works WHERE id = ?", WORK_COLUMNS);
    let row = sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(work_from_row).transpose()
}

/// Load a work or fail with `NotFound`
pub async fn require(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Work> {
    load(conn, id)
        .await?
        .ok_or_else(|| CoreError::not_found(EntityKind::Work, id))
}

/// Live work with this title whose subtitle/language match where given
///
/// Absent optional fields are wildcards, not null-equality tests.
pub async fn find_exact(
    conn: &mut SqliteConnection,
    title: &str,
    subtitle: Option<&str>,
    language: Option<&str>,
) -> CoreResult<Option<Work>> {
    let query = format!(
        r#"
        SELECT {} FROM works
        WHERE deleted_at IS NULL
          AND title = ? COLLATE NOCASE
          AND (? IS NULL OR subtitle = ? COLLATE NOCASE)
          AND (? IS NULL OR language = ?)
        ORDER BY created_at
        LIMIT 1
        "#,
        WORK_COLUMNS
    );
    let row = sqlx::query(&query)
        .bind(title)
        .bind(subtitle)
        .bind(subtitle)
        .bind(language)
        .bind(language)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(work_from_row).transpose()
}

pub async fn set_state(
    conn: &mut SqliteConnection,
    id: Uuid,
    state: ModerationState,
    enabled: bool,
) -> CoreResult<()> {
    sqlx::query(
        "UPDATE works SET moderation_state = ?, enabled = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(state.code())
    .bind(enabled)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Persist the editable fields of `work`
pub async fn update_fields(conn: &mut SqliteConnection, work: &Work) -> CoreResult<()> {
    sqlx::query(
        r#"
        UPDATE works
        SET title = ?, subtitle = ?, language = ?, description = ?, publisher_id = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(&work.title)
    .bind(&work.subtitle)
    .bind(&work.language)
    .bind(&work.description)
    .bind(work.publisher_id.map(|id| id.to_string()))
    .bind(work.id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn set_merged_into(conn: &mut SqliteConnection, source: Uuid, target: Uuid) -> CoreResult<()> {
    sqlx::query("UPDATE works SET merged_into = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(target.to_string())
        .bind(source.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Tombstone a live work; returns rows affected (0 when already tombstoned)
pub async fn tombstone(
    conn: &mut SqliteConnection,
    id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE works SET deleted_at = ?, tombstone_id = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(at)
    .bind(event.to_string())
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn clear_tombstone(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<u64> {
    let result = sqlx::query(
        "UPDATE works SET deleted_at = NULL, tombstone_id = NULL WHERE id = ? AND deleted_at IS NOT NULL",
    )
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn link_contributor(
    conn: &mut SqliteConnection,
    work_id: Uuid,
    contributor_id: Uuid,
    role: &str,
) -> CoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO work_contributors (work_id, contributor_id, role) VALUES (?, ?, ?)")
        .bind(work_id.to_string())
        .bind(contributor_id.to_string())
        .bind(role)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn link_series(
    conn: &mut SqliteConnection,
    work_id: Uuid,
    series_id: Uuid,
    position: Option<&str>,
) -> CoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO work_series (work_id, series_id, position) VALUES (?, ?, ?)")
        .bind(work_id.to_string())
        .bind(series_id.to_string())
        .bind(position)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub async fn link_genre(conn: &mut SqliteConnection, work_id: Uuid, genre_id: Uuid) -> CoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO work_genres (work_id, genre_id) VALUES (?, ?)")
        .bind(work_id.to_string())
        .bind(genre_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Copy identifier and vocabulary associations from `source` onto `target`
///
/// Associations the target already has are left as they are.
pub async fn copy_associations(conn: &mut SqliteConnection, source: Uuid, target: Uuid) -> CoreResult<u64> {
    let source = source.to_string();
    let target = target.to_string();
    let mut copied = 0;

    for statement in [
        "INSERT OR IGNORE INTO work_identifiers (work_id, identifier_id) \
         SELECT ?, identifier_id FROM work_identifiers WHERE work_id = ?",
        "INSERT OR IGNORE INTO work_contributors (work_id, contributor_id, role) \
         SELECT ?, contributor_id, role FROM work_contributors WHERE work_id = ?",
        "INSERT OR IGNORE INTO work_series (work_id, series_id, position) \
         SELECT ?, series_id, position FROM work_series WHERE work_id = ?",
        "INSERT OR IGNORE INTO work_genres (work_id, genre_id) \
         SELECT ?, genre_id FROM work_genres WHERE work_id = ?",
    ] {
        let result = sqlx::query(statement)
            .bind(&target)
            .bind(&source)
            .execute(&mut *conn)
            .await?;
        copied += result.rows_affected();
    }

    Ok(copied)
}
