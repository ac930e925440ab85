//! Contributors, series, genres and publishers
//!
//! All four tables share one shape, so the helpers take a `VocabularyKind`
//! and splice its fixed table name into the statement.

use super::{parse_opt_uuid, parse_uuid};
use crate::error::CoreResult;
use crate::models::{VocabularyEntry, VocabularyKind};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// How `get_or_create` satisfied a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Existing,
    Created,
    /// A tombstoned entry with this name was brought back
    Revived,
}

fn entry_from_row(kind: VocabularyKind, row: &SqliteRow) -> CoreResult<VocabularyEntry> {
    let id: String = row.get("id");
    Ok(VocabularyEntry {
        id: parse_uuid(&id)?,
        kind,
        name: row.get("name"),
        deleted_at: row.get("deleted_at"),
        tombstone_id: parse_opt_uuid(row.get("tombstone_id"))?,
    })
}

pub async fn load(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    id: Uuid,
) -> CoreResult<Option<VocabularyEntry>> {
    let query = format!(
        "SELECT id, name, deleted_at, tombstone_id FROM {} WHERE id = ?",
        kind.table()
    );
    let row = sqlx::query(&query)
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(|r| entry_from_row(kind, r)).transpose()
}

/// Find an entry by exact name (case-insensitive), preferring a live one
pub async fn find_by_name(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    name: &str,
) -> CoreResult<Option<VocabularyEntry>> {
    let query = format!(
        r#"
        SELECT id, name, deleted_at, tombstone_id FROM {}
        WHERE name = ? COLLATE NOCASE
        ORDER BY deleted_at IS NOT NULL, rowid
        LIMIT 1
        "#,
        kind.table()
    );
    let row = sqlx::query(&query)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(|r| entry_from_row(kind, r)).transpose()
}

/// Resolve a name to an entry, reviving or creating it as needed
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    name: &str,
) -> CoreResult<(VocabularyEntry, Resolution)> {
    let name = name.trim();

    if let Some(mut entry) = find_by_name(conn, kind, name).await? {
        if entry.is_live() {
            return Ok((entry, Resolution::Existing));
        }
        clear_tombstone(conn, kind, entry.id).await?;
        entry.deleted_at = None;
        entry.tombstone_id = None;
        return Ok((entry, Resolution::Revived));
    }

    let entry = VocabularyEntry {
        id: Uuid::new_v4(),
        kind,
        name: name.to_string(),
        deleted_at: None,
        tombstone_id: None,
    };
    let query = format!("INSERT INTO {} (id, name) VALUES (?, ?)", kind.table());
    sqlx::query(&query)
        .bind(entry.id.to_string())
        .bind(&entry.name)
        .execute(&mut *conn)
        .await?;

    Ok((entry, Resolution::Created))
}

pub async fn clear_tombstone(conn: &mut SqliteConnection, kind: VocabularyKind, id: Uuid) -> CoreResult<u64> {
    let query = format!(
        "UPDATE {} SET deleted_at = NULL, tombstone_id = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        kind.table()
    );
    let result = sqlx::query(&query)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

/// Tombstoned entries of `kind` associated with the work
pub async fn tombstoned_for_work(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    work_id: Uuid,
) -> CoreResult<Vec<VocabularyEntry>> {
    let link = match kind {
        VocabularyKind::Contributor => {
            r#"v.id IN (
                SELECT contributor_id FROM work_contributors WHERE work_id = ?1
                UNION
                SELECT sc.contributor_id FROM segment_contributors sc
                JOIN segments s ON s.id = sc.segment_id
                WHERE s.work_id = ?1 AND s.deleted_at IS NULL
            )"#
        }
        VocabularyKind::Series => "v.id IN (SELECT series_id FROM work_series WHERE work_id = ?1)",
        VocabularyKind::Genre => "v.id IN (SELECT genre_id FROM work_genres WHERE work_id = ?1)",
        VocabularyKind::Publisher => "v.id IN (SELECT publisher_id FROM works WHERE id = ?1)",
    };
    let query = format!(
        "SELECT v.id, v.name, v.deleted_at, v.tombstone_id FROM {} v WHERE v.deleted_at IS NOT NULL AND {}",
        kind.table(),
        link
    );
    let rows = sqlx::query(&query)
        .bind(work_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(|r| entry_from_row(kind, r)).collect()
}

/// Live entries of `kind` that no live work reaches
///
/// Read-only; the reachability rules live in `VocabularyKind`.
pub async fn unreachable(conn: &mut SqliteConnection, kind: VocabularyKind) -> CoreResult<Vec<VocabularyEntry>> {
    let query = format!(
        r#"
        SELECT v.id, v.name, v.deleted_at, v.tombstone_id FROM {} v
        WHERE v.deleted_at IS NULL AND NOT ({})
        ORDER BY v.rowid
        "#,
        kind.table(),
        kind.reachable_condition()
    );
    let rows = sqlx::query(&query).fetch_all(&mut *conn).await?;

    rows.iter().map(|r| entry_from_row(kind, r)).collect()
}

/// Tombstone an entry if it is still live and still unreachable
pub async fn tombstone_unreachable(
    conn: &mut SqliteConnection,
    kind: VocabularyKind,
    id: Uuid,
    at: DateTime<Utc>,
    event: Uuid,
) -> CoreResult<u64> {
    let query = format!(
        r#"
        UPDATE {table} SET deleted_at = ?, tombstone_id = ?
        WHERE id IN (
            SELECT v.id FROM {table} v
            WHERE v.id = ? AND v.deleted_at IS NULL AND NOT ({reachable})
        )
        "#,
        table = kind.table(),
        reachable = kind.reachable_condition()
    );
    let result = sqlx::query(&query)
        .bind(at)
        .bind(event.to_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
