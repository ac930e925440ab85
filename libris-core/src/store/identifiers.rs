//! Normalized identifiers and their work associations

use super::parse_uuid;
use crate::error::CoreResult;
use crate::identifiers::Identifier;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

/// Id of the stored identifier row, inserting it when new
pub async fn get_or_create(conn: &mut SqliteConnection, identifier: &Identifier) -> CoreResult<Uuid> {
    sqlx::query("INSERT OR IGNORE INTO identifiers (id, kind, value, region) VALUES (?, ?, ?, ?)")
        .bind(Uuid::new_v4().to_string())
        .bind(identifier.kind.as_str())
        .bind(&identifier.value)
        .bind(identifier.region_column())
        .execute(&mut *conn)
        .await?;

    let id: String =
        sqlx::query_scalar("SELECT id FROM identifiers WHERE kind = ? AND value = ? AND region = ?")
            .bind(identifier.kind.as_str())
            .bind(&identifier.value)
            .bind(identifier.region_column())
            .fetch_one(&mut *conn)
            .await?;

    parse_uuid(&id)
}

pub async fn link(conn: &mut SqliteConnection, work_id: Uuid, identifier_id: Uuid) -> CoreResult<()> {
    sqlx::query("INSERT OR IGNORE INTO work_identifiers (work_id, identifier_id) VALUES (?, ?)")
        .bind(work_id.to_string())
        .bind(identifier_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Live works already carrying `identifier`
pub async fn works_with_identifier(
    conn: &mut SqliteConnection,
    identifier: &Identifier,
) -> CoreResult<Vec<Uuid>> {
    let rows = sqlx::query(
        r#"
        SELECT w.id AS id
        FROM identifiers i
        JOIN work_identifiers wi ON wi.identifier_id = i.id
        JOIN works w ON w.id = wi.work_id
        WHERE i.kind = ? AND i.value = ? AND i.region = ? AND w.deleted_at IS NULL
        ORDER BY w.created_at
        "#,
    )
    .bind(identifier.kind.as_str())
    .bind(&identifier.value)
    .bind(identifier.region_column())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            parse_uuid(&id)
        })
        .collect()
}

/// Display keys (`kind:value[@region]`) of a work's identifiers
pub async fn keys_for_work(conn: &mut SqliteConnection, work_id: Uuid) -> CoreResult<Vec<String>> {
    let rows = sqlx::query(
        r#"
        SELECT i.kind AS kind, i.value AS value, i.region AS region
        FROM identifiers i
        JOIN work_identifiers wi ON wi.identifier_id = i.id
        WHERE wi.work_id = ?
        ORDER BY i.kind, i.value
        "#,
    )
    .bind(work_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let kind: String = row.get("kind");
            let value: String = row.get("value");
            let region: String = row.get("region");
            if region.is_empty() {
                format!("{}:{}", kind, value)
            } else {
                format!("{}:{}@{}", kind, value, region)
            }
        })
        .collect())
}
