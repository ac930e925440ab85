//! User rows resolved into actors

use super::parse_uuid;
use crate::error::{CoreError, CoreResult};
use crate::models::EntityKind;
use crate::privileges::{Actor, Capability, CapabilitySet, Role};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

fn actor_from_row(row: &SqliteRow) -> CoreResult<Actor> {
    let id: String = row.get("id");
    let role: i64 = row.get("role");
    let grants: String = row.get("grants");

    let grants: Vec<String> = serde_json::from_str(&grants)
        .map_err(|e| CoreError::corrupt(format!("user {} grants: {}", id, e)))?;
    let grants = grants
        .iter()
        .map(|g| g.parse::<Capability>().map_err(CoreError::corrupt))
        .collect::<CoreResult<CapabilitySet>>()?;

    Ok(Actor {
        id: parse_uuid(&id)?,
        role: Role::from_ordinal(role).ok_or_else(|| CoreError::corrupt(format!("role {}", role)))?,
        grants,
    })
}

pub async fn insert_user(
    conn: &mut SqliteConnection,
    username: &str,
    role: Role,
    grants: &[Capability],
) -> CoreResult<Actor> {
    let actor = Actor {
        id: Uuid::new_v4(),
        role,
        grants: grants.iter().copied().collect(),
    };
    let grant_names: Vec<&str> = actor.grants.iter().map(|c| c.as_str()).collect();

    sqlx::query("INSERT INTO users (id, username, role, grants) VALUES (?, ?, ?, ?)")
        .bind(actor.id.to_string())
        .bind(username)
        .bind(role.ordinal())
        .bind(serde_json::to_string(&grant_names).unwrap_or_else(|_| "[]".to_string()))
        .execute(&mut *conn)
        .await?;

    Ok(actor)
}

pub async fn load_actor(conn: &mut SqliteConnection, id: Uuid) -> CoreResult<Actor> {
    let row = sqlx::query("SELECT id, role, grants FROM users WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some(row) => actor_from_row(&row),
        None => Err(CoreError::not_found(EntityKind::User, id)),
    }
}

pub async fn find_by_username(conn: &mut SqliteConnection, username: &str) -> CoreResult<Option<Actor>> {
    let row = sqlx::query("SELECT id, role, grants FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;

    row.as_ref().map(actor_from_row).transpose()
}
