//! Persisted settings
//!
//! The settings table holds key-value pairs that must survive restarts. The
//! only one the engine depends on is the activation-link signing secret.

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::RngCore;
use sqlx::SqlitePool;

/// Settings key for the activation-link signing secret (base64)
pub const SIGNING_SECRET_KEY: &str = "activation_signing_secret";

/// Length of a generated signing secret in bytes
pub const SIGNING_SECRET_LEN: usize = 32;

/// Read a setting value
pub async fn get_setting(db: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(db)
            .await?;

    Ok(value.flatten())
}

/// Insert or replace a setting value
pub async fn set_setting(db: &SqlitePool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(db)
    .await?;

    Ok(())
}

/// Load the signing secret, generating and storing one on first use
///
/// `configured` (base64, from the TOML config) wins over the stored value.
pub async fn load_signing_secret(db: &SqlitePool, configured: Option<&str>) -> Result<Vec<u8>> {
    if let Some(encoded) = configured {
        return decode_secret(encoded);
    }

    match get_setting(db, SIGNING_SECRET_KEY).await? {
        Some(encoded) => decode_secret(&encoded),
        None => initialize_signing_secret(db).await,
    }
}

/// Generate a random secret and persist it
///
/// `INSERT OR IGNORE` followed by a re-read keeps two processes starting at
/// once from ending up with different secrets.
pub async fn initialize_signing_secret(db: &SqlitePool) -> Result<Vec<u8>> {
    let mut secret = vec![0u8; SIGNING_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);

    sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(SIGNING_SECRET_KEY)
        .bind(STANDARD.encode(&secret))
        .execute(db)
        .await?;

    let stored = get_setting(db, SIGNING_SECRET_KEY)
        .await?
        .ok_or_else(|| Error::Internal("Signing secret missing after insert".to_string()))?;

    tracing::info!("Activation signing secret initialized");
    decode_secret(&stored)
}

fn decode_secret(encoded: &str) -> Result<Vec<u8>> {
    let secret = STANDARD
        .decode(encoded.trim())
        .map_err(|e| Error::Config(format!("Signing secret is not valid base64: {}", e)))?;

    if secret.len() < 16 {
        return Err(Error::Config(format!(
            "Signing secret too short ({} bytes, need at least 16)",
            secret.len()
        )));
    }

    Ok(secret)
}
