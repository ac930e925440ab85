//! Database initialization
//!
//! Opens (or creates) the catalog database and brings the schema up to date.
//! Table creation is idempotent, so this runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas go on the connect options so every pooled connection gets them
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every catalog table and index
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_users_table(pool).await?;
    create_settings_table(pool).await?;

    // Vocabulary entities
    for table in VOCABULARY_TABLES {
        create_vocabulary_table(pool, table).await?;
    }

    create_works_table(pool).await?;
    create_segments_table(pool).await?;
    create_images_table(pool).await?;
    create_identifiers_table(pool).await?;

    // Linking tables
    create_association_tables(pool).await?;

    create_moderation_log_table(pool).await?;

    Ok(())
}

/// Vocabulary tables share one shape: id, name, tombstone columns
pub const VOCABULARY_TABLES: [&str; 4] = ["contributors", "series", "genres", "publishers"];

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            role INTEGER NOT NULL DEFAULT 0,
            grants TEXT NOT NULL DEFAULT '[]',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores application key-value pairs (activation signing secret).
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_vocabulary_table(pool: &SqlitePool, table: &str) -> Result<()> {
    // Table names come from VOCABULARY_TABLES, never from input
    let ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT,
            tombstone_id TEXT
        )
        "#
    );
    sqlx::query(&ddl).execute(pool).await?;

    let index = format!("CREATE INDEX IF NOT EXISTS idx_{table}_name ON {table}(name)");
    sqlx::query(&index).execute(pool).await?;

    Ok(())
}

async fn create_works_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            subtitle TEXT,
            language TEXT,
            description TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            publisher_id TEXT REFERENCES publishers(id),
            enabled INTEGER NOT NULL DEFAULT 0,
            moderation_state INTEGER NOT NULL DEFAULT 0,
            created_by TEXT,
            merged_into TEXT REFERENCES works(id),
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT,
            tombstone_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_title ON works(title)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_publisher ON works(publisher_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_segments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segments (
            id TEXT PRIMARY KEY,
            work_id TEXT NOT NULL REFERENCES works(id),
            parent_id TEXT REFERENCES segments(id),
            title TEXT,
            position INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT,
            tombstone_id TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_segments_work ON segments(work_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_segments_parent ON segments(parent_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    // Exactly one owner: a work or a segment, never both, never neither
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id TEXT PRIMARY KEY,
            work_id TEXT REFERENCES works(id),
            segment_id TEXT REFERENCES segments(id),
            uri TEXT NOT NULL,
            kind TEXT NOT NULL DEFAULT 'cover',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            deleted_at TEXT,
            tombstone_id TEXT,
            CHECK ((work_id IS NULL) <> (segment_id IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_work ON images(work_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_segment ON images(segment_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_identifiers_table(pool: &SqlitePool) -> Result<()> {
    // region is '' for kinds without one so the UNIQUE constraint holds
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identifiers (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            value TEXT NOT NULL,
            region TEXT NOT NULL DEFAULT '',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(kind, value, region)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_association_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_identifiers (
            work_id TEXT NOT NULL REFERENCES works(id),
            identifier_id TEXT NOT NULL REFERENCES identifiers(id),
            PRIMARY KEY (work_id, identifier_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_contributors (
            work_id TEXT NOT NULL REFERENCES works(id),
            contributor_id TEXT NOT NULL REFERENCES contributors(id),
            role TEXT NOT NULL DEFAULT 'author',
            PRIMARY KEY (work_id, contributor_id, role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_series (
            work_id TEXT NOT NULL REFERENCES works(id),
            series_id TEXT NOT NULL REFERENCES series(id),
            position TEXT,
            PRIMARY KEY (work_id, series_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_genres (
            work_id TEXT NOT NULL REFERENCES works(id),
            genre_id TEXT NOT NULL REFERENCES genres(id),
            PRIMARY KEY (work_id, genre_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS segment_contributors (
            segment_id TEXT NOT NULL REFERENCES segments(id),
            contributor_id TEXT NOT NULL REFERENCES contributors(id),
            role TEXT NOT NULL DEFAULT 'narrator',
            PRIMARY KEY (segment_id, contributor_id, role)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for (index, table, column) in [
        ("idx_work_identifiers_identifier", "work_identifiers", "identifier_id"),
        ("idx_work_contributors_contributor", "work_contributors", "contributor_id"),
        ("idx_work_series_series", "work_series", "series_id"),
        ("idx_work_genres_genre", "work_genres", "genre_id"),
        ("idx_segment_contributors_contributor", "segment_contributors", "contributor_id"),
    ] {
        let ddl = format!("CREATE INDEX IF NOT EXISTS {index} ON {table}({column})");
        sqlx::query(&ddl).execute(pool).await?;
    }

    Ok(())
}

async fn create_moderation_log_table(pool: &SqlitePool) -> Result<()> {
    // Append-only: nothing in Libris updates or deletes these rows
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS moderation_log (
            id TEXT PRIMARY KEY,
            target_kind TEXT NOT NULL,
            target_id TEXT NOT NULL,
            action TEXT NOT NULL,
            actor_id TEXT,
            changes TEXT NOT NULL DEFAULT '{}',
            moderation_state INTEGER,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_moderation_log_target ON moderation_log(target_kind, target_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
