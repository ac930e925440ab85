//! Error type shared by the Libris crates

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised below the lifecycle engine: storage, files, config
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure surfaced by sqlx
    #[error("Storage error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file unreadable, unparsable, or out of bounds
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed value handed in by a caller (e.g. a non-base64 secret)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
