//! # Libris Common Library
//!
//! Shared code for the Libris catalog crates:
//! - Error type and result alias
//! - Configuration loading and root folder resolution
//! - SQLite pool initialization, schema and monitored transactions
//! - Persisted settings (activation signing secret)
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
