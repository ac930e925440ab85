//! Persistence helpers
//!
//! Every helper takes `&mut SqliteConnection` so the same code runs on a
//! pooled connection for reads and inside a monitored transaction for writes.
//! Ids are stored as TEXT; tombstone columns are `deleted_at` (timestamp) and
//! `tombstone_id` (the event that set it).

pub mod actors;
pub mod identifiers;
pub mod images;
pub mod segments;
pub mod vocabulary;
pub mod works;

use crate::error::{CoreError, CoreResult};
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str) -> CoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| CoreError::corrupt(format!("uuid '{}'", value)))
}

pub(crate) fn parse_opt_uuid(value: Option<String>) -> CoreResult<Option<Uuid>> {
    value.as_deref().map(parse_uuid).transpose()
}
