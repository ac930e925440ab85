//! Vocabulary entities: contributors, series, genres, publishers
//!
//! They are created on demand by work submissions and retired by the
//! reclamation sweep once no live work reaches them.

use super::EntityKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyKind {
    Contributor,
    Series,
    Genre,
    Publisher,
}

impl VocabularyKind {
    pub const ALL: [VocabularyKind; 4] = [
        VocabularyKind::Contributor,
        VocabularyKind::Series,
        VocabularyKind::Genre,
        VocabularyKind::Publisher,
    ];

    /// Backing table; a fixed identifier, safe to splice into SQL
    pub fn table(&self) -> &'static str {
        match self {
            VocabularyKind::Contributor => "contributors",
            VocabularyKind::Series => "series",
            VocabularyKind::Genre => "genres",
            VocabularyKind::Publisher => "publishers",
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            VocabularyKind::Contributor => EntityKind::Contributor,
            VocabularyKind::Series => EntityKind::Series,
            VocabularyKind::Genre => EntityKind::Genre,
            VocabularyKind::Publisher => EntityKind::Publisher,
        }
    }

    /// SQL condition true when row `v` is joined to at least one live work
    pub(crate) fn reachable_condition(&self) -> &'static str {
        match self {
            VocabularyKind::Contributor => {
                r#"EXISTS (
                    SELECT 1 FROM work_contributors wc
                    JOIN works w ON w.id = wc.work_id
                    WHERE wc.contributor_id = v.id AND w.deleted_at IS NULL
                ) OR EXISTS (
                    SELECT 1 FROM segment_contributors sc
                    JOIN segments s ON s.id = sc.segment_id
                    JOIN works w ON w.id = s.work_id
                    WHERE sc.contributor_id = v.id
                      AND s.deleted_at IS NULL
                      AND w.deleted_at IS NULL
                )"#
            }
            VocabularyKind::Series => {
                r#"EXISTS (
                    SELECT 1 FROM work_series ws
                    JOIN works w ON w.id = ws.work_id
                    WHERE ws.series_id = v.id AND w.deleted_at IS NULL
                )"#
            }
            VocabularyKind::Genre => {
                r#"EXISTS (
                    SELECT 1 FROM work_genres wg
                    JOIN works w ON w.id = wg.work_id
                    WHERE wg.genre_id = v.id AND w.deleted_at IS NULL
                )"#
            }
            VocabularyKind::Publisher => {
                r#"EXISTS (
                    SELECT 1 FROM works w
                    WHERE w.publisher_id = v.id AND w.deleted_at IS NULL
                )"#
            }
        }
    }
}

impl std::fmt::Display for VocabularyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entity_kind().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: Uuid,
    pub kind: VocabularyKind,
    pub name: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub tombstone_id: Option<Uuid>,
}

impl VocabularyEntry {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}
