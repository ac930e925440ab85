//! Catalog data model

pub mod draft;
pub mod moderation;
pub mod vocabulary;
pub mod work;

pub use draft::{ContributorCredit, ImageDraft, SegmentDraft, SeriesEntry, WorkDraft, WorkPatch};
pub use moderation::ModerationState;
pub use vocabulary::{VocabularyEntry, VocabularyKind};
pub use work::{HasDerivedImageUrls, Image, ImageOwner, Segment, Work};

use serde::{Deserialize, Serialize};

/// Every kind of record the engine can address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Work,
    Segment,
    Image,
    Contributor,
    Series,
    Genre,
    Publisher,
    User,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Work => "work",
            EntityKind::Segment => "segment",
            EntityKind::Image => "image",
            EntityKind::Contributor => "contributor",
            EntityKind::Series => "series",
            EntityKind::Genre => "genre",
            EntityKind::Publisher => "publisher",
            EntityKind::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "work" => EntityKind::Work,
            "segment" => EntityKind::Segment,
            "image" => EntityKind::Image,
            "contributor" => EntityKind::Contributor,
            "series" => EntityKind::Series,
            "genre" => EntityKind::Genre,
            "publisher" => EntityKind::Publisher,
            "user" => EntityKind::User,
            _ => return None,
        })
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
