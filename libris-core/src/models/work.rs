//! Works, segments and images

use super::{EntityKind, ModerationState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A catalogued work (book / audiobook)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    /// Free-form structured metadata (edition, release date, ...)
    pub metadata: serde_json::Value,
    pub publisher_id: Option<Uuid>,
    /// Visible and searchable; independent of `deleted_at`
    pub enabled: bool,
    pub moderation_state: ModerationState,
    /// Submitting actor
    pub created_by: Option<Uuid>,
    pub merged_into: Option<Uuid>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Tombstone event that retired this row
    pub tombstone_id: Option<Uuid>,
}

impl Work {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Discoverable: enabled and not tombstoned
    pub fn is_visible(&self) -> bool {
        self.enabled && self.is_live()
    }
}

/// A track / chapter belonging to exactly one work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub work_id: Uuid,
    /// Parent segment (one level), resolved by lookup
    pub parent_id: Option<Uuid>,
    pub title: Option<String>,
    pub position: i64,
    pub duration_ms: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub tombstone_id: Option<Uuid>,
}

impl Segment {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Image owner: a work or a segment, never both, never neither
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ImageOwner {
    Work(Uuid),
    Segment(Uuid),
}

impl ImageOwner {
    /// Build from the two nullable owner columns
    pub fn from_columns(work_id: Option<Uuid>, segment_id: Option<Uuid>) -> Option<Self> {
        match (work_id, segment_id) {
            (Some(work), None) => Some(ImageOwner::Work(work)),
            (None, Some(segment)) => Some(ImageOwner::Segment(segment)),
            _ => None,
        }
    }

    pub fn work_id(&self) -> Option<Uuid> {
        match self {
            ImageOwner::Work(id) => Some(*id),
            ImageOwner::Segment(_) => None,
        }
    }

    pub fn segment_id(&self) -> Option<Uuid> {
        match self {
            ImageOwner::Work(_) => None,
            ImageOwner::Segment(id) => Some(*id),
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ImageOwner::Work(_) => EntityKind::Work,
            ImageOwner::Segment(_) => EntityKind::Segment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub owner: ImageOwner,
    /// Storage key; file storage itself lives outside the engine
    pub uri: String,
    pub kind: String,
    pub deleted_at: Option<DateTime<Utc>>,
    pub tombstone_id: Option<Uuid>,
}

impl Image {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Records that own images and expose public URLs for them
pub trait HasDerivedImageUrls {
    fn image_owner(&self) -> ImageOwner;

    /// Public URLs of this record's live images under `base_url`
    fn image_urls(&self, images: &[Image], base_url: &str) -> Vec<String> {
        let owner = self.image_owner();
        let base = base_url.trim_end_matches('/');
        images
            .iter()
            .filter(|image| image.owner == owner && image.is_live())
            .map(|image| format!("{}/images/{}", base, image.uri.trim_start_matches('/')))
            .collect()
    }
}

impl HasDerivedImageUrls for Work {
    fn image_owner(&self) -> ImageOwner {
        ImageOwner::Work(self.id)
    }
}

impl HasDerivedImageUrls for Segment {
    fn image_owner(&self) -> ImageOwner {
        ImageOwner::Segment(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(owner: ImageOwner, uri: &str, deleted: bool) -> Image {
        Image {
            id: Uuid::new_v4(),
            owner,
            uri: uri.to_string(),
            kind: "cover".to_string(),
            deleted_at: deleted.then(Utc::now),
            tombstone_id: None,
        }
    }

    #[test]
    fn test_owner_from_columns() {
        let id = Uuid::new_v4();
        assert_eq!(ImageOwner::from_columns(Some(id), None), Some(ImageOwner::Work(id)));
        assert_eq!(ImageOwner::from_columns(None, Some(id)), Some(ImageOwner::Segment(id)));
        assert_eq!(ImageOwner::from_columns(None, None), None);
        assert_eq!(ImageOwner::from_columns(Some(id), Some(id)), None);
    }

    #[test]
    fn test_image_urls_only_live_own_images() {
        let segment = Segment {
            id: Uuid::new_v4(),
            work_id: Uuid::new_v4(),
            parent_id: None,
            title: None,
            position: 0,
            duration_ms: None,
            deleted_at: None,
            tombstone_id: None,
        };
        let images = vec![
            image(ImageOwner::Segment(segment.id), "/a.jpg", false),
            image(ImageOwner::Segment(segment.id), "b.jpg", true),
            image(ImageOwner::Work(segment.work_id), "c.jpg", false),
        ];

        let urls = segment.image_urls(&images, "https://cdn.example.org/");
        assert_eq!(urls, vec!["https://cdn.example.org/images/a.jpg".to_string()]);
    }
}
