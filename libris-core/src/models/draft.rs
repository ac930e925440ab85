//! Submission payloads
//!
//! Drafts arrive already schema-validated by the transport layer; the checks
//! here cover the structural rules the engine itself depends on.

use crate::error::{CoreError, CoreResult};
use crate::identifiers::RawIdentifier;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkDraft {
    pub title: String,
    pub subtitle: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    /// Publisher name, matched or created on commit
    pub publisher: Option<String>,
    pub contributors: Vec<ContributorCredit>,
    pub series: Vec<SeriesEntry>,
    pub genres: Vec<String>,
    pub identifiers: Vec<RawIdentifier>,
    pub segments: Vec<SegmentDraft>,
    /// Images owned directly by the work
    pub images: Vec<ImageDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorCredit {
    pub name: String,
    /// author, narrator, translator, ...
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub name: String,
    /// Position within the series ("1", "2.5", ...)
    pub position: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentDraft {
    pub title: Option<String>,
    pub position: i64,
    pub duration_ms: Option<i64>,
    /// Index of an earlier top-level segment in the same draft
    pub parent: Option<usize>,
    pub contributors: Vec<ContributorCredit>,
    pub images: Vec<ImageDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDraft {
    pub uri: String,
    pub kind: String,
}

impl ImageDraft {
    pub fn cover(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            kind: "cover".to_string(),
        }
    }
}

impl WorkDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            metadata: serde_json::Value::Object(Default::default()),
            ..Default::default()
        }
    }

    /// Normalize whitespace and reject structurally invalid drafts
    pub fn validate(&mut self) -> CoreResult<()> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(CoreError::InvalidDraft("title must not be empty".to_string()));
        }
        self.subtitle = trimmed(self.subtitle.take());
        self.language = trimmed(self.language.take()).map(|l| l.to_lowercase());
        self.description = trimmed(self.description.take());
        self.publisher = trimmed(self.publisher.take());

        if self.metadata.is_null() {
            self.metadata = serde_json::Value::Object(Default::default());
        } else if !self.metadata.is_object() {
            return Err(CoreError::InvalidDraft("metadata must be a JSON object".to_string()));
        }

        for credit in &self.contributors {
            require_name("contributor", &credit.name)?;
        }
        for entry in &self.series {
            require_name("series", &entry.name)?;
        }
        for genre in &self.genres {
            require_name("genre", genre)?;
        }
        for image in &self.images {
            require_uri(image)?;
        }

        for (index, segment) in self.segments.iter().enumerate() {
            if let Some(parent) = segment.parent {
                if parent >= index {
                    return Err(CoreError::InvalidDraft(format!(
                        "segment {} names parent {} which is not an earlier segment",
                        index, parent
                    )));
                }
                if self.segments[parent].parent.is_some() {
                    return Err(CoreError::InvalidDraft(format!(
                        "segment {} nests under segment {} which already has a parent",
                        index, parent
                    )));
                }
            }
            for credit in &segment.contributors {
                require_name("contributor", &credit.name)?;
            }
            for image in &segment.images {
                require_uri(image)?;
            }
        }

        Ok(())
    }
}

/// Field changes for an existing work; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkPatch {
    pub title: Option<String>,
    pub subtitle: Option<Option<String>>,
    pub language: Option<Option<String>>,
    pub description: Option<Option<String>>,
    /// Publisher name; `Some(None)` clears it
    pub publisher: Option<Option<String>>,
}

impl WorkPatch {
    pub fn validate(&mut self) -> CoreResult<()> {
        if let Some(title) = self.title.as_mut() {
            *title = title.trim().to_string();
            if title.is_empty() {
                return Err(CoreError::InvalidDraft("title must not be empty".to_string()));
            }
        }
        if let Some(subtitle) = self.subtitle.as_mut() {
            *subtitle = trimmed(subtitle.take());
        }
        if let Some(language) = self.language.as_mut() {
            *language = trimmed(language.take()).map(|l| l.to_lowercase());
        }
        if let Some(description) = self.description.as_mut() {
            *description = trimmed(description.take());
        }
        if let Some(publisher) = self.publisher.as_mut() {
            *publisher = trimmed(publisher.take());
        }
        Ok(())
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn require_name(what: &str, name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::InvalidDraft(format!("{} name must not be empty", what)));
    }
    Ok(())
}

fn require_uri(image: &ImageDraft) -> CoreResult<()> {
    if image.uri.trim().is_empty() {
        return Err(CoreError::InvalidDraft("image uri must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_title_rejected() {
        let mut draft = WorkDraft::new("   ");
        assert!(matches!(draft.validate(), Err(CoreError::InvalidDraft(_))));
    }

    #[test]
    fn test_optional_fields_normalized() {
        let mut draft = WorkDraft::new("  Dune ");
        draft.subtitle = Some("   ".to_string());
        draft.language = Some(" EN ".to_string());

        draft.validate().unwrap();

        assert_eq!(draft.title, "Dune");
        assert_eq!(draft.subtitle, None);
        assert_eq!(draft.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_parent_must_be_earlier_segment() {
        let mut draft = WorkDraft::new("Dune");
        draft.segments = vec![
            SegmentDraft {
                parent: Some(1),
                ..Default::default()
            },
            SegmentDraft::default(),
        ];
        assert!(matches!(draft.validate(), Err(CoreError::InvalidDraft(_))));
    }

    #[test]
    fn test_parent_nesting_limited_to_one_level() {
        let mut draft = WorkDraft::new("Dune");
        draft.segments = vec![
            SegmentDraft::default(),
            SegmentDraft {
                parent: Some(0),
                ..Default::default()
            },
            SegmentDraft {
                parent: Some(1),
                ..Default::default()
            },
        ];
        assert!(matches!(draft.validate(), Err(CoreError::InvalidDraft(_))));
    }

    #[test]
    fn test_non_object_metadata_rejected() {
        let mut draft = WorkDraft::new("Dune");
        draft.metadata = serde_json::json!([1, 2]);
        assert!(matches!(draft.validate(), Err(CoreError::InvalidDraft(_))));
    }

    #[test]
    fn test_patch_clears_blank_subtitle() {
        let mut patch = WorkPatch {
            subtitle: Some(Some("  ".to_string())),
            ..Default::default()
        };
        patch.validate().unwrap();
        assert_eq!(patch.subtitle, Some(None));
    }
}
