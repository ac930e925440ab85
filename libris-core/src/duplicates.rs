//! Duplicate detection
//!
//! Three signals, all pure reads:
//! - exact: a live work with the same title and, where the draft gives them,
//!   the same subtitle and language. Blocks creation.
//! - identifier overlap: a normalized identifier already attached to a live
//!   work. Blocks creation.
//! - fuzzy: search-index hits at or above the configured threshold. Routes
//!   creation to `DUPLICATE_FOUND` but never blocks it.

use crate::error::{CoreError, CoreResult};
use crate::identifiers::Identifier;
use crate::models::{Work, WorkDraft};
use crate::search::{SearchField, SearchIndex, SearchOptions};
use crate::store;
use libris_common::config::DuplicateConfig;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Live works sharing one identifier with the draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierOverlap {
    pub identifier: Identifier,
    pub work_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    pub work_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub exact: Option<Work>,
    pub by_identifier: Vec<IdentifierOverlap>,
    pub fuzzy: Vec<FuzzyMatch>,
}

impl DuplicateReport {
    /// Fail on the blocking signals, exact match first
    pub fn reject_blocking(&self) -> CoreResult<()> {
        if let Some(existing) = &self.exact {
            return Err(CoreError::DuplicateExact { existing: existing.id });
        }
        if let Some(overlap) = self.by_identifier.first() {
            return Err(CoreError::DuplicateIdentifier {
                identifier: overlap.identifier.to_string(),
                existing: overlap.work_ids.clone(),
            });
        }
        Ok(())
    }

    pub fn has_fuzzy_hits(&self) -> bool {
        !self.fuzzy.is_empty()
    }
}

pub struct DuplicateDetector {
    search: Arc<dyn SearchIndex>,
    threshold: f64,
    limit: usize,
}

impl DuplicateDetector {
    pub fn new(search: Arc<dyn SearchIndex>, config: &DuplicateConfig) -> Self {
        Self {
            search,
            threshold: config.fuzzy_threshold,
            limit: config.fuzzy_limit,
        }
    }

    /// Exact and identifier signals; these decide rejection
    pub async fn find_blocking(
        &self,
        conn: &mut SqliteConnection,
        draft: &WorkDraft,
        identifiers: &[Identifier],
    ) -> CoreResult<DuplicateReport> {
        let exact = store::works::find_exact(
            conn,
            &draft.title,
            draft.subtitle.as_deref(),
            draft.language.as_deref(),
        )
        .await?;

        let mut by_identifier = Vec::new();
        for identifier in identifiers {
            let work_ids = store::identifiers::works_with_identifier(conn, identifier).await?;
            if !work_ids.is_empty() {
                by_identifier.push(IdentifierOverlap {
                    identifier: identifier.clone(),
                    work_ids,
                });
            }
        }

        debug!(
            title = %draft.title,
            exact = exact.is_some(),
            identifier_overlaps = by_identifier.len(),
            "Blocking duplicate checks complete"
        );

        Ok(DuplicateReport {
            exact,
            by_identifier,
            fuzzy: Vec::new(),
        })
    }

    /// Fuzzy search hits for the draft's title (and subtitle)
    ///
    /// An unavailable index yields no hits rather than failing the create.
    pub async fn find_fuzzy(&self, draft: &WorkDraft) -> Vec<FuzzyMatch> {
        let query = match &draft.subtitle {
            Some(subtitle) => format!("{} {}", draft.title, subtitle),
            None => draft.title.clone(),
        };
        let options = SearchOptions {
            fields: vec![SearchField::Title, SearchField::Subtitle],
            limit: self.limit,
            score_threshold: Some(self.threshold),
        };

        match self.search.search(&query, &options).await {
            Ok(hits) => {
                let matches: Vec<FuzzyMatch> = hits
                    .into_iter()
                    .filter(|hit| hit.score >= self.threshold)
                    .take(self.limit)
                    .map(|hit| FuzzyMatch {
                        work_id: hit.id,
                        score: hit.score,
                    })
                    .collect();
                debug!(query = %query, hits = matches.len(), "Fuzzy duplicate search complete");
                matches
            }
            Err(e) => {
                warn!(query = %query, error = %e, "Fuzzy duplicate search failed, treating as no hits");
                Vec::new()
            }
        }
    }

    /// All three signals
    pub async fn find_duplicates(
        &self,
        conn: &mut SqliteConnection,
        draft: &WorkDraft,
        identifiers: &[Identifier],
    ) -> CoreResult<DuplicateReport> {
        let mut report = self.find_blocking(conn, draft, identifiers).await?;
        report.fuzzy = self.find_fuzzy(draft).await;
        Ok(report)
    }
}
