//! Search index contract
//!
//! The catalog only consumes the query contract of an external full-text
//! index and keeps it in step with work visibility. `MemorySearchIndex` is a
//! small in-process implementation used by tests and the admin tool.

use crate::models::Work;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Fields a document exposes to search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchField {
    Title,
    Subtitle,
    Description,
}

/// Indexed view of a work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: Uuid,
    pub title: String,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub language: Option<String>,
}

impl SearchDocument {
    pub fn from_work(work: &Work) -> Self {
        Self {
            id: work.id,
            title: work.title.clone(),
            subtitle: work.subtitle.clone(),
            description: work.description.clone(),
            language: work.language.clone(),
        }
    }

    pub fn field(&self, field: SearchField) -> Option<&str> {
        match field {
            SearchField::Title => Some(self.title.as_str()),
            SearchField::Subtitle => self.subtitle.as_deref(),
            SearchField::Description => self.description.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    pub fields: Vec<SearchField>,
    pub limit: usize,
    /// Minimum relevance on the index's own scale
    pub score_threshold: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fields: vec![SearchField::Title, SearchField::Subtitle],
            limit: 20,
            score_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f64,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search index unavailable: {0}")]
    Unavailable(String),

    #[error("Search request rejected: {0}")]
    Rejected(String),
}

/// External full-text index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Best matches for `query`, highest score first
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>, SearchError>;

    /// Add or replace a document
    async fn upsert(&self, document: SearchDocument) -> Result<(), SearchError>;

    /// Drop a document; absent ids are not an error
    async fn remove(&self, id: Uuid) -> Result<(), SearchError>;
}

/// Bring the index in line with a work's visibility
///
/// Visible works are upserted, everything else removed. Runs after commit,
/// so a failure is logged and never undoes the committed write.
pub async fn sync_document(index: &dyn SearchIndex, work: &Work) {
    let result = if work.is_visible() {
        index.upsert(SearchDocument::from_work(work)).await
    } else {
        index.remove(work.id).await
    };
    if let Err(e) = result {
        tracing::warn!(work_id = %work.id, error = %e, "Search index update failed after commit");
    }
}

/// In-memory index scored by normalized Levenshtein similarity
///
/// A document scores the best of its per-field similarities and the similarity
/// of the requested fields joined in order, so "Foundation Book One" matches a
/// work titled "Foundation" with subtitle "Book One".
#[derive(Default)]
pub struct MemorySearchIndex {
    documents: RwLock<HashMap<Uuid, SearchDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.documents.read().await.contains_key(&id)
    }

    pub async fn get(&self, id: Uuid) -> Option<SearchDocument> {
        self.documents.read().await.get(&id).cloned()
    }
}

fn similarity(query: &str, text: &str) -> f64 {
    strsim::normalized_levenshtein(&query.to_lowercase(), &text.to_lowercase())
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>, SearchError> {
        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().await;
        let mut hits: Vec<SearchHit> = documents
            .values()
            .map(|doc| {
                // Whole-document text over the requested fields, in field order
                let combined = options
                    .fields
                    .iter()
                    .filter_map(|f| doc.field(*f))
                    .collect::<Vec<_>>()
                    .join(" ");
                let best_field = options
                    .fields
                    .iter()
                    .filter_map(|f| doc.field(*f))
                    .map(|text| similarity(query, text))
                    .fold(0.0_f64, f64::max);
                let score = best_field.max(similarity(query, &combined));
                SearchHit { id: doc.id, score }
            })
            .filter(|hit| hit.score > 0.0)
            .filter(|hit| options.score_threshold.map_or(true, |t| hit.score >= t))
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.limit);
        Ok(hits)
    }

    async fn upsert(&self, document: SearchDocument) -> Result<(), SearchError> {
        self.documents.write().await.insert(document.id, document);
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> Result<(), SearchError> {
        self.documents.write().await.remove(&id);
        Ok(())
    }
}
