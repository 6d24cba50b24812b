//! SectionStore trait: the vector store as seen by the search pipeline.
//!
//! The store owns the embeddings of the documentation sections and exposes
//! one similarity query. The primary implementation is `SupabaseStore`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::SearchSettings;
use crate::core::errors::UpstreamError;

/// A documentation section returned by the similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSection {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub page_id: Option<i64>,
    pub content: String,
    /// Cosine similarity to the query (higher = better).
    #[serde(default)]
    pub similarity: f64,
}

/// Filters applied by the store when ranking sections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchParams {
    pub match_threshold: f64,
    pub match_count: u32,
    pub min_content_length: u32,
}

impl From<&SearchSettings> for MatchParams {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            match_threshold: settings.match_threshold,
            match_count: settings.match_count,
            min_content_length: settings.min_content_length,
        }
    }
}

#[async_trait]
pub trait SectionStore: Send + Sync {
    /// Sections above `match_threshold`, longer than `min_content_length`,
    /// ordered by descending similarity and capped at `match_count`.
    async fn match_page_sections(
        &self,
        embedding: &[f32],
        params: &MatchParams,
    ) -> Result<Vec<PageSection>, UpstreamError>;
}
