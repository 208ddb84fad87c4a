//! Context retrieval for the advisor.
//!
//! A query is expanded with keywords and domain terms, searched in the
//! knowledge base, reranked with lexical and metadata boosts, thinned of
//! duplicates, and rendered into the context block the language model
//! answers from.

mod enhance;
mod format;
mod rank;

pub use enhance::enhance_query;
pub use format::{format_results, NO_RESULTS};
pub use rank::{deduplicate, rerank};

use grantwise_types::SearchHit;
use grantwise_vector::{KnowledgeBase, MetadataFilter, VectorError};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

/// Context returned when the search finds nothing at all.
pub const EMPTY_KNOWLEDGE_BASE: &str = "No relevant information found in the knowledge base.";

const DEADLINE_RESULTS: usize = 10;

/// Result of one retrieval pass.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub context: String,
    /// Hits that made it into the context, in context order.
    pub hits: Vec<SearchHit>,
    pub elapsed_ms: f64,
}

/// Optional facets for [`Retriever::filtered`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalFilters {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub location: Option<String>,
    pub disciplines: Option<String>,
}

impl RetrievalFilters {
    /// Type must match exactly; location and disciplines match as
    /// substrings.
    pub fn to_metadata_filter(&self) -> MetadataFilter {
        let mut filter = MetadataFilter::new();
        if let Some(kind) = self.kind.as_deref().filter(|v| !v.is_empty()) {
            filter = filter.eq("type", kind);
        }
        if let Some(location) = self.location.as_deref().filter(|v| !v.is_empty()) {
            filter = filter.contains("location", location);
        }
        if let Some(disciplines) = self.disciplines.as_deref().filter(|v| !v.is_empty()) {
            filter = filter.contains("disciplines", disciplines);
        }
        filter
    }
}

#[derive(Clone)]
pub struct Retriever {
    kb: Arc<KnowledgeBase>,
}

impl Retriever {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self { kb }
    }

    pub fn knowledge_base(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    /// Runs the full retrieval pipeline for `query`.
    ///
    /// With `rerank` set, twice as many candidates are fetched and the
    /// best `num_results` kept after reranking.
    pub async fn retrieve(
        &self,
        query: &str,
        num_results: usize,
        filter: Option<&MetadataFilter>,
        rerank_hits: bool,
    ) -> Result<Retrieval, VectorError> {
        let start = Instant::now();
        let enhanced = enhance_query(query);
        let fetch = if rerank_hits {
            num_results.saturating_mul(2)
        } else {
            num_results
        };

        let mut hits = self
            .kb
            .search(&enhanced, fetch, filter)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "retrieval failed"))?;

        if hits.is_empty() {
            tracing::warn!(query, "no results found");
            return Ok(Retrieval {
                context: EMPTY_KNOWLEDGE_BASE.to_string(),
                hits,
                elapsed_ms: elapsed_ms(start),
            });
        }

        if rerank_hits && hits.len() > num_results {
            hits = rerank(query, hits);
            hits.truncate(num_results);
        }
        let hits = deduplicate(hits);
        let context = format_results(&hits);
        let elapsed = elapsed_ms(start);
        tracing::info!(chunks = hits.len(), elapsed_ms = elapsed, "retrieved context");

        Ok(Retrieval {
            context,
            hits,
            elapsed_ms: elapsed,
        })
    }

    /// Retrieval restricted by opportunity type, location or discipline.
    pub async fn filtered(
        &self,
        query: &str,
        num_results: usize,
        filters: &RetrievalFilters,
    ) -> Result<Retrieval, VectorError> {
        let filter = filters.to_metadata_filter();
        self.retrieve(query, num_results, Some(&filter), true).await
    }

    /// Looks for opportunities whose text talks about upcoming deadlines.
    pub async fn upcoming_deadlines(&self, months_ahead: u32) -> Result<Retrieval, VectorError> {
        let query = format!(
            "deadline application due date within {} months upcoming",
            months_ahead
        );
        self.retrieve(&query, DEADLINE_RESULTS, None, true).await
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
