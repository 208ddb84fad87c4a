//! Request and response bodies for the HTTP API.

use crate::ChunkMetadata;
use serde::{Deserialize, Serialize};

/// Number of context chunks retrieved when a request does not say.
pub const DEFAULT_NUM_RESULTS: usize = 5;

/// Upper bound on the context chunks a single request may ask for.
pub const MAX_NUM_RESULTS: usize = 50;

/// Body of `POST /query` and `POST /retrieve_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub num_results: Option<usize>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl QueryRequest {
    /// Requested result count, defaulted when absent or zero and capped at
    /// [`MAX_NUM_RESULTS`].
    pub fn num_results(&self) -> usize {
        match self.num_results {
            Some(n) if n > 0 => n.min(MAX_NUM_RESULTS),
            _ => DEFAULT_NUM_RESULTS,
        }
    }
}

/// Body of `POST /ingest`.
///
/// `data` takes precedence over `file_path` when both are present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_added: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries_updated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextChunk {
    pub text: String,
    pub score: f64,
    pub metadata: ChunkMetadata,
    pub chunk_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResponse {
    pub query: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<ContextChunk>>,
    pub num_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_used: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
}
