//! Shared types for the grantwise workspace.
//!
//! Holds the knowledge-base entry model, per-chunk vector metadata, search
//! hits, the internal RAG response, and the JSON request/response bodies
//! exposed by the HTTP API. Every other crate depends on this one for
//! cross-cutting definitions so the dependency graph stays acyclic.

mod api;

pub use api::{
    ContextChunk, ContextResponse, IngestRequest, IngestResponse, QueryRequest, QueryResponse,
    DEFAULT_NUM_RESULTS, MAX_NUM_RESULTS,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single grant, residency, or fellowship in the knowledge base.
///
/// This is the ingestion model: the vector store renders it into markdown,
/// chunks it, and indexes the chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantEntry {
    pub id: String,
    pub name: String,
    pub organization: String,
    pub description: String,
    /// Opportunity kind: `grant`, `residency`, `fellowship`, ...
    #[serde(rename = "type")]
    pub kind: String,
    pub disciplines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funding_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_requirements: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benefits: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past_recipients: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tips: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

/// Metadata stored alongside every indexed chunk.
///
/// Absent entry fields are stored as empty strings so that every backend
/// sees a flat map of scalars. All fields default on deserialization so
/// chunks written by other tools can still be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkMetadata {
    pub source_id: String,
    pub chunk_index: u32,
    pub entry_name: String,
    pub organization: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Comma-joined discipline list.
    pub disciplines: String,
    pub location: String,
    pub deadline: String,
    pub website: String,
    /// RFC 3339 timestamp of the ingestion that wrote this chunk.
    pub last_updated: String,
}

impl ChunkMetadata {
    /// Returns the string value of a metadata field by its wire name.
    ///
    /// Used by metadata filters. `chunk_index` is rendered as a decimal
    /// string; unknown fields return `None`.
    pub fn field(&self, name: &str) -> Option<String> {
        let value = match name {
            "source_id" => self.source_id.clone(),
            "chunk_index" => self.chunk_index.to_string(),
            "entry_name" => self.entry_name.clone(),
            "organization" => self.organization.clone(),
            "type" => self.kind.clone(),
            "disciplines" => self.disciplines.clone(),
            "location" => self.location.clone(),
            "deadline" => self.deadline.clone(),
            "website" => self.website.clone(),
            "last_updated" => self.last_updated.clone(),
            _ => return None,
        };
        Some(value)
    }
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Chunk ID (`<entry_id>_chunk_<n>`).
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Similarity score, `1 - distance`.
    pub score: f64,
}

/// Outcome of running a query through retrieval and generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    pub query: String,
    pub context: String,
    pub answer: String,
    /// Heuristic confidence in `[0.1, 1.0]`.
    pub confidence: f64,
    pub sources: Vec<String>,
    /// Milliseconds spent per pipeline step (`retrieval_ms`,
    /// `llm_generation_ms`, `total_ms`).
    pub processing_steps: BTreeMap<String, f64>,
}

/// Counters produced by a knowledge-base ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub entries_processed: usize,
    pub entries_added: usize,
    pub entries_updated: usize,
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn grant_entry_reads_type_field() {
        let entry: GrantEntry = serde_json::from_value(json!({
            "id": "g1",
            "name": "Studio Fellowship",
            "organization": "Arts Council",
            "description": "Twelve months of studio time.",
            "type": "fellowship",
            "disciplines": ["painting"],
            "benefits": ["studio", "stipend"]
        }))
        .unwrap();

        assert_eq!(entry.kind, "fellowship");
        assert_eq!(entry.benefits.as_deref(), Some(&["studio".to_string(), "stipend".to_string()][..]));
        assert!(entry.location.is_none());
    }

    #[test]
    fn grant_entry_requires_disciplines() {
        let result: Result<GrantEntry, _> = serde_json::from_value(json!({
            "id": "g1",
            "name": "n",
            "organization": "o",
            "description": "d",
            "type": "grant"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn chunk_metadata_tolerates_missing_fields() {
        let meta: ChunkMetadata =
            serde_json::from_value(json!({"entry_name": "Villa Albertine"})).unwrap();
        assert_eq!(meta.entry_name, "Villa Albertine");
        assert_eq!(meta.chunk_index, 0);
        assert_eq!(meta.field("type").as_deref(), Some(""));
        assert_eq!(meta.field("nope"), None);
    }
}
