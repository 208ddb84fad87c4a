//! Knowledge-base ingestion and search on top of a [`VectorStore`].

use crate::error::VectorError;
use crate::filter::MetadataFilter;
use crate::store::{VectorRecord, VectorStore};
use grantwise_llm::Embedder;
use grantwise_text::TextProcessor;
use grantwise_types::{ChunkMetadata, GrantEntry, IngestReport, SearchHit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Collection used for the grants and residencies knowledge base.
pub const COLLECTION_NAME: &str = "art_grants_residencies";

const INFO_SAMPLE_SIZE: usize = 10;
const INFO_MAX_ENTRIES: usize = 5;

/// Chunking parameters, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
        }
    }
}

/// Summary reported by the admin API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub total_chunks: usize,
    pub sample_entries: Vec<String>,
    pub collection_name: String,
    pub vector_db_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryOutcome {
    Added,
    Updated,
    Exists,
}

pub struct KnowledgeBase {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    processor: TextProcessor,
    chunking: ChunkSettings,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        processor: TextProcessor,
        chunking: ChunkSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            processor,
            chunking,
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn count(&self) -> Result<usize, VectorError> {
        self.store.count().await
    }

    /// Reads a JSON knowledge-base file and ingests its entries.
    pub async fn ingest_file(&self, path: &Path, force_update: bool) -> Result<IngestReport, VectorError> {
        tracing::info!(path = %path.display(), force_update, "starting ingestion");
        let raw = tokio::fs::read_to_string(path).await?;
        let data: Value = serde_json::from_str(&raw)?;
        Ok(self.ingest_value(&data, force_update).await)
    }

    /// Ingests entries from an already parsed document.
    ///
    /// Entry failures are collected into the report and do not stop the run.
    pub async fn ingest_value(&self, data: &Value, force_update: bool) -> IngestReport {
        let entries = entries_of(data);
        tracing::info!(count = entries.len(), "found knowledge-base entries");

        let mut report = IngestReport::default();
        for raw in entries {
            let result = match serde_json::from_value::<GrantEntry>(raw.clone()) {
                Ok(entry) => self.process_entry(&entry, force_update).await,
                Err(e) => Err(VectorError::Json(e)),
            };
            match result {
                Ok(outcome) => {
                    report.entries_processed += 1;
                    match outcome {
                        EntryOutcome::Added => report.entries_added += 1,
                        EntryOutcome::Updated => report.entries_updated += 1,
                        EntryOutcome::Exists => {}
                    }
                }
                Err(e) => {
                    let id = raw.get("id").and_then(Value::as_str).unwrap_or("unknown");
                    let message = format!("Error processing entry {}: {}", id, e);
                    tracing::error!("{}", message);
                    report.errors.push(message);
                }
            }
        }

        tracing::info!(
            processed = report.entries_processed,
            added = report.entries_added,
            updated = report.entries_updated,
            errors = report.errors.len(),
            "ingestion complete"
        );
        report
    }

    async fn process_entry(&self, entry: &GrantEntry, force_update: bool) -> Result<EntryOutcome, VectorError> {
        let entry_id = entry_id(entry);
        let existing = self.store.get(&[chunk_id(&entry_id, 0)]).await?;
        let exists = !existing.is_empty();
        if exists && !force_update {
            return Ok(EntryOutcome::Exists);
        }

        let text = render_entry(entry);
        let chunks = self
            .processor
            .create_chunks(&text, self.chunking.chunk_size, self.chunking.chunk_overlap);
        let embeddings = self.embedder.embed(&chunks).await?;

        let disciplines = entry.disciplines.join(",");
        let last_updated = chrono::Utc::now().to_rfc3339();
        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (document, embedding))| VectorRecord {
                id: chunk_id(&entry_id, i),
                document,
                metadata: ChunkMetadata {
                    source_id: entry_id.clone(),
                    chunk_index: i as u32,
                    entry_name: entry.name.clone(),
                    organization: entry.organization.clone(),
                    kind: entry.kind.clone(),
                    disciplines: disciplines.clone(),
                    location: entry.location.clone().unwrap_or_default(),
                    deadline: entry.deadline.clone().unwrap_or_default(),
                    website: entry.website.clone().unwrap_or_default(),
                    last_updated: last_updated.clone(),
                },
                embedding,
            })
            .collect();

        // Upsert before pruning so a failed write leaves the old version intact.
        let count = records.len();
        self.store.upsert(records).await?;
        tracing::debug!(entry = %entry.name, chunks = count, "indexed entry");
        if exists {
            let removed = self.store.delete_chunks_from(&entry_id, count).await?;
            if removed > 0 {
                tracing::debug!(entry = %entry.name, removed, "removed stale chunks");
            }
        }

        Ok(if exists {
            EntryOutcome::Updated
        } else {
            EntryOutcome::Added
        })
    }

    /// Embeds `query` and returns the `n` closest chunks as hits scored
    /// `1 - distance`.
    pub async fn search(
        &self,
        query: &str,
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>, VectorError> {
        let embedding = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                VectorError::Embedding(grantwise_llm::LlmError::EmptyResponse)
            })?;

        let filter = filter.filter(|f| !f.is_empty());
        let matches = self.store.query(&embedding, n, filter).await.inspect_err(|e| {
            tracing::error!(error = %e, "search failed");
        })?;

        Ok(matches
            .into_iter()
            .map(|m| SearchHit {
                id: m.record.id,
                text: m.record.document,
                metadata: m.record.metadata,
                score: 1.0 - m.distance,
            })
            .collect())
    }

    pub async fn collection_info(&self) -> Result<CollectionInfo, VectorError> {
        let total_chunks = self.store.count().await?;
        let sample = self.store.peek(INFO_SAMPLE_SIZE).await?;
        let names: BTreeSet<String> = sample
            .into_iter()
            .map(|r| r.metadata.entry_name)
            .filter(|name| !name.is_empty())
            .collect();

        Ok(CollectionInfo {
            total_chunks,
            sample_entries: names.into_iter().take(INFO_MAX_ENTRIES).collect(),
            collection_name: self.store.name().to_string(),
            vector_db_type: self.store.backend().to_string(),
        })
    }
}

fn entries_of(data: &Value) -> Vec<Value> {
    let entries = match data {
        Value::Array(items) => return items.clone(),
        Value::Object(map) => match map.get("knowledge_base") {
            Some(kb) => kb.get("entries"),
            None => map.get("entries"),
        },
        _ => None,
    };
    entries
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Stable id of an entry: the first 32 hex chars of
/// SHA-256(`"<name>_<organization>"`).
pub fn entry_id(entry: &GrantEntry) -> String {
    let digest = Sha256::digest(format!("{}_{}", entry.name, entry.organization).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(32);
    id
}

fn chunk_id(entry_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", entry_id, index)
}

/// Renders an entry as the markdown document that gets chunked and embedded.
pub fn render_entry(entry: &GrantEntry) -> String {
    let mut sections = vec![
        format!("# {}", entry.name),
        format!("**Organization:** {}", entry.organization),
        format!("**Type:** {}", entry.kind),
    ];

    if !entry.disciplines.is_empty() {
        sections.push(format!("**Disciplines:** {}", entry.disciplines.join(", ")));
    }
    let labelled = [
        ("Location", &entry.location),
        ("Deadline", &entry.deadline),
        ("Duration", &entry.duration),
        ("Funding", &entry.funding_amount),
    ];
    for (label, value) in labelled {
        if let Some(value) = non_empty(value) {
            sections.push(format!("**{}:** {}", label, value));
        }
    }

    if !entry.description.is_empty() {
        sections.push(format!("\n## Description\n{}", entry.description));
    }
    if let Some(eligibility) = non_empty(&entry.eligibility) {
        sections.push(format!("\n## Eligibility\n{}", eligibility));
    }
    if let Some(requirements) = non_empty(&entry.application_requirements) {
        sections.push(format!("\n## Application Requirements\n{}", requirements));
    }
    if let Some(benefits) = entry.benefits.as_ref().filter(|b| !b.is_empty()) {
        sections.push(format!("\n## Benefits\n- {}", benefits.join("\n- ")));
    }
    if let Some(criteria) = non_empty(&entry.selection_criteria) {
        sections.push(format!("\n## Selection Criteria\n{}", criteria));
    }
    if let Some(tips) = non_empty(&entry.tips) {
        sections.push(format!("\n## Application Tips\n{}", tips));
    }
    if let Some(website) = non_empty(&entry.website) {
        sections.push(format!("\n**Website:** {}", website));
    }
    if let Some(contact) = non_empty(&entry.contact) {
        sections.push(format!("**Contact:** {}", contact));
    }

    sections.join("\n")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
