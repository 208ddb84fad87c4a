//! Client for a remote Chroma server (REST API v1).
//!
//! Embeddings are always computed by our own [`Embedder`](grantwise_llm::Embedder)
//! and sent with each request; the server never embeds text itself.

use crate::error::VectorError;
use crate::filter::MetadataFilter;
use crate::store::{ChunkRecord, ScoredChunk, VectorRecord, VectorStore};
use async_trait::async_trait;
use grantwise_types::ChunkMetadata;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Over-fetch factor when substring filters must be applied locally.
const SUBSTRING_FILTER_OVERFETCH: usize = 4;

pub struct ChromaStore {
    http: reqwest::Client,
    base_url: String,
    name: String,
    collection_id: String,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Value>>>,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Value>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f64>>>,
}

impl ChromaStore {
    /// Gets or creates `name` on the server at `base_url`.
    pub async fn connect(base_url: &str, name: &str, timeout: Duration) -> Result<Self, VectorError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VectorError::Http(e.to_string()))?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let body = json!({
            "name": name,
            "metadata": {
                "description": "Art grants and residencies knowledge base",
                "hnsw:space": "cosine",
            },
            "get_or_create": true,
        });
        let response = http
            .post(format!("{}/api/v1/collections", base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorError::Http(e.to_string()))?;
        let collection: CollectionResponse = decode(response).await?;

        let space = collection
            .metadata
            .as_ref()
            .and_then(|m| m["hnsw:space"].as_str())
            .unwrap_or("l2");
        if space != "cosine" {
            // get_or_create keeps the settings of an existing collection.
            tracing::warn!(
                collection = name,
                space,
                "collection does not use cosine distance, scores will not be comparable"
            );
        }
        tracing::info!(collection = name, id = %collection.id, "connected to chroma");
        Ok(Self {
            http,
            base_url,
            name: name.to_string(),
            collection_id: collection.id,
        })
    }

    fn url(&self, op: &str) -> String {
        format!(
            "{}/api/v1/collections/{}/{}",
            self.base_url, self.collection_id, op
        )
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, op: &str, body: &Value) -> Result<T, VectorError> {
        let response = self
            .http
            .post(self.url(op))
            .json(body)
            .send()
            .await
            .map_err(|e| VectorError::Http(e.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, VectorError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(VectorError::Chroma {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| VectorError::Http(e.to_string()))
}

fn metadata_from(value: Option<Value>) -> ChunkMetadata {
    value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn records_from(get: GetResponse) -> Vec<ChunkRecord> {
    let mut documents = get.documents.unwrap_or_default().into_iter();
    let mut metadatas = get.metadatas.unwrap_or_default().into_iter();
    get.ids
        .into_iter()
        .map(|id| ChunkRecord {
            id,
            document: documents.next().flatten().unwrap_or_default(),
            metadata: metadata_from(metadatas.next().flatten()),
        })
        .collect()
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "chroma"
    }

    async fn count(&self) -> Result<usize, VectorError> {
        let response = self
            .http
            .get(self.url("count"))
            .send()
            .await
            .map_err(|e| VectorError::Http(e.to_string()))?;
        decode(response).await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>, VectorError> {
        let body = json!({"ids": ids, "include": ["documents", "metadatas"]});
        let response: GetResponse = self.post("get", &body).await?;
        Ok(records_from(response))
    }

    async fn peek(&self, limit: usize) -> Result<Vec<ChunkRecord>, VectorError> {
        let body = json!({"limit": limit, "include": ["documents", "metadatas"]});
        let response: GetResponse = self.post("get", &body).await?;
        Ok(records_from(response))
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut ids = Vec::with_capacity(records.len());
        let mut embeddings = Vec::with_capacity(records.len());
        let mut documents = Vec::with_capacity(records.len());
        let mut metadatas = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id);
            embeddings.push(record.embedding);
            documents.push(record.document);
            metadatas.push(serde_json::to_value(&record.metadata)?);
        }
        let body = json!({
            "ids": ids,
            "embeddings": embeddings,
            "documents": documents,
            "metadatas": metadatas,
        });
        let _: Value = self.post("upsert", &body).await?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        let local_filter = filter.filter(|f| f.has_substring_conditions());
        let n_results = if local_filter.is_some() {
            n.saturating_mul(SUBSTRING_FILTER_OVERFETCH)
        } else {
            n
        };

        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(clause) = filter.and_then(MetadataFilter::chroma_where) {
            body["where"] = clause;
        }

        let response: QueryResponse = self.post("query", &body).await?;
        let ids = response.ids.into_iter().next().unwrap_or_default();
        let mut documents = response
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default()
            .into_iter();
        let mut metadatas = response
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default()
            .into_iter();
        let mut distances = response
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default()
            .into_iter();

        let mut scored: Vec<ScoredChunk> = ids
            .into_iter()
            .map(|id| ScoredChunk {
                record: ChunkRecord {
                    id,
                    document: documents.next().flatten().unwrap_or_default(),
                    metadata: metadata_from(metadatas.next().flatten()),
                },
                distance: distances.next().unwrap_or(1.0),
            })
            .collect();

        if let Some(filter) = local_filter {
            scored.retain(|hit| filter.matches(&hit.record.metadata));
        }
        scored.truncate(n);
        Ok(scored)
    }

    async fn delete_source(&self, source_id: &str) -> Result<usize, VectorError> {
        let body = json!({"where": {"source_id": {"$eq": source_id}}});
        let response: Value = self.post("delete", &body).await?;
        Ok(response.as_array().map_or(0, Vec::len))
    }

    async fn delete_chunks_from(
        &self,
        source_id: &str,
        first_index: usize,
    ) -> Result<usize, VectorError> {
        let body = json!({
            "where": {
                "$and": [
                    {"source_id": {"$eq": source_id}},
                    {"chunk_index": {"$gte": first_index}},
                ]
            }
        });
        let response: Value = self.post("delete", &body).await?;
        Ok(response.as_array().map_or(0, Vec::len))
    }
}
