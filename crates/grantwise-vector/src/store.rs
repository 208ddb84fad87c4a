use crate::error::VectorError;
use crate::filter::MetadataFilter;
use async_trait::async_trait;
use grantwise_types::ChunkMetadata;

/// A stored chunk without its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// A chunk ready to be written, with its embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A query match. `distance` is cosine distance, `1 - similarity`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub record: ChunkRecord,
    pub distance: f64,
}

/// A named collection of embedded chunks.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Backend label reported by `collection_info` (`sqlite`, `chroma`).
    fn backend(&self) -> &'static str;

    async fn count(&self) -> Result<usize, VectorError>;

    /// Fetches chunks by id. Missing ids are skipped.
    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>, VectorError>;

    /// Returns up to `limit` chunks in storage order.
    async fn peek(&self, limit: usize) -> Result<Vec<ChunkRecord>, VectorError>;

    /// Inserts or replaces chunks by id.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError>;

    /// Returns the `n` nearest chunks that pass `filter`, closest first.
    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, VectorError>;

    /// Removes every chunk of one knowledge-base entry. Returns the number
    /// removed when the backend reports it.
    async fn delete_source(&self, source_id: &str) -> Result<usize, VectorError>;

    /// Removes the chunks of `source_id` whose index is `first_index` or
    /// higher, left over from a longer previous version of the entry.
    async fn delete_chunks_from(
        &self,
        source_id: &str,
        first_index: usize,
    ) -> Result<usize, VectorError>;
}
