//! Local vector store on SQLite.
//!
//! Embeddings are stored as little-endian `f32` blobs next to the chunk
//! text. Queries scan the collection and rank by cosine distance, which is
//! plenty for a knowledge base of a few thousand chunks.

use crate::error::VectorError;
use crate::filter::MetadataFilter;
use crate::store::{ChunkRecord, ScoredChunk, VectorRecord, VectorStore};
use async_trait::async_trait;
use grantwise_db::DbPool;
use grantwise_types::ChunkMetadata;
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Ordering;

#[derive(Clone)]
pub struct SqliteVectorStore {
    pool: DbPool,
    name: String,
}

impl SqliteVectorStore {
    /// Opens (creating if needed) the named collection. Migrations must
    /// already have run on `pool`.
    pub fn open(pool: DbPool, name: &str) -> Result<Self, VectorError> {
        let conn = pool.get()?;
        let metadata = serde_json::json!({
            "description": "Art grants and residencies knowledge base"
        });
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, metadata_json) VALUES (?1, ?2)",
            params![name, metadata.to_string()],
        )?;
        tracing::debug!(collection = name, "opened sqlite collection");
        Ok(Self {
            pool,
            name: name.to_string(),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, VectorError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> Result<T, VectorError> + Send + 'static,
    {
        let pool = self.pool.clone();
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&*conn, &name)
        })
        .await
        .map_err(|e| VectorError::Task(e.to_string()))?
    }
}

pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// `1 - cos(a, b)`; zero vectors are treated as orthogonal to everything.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn parse_metadata(json: &str) -> ChunkMetadata {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unreadable chunk metadata, using defaults");
        ChunkMetadata::default()
    })
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkRecord> {
    let metadata_json: String = row.get(2)?;
    Ok(ChunkRecord {
        id: row.get(0)?,
        document: row.get(1)?,
        metadata: parse_metadata(&metadata_json),
    })
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn count(&self) -> Result<usize, VectorError> {
        self.blocking(|conn, name| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM chunks WHERE collection = ?1",
                params![name],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn get(&self, ids: &[String]) -> Result<Vec<ChunkRecord>, VectorError> {
        let ids = ids.to_vec();
        self.blocking(move |conn, name| {
            let mut stmt = conn.prepare(
                "SELECT id, document, metadata_json FROM chunks WHERE collection = ?1 AND id = ?2",
            )?;
            let mut records = Vec::with_capacity(ids.len());
            for id in &ids {
                if let Some(record) = stmt
                    .query_row(params![name, id], record_from_row)
                    .optional()?
                {
                    records.push(record);
                }
            }
            Ok(records)
        })
        .await
    }

    async fn peek(&self, limit: usize) -> Result<Vec<ChunkRecord>, VectorError> {
        self.blocking(move |conn, name| {
            let mut stmt = conn.prepare(
                "SELECT id, document, metadata_json FROM chunks
                 WHERE collection = ?1 ORDER BY rowid LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![name, limit as i64], record_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<(), VectorError> {
        if records.is_empty() {
            return Ok(());
        }
        self.blocking(move |conn, name| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO chunks
                        (collection, id, source_id, chunk_index, document, metadata_json, embedding, dimensions, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
                     ON CONFLICT(collection, id) DO UPDATE SET
                        source_id = excluded.source_id,
                        chunk_index = excluded.chunk_index,
                        document = excluded.document,
                        metadata_json = excluded.metadata_json,
                        embedding = excluded.embedding,
                        dimensions = excluded.dimensions,
                        updated_at = excluded.updated_at",
                )?;
                for record in &records {
                    stmt.execute(params![
                        name,
                        record.id,
                        record.metadata.source_id,
                        record.metadata.chunk_index,
                        record.document,
                        serde_json::to_string(&record.metadata)?,
                        encode_embedding(&record.embedding),
                        record.embedding.len() as i64,
                    ])?;
                }
            }
            tx.commit()?;
            tracing::debug!(collection = name, count = records.len(), "upserted chunks");
            Ok(())
        })
        .await
    }

    async fn query(
        &self,
        embedding: &[f32],
        n: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>, VectorError> {
        let embedding = embedding.to_vec();
        let filter = filter.cloned();
        self.blocking(move |conn, name| {
            let mut stmt = conn.prepare(
                "SELECT id, document, metadata_json, embedding, dimensions
                 FROM chunks WHERE collection = ?1",
            )?;
            let mut rows = stmt.query(params![name])?;
            let mut scored = Vec::new();
            while let Some(row) = rows.next()? {
                let record = record_from_row(row)?;
                if let Some(filter) = &filter {
                    if !filter.matches(&record.metadata) {
                        continue;
                    }
                }
                let dimensions: i64 = row.get(4)?;
                if dimensions as usize != embedding.len() {
                    return Err(VectorError::DimensionMismatch {
                        expected: dimensions as usize,
                        got: embedding.len(),
                    });
                }
                let blob: Vec<u8> = row.get(3)?;
                let distance = cosine_distance(&embedding, &decode_embedding(&blob));
                scored.push(ScoredChunk { record, distance });
            }

            scored.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.record.id.cmp(&b.record.id))
            });
            scored.truncate(n);
            Ok(scored)
        })
        .await
    }

    async fn delete_source(&self, source_id: &str) -> Result<usize, VectorError> {
        let source_id = source_id.to_string();
        self.blocking(move |conn, name| {
            let removed = conn.execute(
                "DELETE FROM chunks WHERE collection = ?1 AND source_id = ?2",
                params![name, source_id],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn delete_chunks_from(
        &self,
        source_id: &str,
        first_index: usize,
    ) -> Result<usize, VectorError> {
        let source_id = source_id.to_string();
        let first_index = i64::try_from(first_index).unwrap_or(i64::MAX);
        self.blocking(move |conn, name| {
            let removed = conn.execute(
                "DELETE FROM chunks
                 WHERE collection = ?1 AND source_id = ?2 AND chunk_index >= ?3",
                params![name, source_id, first_index],
            )?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_blob_round_trip() {
        let v = vec![0.5f32, -1.25, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-9);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-9);
        assert!((cosine_distance(&[0.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-9);
    }
}
