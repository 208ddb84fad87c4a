//! Vector storage for the grants knowledge base.
//!
//! [`VectorStore`] abstracts over the local SQLite backend and a remote
//! Chroma server. [`KnowledgeBase`] sits on top: it renders JSON entries
//! to markdown, chunks and embeds them, and answers similarity searches.

mod chroma;
mod error;
mod filter;
mod knowledge_base;
mod sqlite;
mod store;

pub use chroma::ChromaStore;
pub use error::VectorError;
pub use filter::{Condition, MetadataFilter};
pub use grantwise_llm::{Embedder, OpenAiEmbedder};
pub use knowledge_base::{
    entry_id, render_entry, ChunkSettings, CollectionInfo, KnowledgeBase, COLLECTION_NAME,
};
pub use sqlite::SqliteVectorStore;
pub use store::{ChunkRecord, ScoredChunk, VectorRecord, VectorStore};
