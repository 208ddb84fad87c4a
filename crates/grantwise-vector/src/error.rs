use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] grantwise_llm::LlmError),

    #[error("text processing failed: {0}")]
    Text(#[from] grantwise_text::TextError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read knowledge base: {0}")]
    Io(#[from] std::io::Error),

    #[error("chroma request failed ({status}): {message}")]
    Chroma { status: u16, message: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("embedding has {got} dimensions, collection uses {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("background task failed: {0}")]
    Task(String),
}
