use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdaterError {
    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },

    #[error("failed to parse feed: {0}")]
    Feed(#[from] roxmltree::Error),

    #[error("unknown source type: {0}")]
    UnknownSourceType(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("knowledge base file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

impl UpdaterError {
    pub(crate) fn http(url: &str, err: reqwest::Error) -> Self {
        UpdaterError::Http {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
