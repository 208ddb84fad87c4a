//! Language-model access for grantwise.
//!
//! Wraps an OpenAI-compatible HTTP API: chat completions (whole or
//! streamed over SSE) and embeddings. On top of the raw client,
//! [`LlmService`] builds the advisor prompt from retrieved context and
//! scores the answer with a lightweight confidence heuristic.
//!
//! Transient failures (rate limits, 5xx, connection errors, timeouts) are
//! retried with exponential backoff; authentication and parse errors are
//! returned immediately.

mod chat;
mod config;
mod embeddings;
mod error;
mod heuristics;
mod retry;
mod service;
mod speech;

pub use chat::{ChatClient, ChatMessage, ChatRequest};
pub use config::{LlmConfig, DEFAULT_SYSTEM_PROMPT};
pub use embeddings::{Embedder, OpenAiEmbedder};
pub use error::LlmError;
pub use heuristics::{calculate_confidence, extract_sources};
pub use retry::{with_retry, RetryConfig};
pub use service::{GenerationOptions, LlmService};
pub use speech::format_for_speech;
