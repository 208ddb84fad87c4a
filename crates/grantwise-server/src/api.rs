//! API handlers for the grantwise server.

use crate::orchestrator::OrchestratorError;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use grantwise_llm::LlmError;
use grantwise_types::{
    ContextChunk, ContextResponse, IngestRequest, IngestResponse, QueryRequest, QueryResponse,
};
use grantwise_vector::VectorError;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<VectorError> for ApiError {
    fn from(e: VectorError) -> Self {
        match e {
            VectorError::Embedding(inner) => inner.into(),
            VectorError::InvalidFilter(msg) => ApiError::BadRequest(msg),
            e @ (VectorError::Chroma { .. } | VectorError::Http(_)) => {
                ApiError::ServiceUnavailable(format!("vector store unavailable: {}", e))
            }
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            e @ (LlmError::AuthFailed
            | LlmError::MissingApiKey
            | LlmError::RateLimited { .. }
            | LlmError::Connection(_)
            | LlmError::Timeout) => {
                ApiError::ServiceUnavailable(format!("language model unavailable: {}", e))
            }
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Retrieval(inner) => inner.into(),
            OrchestratorError::Generation(inner) => inner.into(),
        }
    }
}

fn require_query(query: &str) -> Result<(), ApiError> {
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    Ok(())
}

/// Handler for `POST /ingest`.
///
/// Ingestion runs in a background task; the response only confirms that it
/// started. Inline `data` wins over `file_path`, which defaults to the
/// configured knowledge-base file.
pub async fn ingest_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let IngestRequest {
        file_path,
        data,
        force_update,
    } = payload;

    if let Some(data) = &data {
        if !(data.is_array() || data.is_object()) {
            return Err(ApiError::BadRequest(
                "data must be an array of entries or an object containing them".to_string(),
            ));
        }
    }

    let kb = state.knowledge_base.clone();
    let path = file_path
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| state.knowledge_base_path.clone());

    tokio::spawn(async move {
        let result = match data {
            Some(data) => Ok(kb.ingest_value(&data, force_update).await),
            None => kb.ingest_file(&path, force_update).await,
        };
        match result {
            Ok(report) => tracing::info!(
                processed = report.entries_processed,
                added = report.entries_added,
                updated = report.entries_updated,
                errors = report.errors.len(),
                "background ingestion finished"
            ),
            Err(e) => tracing::error!(error = %e, path = %path.display(), "ingestion error"),
        }
    });

    Ok(Json(IngestResponse {
        status: "started".to_string(),
        message: "Data ingestion started in background".to_string(),
        entries_processed: None,
        entries_added: None,
        entries_updated: None,
        errors: None,
    }))
}

/// Handler for `POST /retrieve_context`.
pub async fn retrieve_context_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<ContextResponse>, ApiError> {
    require_query(&payload.query)?;

    let retrieval = state
        .orchestrator
        .retriever()
        .retrieve(&payload.query, payload.num_results(), None, true)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "retrieval error"))?;

    let chunks: Vec<ContextChunk> = retrieval
        .hits
        .into_iter()
        .map(|hit| ContextChunk {
            text: hit.text,
            score: hit.score,
            metadata: hit.metadata,
            chunk_id: hit.id,
        })
        .collect();

    Ok(Json(ContextResponse {
        query: payload.query,
        context: retrieval.context,
        num_chunks: chunks.len(),
        chunks: Some(chunks),
        retrieval_time_ms: Some(retrieval.elapsed_ms),
    }))
}

/// Handler for `POST /query`.
///
/// Runs the full pipeline and answers with the complete response. The
/// `stream` flag only applies to the WebSocket API.
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    require_query(&payload.query)?;

    let response = state
        .orchestrator
        .process_query(
            &payload.query,
            Some(payload.num_results()),
            payload.session_id.as_deref(),
        )
        .await
        .inspect_err(|e| tracing::error!(error = %e, "query processing error"))?;

    Ok(Json(QueryResponse {
        query: payload.query,
        processing_time_ms: response.processing_steps.get("total_ms").copied(),
        response: response.answer,
        context_used: Some(response.context),
        confidence: response.confidence,
        sources: Some(response.sources),
    }))
}

/// Handler for `GET /sessions/{sessionId}`.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = state
        .orchestrator
        .session(&session_id)
        .ok_or_else(|| ApiError::NotFound(format!("session not found: {}", session_id)))?;

    Ok(Json(json!({
        "session_id": session_id,
        "created_at": session.created_at,
        "history": session.history,
    })))
}

/// Handler for `DELETE /sessions/{sessionId}`.
pub async fn delete_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.orchestrator.clear_session(&session_id) {
        return Err(ApiError::NotFound(format!("session not found: {}", session_id)));
    }
    Ok(Json(json!({
        "status": "cleared",
        "session_id": session_id,
    })))
}
