//! grantwise server library logic.

pub mod api;
pub mod api_admin;
pub mod api_ws;
pub mod background;
pub mod config;
pub mod orchestrator;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Extension, Json, Router,
};
use background::UpdateScheduler;
use grantwise_vector::KnowledgeBase;
use orchestrator::Orchestrator;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Inline ingestion payloads can be large knowledge-base documents.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Chunked, embedded knowledge base.
    pub knowledge_base: Arc<KnowledgeBase>,
    /// Retrieval, generation and session history.
    pub orchestrator: Arc<Orchestrator>,
    /// Knowledge-base update scheduler.
    pub scheduler: Arc<UpdateScheduler>,
    /// Default file for `POST /ingest`.
    pub knowledge_base_path: PathBuf,
    /// Allowed CORS origins; `"*"` or an empty list allows any origin.
    pub cors_origins: Vec<String>,
}

/// Health check handler.
///
/// Returns `200 OK` with the status of each service. Used by load
/// balancers, monitoring, and CI to verify the server is running.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "vector_store": state.knowledge_base.store().count().await.is_ok(),
            "retrieval": true,
            "llm": true,
            "orchestrator": true,
            "scheduler": state.scheduler.is_running(),
        }
    }))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(parsed)
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/admin/vector_store_info",
            get(api_admin::vector_store_info_handler),
        )
        .route(
            "/admin/trigger_update",
            post(api_admin::trigger_update_handler),
        )
        .route("/admin/update_status", get(api_admin::update_status_handler));

    let cors = cors_layer(&state.cors_origins);

    Router::new()
        .route("/health", get(health))
        .route("/ingest", post(api::ingest_handler))
        .route("/retrieve_context", post(api::retrieve_context_handler))
        .route("/query", post(api::query_handler))
        .route(
            "/sessions/{sessionId}",
            get(api::get_session_handler).delete(api::delete_session_handler),
        )
        .merge(admin_routes)
        .route("/ws/simli", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(Extension(Arc::new(state)))
}
