//! Admin API handlers for the grantwise server.

use crate::{api::ApiError, background::UpdateTrigger, AppState};
use axum::extract::{Extension, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for `GET /admin/vector_store_info`.
pub async fn vector_store_info_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let info = state
        .knowledge_base
        .collection_info()
        .await
        .inspect_err(|e| tracing::error!(error = %e, "error getting vector store info"))?;

    Ok(Json(json!({
        "status": "success",
        "info": info,
    })))
}

/// Handler for `POST /admin/trigger_update`.
///
/// Starts an update in the background. Returns `409 Conflict` while another
/// update is still running. The update slot is reserved before answering, so
/// a `started` reply always means this request's run will happen.
pub async fn trigger_update_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let claim = state
        .scheduler
        .claim_update()
        .ok_or_else(|| ApiError::Conflict("an update is already in progress".to_string()))?;

    tracing::info!("manual update triggered");
    let scheduler = state.scheduler.clone();
    tokio::spawn(async move {
        let _ = scheduler.run_claimed(claim, UpdateTrigger::Manual).await;
    });

    Ok(Json(json!({
        "status": "started",
        "message": "Manual update triggered in background",
    })))
}

/// Handler for `GET /admin/update_status`.
pub async fn update_status_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let scheduler = &state.scheduler;
    let last_run = scheduler
        .last_run()
        .await
        .map_err(|e| ApiError::InternalServerError(format!("failed to read update history: {}", e)))?;

    Ok(Json(json!({
        "scheduler_running": scheduler.is_running(),
        "update_in_progress": scheduler.is_updating(),
        "jobs": scheduler.jobs(),
        "update_schedule": scheduler.schedule_setting(),
        "last_run": last_run,
    })))
}
