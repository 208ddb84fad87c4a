mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use grantwise_server::app;
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceExt;

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health_reports_services() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["vector_store"], true);
    assert_eq!(body["services"]["scheduler"], false);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn retrieve_context_returns_chunks() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/retrieve_context",
        Some(json!({"query": "residency in rural Finland", "num_results": 1})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["query"], "residency in rural Finland");
    assert!(body["context"].as_str().unwrap().contains("**Saari Residence** by Kone Foundation"));
    let chunks = body["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(body["num_chunks"], 1);
    assert_eq!(chunks[0]["chunk_id"], "saari_chunk_0");
    assert!(body["retrieval_time_ms"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn huge_num_results_is_capped() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/retrieve_context",
        Some(json!({"query": "residency", "num_results": u64::MAX})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["num_chunks"], 2);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(&app, "POST", "/query", Some(json!({"query": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("query"));
}

#[tokio::test]
async fn query_answers_and_records_session() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(
        &app,
        "POST",
        "/query",
        Some(json!({"query": "Which residencies are in Finland?", "session_id": "s1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], common::ANSWER);
    assert!((body["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-9);
    assert!(body["context_used"].as_str().unwrap().contains("Saari Residence"));
    assert!(body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "Kone Foundation"));
    assert!(body["processing_time_ms"].as_f64().is_some());

    let (status, session) = call(&app, "GET", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["session_id"], "s1");
    let history = session["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["query"], "Which residencies are in Finland?");
    assert_eq!(history[0]["response"], common::ANSWER);

    let (status, _) = call(&app, "DELETE", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, "GET", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
    let (status, _) = call(&app, "DELETE", "/sessions/s1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_history_keeps_last_ten_turns() {
    let ctx = common::setup().await;
    let orchestrator = ctx.state.orchestrator.clone();

    for i in 0..12 {
        orchestrator
            .process_query(&format!("grant question {}", i), None, Some("long"))
            .await
            .unwrap();
    }

    let session = orchestrator.session("long").unwrap();
    assert_eq!(session.history.len(), 10);
    assert_eq!(session.history[0].query, "grant question 2");
    assert_eq!(session.history[9].query, "grant question 11");
}

#[tokio::test]
async fn processing_steps_are_timed() {
    let ctx = common::setup().await;
    let response = ctx
        .state
        .orchestrator
        .process_query("visual arts grant", None, None)
        .await
        .unwrap();

    for step in ["retrieval_ms", "llm_generation_ms", "total_ms"] {
        assert!(response.processing_steps.contains_key(step), "missing {}", step);
    }
    assert!(ctx.state.orchestrator.session("visual arts grant").is_none());
}

#[tokio::test]
async fn generation_failure_maps_to_error_body() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(&app, "POST", "/query", Some(json!({"query": "please FAIL"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("rejected by mock"));
}

#[tokio::test]
async fn ingest_runs_in_background() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());
    let before = ctx.state.knowledge_base.count().await.unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/ingest",
        Some(json!({"data": [{
            "id": "wiels",
            "name": "WIELS Residency",
            "organization": "WIELS",
            "description": "Studio residency in Brussels.",
            "type": "residency",
            "disciplines": ["painting"]
        }]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");
    assert_eq!(body["message"], "Data ingestion started in background");

    let mut count = before;
    for _ in 0..100 {
        count = ctx.state.knowledge_base.count().await.unwrap();
        if count > before {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, before + 1);
}

#[tokio::test]
async fn ingest_rejects_scalar_data() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, _) = call(&app, "POST", "/ingest", Some(json!({"data": "nope"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vector_store_info_summarises_collection() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(&app, "GET", "/admin/vector_store_info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["info"]["total_chunks"], 2);
    assert_eq!(body["info"]["collection_name"], "art_grants_residencies");
    assert_eq!(body["info"]["vector_db_type"], "sqlite");
}

#[tokio::test]
async fn manual_update_is_recorded() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let (status, body) = call(&app, "GET", "/admin/update_status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scheduler_running"], false);
    assert_eq!(body["update_schedule"], "interval:1h");
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);
    assert_eq!(body["jobs"][0]["id"], "knowledge_base_update");
    assert!(body["jobs"][0]["next_run_time"].is_null());
    assert!(body["last_run"].is_null());

    let (status, body) = call(&app, "POST", "/admin/trigger_update", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");

    let mut last_run = Value::Null;
    for _ in 0..100 {
        let (_, body) = call(&app, "GET", "/admin/update_status", None).await;
        if !body["last_run"].is_null() {
            last_run = body["last_run"].clone();
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(last_run["trigger"], "manual");
    assert_eq!(last_run["new"], 0);
    assert_eq!(last_run["errors"], 0);
    assert!(last_run["failure"].is_null());
    assert!(ctx.dir.path().join("kb.json").exists());
}

#[tokio::test]
async fn trigger_update_conflicts_while_slot_is_taken() {
    let ctx = common::setup().await;
    let app = app(ctx.state.clone());

    let claim = ctx.state.scheduler.claim_update().expect("slot is free");
    assert!(ctx.state.scheduler.claim_update().is_none());
    assert!(ctx.state.scheduler.is_updating());

    let (status, body) = call(&app, "POST", "/admin/trigger_update", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already in progress"));

    drop(claim);
    let (status, _) = call(&app, "POST", "/admin/trigger_update", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn started_scheduler_reports_next_runs() {
    let ctx = common::setup().await;
    let scheduler = ctx.state.scheduler.clone();

    scheduler.start(false);
    assert!(scheduler.is_running());

    let mut jobs = scheduler.jobs();
    for _ in 0..50 {
        if jobs.iter().all(|j| j.next_run_time.is_some()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        jobs = scheduler.jobs();
    }
    assert!(jobs.iter().all(|j| j.next_run_time.is_some()));
    assert_eq!(jobs[0].trigger, "interval[3600s]");

    scheduler.stop();
    assert!(!scheduler.is_running());
    assert!(scheduler.jobs().iter().all(|j| j.next_run_time.is_none()));
}
