use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use grantwise_types::ChunkMetadata;
use grantwise_vector::{ChromaStore, MetadataFilter, VectorRecord, VectorStore};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Default)]
struct Collection {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<Value>,
    last_where: Option<Value>,
}

type Shared = Arc<Mutex<Collection>>;

async fn create(Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["get_or_create"], true);
    assert_eq!(body["metadata"]["hnsw:space"], "cosine");
    Json(json!({"id": "col-1", "name": body["name"], "metadata": body["metadata"]}))
}

async fn upsert(State(state): State<Shared>, Path(id): Path<String>, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(id, "col-1");
    let mut col = state.lock().unwrap();
    for (i, chunk_id) in body["ids"].as_array().unwrap().iter().enumerate() {
        col.ids.push(chunk_id.as_str().unwrap().to_string());
        col.documents.push(body["documents"][i].as_str().unwrap().to_string());
        col.metadatas.push(body["metadatas"][i].clone());
    }
    Json(json!(true))
}

async fn count(State(state): State<Shared>) -> Json<Value> {
    Json(json!(state.lock().unwrap().ids.len()))
}

async fn query(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut col = state.lock().unwrap();
    col.last_where = body.get("where").cloned();
    let n = body["n_results"].as_u64().unwrap() as usize;
    let take = n.min(col.ids.len());
    let distances: Vec<f64> = (0..take).map(|i| i as f64 * 0.1).collect();
    Json(json!({
        "ids": [col.ids[..take].to_vec()],
        "documents": [col.documents[..take].to_vec()],
        "metadatas": [col.metadatas[..take].to_vec()],
        "distances": [distances],
    }))
}

/// Supports `{"source_id": {"$eq": s}}`, optionally joined by `$and` with
/// `{"chunk_index": {"$gte": n}}`.
async fn delete(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let clauses = match body["where"]["$and"].as_array() {
        Some(clauses) => clauses.clone(),
        None => vec![body["where"].clone()],
    };
    let source = clauses[0]["source_id"]["$eq"].as_str().unwrap().to_string();
    let first_index = clauses
        .get(1)
        .and_then(|c| c["chunk_index"]["$gte"].as_u64())
        .unwrap_or(0);
    let mut col = state.lock().unwrap();
    let mut removed = Vec::new();
    let mut i = 0;
    while i < col.ids.len() {
        let meta = &col.metadatas[i];
        if meta["source_id"] == source.as_str()
            && meta["chunk_index"].as_u64().unwrap_or(0) >= first_index
        {
            removed.push(col.ids.remove(i));
            col.documents.remove(i);
            col.metadatas.remove(i);
        } else {
            i += 1;
        }
    }
    Json(json!(removed))
}

async fn spawn() -> (String, Shared) {
    let state: Shared = Arc::default();
    let app = Router::new()
        .route("/api/v1/collections", post(create))
        .route("/api/v1/collections/{id}/upsert", post(upsert))
        .route("/api/v1/collections/{id}/count", get(count))
        .route("/api/v1/collections/{id}/query", post(query))
        .route("/api/v1/collections/{id}/delete", post(delete))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn record(id: &str, source: &str, location: &str) -> VectorRecord {
    let chunk_index = id
        .rsplit('_')
        .next()
        .and_then(|i| i.parse().ok())
        .unwrap_or(0);
    VectorRecord {
        id: id.to_string(),
        document: format!("document {}", id),
        metadata: ChunkMetadata {
            source_id: source.to_string(),
            chunk_index,
            kind: "residency".into(),
            location: location.to_string(),
            ..ChunkMetadata::default()
        },
        embedding: vec![1.0, 0.0],
    }
}

#[tokio::test]
async fn chroma_store_round_trip() {
    let (base, state) = spawn().await;
    let store = ChromaStore::connect(&base, "art_grants_residencies", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(store.backend(), "chroma");

    store
        .upsert(vec![
            record("a_chunk_0", "a", "Berlin"),
            record("b_chunk_0", "b", "Paris"),
            record("b_chunk_1", "b", "Paris"),
        ])
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 3);

    let filter = MetadataFilter::new()
        .eq("type", "residency")
        .contains("location", "Par");
    let hits = store.query(&[1.0, 0.0], 1, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.id, "b_chunk_0");
    assert!((hits[0].distance - 0.1).abs() < 1e-9);
    assert_eq!(
        state.lock().unwrap().last_where,
        Some(json!({"type": {"$eq": "residency"}}))
    );

    assert_eq!(store.delete_source("b").await.unwrap(), 2);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn chroma_prunes_trailing_chunks_only() {
    let (base, state) = spawn().await;
    let store = ChromaStore::connect(&base, "art_grants_residencies", Duration::from_secs(5))
        .await
        .unwrap();
    store
        .upsert(vec![
            record("b_chunk_0", "b", "Paris"),
            record("b_chunk_1", "b", "Paris"),
            record("b_chunk_2", "b", "Paris"),
            record("c_chunk_1", "c", "Lyon"),
        ])
        .await
        .unwrap();

    assert_eq!(store.delete_chunks_from("b", 1).await.unwrap(), 2);
    assert_eq!(state.lock().unwrap().ids, vec!["b_chunk_0", "c_chunk_1"]);
}
