#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use grantwise_db::{create_pool, run_migrations, DbRuntimeSettings};
use grantwise_llm::{LlmConfig, LlmError, LlmService, RetryConfig};
use grantwise_retrieval::Retriever;
use grantwise_server::background::UpdateScheduler;
use grantwise_server::orchestrator::Orchestrator;
use grantwise_server::AppState;
use grantwise_text::TextProcessor;
use grantwise_updater::{DataUpdater, Notifier};
use grantwise_vector::{ChunkSettings, Embedder, KnowledgeBase, SqliteVectorStore, COLLECTION_NAME};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ANSWER: &str = "Apply by 2025 at https://example.org";

/// Bag-of-words embedding, enough for lexical nearest neighbours.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; 256];
                for word in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
                    if word.len() > 2 {
                        let h = word
                            .bytes()
                            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
                        v[h as usize % 256] += 1.0;
                    }
                }
                v
            })
            .collect())
    }

    fn model(&self) -> &str {
        "hash"
    }
}

/// Chat completions mock. Prompts mentioning `FAIL` are rejected.
async fn chat(Json(body): Json<Value>) -> impl IntoResponse {
    if body.to_string().contains("FAIL") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "rejected by mock"}})),
        )
            .into_response();
    }
    if body["stream"] == true {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Apply by \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"2025 at https://example.org\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        return ([("content-type", "text/event-stream")], sse).into_response();
    }
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": ANSWER}}]
    }))
    .into_response()
}

async fn spawn_llm_mock() -> String {
    let app = Router::new().route("/v1/chat/completions", post(chat));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

pub fn entries() -> Value {
    json!([
        {
            "id": "saari",
            "name": "Saari Residence",
            "organization": "Kone Foundation",
            "description": "Residency for artists in rural Finland with studio space.",
            "type": "residency",
            "disciplines": ["visual arts"],
            "location": "Finland",
            "deadline": "March 2025"
        },
        {
            "id": "mondriaan",
            "name": "Mondriaan Fund Grant",
            "organization": "Mondriaan Fund",
            "description": "Grant funding for visual artists based in the Netherlands.",
            "type": "grant",
            "disciplines": ["visual arts", "design"],
            "location": "Netherlands"
        }
    ])
}

pub struct TestContext {
    pub state: AppState,
    pub dir: TempDir,
}

pub async fn setup() -> TestContext {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();

    let store = SqliteVectorStore::open(pool.clone(), COLLECTION_NAME).unwrap();
    let knowledge_base = Arc::new(KnowledgeBase::new(
        Arc::new(store),
        Arc::new(HashEmbedder),
        TextProcessor::new().unwrap(),
        ChunkSettings::default(),
    ));
    let report = knowledge_base.ingest_value(&entries(), false).await;
    assert_eq!(report.entries_added, 2);

    let llm = LlmService::new(LlmConfig {
        api_key: "test-key".into(),
        base_url: spawn_llm_mock().await,
        retry: RetryConfig::immediate(2),
        ..LlmConfig::default()
    })
    .unwrap();
    let orchestrator = Arc::new(Orchestrator::new(
        Retriever::new(knowledge_base.clone()),
        llm,
        5,
    ));

    let dir = tempfile::tempdir().unwrap();
    let kb_path = dir.path().join("kb.json");
    let updater = DataUpdater::new(Vec::new(), kb_path.clone(), Duration::from_secs(5))
        .unwrap()
        .with_knowledge_base(knowledge_base.clone());
    let scheduler = Arc::new(UpdateScheduler::new(
        updater,
        Notifier::new(None),
        "interval:1h",
        pool,
    ));

    let state = AppState {
        knowledge_base,
        orchestrator,
        scheduler,
        knowledge_base_path: kb_path,
        cors_origins: vec!["*".to_string()],
    };
    TestContext { state, dir }
}
