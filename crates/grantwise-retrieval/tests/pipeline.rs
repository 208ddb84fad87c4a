use async_trait::async_trait;
use grantwise_db::{create_pool, run_migrations, DbRuntimeSettings};
use grantwise_llm::LlmError;
use grantwise_retrieval::{Retriever, RetrievalFilters, EMPTY_KNOWLEDGE_BASE};
use grantwise_text::TextProcessor;
use grantwise_vector::{ChunkSettings, Embedder, KnowledgeBase, SqliteVectorStore, COLLECTION_NAME};
use serde_json::json;
use std::sync::Arc;

struct HashEmbedder;

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

async fn retriever(entries: serde_json::Value) -> Retriever {
    let pool = create_pool(":memory:", DbRuntimeSettings::default()).unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    let store = SqliteVectorStore::open(pool, COLLECTION_NAME).unwrap();
    let kb = KnowledgeBase::new(
        Arc::new(store),
        Arc::new(HashEmbedder),
        TextProcessor::new().unwrap(),
        ChunkSettings::default(),
    );
    kb.ingest_value(&entries, false).await;
    Retriever::new(Arc::new(kb))
}

fn entries() -> serde_json::Value {
    json!([
        {
            "id": "saari",
            "name": "Saari Residence",
            "organization": "Kone Foundation",
            "description": "Residency for artists in rural Finland with studio space.",
            "type": "residency",
            "disciplines": ["visual arts"],
            "location": "Finland"
        },
        {
            "id": "mondriaan",
            "name": "Mondriaan Fund Grant",
            "organization": "Mondriaan Fund",
            "description": "Project grant for visual artists. The application deadline is in September.",
            "type": "grant",
            "disciplines": ["visual arts"],
            "location": "Netherlands",
            "deadline": "2025-09-01"
        },
        {
            "id": "wiels",
            "name": "WIELS Residency",
            "organization": "WIELS",
            "description": "Studio residency in Brussels for emerging artists.",
            "type": "residency",
            "disciplines": ["painting", "sculpture"],
            "location": "Brussels, Belgium"
        }
    ])
}

#[tokio::test]
async fn empty_knowledge_base_yields_placeholder() {
    let retriever = retriever(json!([])).await;
    let result = retriever.retrieve("anything", 5, None, true).await.unwrap();
    assert_eq!(result.context, EMPTY_KNOWLEDGE_BASE);
    assert!(result.hits.is_empty());
}

#[tokio::test]
async fn retrieve_formats_ranked_context() {
    let retriever = retriever(entries()).await;
    let result = retriever
        .retrieve("residency in rural finland", 2, None, true)
        .await
        .unwrap();

    assert!(result.hits.len() <= 2);
    assert_eq!(result.hits[0].metadata.entry_name, "Saari Residence");
    assert!(result
        .context
        .starts_with("**Saari Residence** by Kone Foundation\n[Type: residency, Location: Finland]\n"));
    assert!(result.elapsed_ms >= 0.0);
}

#[tokio::test]
async fn filtered_retrieval_respects_facets() {
    let retriever = retriever(entries()).await;
    let filters = RetrievalFilters {
        kind: Some("residency".into()),
        location: Some("Belgium".into()),
        disciplines: None,
    };
    let result = retriever.filtered("studio", 5, &filters).await.unwrap();
    assert_eq!(result.hits.len(), 1);
    assert!(result.context.contains("WIELS Residency"));
    assert!(!result.context.contains("Saari"));
}

#[tokio::test]
async fn deadline_search_prefers_dated_entries() {
    let retriever = retriever(entries()).await;
    let result = retriever.upcoming_deadlines(3).await.unwrap();
    assert_eq!(result.hits.len(), 3);
    assert_eq!(result.hits[0].metadata.entry_name, "Mondriaan Fund Grant");
}

#[tokio::test]
async fn oversized_result_count_returns_everything() {
    let retriever = retriever(entries()).await;
    let result = retriever
        .retrieve("residency", usize::MAX / 2 + 1, None, true)
        .await
        .unwrap();
    assert_eq!(result.hits.len(), 3);
}
