//! grantwise server binary: the art grants and residencies advisor backend.
//!
//! Starts an axum HTTP server with structured logging, database
//! initialization, knowledge-base ingestion, the update scheduler, and
//! graceful shutdown on SIGTERM/SIGINT.

use grantwise_server::background::UpdateScheduler;
use grantwise_server::config::{self, VectorBackend};
use grantwise_server::orchestrator::Orchestrator;
use grantwise_server::{app, AppState};
use grantwise_llm::{LlmService, OpenAiEmbedder};
use grantwise_retrieval::Retriever;
use grantwise_text::TextProcessor;
use grantwise_updater::{load_sources, DataUpdater, Notifier, SourceKind};
use grantwise_vector::{
    ChromaStore, ChunkSettings, KnowledgeBase, SqliteVectorStore, VectorStore, COLLECTION_NAME,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("GRANTWISE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

/// Ingests the knowledge-base file when the collection is empty. Failures
/// are logged and startup continues.
async fn auto_ingest(kb: &KnowledgeBase, path: &Path) {
    match kb.count().await {
        Ok(0) => {}
        Ok(count) => {
            tracing::info!(chunks = count, "knowledge base already populated");
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to count knowledge base chunks");
            return;
        }
    }

    tracing::info!(path = %path.display(), "database is empty, auto-ingesting knowledge base");
    match kb.ingest_file(path, true).await {
        Ok(report) => tracing::info!(
            added = report.entries_added,
            errors = report.errors.len(),
            "auto-ingestion completed"
        ),
        Err(e) => tracing::error!(error = %e, "auto-ingestion failed"),
    }
}

#[tokio::main]
async fn main() {
    let dotenv = dotenvy::dotenv();

    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration: the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "loaded environment file");
    }
    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    tracing::debug!(?config, "effective configuration");

    // Initialize database
    let pool = grantwise_db::create_pool(
        &config.database.path,
        grantwise_db::DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )
    .expect("failed to create database pool: check database.path in config");

    {
        let conn = pool
            .get()
            .expect("failed to get database connection for migrations");
        let applied =
            grantwise_db::run_migrations(&conn).expect("failed to run database migrations");
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
    }

    // Vector store and knowledge base
    let embedder = OpenAiEmbedder::new(config.llm.clone())
        .expect("failed to create embeddings client: set OPENAI_API_KEY or llm.api_key");
    let store: Arc<dyn VectorStore> = match config.vector.backend {
        VectorBackend::Sqlite => Arc::new(
            SqliteVectorStore::open(pool.clone(), COLLECTION_NAME)
                .expect("failed to open the SQLite vector collection"),
        ),
        VectorBackend::Chroma => Arc::new(
            ChromaStore::connect(
                &config.vector.chroma_url,
                COLLECTION_NAME,
                Duration::from_secs(config.vector.request_timeout_secs.max(1)),
            )
            .await
            .expect("failed to connect to Chroma: check vector.chroma_url"),
        ),
    };
    tracing::info!(backend = store.backend(), collection = store.name(), "vector store ready");

    let processor = TextProcessor::for_model(&config.llm.embedding_model)
        .expect("failed to load tokenizer");
    let knowledge_base = Arc::new(KnowledgeBase::new(
        store,
        Arc::new(embedder),
        processor,
        ChunkSettings {
            chunk_size: config.vector.chunk_size,
            chunk_overlap: config.vector.chunk_overlap,
        },
    ));

    let knowledge_base_path = PathBuf::from(&config.rag.knowledge_base_path);
    auto_ingest(&knowledge_base, &knowledge_base_path).await;

    // Retrieval and generation
    let llm = LlmService::new(config.llm.clone())
        .expect("failed to create chat client: set OPENAI_API_KEY or llm.api_key");
    let orchestrator = Arc::new(Orchestrator::new(
        Retriever::new(knowledge_base.clone()),
        llm,
        config.rag.num_results,
    ));

    // Update scheduler
    let mut sources = load_sources(config.updater.custom_sources.as_deref());
    if !config.updater.enable_web_scraping {
        sources.retain(|s| s.kind != SourceKind::Scrape);
    }
    let updater = DataUpdater::new(
        sources,
        knowledge_base_path.clone(),
        Duration::from_secs(config.updater.scraping_timeout_secs.max(1)),
    )
    .expect("failed to create data updater")
    .with_knowledge_base(knowledge_base.clone());
    let scheduler = Arc::new(UpdateScheduler::new(
        updater,
        Notifier::new(config.updater.notification_webhook.clone()),
        &config.updater.schedule,
        pool,
    ));
    scheduler.start(config.updater.update_on_startup);

    // Build application
    let state = AppState {
        knowledge_base,
        orchestrator,
        scheduler: scheduler.clone(),
        knowledge_base_path,
        cors_origins: config.server.cors_origins.clone(),
    };
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting grantwise server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address: is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    scheduler.stop();
    tracing::info!("grantwise server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
