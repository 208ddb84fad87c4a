//! Server configuration loading from file and environment variables.

use grantwise_llm::LlmConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Vector store settings.
    #[serde(default)]
    pub vector: VectorConfig,

    /// Chat and embedding API settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retrieval settings.
    #[serde(default)]
    pub rag: RagConfig,

    /// Knowledge-base updater settings.
    #[serde(default)]
    pub updater: UpdaterConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins. `"*"` allows any origin.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "grantwise_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Embeddings stored in the server's SQLite database.
    #[default]
    Sqlite,
    /// A Chroma server reached over HTTP.
    Chroma,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorConfig {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Base URL of the Chroma server when `backend = "chroma"`.
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    /// Chunk size in tokens.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Token overlap between consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_vector_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RagConfig {
    /// Context chunks used per answer.
    #[serde(default = "default_num_results")]
    pub num_results: usize,

    /// Knowledge-base JSON file ingested on startup and maintained by the
    /// updater.
    #[serde(default = "default_kb_path")]
    pub knowledge_base_path: String,
}

#[derive(Clone, Deserialize)]
pub struct UpdaterConfig {
    /// `cron:<5-field expression>` or `interval:<N><m|h|d>`.
    #[serde(default = "default_schedule")]
    pub schedule: String,

    #[serde(default)]
    pub update_on_startup: bool,

    /// JSON array of extra data sources.
    #[serde(default)]
    pub custom_sources: Option<String>,

    /// When false, `scrape` sources are skipped.
    #[serde(default = "default_true")]
    pub enable_web_scraping: bool,

    #[serde(default = "default_scraping_timeout_secs")]
    pub scraping_timeout_secs: u64,

    #[serde(default)]
    pub notification_webhook: Option<String>,
}

impl std::fmt::Debug for UpdaterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Custom sources may carry API keys and webhook URLs often embed tokens.
        f.debug_struct("UpdaterConfig")
            .field("schedule", &self.schedule)
            .field("update_on_startup", &self.update_on_startup)
            .field(
                "custom_sources",
                &self.custom_sources.as_ref().map(|_| "[REDACTED]"),
            )
            .field("enable_web_scraping", &self.enable_web_scraping)
            .field("scraping_timeout_secs", &self.scraping_timeout_secs)
            .field(
                "notification_webhook",
                &self.notification_webhook.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
}

fn default_port() -> u16 {
    8000
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_db_path() -> String {
    "data/grantwise.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

fn default_vector_timeout_secs() -> u64 {
    30
}

fn default_num_results() -> usize {
    5
}

fn default_kb_path() -> String {
    "./data/art_grants_residencies_kb.json".to_string()
}

fn default_schedule() -> String {
    "cron:0 0 * * *".to_string()
}

fn default_true() -> bool {
    true
}

fn default_scraping_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            chroma_url: default_chroma_url(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            request_timeout_secs: default_vector_timeout_secs(),
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            num_results: default_num_results(),
            knowledge_base_path: default_kb_path(),
        }
    }
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            schedule: default_schedule(),
            update_on_startup: false,
            custom_sources: None,
            enable_web_scraping: true,
            scraping_timeout_secs: default_scraping_timeout_secs(),
            notification_webhook: None,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value that cannot work was configured.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `GRANTWISE_HOST`, `GRANTWISE_PORT` override `server.host` / `server.port`
///   (`PORT` is also honoured for hosting platforms that set it)
/// - `GRANTWISE_CORS_ORIGINS` overrides `server.cors_origins` (comma-separated)
/// - `GRANTWISE_DB_PATH` overrides `database.path`
/// - `GRANTWISE_LOG_LEVEL` overrides `logging.level`
/// - `GRANTWISE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `GRANTWISE_VECTOR_BACKEND`, `GRANTWISE_CHROMA_URL` override `vector.*`
/// - `OPENAI_API_KEY` overrides `llm.api_key`; `GRANTWISE_LLM_MODEL`,
///   `GRANTWISE_EMBEDDING_MODEL`, `GRANTWISE_OPENAI_BASE_URL` override the rest
/// - `GRANTWISE_KB_PATH` overrides `rag.knowledge_base_path`
/// - `GRANTWISE_UPDATE_SCHEDULE`, `GRANTWISE_UPDATE_ON_STARTUP`,
///   `GRANTWISE_CUSTOM_DATA_SOURCES`, `GRANTWISE_NOTIFICATION_WEBHOOK`
///   override `updater.*`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the chunk settings cannot produce chunks.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Applies overrides from `lookup`, which maps a variable name to its value.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let flag = |value: String| value == "true" || value == "1";

    if let Some(host) = lookup("GRANTWISE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("GRANTWISE_PORT").or_else(|| lookup("PORT")) {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(origins) = lookup("GRANTWISE_CORS_ORIGINS") {
        config.server.cors_origins = origins
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }
    if let Some(db_path) = lookup("GRANTWISE_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = lookup("GRANTWISE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("GRANTWISE_LOG_JSON") {
        config.logging.json = flag(json);
    }

    if let Some(backend) = lookup("GRANTWISE_VECTOR_BACKEND") {
        match backend.to_lowercase().as_str() {
            "sqlite" => config.vector.backend = VectorBackend::Sqlite,
            "chroma" => config.vector.backend = VectorBackend::Chroma,
            other => tracing::warn!(backend = other, "ignoring unknown vector backend override"),
        }
    }
    if let Some(url) = lookup("GRANTWISE_CHROMA_URL") {
        config.vector.chroma_url = url;
    }

    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.llm.api_key = key;
    }
    if let Some(model) = lookup("GRANTWISE_LLM_MODEL") {
        config.llm.model = model;
    }
    if let Some(model) = lookup("GRANTWISE_EMBEDDING_MODEL") {
        config.llm.embedding_model = model;
    }
    if let Some(url) = lookup("GRANTWISE_OPENAI_BASE_URL") {
        config.llm.base_url = url;
    }

    if let Some(path) = lookup("GRANTWISE_KB_PATH") {
        config.rag.knowledge_base_path = path;
    }

    if let Some(schedule) = lookup("GRANTWISE_UPDATE_SCHEDULE") {
        config.updater.schedule = schedule;
    }
    if let Some(startup) = lookup("GRANTWISE_UPDATE_ON_STARTUP") {
        config.updater.update_on_startup = flag(startup);
    }
    if let Some(sources) = lookup("GRANTWISE_CUSTOM_DATA_SOURCES") {
        config.updater.custom_sources = Some(sources);
    }
    if let Some(webhook) = lookup("GRANTWISE_NOTIFICATION_WEBHOOK") {
        config.updater.notification_webhook = Some(webhook);
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.vector.chunk_size == 0 {
        return Err(ConfigError::Invalid("vector.chunk_size must be positive".into()));
    }
    if config.vector.chunk_overlap >= config.vector.chunk_size {
        return Err(ConfigError::Invalid(format!(
            "vector.chunk_overlap ({}) must be smaller than vector.chunk_size ({})",
            config.vector.chunk_overlap, config.vector.chunk_size
        )));
    }
    Ok(())
}
