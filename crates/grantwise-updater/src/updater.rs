use crate::collect::{parse_api_results, parse_feed, parse_listings};
use crate::entry::UpdaterEntry;
use crate::error::UpdaterError;
use crate::kb_file::{Integration, KnowledgeBaseFile};
use crate::source::{DataSource, SourceKind};
use crate::UpdateStats;
use grantwise_vector::KnowledgeBase;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const USER_AGENT: &str = "grantwise-updater/0.1";

/// Collects opportunities from the configured sources, merges them into
/// the knowledge-base file and re-ingests the result.
pub struct DataUpdater {
    http: reqwest::Client,
    sources: Vec<DataSource>,
    kb_path: PathBuf,
    knowledge_base: Option<Arc<KnowledgeBase>>,
}

impl DataUpdater {
    pub fn new(
        sources: Vec<DataSource>,
        kb_path: impl Into<PathBuf>,
        request_timeout: Duration,
    ) -> Result<Self, UpdaterError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdaterError::Http {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            http,
            sources,
            kb_path: kb_path.into(),
            knowledge_base: None,
        })
    }

    /// Re-ingest into `kb` after every successful update.
    pub fn with_knowledge_base(mut self, kb: Arc<KnowledgeBase>) -> Self {
        self.knowledge_base = Some(kb);
        self
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn kb_path(&self) -> &Path {
        &self.kb_path
    }

    /// Runs one full update.
    ///
    /// Source and entry failures are counted in the returned stats. Loading,
    /// saving or re-ingesting the knowledge base fails the whole run.
    pub async fn update_knowledge_base(&self) -> Result<UpdateStats, UpdaterError> {
        tracing::info!(sources = self.sources.len(), "starting knowledge base update");
        let mut stats = UpdateStats::default();
        let mut file = KnowledgeBaseFile::load(&self.kb_path).await?;

        let mut collected = Vec::new();
        for source in self.sources.iter().filter(|s| s.enabled) {
            match self.collect(source).await {
                Ok(entries) => {
                    tracing::info!(source = %source.name, count = entries.len(), "collected entries");
                    collected.extend(entries);
                }
                Err(e) => {
                    tracing::error!(source = %source.name, error = %e, "error collecting from source");
                    stats.errors += 1;
                }
            }
        }

        let mut changed = Vec::new();
        for entry in collected {
            let id = entry.id.clone();
            match file.integrate(entry) {
                Integration::New => stats.new += 1,
                Integration::Updated => {
                    stats.updated += 1;
                    changed.push(id);
                }
                Integration::Unchanged => {}
            }
        }

        file.save(&self.kb_path).await?;
        self.reingest(&file, &changed).await?;

        tracing::info!(
            new = stats.new,
            updated = stats.updated,
            errors = stats.errors,
            "update completed"
        );
        Ok(stats)
    }

    async fn collect(&self, source: &DataSource) -> Result<Vec<UpdaterEntry>, UpdaterError> {
        match source.kind {
            SourceKind::Scrape => {
                let body = self.fetch_text(source).await?;
                let source = source.clone();
                tokio::task::spawn_blocking(move || parse_listings(&body, &source))
                    .await
                    .map_err(|e| UpdaterError::Task(e.to_string()))?
            }
            SourceKind::Rss => {
                let body = self.fetch_text(source).await?;
                parse_feed(&body, source)
            }
            SourceKind::Api => {
                let body = self.fetch_text(source).await?;
                let data: Value = serde_json::from_str(&body)?;
                Ok(parse_api_results(&data, source))
            }
        }
    }

    async fn fetch_text(&self, source: &DataSource) -> Result<String, UpdaterError> {
        let mut request = self.http.get(&source.url);
        if let Some(key) = source.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| UpdaterError::http(&source.url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpdaterError::Status {
                url: source.url.clone(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| UpdaterError::http(&source.url, e))
    }

    /// Organization to index a collected entry under when it has none.
    fn organization_for(&self, entry: &UpdaterEntry) -> String {
        self.sources
            .iter()
            .find(|s| s.url == entry.source_url)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| entry.source_url.clone())
    }

    /// Documents to ingest: curated entries as stored, collected entries
    /// mapped to the ingestion model.
    fn ingest_documents(&self, file: &KnowledgeBaseFile, only: Option<&[String]>) -> Result<Vec<Value>, UpdaterError> {
        let mut documents = Vec::new();
        if only.is_none() {
            documents.extend(file.curated().iter().cloned());
        }
        for entry in file.collected() {
            if only.is_some_and(|ids| !ids.contains(&entry.id)) {
                continue;
            }
            let grant = entry.to_grant_entry(&self.organization_for(entry));
            documents.push(serde_json::to_value(grant)?);
        }
        Ok(documents)
    }

    async fn reingest(&self, file: &KnowledgeBaseFile, changed: &[String]) -> Result<(), UpdaterError> {
        let Some(kb) = &self.knowledge_base else {
            return Ok(());
        };

        let all = Value::Array(self.ingest_documents(file, None)?);
        let report = kb.ingest_value(&all, false).await;
        let mut updated = 0;
        if !changed.is_empty() {
            let refreshed = Value::Array(self.ingest_documents(file, Some(changed))?);
            updated = kb.ingest_value(&refreshed, true).await.entries_updated;
        }

        tracing::info!(
            added = report.entries_added,
            updated,
            errors = report.errors.len(),
            "re-ingested knowledge base into vector store"
        );
        Ok(())
    }
}
