//! The knowledge-base JSON file the updater maintains.
//!
//! Entries collected from sources carry a `source_url` and are tracked by
//! id for change detection. Any other entries (hand-curated ones) are
//! carried through untouched.

use crate::entry::UpdaterEntry;
use crate::error::UpdaterError;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    New,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseFile {
    collected: BTreeMap<String, UpdaterEntry>,
    curated: Vec<Value>,
}

impl KnowledgeBaseFile {
    /// Loads `path`, or starts empty when it does not exist yet.
    pub async fn load(path: &Path) -> Result<Self, UpdaterError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no existing knowledge base, starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let data: Value = serde_json::from_str(&raw)?;
        Ok(Self::from_document(&data))
    }

    pub fn from_document(data: &Value) -> Self {
        let entries = data
            .get("knowledge_base")
            .and_then(|kb| kb.get("entries"))
            .or_else(|| data.get("entries"))
            .or(Some(data))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut file = Self::default();
        for raw in entries {
            if raw.get("source_url").is_some() {
                match serde_json::from_value::<UpdaterEntry>(raw.clone()) {
                    Ok(entry) => {
                        file.collected.insert(entry.id.clone(), entry);
                        continue;
                    }
                    Err(e) => tracing::warn!(error = %e, "keeping unreadable collected entry as-is"),
                }
            }
            file.curated.push(raw);
        }
        file
    }

    pub fn len(&self) -> usize {
        self.collected.len() + self.curated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collected(&self) -> impl Iterator<Item = &UpdaterEntry> {
        self.collected.values()
    }

    pub fn curated(&self) -> &[Value] {
        &self.curated
    }

    /// Adds `entry` if its id is new, replaces it if the content hash
    /// changed, and otherwise leaves the stored entry alone.
    pub fn integrate(&mut self, entry: UpdaterEntry) -> Integration {
        match self.collected.get(&entry.id) {
            None => {
                tracing::info!(name = %entry.name, "added new entry");
                self.collected.insert(entry.id.clone(), entry);
                Integration::New
            }
            Some(existing) if existing.hash != entry.hash => {
                tracing::info!(name = %entry.name, "updated entry");
                self.collected.insert(entry.id.clone(), entry);
                Integration::Updated
            }
            Some(_) => Integration::Unchanged,
        }
    }

    /// The file contents, entries sorted by type then name.
    pub fn to_document(&self) -> Result<Value, UpdaterError> {
        let mut entries = self.curated.clone();
        for entry in self.collected.values() {
            entries.push(serde_json::to_value(entry)?);
        }
        let sort_key = |v: &Value| {
            (
                v.get("type").and_then(Value::as_str).unwrap_or("").to_string(),
                v.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
            )
        };
        entries.sort_by_key(sort_key);

        Ok(json!({
            "knowledge_base": {
                "metadata": {
                    "version": "1.0",
                    "last_updated": chrono::Utc::now().to_rfc3339(),
                    "description": "Art grants and residencies expert knowledge base",
                    "total_entries": entries.len(),
                },
                "entries": entries,
            }
        }))
    }

    /// Writes the file through a temporary sibling and a rename so readers
    /// never see a partial document.
    pub async fn save(&self, path: &Path) -> Result<(), UpdaterError> {
        let document = self.to_document()?;
        let body = serde_json::to_vec_pretty(&document)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, path).await?;

        tracing::info!(entries = self.len(), path = %path.display(), "saved knowledge base");
        Ok(())
    }
}
