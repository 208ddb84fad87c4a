//! Keeps the knowledge base fresh.
//!
//! [`DataUpdater`] scrapes listing pages, reads RSS/Atom feeds and JSON
//! APIs, merges what it finds into the knowledge-base file using content
//! hashes for change detection, and re-ingests the file into the vector
//! store. [`UpdateSchedule`] parses the configured run schedule and
//! [`Notifier`] reports results to a webhook.

mod collect;
mod entry;
mod error;
mod kb_file;
mod notify;
mod schedule;
mod source;
mod updater;

pub use collect::{parse_api_results, parse_feed, parse_listings};
pub use entry::{content_hash, generate_id, infer_kind, UpdaterEntry};
pub use error::UpdaterError;
pub use kb_file::{Integration, KnowledgeBaseFile};
pub use notify::{completion_payload, failure_payload, Notifier};
pub use schedule::UpdateSchedule;
pub use source::{builtin_sources, load_sources, DataSource, SourceKind};
pub use updater::DataUpdater;

use serde::{Deserialize, Serialize};

/// Counters for one update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStats {
    pub new: usize,
    pub updated: usize,
    pub errors: usize,
}
