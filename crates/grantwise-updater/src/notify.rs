use crate::UpdateStats;
use serde_json::{json, Value};
use std::time::Duration;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts update results to an optional webhook. Delivery failures are
/// logged, never returned.
#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
    webhook: Option<String>,
}

impl Notifier {
    pub fn new(webhook: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            webhook: webhook.filter(|w| !w.trim().is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    /// Reports a finished run when it found something new or hit errors.
    pub async fn update_complete(&self, stats: &UpdateStats, duration: Duration) {
        if stats.new == 0 && stats.errors == 0 {
            return;
        }
        self.post(completion_payload(stats, duration)).await;
    }

    pub async fn update_failed(&self, error: &str) {
        self.post(failure_payload(error)).await;
    }

    async fn post(&self, payload: Value) {
        let Some(url) = &self.webhook else {
            return;
        };
        match self.http.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!("sent update notification");
            }
            Ok(response) => {
                tracing::error!(status = %response.status(), "notification webhook rejected payload");
            }
            Err(e) => tracing::error!(error = %e, "error sending notification"),
        }
    }
}

pub fn completion_payload(stats: &UpdateStats, duration: Duration) -> Value {
    json!({
        "text": "Knowledge Base Update Complete",
        "stats": stats,
        "duration_seconds": duration.as_secs_f64(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

pub fn failure_payload(error: &str) -> Value {
    json!({
        "text": "Knowledge Base Update Failed",
        "error": error,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
