use crate::error::LlmError;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;

/// Exponential backoff settings.
///
/// The wait before retry `n` (1-based) is `multiplier_ms * 2^n`, clamped to
/// `[min_backoff_ms, max_backoff_ms]`. A server-supplied retry-after wins
/// when it is longer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub multiplier_ms: u64,
    pub min_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier_ms: 1_000,
            min_backoff_ms: 4_000,
            max_backoff_ms: 10_000,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts. Intended for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier_ms: 0,
            min_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub(crate) fn backoff(&self, attempt: u32, err: &LlmError) -> Duration {
        let exp = self
            .multiplier_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let mut ms = exp.clamp(self.min_backoff_ms, self.max_backoff_ms.max(self.min_backoff_ms));
        if let LlmError::RateLimited { retry_after_secs } = err {
            if self.max_backoff_ms > 0 {
                ms = ms.max(retry_after_secs.saturating_mul(1_000));
            }
        }
        Duration::from_millis(ms)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or runs out of
/// attempts.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let wait = config.backoff(attempt, &e);
                tracing::warn!(
                    attempt,
                    max_attempts = attempts,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "retrying after transient error"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_backoff_is_clamped() {
        let config = RetryConfig::default();
        let err = LlmError::Timeout;
        assert_eq!(config.backoff(1, &err), Duration::from_secs(4));
        assert_eq!(config.backoff(3, &err), Duration::from_secs(8));
        assert_eq!(config.backoff(6, &err), Duration::from_secs(10));
    }

    #[test]
    fn rate_limit_hint_extends_backoff() {
        let config = RetryConfig::default();
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(config.backoff(1, &err), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&RetryConfig::immediate(3), || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(LlmError::Connection("reset".into()))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_stop_immediately() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::AuthFailed)
        })
        .await;

        assert!(matches!(result, Err(LlmError::AuthFailed)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_retry(&RetryConfig::immediate(3), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::Timeout)
        })
        .await;

        assert!(matches!(result, Err(LlmError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
