use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: check the API key")]
    AuthFailed,

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out")]
    Timeout,

    #[error("failed to parse response: {0}")]
    ResponseParse(String),

    #[error("stream error: {0}")]
    Streaming(String),

    #[error("response contained no content")]
    EmptyResponse,

    #[error("API key is not configured")]
    MissingApiKey,
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited { .. }
            | LlmError::Connection(_)
            | LlmError::Timeout
            | LlmError::Streaming(_) => true,
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Connection(err.to_string())
        }
    }

    /// Maps a non-success HTTP status and body to an error.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed,
            429 => {
                let retry_after_secs = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                    .and_then(|msg| {
                        msg.split("in ")
                            .last()
                            .and_then(|s| s.trim().trim_end_matches('.').trim_end_matches('s').parse::<u64>().ok())
                    })
                    .unwrap_or(5);
                LlmError::RateLimited { retry_after_secs }
            }
            code => {
                let message = serde_json::from_str::<serde_json::Value>(body)
                    .ok()
                    .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                    .unwrap_or_else(|| body.chars().take(500).collect());
                LlmError::Api {
                    status: code,
                    message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            LlmError::from_status(StatusCode::UNAUTHORIZED, ""),
            LlmError::AuthFailed
        ));

        let limited = LlmError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached. Please try again in 7s."}}"#,
        );
        assert!(matches!(limited, LlmError::RateLimited { retry_after_secs: 7 }));

        let server = LlmError::from_status(
            StatusCode::BAD_GATEWAY,
            r#"{"error":{"message":"upstream"}}"#,
        );
        assert!(matches!(&server, LlmError::Api { status: 502, message } if message == "upstream"));
        assert!(server.is_transient());

        let bad = LlmError::from_status(StatusCode::BAD_REQUEST, "nope");
        assert!(!bad.is_transient());
    }
}
