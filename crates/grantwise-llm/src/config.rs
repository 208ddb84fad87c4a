use crate::retry::RetryConfig;
use serde::Deserialize;
use std::fmt;

/// Persona used when no system prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert art grant and residency advisor for artists. Your expertise includes:

1. Comprehensive knowledge of international art grants, fellowships, and residency programs
2. Understanding of application requirements, deadlines, and eligibility criteria
3. Ability to match artists with appropriate opportunities based on their medium, career stage, and goals
4. Practical advice on creating compelling applications and portfolios
5. Knowledge of funding amounts, benefits, and what each program offers

Your responses should be:
- Accurate and based on the provided context
- Helpful and actionable
- Encouraging and supportive of artists' goals
- Clear about any limitations in your knowledge

If the context doesn't contain specific information, acknowledge this honestly and provide general guidance where appropriate.";

/// Settings for the OpenAI-compatible API.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub system_prompt: String,
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            embedding_model: "text-embedding-ada-002".to_string(),
            max_tokens: 2_000,
            temperature: 0.7,
            request_timeout_secs: 60,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl LlmConfig {
    pub(crate) fn http_client(&self) -> Result<reqwest::Client, crate::LlmError> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| crate::LlmError::Connection(e.to_string()))
    }

    /// Client for streamed completions. The timeout bounds each read rather
    /// than the whole response, so long answers are not cut off.
    pub(crate) fn streaming_http_client(&self) -> Result<reqwest::Client, crate::LlmError> {
        let timeout = std::time::Duration::from_secs(self.request_timeout_secs.max(1));
        reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()
            .map_err(|e| crate::LlmError::Connection(e.to_string()))
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_key() {
        let config = LlmConfig {
            api_key: "sk-secret".into(),
            ..LlmConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = LlmConfig {
            base_url: "http://127.0.0.1:9000/v1/".into(),
            ..LlmConfig::default()
        };
        assert_eq!(config.endpoint("embeddings"), "http://127.0.0.1:9000/v1/embeddings");
    }
}
