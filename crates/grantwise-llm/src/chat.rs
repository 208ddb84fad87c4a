use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::retry::with_retry;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Body of a `/chat/completions` call. The model is filled in by the client.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            messages,
            temperature,
            max_tokens,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
        }
    }

    fn body(&self, model: &str, stream: bool) -> serde_json::Value {
        let mut body = serde_json::to_value(self).unwrap_or_default();
        body["model"] = serde_json::Value::String(model.to_string());
        if stream {
            body["stream"] = serde_json::Value::Bool(true);
        }
        body
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ChatMessage,
}

/// Client for the chat completions endpoint.
#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    streaming_http: reqwest::Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http = config.http_client()?;
        let streaming_http = config.streaming_http_client()?;
        Ok(Self {
            http,
            streaming_http,
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Returns the full completion text, retrying transient failures.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let body = request.body(&self.config.model, false);
        with_retry(&self.config.retry, || self.send_completion(&body)).await
    }

    async fn send_completion(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let response = self.post(&self.http, body).await?;
        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        Ok(content)
    }

    /// Streams completion deltas into `tx` and returns the concatenated
    /// text. Only connection setup is retried; once deltas have been sent
    /// a failure is returned as-is.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let body = request.body(&self.config.model, true);
        let response =
            with_retry(&self.config.retry, || self.post(&self.streaming_http, &body)).await?;

        let mut stream = response.bytes_stream();
        // Raw bytes: a multi-byte character may straddle two network chunks.
        let mut buffer: Vec<u8> = Vec::new();
        let mut full = String::new();

        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming(e.to_string()))?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=newline).collect();
                let line = decode_line(&raw)?;
                match parse_sse_line(line.trim_end()) {
                    SseLine::Done => break 'outer,
                    SseLine::Delta(delta) => {
                        full.push_str(&delta);
                        if tx.send(delta).await.is_err() {
                            tracing::debug!("stream receiver dropped, stopping");
                            break 'outer;
                        }
                    }
                    SseLine::Skip => {}
                }
            }
        }

        if let SseLine::Delta(delta) = parse_sse_line(decode_line(&buffer)?.trim_end()) {
            full.push_str(&delta);
            let _ = tx.send(delta).await;
        }

        Ok(full)
    }

    async fn post(
        &self,
        http: &reqwest::Client,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, LlmError> {
        let response = http
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status, &text));
        }
        Ok(response)
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Delta(String),
    Done,
    Skip,
}

fn decode_line(raw: &[u8]) -> Result<String, LlmError> {
    String::from_utf8(raw.to_vec())
        .map_err(|e| LlmError::Streaming(format!("invalid UTF-8 in event stream: {}", e)))
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim_start();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    match serde_json::from_str::<serde_json::Value>(data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(delta) if !delta.is_empty() => SseLine::Delta(delta.to_string()),
            _ => SseLine::Skip,
        },
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed SSE payload");
            SseLine::Skip
        }
    }
}
