use crate::chat::{ChatClient, ChatMessage, ChatRequest};
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::heuristics::{calculate_confidence, extract_sources};
use grantwise_types::RagResponse;
use std::collections::BTreeMap;
use std::time::Instant;
use tokio::sync::mpsc;

const CLARIFICATION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant specializing in art grants and residencies.";
const CLARIFICATION_MAX_TOKENS: u32 = 150;
const CLARIFICATION_TEMPERATURE: f32 = 0.7;

/// Per-request overrides of the configured sampling parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Builds advisor prompts from retrieved context and runs them through the
/// chat client.
#[derive(Clone)]
pub struct LlmService {
    chat: ChatClient,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            chat: ChatClient::new(config)?,
        })
    }

    pub fn model(&self) -> &str {
        &self.chat.config().model
    }

    /// Answers `query` from `context`, scoring the answer and listing the
    /// sources named in the context.
    pub async fn generate(
        &self,
        query: &str,
        context: &str,
        options: GenerationOptions,
    ) -> Result<RagResponse, LlmError> {
        let start = Instant::now();
        let mut request = self.answer_request(query, context, options);
        request.frequency_penalty = Some(0.1);
        request.presence_penalty = Some(0.1);

        let answer = self.chat.complete(&request).await.inspect_err(|e| {
            tracing::error!(error = %e, "LLM generation failed");
        })?;

        let confidence = calculate_confidence(&answer, context);
        let sources = extract_sources(context);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(confidence, elapsed_ms, "generated answer");

        let mut processing_steps = BTreeMap::new();
        processing_steps.insert("llm_generation_ms".to_string(), elapsed_ms);

        Ok(RagResponse {
            query: query.to_string(),
            context: context.to_string(),
            answer,
            confidence,
            sources,
            processing_steps,
        })
    }

    /// Streams answer deltas into `tx`, returning the full answer once the
    /// stream ends.
    pub async fn stream_answer(
        &self,
        query: &str,
        context: &str,
        options: GenerationOptions,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let request = self.answer_request(query, context, options);
        self.chat.stream(&request, tx).await
    }

    /// Asks the model for a short follow-up question when `query` is too
    /// vague to answer well.
    pub async fn clarification(&self, query: &str) -> Result<String, LlmError> {
        let prompt = format!(
            "The user has asked a question about art grants and residencies, but the query needs clarification to provide the most helpful response.\n\n\
             User query: {query}\n\n\
             Available context suggests these possible interpretations or missing information. Generate a friendly clarification question to better understand what the user is looking for.\n\n\
             Keep the clarification brief and offer 2-3 specific options if applicable."
        );
        let request = ChatRequest::new(
            vec![
                ChatMessage::system(CLARIFICATION_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
            CLARIFICATION_TEMPERATURE,
            CLARIFICATION_MAX_TOKENS,
        );
        self.chat.complete(&request).await
    }

    fn answer_request(&self, query: &str, context: &str, options: GenerationOptions) -> ChatRequest {
        let config = self.chat.config();
        let mut request = ChatRequest::new(
            vec![
                ChatMessage::system(config.system_prompt.clone()),
                ChatMessage::user(user_prompt(query, context)),
            ],
            options.temperature.unwrap_or(config.temperature),
            options.max_tokens.unwrap_or(config.max_tokens),
        );
        request.top_p = Some(0.9);
        request
    }
}

pub(crate) fn user_prompt(query: &str, context: &str) -> String {
    format!(
        "Based on the following context from the art grants and residencies knowledge base, please answer the user's question. If the context doesn't contain enough information to fully answer the question, acknowledge this and provide any relevant general guidance you can.\n\n\
         CONTEXT:\n{context}\n\n\
         USER QUESTION:\n{query}\n\n\
         Please provide a helpful, accurate, and well-structured response."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_embeds_context_and_question() {
        let prompt = user_prompt("Any grants in Berlin?", "**Berlin Fund**\nMoney.");
        assert!(prompt.contains("CONTEXT:\n**Berlin Fund**\nMoney.\n\nUSER QUESTION:\nAny grants in Berlin?\n\n"));
        assert!(prompt.ends_with("well-structured response."));
    }

    #[test]
    fn overrides_replace_configured_sampling() {
        let service = LlmService::new(LlmConfig {
            api_key: "k".into(),
            ..LlmConfig::default()
        })
        .unwrap();
        let request = service.answer_request(
            "q",
            "c",
            GenerationOptions {
                temperature: Some(0.2),
                max_tokens: None,
            },
        );
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, 2_000);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, crate::DEFAULT_SYSTEM_PROMPT);
    }
}
