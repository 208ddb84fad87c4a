//! Query orchestration: retrieval, answer generation and session history.

use grantwise_llm::{calculate_confidence, extract_sources, format_for_speech, GenerationOptions, LlmError, LlmService};
use grantwise_retrieval::Retriever;
use grantwise_types::RagResponse;
use grantwise_vector::VectorError;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Turns kept per session.
pub const MAX_SESSION_TURNS: usize = 10;

/// Sessions kept in memory. The least recently used one is evicted first.
pub const MAX_SESSIONS: usize = 1_000;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] VectorError),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),
}

/// Progress reported while a streamed answer is produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Status(String),
    Started,
    Chunk(String),
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionTurn {
    pub timestamp: String,
    pub query: String,
    pub response: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub created_at: String,
    pub history: Vec<SessionTurn>,
    #[serde(skip)]
    last_active: Instant,
}

/// Session histories keyed by client-chosen id, bounded in both the number
/// of sessions and the turns per session.
pub struct SessionStore {
    limit: usize,
    /// Uses `std::sync::RwLock`: every access is a short map operation that
    /// never spans an `.await`.
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Appends `turn`, creating the session if needed and evicting the
    /// least recently used session when the store is full.
    pub fn record(&self, session_id: &str, turn: SessionTurn) {
        let mut sessions = self.write();
        if !sessions.contains_key(session_id) && sessions.len() >= self.limit {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, session)| session.last_active)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                sessions.remove(&oldest);
                tracing::debug!(session = %oldest, "evicted least recently used session");
            }
        }

        let session = sessions.entry(session_id.to_string()).or_insert_with(|| Session {
            created_at: turn.timestamp.clone(),
            history: Vec::new(),
            last_active: Instant::now(),
        });
        session.last_active = Instant::now();
        session.history.push(turn);
        if session.history.len() > MAX_SESSION_TURNS {
            let excess = session.history.len() - MAX_SESSION_TURNS;
            session.history.drain(..excess);
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.read().get(session_id).cloned()
    }

    /// Returns false if the session did not exist.
    pub fn remove(&self, session_id: &str) -> bool {
        self.write().remove(session_id).is_some()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Session>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Runs queries through retrieval and generation and keeps a short
/// history per session id.
pub struct Orchestrator {
    retriever: Retriever,
    llm: LlmService,
    num_results: usize,
    sessions: SessionStore,
}

impl Orchestrator {
    pub fn new(retriever: Retriever, llm: LlmService, num_results: usize) -> Self {
        Self {
            retriever,
            llm,
            num_results: num_results.max(1),
            sessions: SessionStore::new(MAX_SESSIONS),
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn llm(&self) -> &LlmService {
        &self.llm
    }

    pub fn num_results(&self) -> usize {
        self.num_results
    }

    /// Retrieves context for `query` and generates a complete answer.
    pub async fn process_query(
        &self,
        query: &str,
        num_results: Option<usize>,
        session_id: Option<&str>,
    ) -> Result<RagResponse, OrchestratorError> {
        let start = Instant::now();
        let mut steps = BTreeMap::new();

        let retrieval = self
            .retriever
            .retrieve(query, num_results.unwrap_or(self.num_results), None, true)
            .await?;
        steps.insert("retrieval_ms".to_string(), retrieval.elapsed_ms);

        let llm_start = Instant::now();
        let mut response = self
            .llm
            .generate(query, &retrieval.context, GenerationOptions::default())
            .await?;
        steps.insert("llm_generation_ms".to_string(), elapsed_ms(llm_start));

        self.finish(query, session_id, start, steps, &mut response);
        Ok(response)
    }

    /// Like [`process_query`](Self::process_query), but reports progress
    /// and answer deltas on `events` as they arrive.
    ///
    /// A failed generation is reported as [`StreamEvent::Failed`] before
    /// the error is returned.
    pub async fn process_query_streaming(
        &self,
        query: &str,
        session_id: Option<&str>,
        events: mpsc::Sender<StreamEvent>,
    ) -> Result<RagResponse, OrchestratorError> {
        let start = Instant::now();
        let mut steps = BTreeMap::new();

        let _ = events
            .send(StreamEvent::Status("Searching knowledge base...".into()))
            .await;
        let retrieval = self
            .retriever
            .retrieve(query, self.num_results, None, true)
            .await?;
        steps.insert("retrieval_ms".to_string(), retrieval.elapsed_ms);

        let _ = events
            .send(StreamEvent::Status("Generating response...".into()))
            .await;
        let _ = events.send(StreamEvent::Started).await;

        let llm_start = Instant::now();
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let generation = self
            .llm
            .stream_answer(query, &retrieval.context, GenerationOptions::default(), tx);
        let forward = async {
            while let Some(delta) = rx.recv().await {
                if events.send(StreamEvent::Chunk(delta)).await.is_err() {
                    break;
                }
            }
        };
        let (answer, ()) = tokio::join!(generation, forward);

        let answer = match answer {
            Ok(answer) => {
                let _ = events.send(StreamEvent::Completed).await;
                answer
            }
            Err(e) => {
                tracing::error!(error = %e, "streaming error");
                let _ = events.send(StreamEvent::Failed(e.to_string())).await;
                return Err(e.into());
            }
        };
        steps.insert("llm_generation_ms".to_string(), elapsed_ms(llm_start));

        let mut response = RagResponse {
            query: query.to_string(),
            confidence: calculate_confidence(&answer, &retrieval.context),
            sources: extract_sources(&retrieval.context),
            context: retrieval.context,
            answer,
            processing_steps: BTreeMap::new(),
        };
        self.finish(query, session_id, start, steps, &mut response);
        Ok(response)
    }

    fn finish(
        &self,
        query: &str,
        session_id: Option<&str>,
        start: Instant,
        mut steps: BTreeMap<String, f64>,
        response: &mut RagResponse,
    ) {
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            self.record_turn(id, query, response);
        }

        let total = elapsed_ms(start);
        steps.insert("total_ms".to_string(), total);
        tracing::info!(
            total_ms = total,
            retrieval_ms = steps.get("retrieval_ms").copied().unwrap_or_default(),
            generation_ms = steps.get("llm_generation_ms").copied().unwrap_or_default(),
            "query processed"
        );
        response.processing_steps = steps;
    }

    fn record_turn(&self, session_id: &str, query: &str, response: &RagResponse) {
        let turn = SessionTurn {
            timestamp: chrono::Utc::now().to_rfc3339(),
            query: query.to_string(),
            response: response.answer.clone(),
            confidence: response.confidence,
            sources: response.sources.clone(),
        };
        self.sessions.record(session_id, turn);
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id)
    }

    /// Removes a session. Returns false if it did not exist.
    pub fn clear_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id)
    }

    /// Text ready for a speaking avatar.
    pub fn prepare_for_tts(&self, response: &str) -> String {
        format_for_speech(response)
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
