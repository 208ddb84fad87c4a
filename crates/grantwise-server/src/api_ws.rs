//! WebSocket API for the speaking-avatar client (`/ws/simli`).
//!
//! Clients send JSON frames tagged by `type`:
//! - `query` with `text` (or `content`), optional `stream` and `session_id`
//! - `speech` with `text`, answered with the text rewritten for TTS
//! - `ping`, answered with `pong`
//!
//! Malformed frames get an `error` frame; the connection stays open.

use crate::orchestrator::StreamEvent;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sources previewed in the `context` frame.
const CONTEXT_PREVIEW_SOURCES: usize = 3;
const CONTEXT_PREVIEW_CHARS: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    Query {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        stream: bool,
        #[serde(default)]
        session_id: Option<String>,
    },
    Speech {
        text: String,
    },
    Ping,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextPreview {
    pub source: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    Processing { message: String },
    Status { message: String },
    Context { chunks: Vec<ContextPreview> },
    Response { text: String, confidence: f64 },
    StreamStart { message: String },
    StreamChunk { content: String },
    StreamComplete { message: String },
    StreamError { error: String },
    Speech { text: String },
    Pong,
    Error { message: String },
}

impl From<StreamEvent> for OutgoingMessage {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Status(message) => OutgoingMessage::Status { message },
            StreamEvent::Started => OutgoingMessage::StreamStart {
                message: "Starting response stream...".to_string(),
            },
            StreamEvent::Chunk(content) => OutgoingMessage::StreamChunk { content },
            StreamEvent::Completed => OutgoingMessage::StreamComplete {
                message: "Response complete".to_string(),
            },
            StreamEvent::Failed(error) => OutgoingMessage::StreamError { error },
        }
    }
}

/// Handler for `GET /ws/simli`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::info!("websocket connection established");
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a slow client cannot grow memory without limit.
    let (tx, mut rx) = mpsc::channel::<String>(256);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(AxumMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            AxumMessage::Text(text) => handle_text(&state, &tx, text.as_str()).await,
            AxumMessage::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    let _ = send_task.await;
    tracing::info!("websocket disconnected");
}

async fn handle_text(state: &AppState, tx: &mpsc::Sender<String>, text: &str) {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "malformed websocket frame");
            send(tx, &error_frame(format!("invalid JSON: {}", e))).await;
            return;
        }
    };
    let incoming = match serde_json::from_value::<IncomingMessage>(value) {
        Ok(incoming) => incoming,
        Err(e) => {
            send(tx, &error_frame(format!("unsupported message: {}", e))).await;
            return;
        }
    };

    match incoming {
        IncomingMessage::Ping => send(tx, &OutgoingMessage::Pong).await,
        IncomingMessage::Speech { text } => {
            let text = state.orchestrator.prepare_for_tts(&text);
            send(tx, &OutgoingMessage::Speech { text }).await;
        }
        IncomingMessage::Query {
            text,
            content,
            stream,
            session_id,
        } => {
            let query = text
                .filter(|t| !t.trim().is_empty())
                .or(content)
                .unwrap_or_default();
            if query.trim().is_empty() {
                send(tx, &error_frame("query text is required".to_string())).await;
                return;
            }
            tracing::info!(query = %query, stream, "received websocket query");
            handle_query(state, tx, &query, stream, session_id.as_deref()).await;
        }
    }
}

async fn handle_query(
    state: &AppState,
    tx: &mpsc::Sender<String>,
    query: &str,
    stream: bool,
    session_id: Option<&str>,
) {
    send(
        tx,
        &OutgoingMessage::Processing {
            message: "Searching knowledge base...".to_string(),
        },
    )
    .await;

    let result = if stream {
        let (events_tx, mut events_rx) = mpsc::channel::<StreamEvent>(64);
        let processing = state
            .orchestrator
            .process_query_streaming(query, session_id, events_tx);
        let forward = async {
            while let Some(event) = events_rx.recv().await {
                send(tx, &OutgoingMessage::from(event)).await;
            }
        };
        let (result, ()) = tokio::join!(processing, forward);
        result
    } else {
        state.orchestrator.process_query(query, None, session_id).await
    };

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "websocket query failed");
            send(tx, &error_frame(e.to_string())).await;
            return;
        }
    };

    if !stream && !response.sources.is_empty() {
        send(
            tx,
            &OutgoingMessage::Context {
                chunks: context_preview(&response.sources),
            },
        )
        .await;
    }

    send(
        tx,
        &OutgoingMessage::Response {
            text: response.answer,
            confidence: response.confidence,
        },
    )
    .await;
}

/// The first sources, each with a text cut to a short preview.
pub fn context_preview(sources: &[String]) -> Vec<ContextPreview> {
    sources
        .iter()
        .take(CONTEXT_PREVIEW_SOURCES)
        .map(|source| ContextPreview {
            source: source.clone(),
            text: format!(
                "{}...",
                source.chars().take(CONTEXT_PREVIEW_CHARS).collect::<String>()
            ),
        })
        .collect()
}

fn error_frame(message: String) -> OutgoingMessage {
    OutgoingMessage::Error { message }
}

async fn send(tx: &mpsc::Sender<String>, msg: &OutgoingMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            if tx.send(json).await.is_err() {
                tracing::debug!("websocket closed before frame was sent");
            }
        }
        Err(e) => tracing::error!(error = %e, "failed to serialize websocket frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outgoing_frames_are_tagged() {
        let frame = serde_json::to_value(OutgoingMessage::Response {
            text: "Apply by March.".into(),
            confidence: 0.8,
        })
        .unwrap();
        assert_eq!(frame, json!({"type": "response", "text": "Apply by March.", "confidence": 0.8}));

        let pong = serde_json::to_value(OutgoingMessage::Pong).unwrap();
        assert_eq!(pong, json!({"type": "pong"}));

        let chunk = serde_json::to_value(OutgoingMessage::from(StreamEvent::Chunk("Hi".into()))).unwrap();
        assert_eq!(chunk, json!({"type": "stream_chunk", "content": "Hi"}));
    }

    #[test]
    fn incoming_query_accepts_text_or_content() {
        let msg: IncomingMessage =
            serde_json::from_str(r#"{"type": "query", "content": "residencies in Berlin"}"#).unwrap();
        match msg {
            IncomingMessage::Query {
                text,
                content,
                stream,
                session_id,
            } => {
                assert!(text.is_none());
                assert_eq!(content.as_deref(), Some("residencies in Berlin"));
                assert!(!stream);
                assert!(session_id.is_none());
            }
            other => panic!("unexpected message: {:?}", other),
        }

        assert!(serde_json::from_str::<IncomingMessage>(r#"{"type": "dance"}"#).is_err());
    }

    #[test]
    fn context_preview_is_limited() {
        let sources: Vec<String> = vec![
            "Künstlerhaus Bethanien".into(),
            "x".repeat(150),
            "Saari Residence".into(),
            "Wiels".into(),
        ];
        let preview = context_preview(&sources);
        assert_eq!(preview.len(), 3);
        assert_eq!(preview[0].text, "Künstlerhaus Bethanien...");
        assert_eq!(preview[1].text.chars().count(), 103);
    }
}
