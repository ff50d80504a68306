//! HTTP surface: a thin axum layer over the engine.
//!
//! Two endpoints: `POST /chat` drives one turn for a thread and `POST /ingest`
//! adds a document to the retrieval corpus. All orchestration semantics live
//! in [`TurnEngine`]; handlers only translate between JSON bodies and engine
//! calls, mapping engine errors onto status codes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument};

use crate::engine::{TurnEngine, TurnError};
use crate::retrieval::Retriever;

/// Shared handler state. Cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TurnEngine>,
    pub retriever: Arc<dyn Retriever>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub thread_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub text: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/ingest", post(ingest))
        .with_state(state)
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

#[instrument(skip(state, req), fields(thread_id = %req.thread_id))]
async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    match state
        .engine
        .run_turn(&req.thread_id, Some(&req.message))
        .await
    {
        Ok(outcome) => {
            let aborted = match &outcome.status {
                crate::engine::TurnStatus::Completed => None,
                crate::engine::TurnStatus::Aborted { reason } => Some(reason.to_string()),
            };
            Json(ChatResponse {
                response: outcome.content,
                aborted,
            })
            .into_response()
        }
        Err(TurnError::EmptyThreadId) => {
            error_body(StatusCode::BAD_REQUEST, "thread_id must not be empty")
        }
        Err(e @ TurnError::ThreadBusy { .. }) => error_body(StatusCode::CONFLICT, e.to_string()),
        Err(e @ TurnError::Model(_)) => {
            error!(error = %e, "turn failed at model invocation");
            error_body(StatusCode::BAD_GATEWAY, e.to_string())
        }
        Err(e @ TurnError::Checkpoint(_)) => {
            error!(error = %e, "turn failed at checkpoint write");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[instrument(skip(state, req))]
async fn ingest(State(state): State<AppState>, Json(req): Json<IngestRequest>) -> Response {
    match state.retriever.ingest(&req.text).await {
        Ok(()) => {
            info!(bytes = req.text.len(), "document ingested");
            Json(json!({ "status": "ok" })).into_response()
        }
        Err(e) => error_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("ingest failed: {e}"),
        ),
    }
}
