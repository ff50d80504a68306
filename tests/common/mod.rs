//! Shared test doubles for engine integration tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use turnloom::checkpoint::InMemoryCheckpointer;
use turnloom::config::EngineConfig;
use turnloom::engine::TurnEngine;
use turnloom::message::{Message, ToolCallRequest};
use turnloom::model::{AssistantReply, ModelError, ModelInvoker, ToolSpec};
use turnloom::retrieval::{RetrievalError, Retriever, Snippet};
use turnloom::tools::{Tool, ToolError, ToolRegistry};

/// Replays a fixed sequence of replies, recording every history it was shown.
/// Panics if invoked past the end of the script.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<AssistantReply>>,
    pub seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(
        &self,
        history: &[Message],
        _tool_specs: &[ToolSpec],
    ) -> Result<AssistantReply, ModelError> {
        self.seen.lock().push(history.to_vec());
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| ModelError::Decode {
                message: "scripted model exhausted".into(),
            })
    }
}

/// Requests one fresh tool call on every invocation, forever.
pub struct AlwaysToolModel {
    pub tool_name: String,
}

#[async_trait]
impl ModelInvoker for AlwaysToolModel {
    async fn invoke(
        &self,
        _history: &[Message],
        _tool_specs: &[ToolSpec],
    ) -> Result<AssistantReply, ModelError> {
        let call_id = format!("call_{}", uuid::Uuid::new_v4());
        Ok(AssistantReply::with_tool_calls(
            "",
            vec![ToolCallRequest::new(
                call_id,
                &self.tool_name,
                json!({"value": 1}),
            )],
        ))
    }
}

/// Blocks until a release permit arrives, to hold a thread lease open.
pub struct BlockedModel {
    pub release: Arc<tokio::sync::Semaphore>,
}

#[async_trait]
impl ModelInvoker for BlockedModel {
    async fn invoke(
        &self,
        _history: &[Message],
        _tool_specs: &[ToolSpec],
    ) -> Result<AssistantReply, ModelError> {
        let permit = self.release.acquire().await.map_err(|_| ModelError::Decode {
            message: "release semaphore closed".into(),
        })?;
        permit.forget();
        Ok(AssistantReply::text("released"))
    }
}

/// Echoes its arguments back, counting invocations.
pub struct CountingTool {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for CountingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "echo",
            "Echoes arguments back.",
            json!({"type": "object", "properties": {"value": {}}}),
        )
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(arguments)
    }
}

/// Always fails, exercising the in-band failure path.
pub struct BrokenTool;

#[async_trait]
impl Tool for BrokenTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("broken", "Always fails.", json!({"type": "object"}))
    }

    async fn call(&self, _arguments: Value) -> Result<Value, ToolError> {
        Err(ToolError::Execution("synthetic breakage".into()))
    }
}

/// Retriever whose backing store is down.
pub struct DownRetriever;

#[async_trait]
impl Retriever for DownRetriever {
    async fn search(&self, _query: &str, _k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        Err(RetrievalError::Unavailable {
            message: "connection refused".into(),
        })
    }

    async fn ingest(&self, _text: &str) -> Result<(), RetrievalError> {
        Err(RetrievalError::Unavailable {
            message: "connection refused".into(),
        })
    }
}

/// Engine over in-memory collaborators; the checkpointer handle is shared so
/// tests can assert on persisted history.
pub fn engine_with(
    model: Arc<dyn ModelInvoker>,
    retriever: Arc<dyn Retriever>,
    tools: ToolRegistry,
    config: EngineConfig,
) -> (Arc<TurnEngine>, Arc<InMemoryCheckpointer>) {
    let checkpointer = Arc::new(InMemoryCheckpointer::new());
    let engine = TurnEngine::new(checkpointer.clone(), model, retriever)
        .with_tools(tools)
        .with_config(config);
    (Arc::new(engine), checkpointer)
}

pub fn role_names(messages: &[Message]) -> Vec<&'static str> {
    messages.iter().map(Message::role_name).collect()
}
