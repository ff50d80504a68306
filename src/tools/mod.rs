//! Tool registry and execution.
//!
//! Tools are pure request/response executors: structured arguments in, a JSON
//! value (or failure) out, with no shared mutable state across calls within a
//! turn. Execution failures are never fatal — the registry turns an unknown
//! name, an executor error, or a timeout into an error-flagged
//! [`ToolCallOutcome`] that the engine appends as a Tool message so the model
//! can recover.

mod backtest;

pub use backtest::BacktestTool;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use crate::message::{ToolCallOutcome, ToolCallRequest};
use crate::model::ToolSpec;

#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("{0}")]
    #[diagnostic(code(turnloom::tools::execution))]
    Execution(String),

    #[error("transport failure: {0}")]
    #[diagnostic(code(turnloom::tools::transport))]
    Transport(#[from] reqwest::Error),

    #[error("invalid arguments: {0}")]
    #[diagnostic(code(turnloom::tools::arguments))]
    Arguments(#[from] serde_json::Error),
}

/// One executable capability the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The spec advertised to the model.
    fn spec(&self) -> ToolSpec;

    /// Executes with structured arguments and returns the result payload.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Tool name → executor, with a bounded per-call timeout.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its spec name, replacing any previous entry.
    #[must_use]
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.insert(tool.spec().name.clone(), Arc::new(tool));
        self
    }

    /// Specs of every registered tool, for the model invocation.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Executes one request synchronously under `timeout`.
    ///
    /// Never fails the turn: unknown names, executor errors, and timeouts all
    /// come back as error-flagged outcomes carrying the cause as text.
    pub async fn execute(&self, request: &ToolCallRequest, timeout: Duration) -> ToolCallOutcome {
        let Some(tool) = self.tools.get(&request.tool_name) else {
            warn!(tool = %request.tool_name, call_id = %request.call_id, "unknown tool requested");
            return ToolCallOutcome::failure(
                &request.call_id,
                format!("unknown tool: {}", request.tool_name),
            );
        };

        match tokio::time::timeout(timeout, tool.call(request.arguments.clone())).await {
            Ok(Ok(output)) => {
                let content = match output {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                ToolCallOutcome::success(&request.call_id, content)
            }
            Ok(Err(e)) => {
                warn!(tool = %request.tool_name, call_id = %request.call_id, error = %e, "tool execution failed");
                ToolCallOutcome::failure(&request.call_id, format!("tool execution failed: {e}"))
            }
            Err(_) => {
                warn!(tool = %request.tool_name, call_id = %request.call_id, "tool execution timed out");
                ToolCallOutcome::failure(
                    &request.call_id,
                    format!(
                        "tool execution failed: timed out after {}s",
                        timeout.as_secs()
                    ),
                )
            }
        }
    }
}
