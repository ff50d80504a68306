//! Model invoker: history + tool specs → one assistant reply.
//!
//! The inference API is an external collaborator behind [`ModelInvoker`].
//! Unlike retrieval and tool execution, a model failure is fatal to the turn;
//! there is no fallback reply.

mod openai_compat;

pub use openai_compat::OpenAiCompatInvoker;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::{Message, ToolCallRequest};

/// Advertised capability the model may request via a tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Exactly one assistant response, optionally carrying tool-call requests.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AssistantReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: content.into(),
            tool_calls,
        }
    }

    /// Converts the reply into the Assistant message appended to history.
    #[must_use]
    pub fn into_message(self) -> Message {
        if self.tool_calls.is_empty() {
            Message::assistant(self.content)
        } else {
            Message::assistant_with_tool_calls(self.content, self.tool_calls)
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("model endpoint returned status {status}: {body}")]
    #[diagnostic(code(turnloom::model::api))]
    Api { status: u16, body: String },

    #[error("model request failed: {0}")]
    #[diagnostic(
        code(turnloom::model::transport),
        help("Check the model base URL, network reachability, and the configured timeout.")
    )]
    Transport(#[from] reqwest::Error),

    #[error("model invocation timed out after {seconds}s")]
    #[diagnostic(code(turnloom::model::timeout))]
    Timeout { seconds: u64 },

    #[error("model response could not be decoded: {message}")]
    #[diagnostic(code(turnloom::model::decode))]
    Decode { message: String },
}

/// External inference collaborator.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Invokes the model with the full history (system instructions and tool
    /// specs included) and returns exactly one assistant reply.
    async fn invoke(
        &self,
        history: &[Message],
        tool_specs: &[ToolSpec],
    ) -> Result<AssistantReply, ModelError>;
}
