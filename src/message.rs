//! Conversation messages and tool-call payloads.
//!
//! A [`Message`] is a discriminated variant over the four conversation roles.
//! The role tag doubles as the serde tag, so a persisted message always
//! carries its kind explicitly and never degrades into an untyped map.
//!
//! # Examples
//!
//! ```
//! use turnloom::message::Message;
//!
//! let user = Message::user("What is 2+2?");
//! let reply = Message::assistant("4");
//!
//! assert_eq!(user.role_name(), "user");
//! assert_eq!(reply.content(), "4");
//! assert!(reply.tool_calls().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured request emitted by the model to invoke an external capability.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Identifier tying this request to its eventual Tool message.
    pub call_id: String,
    /// Registered tool name to invoke.
    pub tool_name: String,
    /// Structured arguments forwarded to the tool executor.
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

/// Resolution of one tool call: either its output or a structured failure.
///
/// Failures are surfaced in-band as Tool messages so the model can recover;
/// they never abort the turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallOutcome {
    pub call_id: String,
    /// Tool output on success, or the failure cause as text.
    pub content: String,
    pub is_error: bool,
}

impl ToolCallOutcome {
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn failure(call_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: cause.into(),
            is_error: true,
        }
    }
}

/// One entry in a thread's append-only message history.
///
/// Variants carry only the fields their role actually has: a Tool message
/// always references the call it resolves, and only Assistant messages may
/// request tool calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        content: String,
    },
    System {
        content: String,
    },
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    Tool {
        call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl Message {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Creates an assistant message with no tool-call requests.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Creates an assistant message carrying tool-call requests.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Message::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Creates a Tool message resolving `call_id` with a successful output.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates a Tool message resolving `call_id` with a failure cause.
    pub fn tool_failure(call_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Message::Tool {
            call_id: call_id.into(),
            content: cause.into(),
            is_error: true,
        }
    }

    /// Creates a Tool message from a resolved [`ToolCallOutcome`].
    pub fn from_outcome(outcome: ToolCallOutcome) -> Self {
        Message::Tool {
            call_id: outcome.call_id,
            content: outcome.content,
            is_error: outcome.is_error,
        }
    }

    /// The serialized role tag for this message.
    #[must_use]
    pub fn role_name(&self) -> &'static str {
        match self {
            Message::User { .. } => "user",
            Message::System { .. } => "system",
            Message::Assistant { .. } => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    /// The text content of this message.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Message::User { content }
            | Message::System { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }

    /// Tool-call requests carried by this message (empty for non-Assistant roles).
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// The call_id this message resolves, if it is a Tool message.
    #[must_use]
    pub fn resolved_call_id(&self) -> Option<&str> {
        match self {
            Message::Tool { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self, Message::Assistant { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constructors_set_role_and_content() {
        let m = Message::user("hello");
        assert_eq!(m.role_name(), "user");
        assert_eq!(m.content(), "hello");
        assert!(m.is_user());

        let m = Message::system("be brief");
        assert_eq!(m.role_name(), "system");

        let m = Message::assistant("hi");
        assert!(m.is_assistant());
        assert!(m.tool_calls().is_empty());
    }

    #[test]
    fn assistant_carries_tool_calls() {
        let req = ToolCallRequest::new("call_1", "echo", json!({"text": "x"}));
        let m = Message::assistant_with_tool_calls("", vec![req.clone()]);
        assert_eq!(m.tool_calls(), &[req]);
        assert_eq!(m.resolved_call_id(), None);
    }

    #[test]
    fn tool_message_references_its_call() {
        let ok = Message::tool_result("call_1", "{\"pnl\": 42}");
        assert_eq!(ok.resolved_call_id(), Some("call_1"));

        let failed = Message::tool_failure("call_2", "timed out");
        match failed {
            Message::Tool { is_error, .. } => assert!(is_error),
            _ => panic!("expected a Tool message"),
        }
    }

    #[test]
    fn serde_round_trip_preserves_variant() {
        let original = Message::assistant_with_tool_calls(
            "running a backtest",
            vec![ToolCallRequest::new(
                "call_9",
                "execute_backtest",
                json!({"code": "pass", "start_cash": 100000.0}),
            )],
        );
        let encoded = serde_json::to_string(&original).unwrap();
        assert!(encoded.contains("\"role\":\"assistant\""));
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn plain_assistant_serializes_without_tool_calls_field() {
        let encoded = serde_json::to_string(&Message::assistant("done")).unwrap();
        assert!(!encoded.contains("tool_calls"));
    }

    #[test]
    fn outcome_converts_to_tool_message() {
        let outcome = ToolCallOutcome::failure("call_3", "unknown tool: frobnicate");
        let m = Message::from_outcome(outcome);
        assert_eq!(m.resolved_call_id(), Some("call_3"));
        assert_eq!(m.content(), "unknown tool: frobnicate");
    }
}
