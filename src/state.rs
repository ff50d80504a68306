//! Per-thread graph execution state.
//!
//! [`GraphState`] is the unit the checkpoint store persists: the append-only
//! message history of one conversation thread plus the bookkeeping the turn
//! loop needs to resume after a crash (the pending tool-call set and the
//! iteration counter).
//!
//! Invariants maintained by the engine:
//! - messages are strictly append-ordered and never rewritten in place;
//! - `pending_tool_calls` is empty whenever a turn is in a terminal state;
//! - `iteration_count` never exceeds the configured maximum.

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::message::{Message, ToolCallRequest};

/// Complete graph execution state for one conversation thread.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    /// Opaque thread identifier.
    pub thread_id: String,
    /// Ordered message history, oldest first.
    pub messages: Vec<Message>,
    /// Tool-call requests appended with the latest Assistant message and not
    /// yet resolved into Tool messages, in emission order.
    #[serde(default)]
    pub pending_tool_calls: Vec<ToolCallRequest>,
    /// Number of completed tool-step iterations within the current turn.
    #[serde(default)]
    pub iteration_count: u32,
}

impl GraphState {
    /// Creates an empty state for a thread that has no checkpoint yet.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            pending_tool_calls: Vec::new(),
            iteration_count: 0,
        }
    }

    /// Appends a message to the history.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The most recent message, if any.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Content of the most recent Assistant message, scanning backwards.
    ///
    /// Used as the partial answer when a turn aborts.
    #[must_use]
    pub fn last_assistant_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.is_assistant())
            .map(Message::content)
    }

    /// Call ids already resolved by a Tool message in the history.
    #[must_use]
    pub fn resolved_call_ids(&self) -> FxHashSet<&str> {
        self.messages
            .iter()
            .filter_map(Message::resolved_call_id)
            .collect()
    }

    /// Pending requests that have no matching Tool message yet, in emission
    /// order. This is the set a resumed turn must still execute; requests a
    /// previous (crashed) run already resolved are filtered out so each call
    /// id resolves at most once.
    #[must_use]
    pub fn unresolved_pending(&self) -> Vec<ToolCallRequest> {
        let resolved = self.resolved_call_ids();
        self.pending_tool_calls
            .iter()
            .filter(|req| !resolved.contains(req.call_id.as_str()))
            .cloned()
            .collect()
    }

    /// True when no tool work is outstanding.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.unresolved_pending().is_empty()
    }
}
