//! The graph executor: drives one conversation turn through the node graph.
//!
//! One turn walks `LoadState → AgentStep → Routing → (ToolStep → AgentStep)*`
//! until it reaches `Terminal` (no tool calls requested) or `Aborted`
//! (iteration cap or turn deadline). Routing is a pure function of the latest
//! assistant reply: non-empty tool-call requests route to the tool step,
//! anything else terminates the turn.
//!
//! Checkpoints are written at exactly two kinds of points: right after an
//! assistant message with pending tool calls is appended (so recovery resumes
//! at the tool step with the correct pending set) and at turn termination or
//! abort. Graph-walking itself is synchronous; the only suspension points are
//! the retrieval, model, and tool calls, each under its own timeout.

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::lease::ThreadLeases;
use crate::checkpoint::{Checkpoint, Checkpointer, CheckpointerError};
use crate::config::EngineConfig;
use crate::message::Message;
use crate::model::{AssistantReply, ModelError, ModelInvoker};
use crate::retrieval::Retriever;
use crate::state::GraphState;
use crate::tools::ToolRegistry;

/// Why a turn ended in the `Aborted` state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortReason {
    /// The configured tool-iteration maximum was reached.
    IterationLimit { max: u32 },
    /// The optional turn-level deadline expired.
    DeadlineExceeded,
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::IterationLimit { max } => {
                write!(f, "tool iteration limit of {max} reached")
            }
            AbortReason::DeadlineExceeded => write!(f, "turn deadline exceeded"),
        }
    }
}

/// Terminal disposition of one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    Aborted { reason: AbortReason },
}

/// Result of one completed or aborted turn.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnOutcome {
    /// Final assistant content, or the last available content when aborted.
    pub content: String,
    pub status: TurnStatus,
    /// Tool-step iterations the turn performed.
    pub iterations: u32,
}

impl TurnOutcome {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TurnStatus::Aborted { .. })
    }
}

/// Infrastructure-level failures that abort the turn with a structured error.
///
/// Component-local recoverable failures (retrieval, individual tools) never
/// appear here; they are folded back into the history as in-band messages.
#[derive(Debug, Error, Diagnostic)]
pub enum TurnError {
    #[error("thread id must not be empty")]
    #[diagnostic(code(turnloom::engine::empty_thread_id))]
    EmptyThreadId,

    /// A turn is already in flight for this thread; the caller should retry.
    #[error("thread {thread_id} is busy: another turn holds its lease")]
    #[diagnostic(
        code(turnloom::engine::thread_busy),
        help("A RunTurn is already in flight for this thread id. Retry shortly.")
    )]
    ThreadBusy { thread_id: String },

    /// Model invocation failed; fatal to the turn, no fallback.
    #[error("model invocation failed: {0}")]
    #[diagnostic(code(turnloom::engine::model))]
    Model(#[from] ModelError),

    /// Checkpoint write failed; the turn cannot safely continue and no side
    /// effect is assumed committed.
    #[error(transparent)]
    #[diagnostic(code(turnloom::engine::checkpoint))]
    Checkpoint(#[from] CheckpointerError),
}

/// The conversation orchestration engine.
///
/// All collaborators are explicitly constructed handles injected at build
/// time; the engine owns no process-wide singletons. One engine serves many
/// threads concurrently while its per-thread leases keep each thread id
/// single-writer.
pub struct TurnEngine {
    checkpointer: Arc<dyn Checkpointer>,
    model: Arc<dyn ModelInvoker>,
    retriever: Arc<dyn Retriever>,
    tools: ToolRegistry,
    config: EngineConfig,
    leases: ThreadLeases,
}

impl TurnEngine {
    pub fn new(
        checkpointer: Arc<dyn Checkpointer>,
        model: Arc<dyn ModelInvoker>,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self {
            checkpointer,
            model,
            retriever,
            tools: ToolRegistry::new(),
            config: EngineConfig::default(),
            leases: ThreadLeases::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs one turn for `thread_id`.
    ///
    /// `incoming` is the new user message; pass `None` to resume a turn that
    /// crashed after a checkpoint save (any persisted pending tool calls are
    /// resolved before the model is consulted again, and already-resolved
    /// call ids are not re-invoked).
    #[instrument(skip(self, incoming), err)]
    pub async fn run_turn(
        &self,
        thread_id: &str,
        incoming: Option<&str>,
    ) -> Result<TurnOutcome, TurnError> {
        if thread_id.trim().is_empty() {
            return Err(TurnError::EmptyThreadId);
        }

        let _lease = self
            .leases
            .acquire(thread_id, self.config.lease_timeout)
            .await
            .ok_or_else(|| TurnError::ThreadBusy {
                thread_id: thread_id.to_string(),
            })?;

        // LoadState: latest checkpoint or an empty state for a new thread.
        let (mut state, mut version) = match self.checkpointer.load_latest(thread_id).await? {
            Some(checkpoint) => (checkpoint.state, checkpoint.version),
            None => (GraphState::new(thread_id), 0),
        };

        let deadline = self.config.turn_deadline.map(|d| Instant::now() + d);

        // Recovery path: a prior run checkpointed at a suspension point and
        // died. Resolve the outstanding calls before anything else so the
        // assistant message with pending calls is answered in order.
        if !state.unresolved_pending().is_empty() {
            info!(
                thread = thread_id,
                pending = state.unresolved_pending().len(),
                "resuming at tool step from persisted pending set"
            );
            self.tool_step(&mut state).await;
        } else {
            state.pending_tool_calls.clear();
        }

        if let Some(text) = incoming {
            state.append(Message::user(text));
            // A fresh inbound message starts a fresh iteration budget.
            state.iteration_count = 0;
        } else if let Some(message) = state.last_message()
            && message.is_assistant()
        {
            // Crash landed after the terminal checkpoint save but before the
            // response was delivered. The answer is already persisted; return
            // it without another model call or checkpoint write.
            debug!(thread = thread_id, "resume found settled state");
            return Ok(TurnOutcome {
                content: message.content().to_string(),
                status: TurnStatus::Completed,
                iterations: state.iteration_count,
            });
        }

        loop {
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                return self
                    .abort(&mut state, version, AbortReason::DeadlineExceeded)
                    .await;
            }

            // AgentStep.
            let reply = self.agent_step(&state).await?;

            // Routing: pure function of the latest assistant reply.
            if reply.tool_calls.is_empty() {
                let content = reply.content.clone();
                state.append(reply.into_message());
                self.save(&state, &mut version).await?;
                debug!(thread = thread_id, version, "turn terminal");
                return Ok(TurnOutcome {
                    content,
                    status: TurnStatus::Completed,
                    iterations: state.iteration_count,
                });
            }

            if state.iteration_count >= self.config.max_iterations {
                // Record the requests in the message but leave the pending
                // set empty: Aborted is a terminal state.
                state.append(reply.into_message());
                return self
                    .abort(
                        &mut state,
                        version,
                        AbortReason::IterationLimit {
                            max: self.config.max_iterations,
                        },
                    )
                    .await;
            }

            // Suspension point: persist the pending set before executing so
            // a crash here resumes at the tool step.
            state.pending_tool_calls = reply.tool_calls.clone();
            state.append(reply.into_message());
            self.save(&state, &mut version).await?;

            self.tool_step(&mut state).await;
        }
    }

    /// Agent step: optional retrieval augmentation, then one model call.
    ///
    /// Augmentation applies only to the copy of history sent to the model;
    /// the persisted user message keeps its original text. Retrieval failure
    /// or emptiness degrades to an unaugmented call, never failing the turn.
    async fn agent_step(&self, state: &GraphState) -> Result<AssistantReply, TurnError> {
        let mut history: Vec<Message> = Vec::with_capacity(state.messages.len() + 1);
        if let Some(prompt) = &self.config.system_prompt {
            history.push(Message::system(prompt));
        }
        history.extend(state.messages.iter().cloned());

        if let Some(Message::User { content }) = state.last_message() {
            let search = self.retriever.search(content, self.config.retrieval_k);
            match tokio::time::timeout(self.config.retrieval_timeout, search).await {
                Ok(Ok(snippets)) if !snippets.is_empty() => {
                    debug!(hits = snippets.len(), "retrieval augmentation applied");
                    let context: Vec<&str> = snippets.iter().map(|s| s.text.as_str()).collect();
                    let augmented = format!(
                        "[Reference context]\n{}\n\nUser question: {content}",
                        context.join("\n")
                    );
                    if let Some(last) = history.last_mut() {
                        *last = Message::user(augmented);
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    warn!(error = %e, "retrieval unavailable; proceeding unaugmented");
                }
                Err(_) => {
                    warn!("retrieval timed out; proceeding unaugmented");
                }
            }
        }

        let reply = self.model.invoke(&history, &self.tools.specs()).await?;
        Ok(reply)
    }

    /// Tool step: execute every unresolved pending request in emission order,
    /// appending one Tool message per resolved call id.
    async fn tool_step(&self, state: &mut GraphState) {
        let pending = state.unresolved_pending();
        for request in &pending {
            let outcome = self.tools.execute(request, self.config.tool_timeout).await;
            state.append(Message::from_outcome(outcome));
        }
        state.pending_tool_calls.clear();
        state.iteration_count += 1;
    }

    async fn save(&self, state: &GraphState, version: &mut u64) -> Result<(), TurnError> {
        self.checkpointer
            .save(Checkpoint::next(state, *version))
            .await?;
        *version += 1;
        Ok(())
    }

    /// Abort path: note the reason in history, persist, and return the last
    /// available content with the error flag set.
    async fn abort(
        &self,
        state: &mut GraphState,
        mut version: u64,
        reason: AbortReason,
    ) -> Result<TurnOutcome, TurnError> {
        warn!(thread = %state.thread_id, %reason, "turn aborted");
        state.append(Message::system(format!("turn aborted: {reason}")));
        self.save(state, &mut version).await?;

        let content = state
            .messages
            .iter()
            .rev()
            .filter(|m| m.is_assistant())
            .map(Message::content)
            .find(|c| !c.is_empty())
            .unwrap_or_default()
            .to_string();

        Ok(TurnOutcome {
            content,
            status: TurnStatus::Aborted { reason },
            iterations: state.iteration_count,
        })
    }
}
