//! Durable checkpoint storage for thread state.
//!
//! A [`Checkpoint`] is a versioned snapshot of one thread's [`GraphState`].
//! Versions are monotonically increasing per thread; [`Checkpointer::save`]
//! rejects anything other than `latest + 1` so a stale writer can never
//! overwrite a newer snapshot. Saves are atomic from the caller's view: a
//! crash between load and save never leaves a state mixing two turns.
//!
//! Backends:
//! - [`InMemoryCheckpointer`] — volatile, for tests and store-less builds;
//! - [`SqliteCheckpointer`] — durable sqlx-backed store (`sqlite` feature).
//!
//! The store does not provide cross-thread locking; the engine guarantees
//! single-writer access per thread id through its lease.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::state::GraphState;

/// Versioned snapshot of a thread's graph execution state.
#[derive(Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub thread_id: String,
    /// Monotonically increasing per thread; the first checkpoint is version 1.
    pub version: u64,
    pub state: GraphState,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Builds the successor checkpoint for `state`, stamped now.
    pub fn next(state: &GraphState, current_version: u64) -> Self {
        Self {
            thread_id: state.thread_id.clone(),
            version: current_version + 1,
            state: state.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    /// The save targeted a version that is not exactly `latest + 1`.
    #[error("version conflict for thread {thread_id}: expected {expected}, found {found}")]
    #[diagnostic(
        code(turnloom::checkpoint::version_conflict),
        help("Another writer advanced this thread. Reload the latest checkpoint and retry.")
    )]
    VersionConflict {
        thread_id: String,
        expected: u64,
        found: u64,
    },

    /// Storage backend failure (connection, transaction, I/O).
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(turnloom::checkpoint::backend))]
    Backend { message: String },

    /// Persisted state could not be encoded or decoded.
    #[error("checkpoint serialization error: {source}")]
    #[diagnostic(
        code(turnloom::checkpoint::serde),
        help("The persisted state_json does not match the current GraphState shape.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Pluggable persistence for thread checkpoints.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Loads the highest-version checkpoint for `thread_id`, if any.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Persists `checkpoint` atomically. Fails with
    /// [`CheckpointerError::VersionConflict`] unless `checkpoint.version`
    /// is exactly one past the stored latest (or 1 for a new thread).
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// All thread ids with at least one checkpoint.
    async fn list_threads(&self) -> Result<Vec<String>>;
}

/// Volatile checkpointer keeping full version history per thread.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: Mutex<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of checkpoints stored for `thread_id`. Test-oriented helper to
    /// assert on write counts.
    #[must_use]
    pub fn history_len(&self, thread_id: &str) -> usize {
        self.threads
            .lock()
            .get(thread_id)
            .map_or(0, |history| history.len())
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .threads
            .lock()
            .get(thread_id)
            .and_then(|history| history.last())
            .cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.lock();
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        let latest = history.last().map_or(0, |cp| cp.version);
        if checkpoint.version != latest + 1 {
            return Err(CheckpointerError::VersionConflict {
                thread_id: checkpoint.thread_id,
                expected: latest + 1,
                found: checkpoint.version,
            });
        }
        history.push(checkpoint);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        Ok(self.threads.lock().keys().cloned().collect())
    }
}
