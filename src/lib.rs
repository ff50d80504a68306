//! # Turnloom: Resumable Conversation Orchestration
//!
//! Turnloom drives multi-step agent conversations as a graph-structured state
//! machine: each inbound user message runs one *turn* that loops through
//! retrieval augmentation, model invocation, tool-call routing, and tool
//! execution until the model answers without requesting tools. Every thread's
//! state is checkpointed under a monotonically versioned store, so a turn
//! interrupted mid-flight resumes from its last persisted suspension point
//! without re-invoking already-resolved tool calls.
//!
//! ## Core Concepts
//!
//! - **Messages**: Role-tagged conversation entries ([`message::Message`]),
//!   including assistant tool-call requests and the tool results that answer
//!   them.
//! - **GraphState**: One thread's append-only history plus pending tool calls
//!   and the per-turn iteration count ([`state::GraphState`]).
//! - **Checkpointer**: Versioned, optimistically concurrent persistence of
//!   thread state ([`checkpoint::Checkpointer`]), in memory or SQLite.
//! - **TurnEngine**: The executor walking the turn graph under a per-thread
//!   lease ([`engine::TurnEngine`]).
//! - **Tools and Retrieval**: Pluggable [`tools::Tool`] executors and a
//!   [`retrieval::Retriever`] corpus, both failing softly into the
//!   conversation rather than aborting it.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnloom::checkpoint::InMemoryCheckpointer;
//! use turnloom::engine::TurnEngine;
//! use turnloom::model::OpenAiCompatInvoker;
//! use turnloom::retrieval::InMemoryRetriever;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = TurnEngine::new(
//!     Arc::new(InMemoryCheckpointer::new()),
//!     Arc::new(OpenAiCompatInvoker::new(
//!         "https://api.deepseek.com",
//!         "sk-...",
//!         "deepseek-chat",
//!     )),
//!     Arc::new(InMemoryRetriever::new()),
//! );
//!
//! let outcome = engine.run_turn("thread-1", Some("hello")).await?;
//! println!("{}", outcome.content);
//! # Ok(())
//! # }
//! ```
//!
//! The HTTP surface in [`server`] exposes the same entry points as
//! `POST /chat` and `POST /ingest`.

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod message;
pub mod model;
pub mod retrieval;
pub mod server;
pub mod state;
pub mod telemetry;
pub mod tools;
