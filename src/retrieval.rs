//! Retrieval collaborator: read-only context injection for the agent step.
//!
//! The engine only depends on the [`Retriever`] trait; the similarity-search
//! backend itself is an external collaborator. Whatever the backend does,
//! retrieval never blocks or fails a turn: the agent step treats an error or
//! an empty result as "proceed unaugmented".

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// One retrieved context snippet, ordered by descending relevance.
#[derive(Clone, Debug, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Error, Diagnostic)]
pub enum RetrievalError {
    #[error("retrieval backend unavailable: {message}")]
    #[diagnostic(
        code(turnloom::retrieval::unavailable),
        help("The turn proceeds unaugmented; check the index backend.")
    )]
    Unavailable { message: String },

    #[error("ingestion failed: {message}")]
    #[diagnostic(code(turnloom::retrieval::ingest))]
    Ingest { message: String },
}

/// Query → ordered snippets, plus document ingestion for the index.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `k` snippets ordered by descending relevance. May be
    /// empty.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError>;

    /// Adds a document to the index; it becomes queryable by later searches.
    async fn ingest(&self, text: &str) -> Result<(), RetrievalError>;
}

/// Naive in-process index scoring documents by token overlap with the query.
///
/// Reference collaborator for tests and single-node deployments; a vector
/// store backend implements [`Retriever`] against the same contract.
#[derive(Default)]
pub struct InMemoryRetriever {
    documents: RwLock<Vec<String>>,
}

fn tokens(text: &str) -> FxHashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

impl InMemoryRetriever {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read();
        let mut scored: Vec<Snippet> = documents
            .iter()
            .filter_map(|doc| {
                let doc_tokens = tokens(doc);
                let overlap = query_tokens.intersection(&doc_tokens).count();
                if overlap == 0 {
                    return None;
                }
                Some(Snippet {
                    text: doc.clone(),
                    score: overlap as f32 / query_tokens.len() as f32,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn ingest(&self, text: &str) -> Result<(), RetrievalError> {
        if text.trim().is_empty() {
            return Err(RetrievalError::Ingest {
                message: "document text is empty".to_string(),
            });
        }
        self.documents.write().push(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ingested_documents_become_queryable() {
        let index = InMemoryRetriever::new();
        index
            .ingest("Dual moving average crossover strategies trade the golden cross")
            .await
            .unwrap();
        index.ingest("Coffee brewing temperatures").await.unwrap();

        let hits = index.search("moving average strategy", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("crossover"));
    }

    #[tokio::test]
    async fn search_orders_by_score_and_truncates() {
        let index = InMemoryRetriever::new();
        index.ingest("alpha beta gamma").await.unwrap();
        index.ingest("alpha beta").await.unwrap();
        index.ingest("alpha").await.unwrap();

        let hits = index.search("alpha beta gamma", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert_eq!(hits[0].text, "alpha beta gamma");
    }

    #[tokio::test]
    async fn unrelated_query_returns_empty() {
        let index = InMemoryRetriever::new();
        index.ingest("momentum indicators").await.unwrap();
        let hits = index.search("zzz", 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let index = InMemoryRetriever::new();
        assert!(index.ingest("   ").await.is_err());
        assert!(index.is_empty());
    }
}
