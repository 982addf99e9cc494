//! Semantic retrieval over the election document index
//!
//! Two-stage retrieval: HNSW vector search with a tuner-controlled effort
//! parameter, then optional cross-encoder reranking of the expanded
//! candidate set. Final ordering is deterministic: rerank score when
//! present, else raw similarity, ties broken by document id.

mod engine;
mod reranker;

pub use engine::{RetrievalEngine, RetrievalError};
pub use reranker::{RerankError, Reranker};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A document stored alongside the vector index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: u64,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// A ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document_id: u64,
    pub text: String,
    /// Cosine similarity from the vector index
    pub raw_score: f32,
    /// Cross-encoder score, present only when reranking ran
    pub rerank_score: Option<f32>,
    pub metadata: BTreeMap<String, String>,
}

impl SearchResult {
    /// The score that drives final ordering
    pub fn effective_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.raw_score)
    }
}

/// Sort results by effective score descending, ties by document id
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.effective_score()
            .partial_cmp(&a.effective_score())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u64, raw: f32, rerank: Option<f32>) -> SearchResult {
        SearchResult {
            document_id: id,
            text: String::new(),
            raw_score: raw,
            rerank_score: rerank,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_rerank_score_takes_precedence() {
        let mut results = vec![result(1, 0.9, Some(0.1)), result(2, 0.5, Some(0.8))];
        sort_results(&mut results);
        assert_eq!(results[0].document_id, 2);
    }

    #[test]
    fn test_ties_broken_by_document_id() {
        let mut results = vec![result(9, 0.5, None), result(3, 0.5, None), result(7, 0.5, None)];
        sort_results(&mut results);
        let ids: Vec<u64> = results.iter().map(|r| r.document_id).collect();
        assert_eq!(ids, vec![3, 7, 9]);
    }
}
