//! Cross-encoder reranking using FastEmbed

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Reranker initialization failed: {0}")]
    InitializationError(String),

    #[error("Reranking failed: {0}")]
    RerankingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Pairwise relevance scorer for improving result precision
pub struct Reranker {
    model: Arc<TextRerank>,
    model_name: String,
}

impl Reranker {
    pub fn new(model_name: &str) -> Result<Self, RerankError> {
        tracing::info!("Initializing reranker model: {}", model_name);

        let init_options = RerankInitOptions::new(RerankerModel::BGERerankerBase)
            .with_show_download_progress(true);

        let model = TextRerank::try_new(init_options)
            .map_err(|e| RerankError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
        })
    }

    /// Score candidates against a question
    ///
    /// Returns (candidate index, relevance score) pairs sorted by score
    /// descending; ties keep the lower index first for reproducibility.
    pub fn rerank(
        &self,
        query: &str,
        candidates: &[String],
        top_k: usize,
    ) -> Result<Vec<(usize, f32)>, RerankError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if query.is_empty() {
            return Err(RerankError::InvalidInput(
                "Query cannot be empty".to_string(),
            ));
        }

        let documents: Vec<&str> = candidates.iter().map(|s| s.as_str()).collect();

        let results = self
            .model
            .rerank(query, documents, true, Some(top_k))
            .map_err(|e| RerankError::RerankingError(e.to_string()))?;

        let mut scored: Vec<(usize, f32)> =
            results.into_iter().map(|r| (r.index, r.score)).collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(scored)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires model download
    fn test_rerank_prefers_relevant_candidate() {
        let reranker = Reranker::new("bge-reranker-base").unwrap();

        let query = "How many candidates registered in Kaski district?";
        let candidates = vec![
            "Kaski district registered 54 candidates for the election.".to_string(),
            "The weather in the hills was mild this spring.".to_string(),
        ];

        let results = reranker.rerank(query, &candidates, 2).unwrap();
        assert_eq!(results[0].0, 0);
    }
}
