//! Retrieval engine: embed, search, rerank, cache

use crate::cache::{CacheKey, Namespace, TieredCache};
use crate::classifier::QueryType;
use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingProvider, VectorIndex};
use crate::retrieval::{sort_results, DocumentRecord, Reranker, SearchResult};
use crate::tuner::AdaptiveTuner;
use ahash::AHashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding generation failed: {0}")]
    EmbeddingError(String),

    #[error("Vector search failed: {0}")]
    VectorSearchError(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Semantic retrieval over the indexed document set
pub struct RetrievalEngine {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<VectorIndex>,
    documents: RwLock<AHashMap<u64, DocumentRecord>>,
    reranker: Option<Arc<Reranker>>,
    cache: Arc<TieredCache>,
    tuner: Arc<AdaptiveTuner>,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<VectorIndex>,
        reranker: Option<Arc<Reranker>>,
        cache: Arc<TieredCache>,
        tuner: Arc<AdaptiveTuner>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            provider,
            index,
            documents: RwLock::new(AHashMap::new()),
            reranker,
            cache,
            tuner,
            config,
        }
    }

    /// Embed and index one document
    pub fn index_document(&self, record: DocumentRecord) -> Result<(), RetrievalError> {
        let embedding = self.embed_cached(&record.text)?;
        self.index
            .insert(record.id, &embedding)
            .map_err(|e| RetrievalError::VectorSearchError(e.to_string()))?;

        let mut documents = self.documents.write().unwrap();
        documents.insert(record.id, record);
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    /// Retrieve a ranked list of documents for a question
    ///
    /// Degradation contract: a cached result is served without touching the
    /// embedding provider; an empty index yields an empty list, not an error.
    pub fn retrieve(
        &self,
        question: &str,
        filters: &[(String, String)],
        top_k: usize,
        query_type: QueryType,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if question.is_empty() {
            return Err(RetrievalError::InvalidQuery(
                "Question cannot be empty".to_string(),
            ));
        }

        let top_k = top_k.clamp(1, self.config.max_top_k);
        let start = Instant::now();

        let (effort, signature) = self.tuner.effort_for(question, filters, query_type);

        // Effort is part of the key: search results get a short TTL because
        // the index content can change out of band.
        let cache_key = CacheKey::from_parts(
            Namespace::Search,
            &[question, &top_k.to_string(), &effort.to_string()],
        );
        if let Some(cached) = self
            .cache
            .get_json::<Vec<SearchResult>>(Namespace::Search, &cache_key)
        {
            tracing::debug!("Search cache hit for '{}'", question);
            return Ok(cached);
        }

        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embed_cached(question)?;

        let fetch_k = if self.reranker.is_some() {
            top_k * self.config.expansion_factor
        } else {
            top_k
        };

        let hits = self
            .index
            .search(&embedding, fetch_k, effort)
            .map_err(|e| RetrievalError::VectorSearchError(e.to_string()))?;

        let mut results = self.hydrate(hits);

        if let Some(reranker) = &self.reranker {
            if results.len() > 1 {
                self.apply_rerank(reranker, question, &mut results, top_k);
            }
        }

        sort_results(&mut results);
        results.truncate(top_k);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.tuner.record(signature, elapsed_ms);

        self.cache
            .put_json(Namespace::Search, &cache_key, &results, None);

        tracing::info!(
            "Retrieved {} results for '{}' (effort={}, {:.1}ms)",
            results.len(),
            question,
            effort,
            elapsed_ms
        );

        Ok(results)
    }

    /// Embedding via the long-TTL cache, falling back to the provider
    fn embed_cached(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let key = CacheKey::new(Namespace::Embedding, text, &[]);

        if let Some(cached) = self.cache.get_json::<Vec<f32>>(Namespace::Embedding, &key) {
            return Ok(cached);
        }

        let embedding = self
            .provider
            .embed(text)
            .map_err(|e| RetrievalError::EmbeddingError(e.to_string()))?;

        self.cache
            .put_json(Namespace::Embedding, &key, &embedding, None);
        Ok(embedding)
    }

    fn hydrate(&self, hits: Vec<crate::embedding::IndexHit>) -> Vec<SearchResult> {
        let documents = self.documents.read().unwrap();
        hits.into_iter()
            .filter_map(|hit| {
                let record = documents.get(&hit.id)?;
                Some(SearchResult {
                    document_id: hit.id,
                    text: record.text.clone(),
                    raw_score: hit.score,
                    rerank_score: None,
                    metadata: record.metadata.clone(),
                })
            })
            .collect()
    }

    /// Attach rerank scores; a reranker failure falls back to raw ordering
    fn apply_rerank(
        &self,
        reranker: &Reranker,
        question: &str,
        results: &mut Vec<SearchResult>,
        top_k: usize,
    ) {
        let texts: Vec<String> = results.iter().map(|r| r.text.clone()).collect();

        match reranker.rerank(question, &texts, top_k.min(texts.len())) {
            Ok(scored) => {
                for (idx, score) in scored {
                    if let Some(result) = results.get_mut(idx) {
                        result.rerank_score = Some(score);
                    }
                }
                // Candidates the reranker did not score drop below scored
                // ones once sorted; remove them to keep ordering consistent.
                results.retain(|r| r.rerank_score.is_some());
            }
            Err(e) => {
                tracing::warn!("Reranking failed, keeping raw order: {}", e);
            }
        }
    }
}
