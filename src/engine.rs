//! Top-level engine wiring the pipeline together
//!
//! `QaEngine` is the single entry point the surrounding application calls:
//! classify the question, route it, and hand back an answer, plus the
//! observability and cache-administration surface.

use crate::analytics::{AnalyticsEngine, SqliteAnalytics};
use crate::cache::{Namespace, NamespaceStats, TieredCache};
use crate::classifier::QueryClassifier;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastEmbedProvider, VectorIndex};
use crate::error::{ChunavError, Result};
use crate::llm::{HttpLlmClient, LlmClient};
use crate::pool::{ConnectionPool, PoolStats};
use crate::retrieval::{DocumentRecord, Reranker, RetrievalEngine};
use crate::router::{Answer, QueryRouter};
use crate::tuner::AdaptiveTuner;
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

/// Which cache entries an invalidation request covers
///
/// `All` leaves embeddings alone: they are input-deterministic and
/// expensive to recompute, so clearing them needs an explicit ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidateScope {
    All,
    Everything,
    Embedding,
    Search,
    Structured,
    Answer,
}

impl FromStr for InvalidateScope {
    type Err = ChunavError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(InvalidateScope::All),
            "everything" => Ok(InvalidateScope::Everything),
            "embedding" | "embeddings" => Ok(InvalidateScope::Embedding),
            "search" => Ok(InvalidateScope::Search),
            "structured" => Ok(InvalidateScope::Structured),
            "answer" | "answers" => Ok(InvalidateScope::Answer),
            other => Err(ChunavError::Config(format!(
                "Unknown cache scope '{}'. Valid: all, everything, embedding, \
                 search, structured, answer",
                other
            ))),
        }
    }
}

/// Observability snapshot for `stats`
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub cache: BTreeMap<String, NamespaceStats>,
    pub pool: Option<PoolStats>,
    /// Average search effort handed out per query type
    pub average_effort: BTreeMap<String, f64>,
    pub indexed_documents: usize,
}

/// The question-answering pipeline
pub struct QaEngine {
    classifier: Arc<QueryClassifier>,
    router: QueryRouter,
    cache: Arc<TieredCache>,
    tuner: Arc<AdaptiveTuner>,
    retrieval: Arc<RetrievalEngine>,
    pool: Option<Arc<ConnectionPool>>,
}

impl QaEngine {
    /// Build the full production pipeline from configuration
    ///
    /// Opens the pool, creates the analytics schema, and loads the local
    /// embedding (and optionally reranker) models; model files download on
    /// first use.
    pub fn from_config(config: &Config) -> Result<Self> {
        let pool = Arc::new(ConnectionPool::new(
            &config.analytics.db_path,
            &config.pool,
        )?);
        let analytics = Arc::new(SqliteAnalytics::new(pool.clone()));
        analytics.init_schema()?;

        let provider: Arc<dyn EmbeddingProvider> = Arc::new(
            FastEmbedProvider::new(&config.embedding.model)
                .map_err(|e| ChunavError::ServiceUnavailable {
                    service: "embedding".to_string(),
                    message: e.to_string(),
                })?,
        );

        let reranker = if config.retrieval.enable_reranking {
            Some(Arc::new(
                Reranker::new(&config.retrieval.reranker_model).map_err(|e| {
                    ChunavError::ServiceUnavailable {
                        service: "reranker".to_string(),
                        message: e.to_string(),
                    }
                })?,
            ))
        } else {
            None
        };

        let llm: Option<Arc<dyn LlmClient>> = if config.llm.enabled {
            Some(Arc::new(HttpLlmClient::from_config(&config.llm)?))
        } else {
            None
        };

        Ok(Self::with_components(
            config,
            provider,
            reranker,
            analytics,
            llm,
            Some(pool),
        ))
    }

    /// Assemble the pipeline from injected collaborators
    pub fn with_components(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<Reranker>>,
        analytics: Arc<dyn AnalyticsEngine>,
        llm: Option<Arc<dyn LlmClient>>,
        pool: Option<Arc<ConnectionPool>>,
    ) -> Self {
        let cache = Arc::new(TieredCache::new(&config.cache));
        let tuner = Arc::new(AdaptiveTuner::new(
            config.index.clone(),
            config.tuner.clone(),
        ));

        let index = Arc::new(VectorIndex::new(
            provider.dimension(),
            config.index.hnsw_m,
            config.index.hnsw_ef_construction,
        ));

        let retrieval = Arc::new(RetrievalEngine::new(
            provider,
            index,
            reranker,
            cache.clone(),
            tuner.clone(),
            config.retrieval.clone(),
        ));

        let classifier = Arc::new(QueryClassifier::new(&config.classifier, llm.clone()));

        let router = QueryRouter::new(
            classifier.clone(),
            analytics,
            retrieval.clone(),
            cache.clone(),
            llm,
            config.retrieval.default_top_k,
        );

        Self {
            classifier,
            router,
            cache,
            tuner,
            retrieval,
            pool,
        }
    }

    /// Answer one question. Never fails: failures surface as degraded
    /// answers with flags set.
    pub async fn answer(
        &self,
        question: &str,
        filters: &BTreeMap<String, String>,
        session_id: Option<&str>,
    ) -> Answer {
        tracing::info!(
            "Answering question (session={}): '{}'",
            session_id.unwrap_or("-"),
            question
        );

        let classification = self.classifier.classify(question).await;
        tracing::debug!(
            "Classified as {:?} via {:?} (confidence {:.2})",
            classification.query_type,
            classification.method,
            classification.confidence
        );

        let mut answer = self.router.route(question, filters, &classification).await;
        if let Some(session) = session_id {
            answer
                .metadata
                .insert("session_id".to_string(), session.to_string());
        }
        answer
            .metadata
            .insert("answered_at".to_string(), chrono::Utc::now().to_rfc3339());
        answer
    }

    /// Add one document to the semantic index
    pub fn index_document(&self, record: DocumentRecord) -> Result<()> {
        self.retrieval
            .index_document(record)
            .map_err(|e| ChunavError::ServiceUnavailable {
                service: "retrieval".to_string(),
                message: e.to_string(),
            })
    }

    /// Cache, pool, and tuner observability snapshot
    pub fn stats(&self) -> EngineStats {
        let mut cache = BTreeMap::new();
        for namespace in Namespace::ALL {
            cache.insert(
                namespace.salt().to_string(),
                self.cache.namespace_stats(namespace),
            );
        }

        let average_effort = self
            .tuner
            .average_effort_by_type()
            .into_iter()
            .map(|(qt, avg)| (qt.as_str().to_string(), avg))
            .collect();

        EngineStats {
            cache,
            pool: self.pool.as_ref().map(|p| p.stats()),
            average_effort,
            indexed_documents: self.retrieval.document_count(),
        }
    }

    /// Clear cached entries; returns the number of entries removed
    pub fn invalidate_cache(&self, scope: InvalidateScope) -> usize {
        match scope {
            InvalidateScope::All => self.cache.invalidate_all(),
            InvalidateScope::Everything => self.cache.invalidate_everything(),
            InvalidateScope::Embedding => self.cache.invalidate(Namespace::Embedding),
            InvalidateScope::Search => self.cache.invalidate(Namespace::Search),
            InvalidateScope::Structured => self.cache.invalidate(Namespace::Structured),
            InvalidateScope::Answer => self.cache.invalidate(Namespace::Answer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_parsing() {
        assert_eq!(
            "all".parse::<InvalidateScope>().unwrap(),
            InvalidateScope::All
        );
        assert_eq!(
            "Embeddings".parse::<InvalidateScope>().unwrap(),
            InvalidateScope::Embedding
        );
        assert!("bogus".parse::<InvalidateScope>().is_err());
    }
}
