//! Semantic retrieval path and observability surface tests with a
//! deterministic stub embedder.

use chunav::analytics::{AnalyticsEngine, FieldStatistics, GroupCount};
use chunav::classifier::QueryType;
use chunav::config::Config;
use chunav::embedding::{EmbeddingError, EmbeddingProvider};
use chunav::engine::{InvalidateScope, QaEngine};
use chunav::error::Result;
use chunav::retrieval::DocumentRecord;
use std::collections::BTreeMap;
use std::sync::Arc;

struct StubProvider;

impl EmbeddingProvider for StubProvider {
    fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; 8];
        let axis = text.bytes().map(|b| b as usize).sum::<usize>() % 8;
        v[axis] = 1.0;
        Ok(v)
    }

    fn dimension(&self) -> usize {
        8
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

/// Analytics stand-in for tests that never reach the structured path
struct EmptyAnalytics;

impl AnalyticsEngine for EmptyAnalytics {
    fn count(&self, _: &str, _: &BTreeMap<String, String>) -> Result<u64> {
        Ok(0)
    }

    fn aggregate(
        &self,
        _: &str,
        _: &str,
        _: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>> {
        Ok(Vec::new())
    }

    fn statistics(&self, _: &str, _: &str, _: &BTreeMap<String, String>) -> Result<FieldStatistics> {
        Ok(FieldStatistics {
            count: 0,
            mean: None,
            min: None,
            max: None,
        })
    }

    fn compare(
        &self,
        _: &str,
        _: &str,
        _: &[String],
        _: &BTreeMap<String, String>,
    ) -> Result<Vec<GroupCount>> {
        Ok(Vec::new())
    }
}

fn semantic_engine() -> QaEngine {
    let mut config = Config::default();
    config.retrieval.enable_reranking = false;

    QaEngine::with_components(
        &config,
        Arc::new(StubProvider),
        None,
        Arc::new(EmptyAnalytics),
        None,
        None,
    )
}

fn record(id: u64, text: &str) -> DocumentRecord {
    DocumentRecord {
        id,
        text: text.to_string(),
        metadata: BTreeMap::new(),
    }
}

#[tokio::test]
async fn test_semantic_question_cites_sources() {
    let engine = semantic_engine();
    engine
        .index_document(record(1, "Candidate profile: a lawyer from Pokhara."))
        .unwrap();
    engine
        .index_document(record(2, "Candidate profile: a doctor from Butwal."))
        .unwrap();

    let answer = engine
        .answer("candidates with a background in law", &BTreeMap::new(), None)
        .await;

    assert_eq!(answer.query_type, QueryType::SemanticSearch);
    assert!(!answer.sources.is_empty());
    assert!(!answer.degraded);
}

#[tokio::test]
async fn test_empty_index_gives_clean_answer() {
    let engine = semantic_engine();

    let answer = engine
        .answer("candidates with a background in law", &BTreeMap::new(), None)
        .await;

    assert!(answer.sources.is_empty());
    assert!(!answer.degraded);
    assert!(!answer.answer_text.is_empty());
}

#[tokio::test]
async fn test_stats_reflect_activity() {
    let engine = semantic_engine();
    for id in 0..5u64 {
        engine
            .index_document(record(id, &format!("Profile number {}", id)))
            .unwrap();
    }

    engine
        .answer("candidates with interesting profiles", &BTreeMap::new(), None)
        .await;

    let stats = engine.stats();
    assert_eq!(stats.indexed_documents, 5);
    assert!(stats.cache.contains_key("embedding"));
    assert!(stats.cache.contains_key("answer"));
    assert!(stats.pool.is_none());
    assert!(stats
        .average_effort
        .contains_key(QueryType::SemanticSearch.as_str()));
}

#[tokio::test]
async fn test_invalidate_all_preserves_embeddings() {
    let engine = semantic_engine();
    engine.index_document(record(1, "Some profile text.")).unwrap();

    engine
        .answer("candidates with interesting profiles", &BTreeMap::new(), None)
        .await;

    let before = engine.stats();
    assert!(before.cache["embedding"].entries > 0);

    let removed = engine.invalidate_cache(InvalidateScope::All);
    assert!(removed > 0);

    let after = engine.stats();
    assert_eq!(after.cache["answer"].entries, 0);
    assert_eq!(after.cache["search"].entries, 0);
    assert_eq!(
        after.cache["embedding"].entries,
        before.cache["embedding"].entries
    );

    let wiped = engine.invalidate_cache(InvalidateScope::Everything);
    assert!(wiped > 0);
    assert_eq!(engine.stats().cache["embedding"].entries, 0);
}

#[tokio::test]
async fn test_session_id_attached_to_answer() {
    let engine = semantic_engine();
    let answer = engine
        .answer("anything at all", &BTreeMap::new(), Some("session-42"))
        .await;

    assert_eq!(
        answer.metadata.get("session_id").map(String::as_str),
        Some("session-42")
    );
}
