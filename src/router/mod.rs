//! Query routing and answer assembly
//!
//! The router is the top-level orchestrator: structured query types go to
//! the analytics engine, semantic search goes to the retrieval engine, and
//! multi-step questions are decomposed into sub-questions that are
//! re-classified and routed recursively. Recursion carries an explicit
//! depth counter with a hard bound; exceeding it produces a degraded
//! answer with an incomplete marker instead of an error. Component
//! failures follow the same rule: one retry, then the best partial answer
//! with the degradation surfaced in flags, never a panic or an error to
//! the caller.

mod decompose;

pub use decompose::{Decomposer, Decomposition, MergeStrategy};

use crate::analytics::AnalyticsEngine;
use crate::cache::{CacheKey, Namespace, TieredCache};
use crate::classifier::{Classification, ClassificationMethod, QueryClassifier, QueryType};
use crate::llm::LlmClient;
use crate::retrieval::{RetrievalEngine, SearchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Decomposition recursion bound: a question may split into sub-questions,
/// and those once more, but no further.
const MAX_DECOMPOSITION_DEPTH: usize = 2;

/// A retrieval hit cited by an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSource {
    pub document_id: u64,
    pub snippet: String,
    pub score: f32,
}

/// The assembled result handed back to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer_text: String,
    pub sources: Vec<AnswerSource>,
    pub query_type: QueryType,
    pub entities: BTreeMap<String, String>,
    pub method: ClassificationMethod,
    /// Set when a component failed and the answer is best-effort
    pub degraded: bool,
    /// Set when decomposition hit its depth bound before fully resolving
    pub incomplete: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Answer {
    fn degraded_with(classification: &Classification, text: &str) -> Self {
        Self {
            answer_text: text.to_string(),
            sources: Vec::new(),
            query_type: classification.query_type,
            entities: classification.entities.clone(),
            method: classification.method,
            degraded: true,
            incomplete: false,
            metadata: BTreeMap::new(),
        }
    }
}

/// Structured-query payload cached in the structured namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StructuredPayload {
    text: String,
    metadata: BTreeMap<String, String>,
}

/// Top-level dispatcher over classified questions
pub struct QueryRouter {
    classifier: Arc<QueryClassifier>,
    analytics: Arc<dyn AnalyticsEngine>,
    retrieval: Arc<RetrievalEngine>,
    cache: Arc<TieredCache>,
    llm: Option<Arc<dyn LlmClient>>,
    decomposer: Decomposer,
    default_top_k: usize,
}

impl QueryRouter {
    pub fn new(
        classifier: Arc<QueryClassifier>,
        analytics: Arc<dyn AnalyticsEngine>,
        retrieval: Arc<RetrievalEngine>,
        cache: Arc<TieredCache>,
        llm: Option<Arc<dyn LlmClient>>,
        default_top_k: usize,
    ) -> Self {
        Self {
            classifier,
            analytics,
            retrieval,
            cache,
            llm,
            decomposer: Decomposer::new(),
            default_top_k,
        }
    }

    /// Route a classified question to an answer. Never fails: component
    /// errors become degraded answers.
    pub async fn route(
        &self,
        question: &str,
        filters: &BTreeMap<String, String>,
        classification: &Classification,
    ) -> Answer {
        self.route_at_depth(question, filters, classification, 0)
            .await
    }

    fn route_at_depth<'a>(
        &'a self,
        question: &'a str,
        filters: &'a BTreeMap<String, String>,
        classification: &'a Classification,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = Answer> + Send + 'a>> {
        Box::pin(async move {
            let filter_pairs: Vec<(String, String)> = filters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let answer_key = CacheKey::new(Namespace::Answer, question, &filter_pairs);

            if let Some(mut cached) = self.cache.get_json::<Answer>(Namespace::Answer, &answer_key)
            {
                tracing::info!("Answer cache hit for '{}'", question);
                cached
                    .metadata
                    .insert("cache".to_string(), "hit".to_string());
                return cached;
            }

            // Caller filters take precedence over extracted entities.
            let mut effective = classification.entities.clone();
            for (k, v) in filters {
                effective.insert(k.clone(), v.clone());
            }

            let answer = match classification.query_type {
                QueryType::ExactLookup
                | QueryType::Analytical
                | QueryType::Aggregation
                | QueryType::Comparison => {
                    self.route_structured(question, classification, &effective)
                }
                QueryType::SemanticSearch => {
                    self.route_semantic(question, classification, &filter_pairs)
                }
                QueryType::Complex => {
                    self.route_complex(question, filters, classification, &effective, depth)
                        .await
                }
            };

            if !answer.degraded && !answer.incomplete {
                self.cache
                    .put_json(Namespace::Answer, &answer_key, &answer, None);
            }

            answer
        })
    }

    /// Exact computation via the analytics engine, cached on (type, entities)
    fn route_structured(
        &self,
        question: &str,
        classification: &Classification,
        entities: &BTreeMap<String, String>,
    ) -> Answer {
        let mut key_parts: Vec<String> = vec![classification.query_type.as_str().to_string()];
        for (k, v) in entities {
            key_parts.push(format!("{}={}", k, v));
        }
        if classification.query_type == QueryType::Comparison {
            // Two questions naming different party pairs can share entities,
            // so the compared values must be part of the key.
            for party in self.classifier.parties_in(question) {
                key_parts.push(format!("vs={}", party));
            }
        }
        let part_refs: Vec<&str> = key_parts.iter().map(String::as_str).collect();
        let structured_key = CacheKey::from_parts(Namespace::Structured, &part_refs);

        if let Some(payload) = self
            .cache
            .get_json::<StructuredPayload>(Namespace::Structured, &structured_key)
        {
            tracing::debug!("Structured cache hit for '{}'", question);
            return self.structured_answer(classification, entities, payload);
        }

        // One retry before degrading, matching the external-service policy.
        let computed = self
            .compute_structured(question, classification.query_type, entities)
            .or_else(|first| {
                tracing::warn!("Analytics query failed, retrying once: {}", first);
                self.compute_structured(question, classification.query_type, entities)
            });

        match computed {
            Ok(payload) => {
                self.cache
                    .put_json(Namespace::Structured, &structured_key, &payload, None);
                self.structured_answer(classification, entities, payload)
            }
            Err(e) => {
                tracing::error!("Analytics query failed after retry: {}", e);
                Answer::degraded_with(
                    classification,
                    "The exact figures are unavailable right now. Please try again shortly.",
                )
            }
        }
    }

    fn structured_answer(
        &self,
        classification: &Classification,
        entities: &BTreeMap<String, String>,
        payload: StructuredPayload,
    ) -> Answer {
        Answer {
            answer_text: payload.text,
            sources: Vec::new(),
            query_type: classification.query_type,
            entities: entities.clone(),
            method: classification.method,
            degraded: false,
            incomplete: false,
            metadata: payload.metadata,
        }
    }

    fn compute_structured(
        &self,
        question: &str,
        query_type: QueryType,
        entities: &BTreeMap<String, String>,
    ) -> crate::error::Result<StructuredPayload> {
        let target = entities
            .get("target")
            .map(String::as_str)
            .unwrap_or("candidates");
        let scope = scope_description(entities);
        let mut metadata = BTreeMap::new();

        let text = match query_type {
            QueryType::ExactLookup => {
                let count = self.analytics.count(target, entities)?;
                metadata.insert("count".to_string(), count.to_string());
                format!("There are {} {}{}.", count, readable_target(target), scope)
            }
            QueryType::Analytical => {
                let stats = self.analytics.statistics(target, "age", entities)?;
                metadata.insert("count".to_string(), stats.count.to_string());
                match (stats.mean, stats.min, stats.max) {
                    (Some(mean), Some(min), Some(max)) => {
                        metadata.insert("mean_age".to_string(), format!("{:.1}", mean));
                        format!(
                            "Across {} {}{}, the average age is {:.1} (youngest {}, oldest {}).",
                            stats.count,
                            readable_target(target),
                            scope,
                            mean,
                            min as i64,
                            max as i64
                        )
                    }
                    _ => format!("No age data found for {}{}.", readable_target(target), scope),
                }
            }
            QueryType::Aggregation => {
                let dimension = group_dimension(question, entities);
                let groups = self.analytics.aggregate(target, dimension, entities)?;
                metadata.insert("group_by".to_string(), dimension.to_string());
                if groups.is_empty() {
                    format!("No {} found{}.", readable_target(target), scope)
                } else {
                    let listing: Vec<String> = groups
                        .iter()
                        .take(5)
                        .map(|g| format!("{} ({})", g.key, g.count))
                        .collect();
                    format!(
                        "{} by {}{}: {}.",
                        capitalize(readable_target(target)),
                        dimension,
                        scope,
                        listing.join(", ")
                    )
                }
            }
            QueryType::Comparison => {
                let named = self.classifier.parties_in(question);
                if named.len() >= 2 {
                    // The question names the parties to compare; the single
                    // extracted party entity would shadow them as a filter.
                    let mut scoped = entities.clone();
                    scoped.remove("party");
                    let groups = self.analytics.compare(target, "party", &named, &scoped)?;
                    metadata.insert("compared_on".to_string(), "party".to_string());
                    metadata.insert("compared_values".to_string(), named.join("|"));
                    let listing: Vec<String> = groups
                        .iter()
                        .map(|g| format!("{}: {}", g.key, g.count))
                        .collect();
                    format!(
                        "Comparison of {}{}: {}.",
                        named.join(" vs "),
                        scope_description(&scoped),
                        listing.join("; ")
                    )
                } else {
                    let dimension = group_dimension(question, entities);
                    // Without explicit comparison values, present all buckets
                    // side by side.
                    let groups = self.analytics.aggregate(target, dimension, entities)?;
                    metadata.insert("compared_on".to_string(), dimension.to_string());
                    if groups.len() < 2 {
                        format!(
                            "Not enough {} data to compare by {}{}.",
                            readable_target(target),
                            dimension,
                            scope
                        )
                    } else {
                        let listing: Vec<String> = groups
                            .iter()
                            .map(|g| format!("{}: {}", g.key, g.count))
                            .collect();
                        format!("Comparison by {}{}: {}.", dimension, scope, listing.join("; "))
                    }
                }
            }
            QueryType::SemanticSearch | QueryType::Complex => {
                unreachable!("structured routing only handles structured types")
            }
        };

        Ok(StructuredPayload { text, metadata })
    }

    /// Semantic search via the retrieval engine
    fn route_semantic(
        &self,
        question: &str,
        classification: &Classification,
        filter_pairs: &[(String, String)],
    ) -> Answer {
        let retrieved = self
            .retrieval
            .retrieve(
                question,
                filter_pairs,
                self.default_top_k,
                QueryType::SemanticSearch,
            )
            .or_else(|first| {
                tracing::warn!("Retrieval failed, retrying once: {}", first);
                self.retrieval.retrieve(
                    question,
                    filter_pairs,
                    self.default_top_k,
                    QueryType::SemanticSearch,
                )
            });

        match retrieved {
            Ok(results) if results.is_empty() => Answer {
                answer_text: "No matching documents were found for this question.".to_string(),
                sources: Vec::new(),
                query_type: QueryType::SemanticSearch,
                entities: classification.entities.clone(),
                method: classification.method,
                degraded: false,
                incomplete: false,
                metadata: BTreeMap::new(),
            },
            Ok(results) => {
                let sources: Vec<AnswerSource> = results
                    .iter()
                    .map(|r| AnswerSource {
                        document_id: r.document_id,
                        snippet: snippet_of(&r.text),
                        score: r.effective_score(),
                    })
                    .collect();
                Answer {
                    answer_text: summarize_results(&results),
                    sources,
                    query_type: QueryType::SemanticSearch,
                    entities: classification.entities.clone(),
                    method: classification.method,
                    degraded: false,
                    incomplete: false,
                    metadata: BTreeMap::new(),
                }
            }
            Err(e) => {
                tracing::error!("Retrieval failed after retry: {}", e);
                Answer::degraded_with(
                    classification,
                    "Document search is unavailable right now. Please try again shortly.",
                )
            }
        }
    }

    /// Decompose, route each sub-question recursively, merge
    async fn route_complex(
        &self,
        question: &str,
        filters: &BTreeMap<String, String>,
        classification: &Classification,
        entities: &BTreeMap<String, String>,
        depth: usize,
    ) -> Answer {
        if depth >= MAX_DECOMPOSITION_DEPTH {
            tracing::warn!(
                "Decomposition depth bound reached at '{}' (depth {})",
                question,
                depth
            );
            let mut answer = Answer::degraded_with(
                classification,
                "This question could not be fully resolved; it required more \
                 decomposition steps than allowed.",
            );
            answer.incomplete = true;
            return answer;
        }

        let parties = self.classifier.parties_in(question);
        let decomposition = self
            .decomposer
            .decompose(question, entities, &parties, self.llm.as_deref())
            .await;

        tracing::info!(
            "Decomposed '{}' into {} sub-questions ({})",
            question,
            decomposition.sub_questions.len(),
            decomposition.strategy.as_str()
        );

        let mut sub_answers = Vec::with_capacity(decomposition.sub_questions.len());
        for sub_question in &decomposition.sub_questions {
            let sub_classification = self.classifier.classify(sub_question).await;
            let sub_answer = self
                .route_at_depth(sub_question, filters, &sub_classification, depth + 1)
                .await;
            sub_answers.push((sub_question.clone(), sub_answer));
        }

        merge_answers(question, classification, decomposition.strategy, sub_answers)
    }
}

/// Combine sub-answers into one answer per the declared strategy
fn merge_answers(
    question: &str,
    classification: &Classification,
    strategy: MergeStrategy,
    mut sub_answers: Vec<(String, Answer)>,
) -> Answer {
    let degraded = sub_answers.iter().any(|(_, a)| a.degraded);
    let incomplete = sub_answers.iter().any(|(_, a)| a.incomplete);

    if strategy == MergeStrategy::CompareThenRank {
        // Rank compared entities by their computed counts, largest first.
        sub_answers.sort_by(|(qa, a), (qb, b)| {
            let ca = answer_count(a);
            let cb = answer_count(b);
            cb.cmp(&ca).then_with(|| qa.cmp(qb))
        });
    }

    let parts: Vec<String> = sub_answers
        .iter()
        .enumerate()
        .map(|(i, (_, a))| format!("{}. {}", i + 1, a.answer_text))
        .collect();

    let answer_text = match strategy {
        MergeStrategy::FilterThenAggregate | MergeStrategy::Sequential => {
            format!("Resolved in {} steps: {}", parts.len(), parts.join(" "))
        }
        MergeStrategy::CompareThenRank => {
            format!("Ranked comparison: {}", parts.join(" "))
        }
    };

    let mut sources = Vec::new();
    for (_, sub) in &sub_answers {
        sources.extend(sub.sources.iter().cloned());
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("strategy".to_string(), strategy.as_str().to_string());
    metadata.insert(
        "sub_questions".to_string(),
        sub_answers.len().to_string(),
    );

    tracing::debug!(
        "Merged {} sub-answers for '{}' (degraded={}, incomplete={})",
        sub_answers.len(),
        question,
        degraded,
        incomplete
    );

    Answer {
        answer_text,
        sources,
        query_type: QueryType::Complex,
        entities: classification.entities.clone(),
        method: classification.method,
        degraded,
        incomplete,
        metadata,
    }
}

fn answer_count(answer: &Answer) -> u64 {
    answer
        .metadata
        .get("count")
        .and_then(|c| c.parse().ok())
        .unwrap_or(0)
}

/// The dimension to group or compare on, from question text
fn group_dimension(question: &str, entities: &BTreeMap<String, String>) -> &'static str {
    let query = question.to_lowercase();
    if query.contains("gender") || query.contains("male") || query.contains("female") {
        "gender"
    } else if query.contains("province") && !entities.contains_key("province") {
        "province"
    } else if query.contains("district") && !entities.contains_key("district") {
        "district"
    } else {
        "party"
    }
}

fn scope_description(entities: &BTreeMap<String, String>) -> String {
    let mut parts = Vec::new();
    for dimension in ["constituency", "district", "province", "party", "gender"] {
        if let Some(value) = entities.get(dimension) {
            parts.push(format!("{} {}", dimension, value));
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" for {}", parts.join(", "))
    }
}

fn readable_target(target: &str) -> &str {
    match target {
        "voting_centers" => "voting centers",
        other => other,
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn snippet_of(text: &str) -> String {
    const SNIPPET_CHARS: usize = 160;
    if text.chars().count() <= SNIPPET_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

fn summarize_results(results: &[SearchResult]) -> String {
    let top = &results[0];
    format!(
        "Most relevant of {} matching documents: {}",
        results.len(),
        snippet_of(&top.text)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(query_type: QueryType) -> Classification {
        Classification {
            query_type,
            intent: "test".to_string(),
            entities: BTreeMap::new(),
            confidence: 0.9,
            method: ClassificationMethod::Rule,
        }
    }

    fn answer_with_count(count: u64) -> Answer {
        let mut metadata = BTreeMap::new();
        metadata.insert("count".to_string(), count.to_string());
        Answer {
            answer_text: format!("There are {} candidates.", count),
            sources: Vec::new(),
            query_type: QueryType::ExactLookup,
            entities: BTreeMap::new(),
            method: ClassificationMethod::Rule,
            degraded: false,
            incomplete: false,
            metadata,
        }
    }

    #[test]
    fn test_compare_merge_ranks_by_count() {
        let merged = merge_answers(
            "compare",
            &classification(QueryType::Complex),
            MergeStrategy::CompareThenRank,
            vec![
                ("uml?".to_string(), answer_with_count(3)),
                ("congress?".to_string(), answer_with_count(7)),
            ],
        );

        assert!(merged.answer_text.starts_with("Ranked comparison: 1. There are 7"));
        assert_eq!(
            merged.metadata.get("strategy").map(String::as_str),
            Some("compare_then_rank")
        );
    }

    #[test]
    fn test_merge_propagates_flags() {
        let mut degraded = answer_with_count(0);
        degraded.degraded = true;

        let merged = merge_answers(
            "q",
            &classification(QueryType::Complex),
            MergeStrategy::Sequential,
            vec![
                ("a?".to_string(), answer_with_count(1)),
                ("b?".to_string(), degraded),
            ],
        );

        assert!(merged.degraded);
        assert!(!merged.incomplete);
    }

    #[test]
    fn test_group_dimension_prefers_unfiltered() {
        let mut entities = BTreeMap::new();
        entities.insert("province".to_string(), "gandaki".to_string());

        // Province already pinned by a filter, so group by party instead.
        assert_eq!(
            group_dimension("candidates by province", &entities),
            "party"
        );
        assert_eq!(
            group_dimension("candidates by province", &BTreeMap::new()),
            "province"
        );
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(400);
        let snippet = snippet_of(&long);
        assert!(snippet.len() < 200);
        assert!(snippet.ends_with("..."));
    }
}
