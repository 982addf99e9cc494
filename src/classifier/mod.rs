//! Query classification
//!
//! Assigns one of six query types to an incoming question and extracts
//! structured entities (target, filters). A fast rule pass runs first;
//! the LLM fallback is consulted only when rule confidence falls below the
//! configured threshold. Classification never fails: if the LLM errors or
//! times out, the best rule-based guess is returned with its confidence
//! capped below the acceptance threshold.

mod gazetteer;
mod rules;

pub use gazetteer::Gazetteer;
pub use rules::RuleClassifier;

use crate::config::ClassifierConfig;
use crate::llm::LlmClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The closed set of query types the router dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryType {
    ExactLookup,
    Analytical,
    SemanticSearch,
    Comparison,
    Aggregation,
    Complex,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::ExactLookup => "EXACT_LOOKUP",
            QueryType::Analytical => "ANALYTICAL",
            QueryType::SemanticSearch => "SEMANTIC_SEARCH",
            QueryType::Comparison => "COMPARISON",
            QueryType::Aggregation => "AGGREGATION",
            QueryType::Complex => "COMPLEX",
        }
    }

    /// Parse a type name from LLM output, tolerant of surrounding text
    pub fn from_label(label: &str) -> Option<Self> {
        let upper = label.to_uppercase();
        [
            QueryType::ExactLookup,
            QueryType::Analytical,
            QueryType::SemanticSearch,
            QueryType::Comparison,
            QueryType::Aggregation,
            QueryType::Complex,
        ]
        .into_iter()
        .find(|qt| upper.contains(qt.as_str()))
    }
}

/// Which path produced the classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationMethod {
    Rule,
    Llm,
}

/// Result of classifying one question; produced once, never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub query_type: QueryType,
    pub intent: String,
    /// Extracted filter dimensions (district, province, party, gender, ...)
    pub entities: BTreeMap<String, String>,
    /// Confidence in [0, 1]
    pub confidence: f32,
    pub method: ClassificationMethod,
}

/// Rule-first classifier with LLM fallback
pub struct QueryClassifier {
    rules: RuleClassifier,
    gazetteer: Gazetteer,
    llm: Option<Arc<dyn LlmClient>>,
    threshold: f32,
}

impl QueryClassifier {
    pub fn new(config: &ClassifierConfig, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            rules: RuleClassifier::new(),
            gazetteer: Gazetteer::new(),
            llm,
            threshold: config.rule_confidence_threshold,
        }
    }

    /// Classify a question. Always succeeds with some classification.
    pub async fn classify(&self, question: &str) -> Classification {
        let normalized = question.trim().to_lowercase();

        let (rule_type, rule_confidence, intent) = self.rules.classify(&normalized);
        let entities = self.gazetteer.extract(&normalized);

        if rule_confidence >= self.threshold {
            tracing::info!(
                "Rule-based classification: {:?} (confidence: {:.2})",
                rule_type,
                rule_confidence
            );
            return Classification {
                query_type: rule_type,
                intent,
                entities,
                confidence: rule_confidence,
                method: ClassificationMethod::Rule,
            };
        }

        if let Some(llm) = &self.llm {
            tracing::info!("Rule confidence {:.2} below threshold, using LLM", rule_confidence);
            match self.classify_by_llm(llm.as_ref(), question).await {
                Ok((query_type, confidence)) => {
                    return Classification {
                        query_type,
                        intent,
                        entities,
                        confidence: confidence.clamp(0.0, 1.0),
                        method: ClassificationMethod::Llm,
                    };
                }
                Err(e) => {
                    tracing::warn!("LLM classification failed, falling back to rules: {}", e);
                }
            }
        }

        // Fallback: best rule guess, confidence capped below the acceptance
        // threshold so downstream consumers can see it was uncertain.
        Classification {
            query_type: rule_type,
            intent,
            entities,
            confidence: rule_confidence.min(self.threshold - 0.05).max(0.0),
            method: ClassificationMethod::Rule,
        }
    }

    /// All parties mentioned in a question, for comparison decomposition
    pub fn parties_in(&self, question: &str) -> Vec<String> {
        self.gazetteer.parties_in(&question.trim().to_lowercase())
    }

    async fn classify_by_llm(
        &self,
        llm: &dyn LlmClient,
        question: &str,
    ) -> crate::error::Result<(QueryType, f32)> {
        let prompt = build_classification_prompt(question);
        let response = llm.complete(&prompt).await?;
        Ok(parse_llm_classification(&response))
    }
}

/// Structured-output prompt constrained to the six query types
fn build_classification_prompt(question: &str) -> String {
    format!(
        "Classify the following election data query into one of these categories:\n\
         \n\
         - EXACT_LOOKUP: count, find specific entities, list items\n\
         - ANALYTICAL: statistics, averages, distributions, trends\n\
         - SEMANTIC_SEARCH: conceptual questions, similarity-based\n\
         - COMPARISON: compare between entities\n\
         - AGGREGATION: group and summarize by categories\n\
         - COMPLEX: multi-step queries requiring multiple operations\n\
         \n\
         Query: \"{}\"\n\
         \n\
         Return only the category name and a confidence score (0-1), separated by |.\n\
         Format: CATEGORY|CONFIDENCE",
        question
    )
}

/// Parse "CATEGORY|CONFIDENCE"; tolerate a bare category name
fn parse_llm_classification(response: &str) -> (QueryType, f32) {
    let trimmed = response.trim();

    if let Some((category, confidence_str)) = trimmed.split_once('|') {
        if let Some(query_type) = QueryType::from_label(category) {
            let confidence = confidence_str.trim().parse::<f32>().unwrap_or(0.75);
            return (query_type, confidence.clamp(0.0, 1.0));
        }
    }

    match QueryType::from_label(trimmed) {
        Some(query_type) => (query_type, 0.75),
        None => (QueryType::SemanticSearch, 0.5),
    }
}
