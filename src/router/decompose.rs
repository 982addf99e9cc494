//! Decomposition of multi-step questions into routable sub-questions

use crate::llm::LlmClient;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How sub-results are combined into one answer
///
/// Chosen at decomposition time from the question's shape; a closed set so
/// the merge step is an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Narrow the data with filters, then aggregate within the narrowed set
    FilterThenAggregate,
    /// Compute one result per compared entity, then rank them
    CompareThenRank,
    /// Answer sub-questions in order and present them as one narrative
    Sequential,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::FilterThenAggregate => "filter_then_aggregate",
            MergeStrategy::CompareThenRank => "compare_then_rank",
            MergeStrategy::Sequential => "sequential",
        }
    }
}

/// An ordered plan of 2 to 4 sub-questions plus the strategy to merge them
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub sub_questions: Vec<String>,
    pub strategy: MergeStrategy,
}

const MIN_SUB_QUESTIONS: usize = 2;
const MAX_SUB_QUESTIONS: usize = 4;

/// Splits a multi-step question into simpler sub-questions
///
/// An available LLM proposes the split; rule templates cover the known
/// question shapes when the LLM is absent or fails.
pub struct Decomposer {
    superlative: Regex,
    comparison: Regex,
}

impl Decomposer {
    pub fn new() -> Self {
        Self {
            superlative: Regex::new(r"\b(youngest|oldest|most|least|highest|lowest|top|best)\b")
                .expect("static pattern"),
            comparison: Regex::new(r"\b(compare|versus|vs|difference between)\b")
                .expect("static pattern"),
        }
    }

    pub async fn decompose(
        &self,
        question: &str,
        entities: &BTreeMap<String, String>,
        parties: &[String],
        llm: Option<&dyn LlmClient>,
    ) -> Decomposition {
        let strategy = self.strategy_for(question, parties);

        if let Some(llm) = llm {
            match self.decompose_by_llm(llm, question).await {
                Ok(sub_questions) => {
                    return Decomposition {
                        sub_questions,
                        strategy,
                    };
                }
                Err(e) => {
                    tracing::warn!("LLM decomposition failed, using rule templates: {}", e);
                }
            }
        }

        Decomposition {
            sub_questions: self.rule_decompose(question, entities, parties, strategy),
            strategy,
        }
    }

    fn strategy_for(&self, question: &str, parties: &[String]) -> MergeStrategy {
        let query = question.to_lowercase();
        if self.comparison.is_match(&query) && parties.len() >= MIN_SUB_QUESTIONS {
            MergeStrategy::CompareThenRank
        } else if self.superlative.is_match(&query) {
            MergeStrategy::FilterThenAggregate
        } else {
            MergeStrategy::Sequential
        }
    }

    async fn decompose_by_llm(
        &self,
        llm: &dyn LlmClient,
        question: &str,
    ) -> crate::error::Result<Vec<String>> {
        let prompt = format!(
            "Break the following election data question into {} to {} simpler \
             sub-questions that can each be answered independently.\n\
             Return one sub-question per line with no numbering or bullets.\n\
             \n\
             Question: \"{}\"",
            MIN_SUB_QUESTIONS, MAX_SUB_QUESTIONS, question
        );

        let response = llm.complete(&prompt).await?;
        let sub_questions = parse_sub_questions(&response);

        if sub_questions.len() < MIN_SUB_QUESTIONS {
            return Err(crate::error::ChunavError::ServiceUnavailable {
                service: "llm".to_string(),
                message: format!(
                    "Decomposition produced {} sub-questions, need at least {}",
                    sub_questions.len(),
                    MIN_SUB_QUESTIONS
                ),
            });
        }

        Ok(sub_questions)
    }

    /// Template split for the known multi-step shapes
    fn rule_decompose(
        &self,
        question: &str,
        entities: &BTreeMap<String, String>,
        parties: &[String],
        strategy: MergeStrategy,
    ) -> Vec<String> {
        let scope = scope_phrase(entities);

        match strategy {
            MergeStrategy::CompareThenRank => parties
                .iter()
                .take(MAX_SUB_QUESTIONS)
                .map(|party| format!("How many candidates does {} have{}?", party, scope))
                .collect(),
            MergeStrategy::FilterThenAggregate => vec![
                format!("How many candidates are there by party{}?", scope),
                format!("What is the average age of candidates{}?", scope),
            ],
            MergeStrategy::Sequential => vec![
                format!("How many candidates are there{}?", scope),
                question.to_string(),
            ],
        }
    }
}

impl Default for Decomposer {
    fn default() -> Self {
        Self::new()
    }
}

/// A location phrase like " in kaski" built from extracted entities
fn scope_phrase(entities: &BTreeMap<String, String>) -> String {
    for dimension in ["district", "province"] {
        if let Some(value) = entities.get(dimension) {
            return format!(" in {}", value);
        }
    }
    String::new()
}

/// Parse LLM output into clean sub-question lines
fn parse_sub_questions(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || c == '.' || c == ')' || c == '-' || c == '*'
                })
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(MAX_SUB_QUESTIONS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_superlative_gets_filter_then_aggregate() {
        let decomposer = Decomposer::new();
        let d = decomposer
            .decompose(
                "which party has the youngest candidates in gandaki",
                &entities(&[("province", "gandaki")]),
                &[],
                None,
            )
            .await;

        assert_eq!(d.strategy, MergeStrategy::FilterThenAggregate);
        assert_eq!(d.sub_questions.len(), 2);
        assert!(d.sub_questions[0].contains("gandaki"));
    }

    #[tokio::test]
    async fn test_two_parties_get_compare_then_rank() {
        let decomposer = Decomposer::new();
        let parties = vec!["nepali congress".to_string(), "cpn-uml".to_string()];
        let d = decomposer
            .decompose(
                "compare congress and uml in kaski",
                &entities(&[("district", "kaski")]),
                &parties,
                None,
            )
            .await;

        assert_eq!(d.strategy, MergeStrategy::CompareThenRank);
        assert_eq!(d.sub_questions.len(), 2);
        assert!(d.sub_questions[0].contains("nepali congress"));
        assert!(d.sub_questions[1].contains("cpn-uml"));
    }

    #[tokio::test]
    async fn test_fallback_is_sequential() {
        let decomposer = Decomposer::new();
        let d = decomposer
            .decompose("tell me about the election in kaski", &entities(&[("district", "kaski")]), &[], None)
            .await;

        assert_eq!(d.strategy, MergeStrategy::Sequential);
        assert!(d.sub_questions.len() >= 2);
    }

    #[test]
    fn test_parse_sub_questions_strips_numbering() {
        let parsed = parse_sub_questions("1. First question?\n2) Second question?\n- Third?\n");
        assert_eq!(
            parsed,
            vec!["First question?", "Second question?", "Third?"]
        );
    }

    #[test]
    fn test_parse_caps_at_four() {
        let parsed = parse_sub_questions("a?\nb?\nc?\nd?\ne?\nf?");
        assert_eq!(parsed.len(), 4);
    }
}
