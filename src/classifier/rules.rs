//! Rule-based classification pass
//!
//! Weighted regex vocabulary per query type. Anchored, unambiguous phrases
//! carry more weight than loose keyword hits; the winning type's accumulated
//! weight maps to a confidence capped at 0.9 so the LLM path stays reachable
//! for genuinely ambiguous questions.

use crate::classifier::QueryType;
use regex::Regex;

/// Highest confidence the rule pass can claim
const MAX_RULE_CONFIDENCE: f32 = 0.9;

/// Confidence assigned when nothing matches (defaults to semantic search)
const NO_MATCH_CONFIDENCE: f32 = 0.2;

struct WeightedPattern {
    regex: Regex,
    weight: f32,
}

struct TypePatterns {
    query_type: QueryType,
    patterns: Vec<WeightedPattern>,
}

/// Pattern-matching classifier over a fixed intent vocabulary
pub struct RuleClassifier {
    types: Vec<TypePatterns>,
    superlative: Regex,
    dimension: Regex,
    intents: Vec<(Regex, &'static str)>,
}

fn pattern(raw: &str, weight: f32) -> WeightedPattern {
    WeightedPattern {
        regex: Regex::new(raw).expect("static classifier pattern"),
        weight,
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        let types = vec![
            TypePatterns {
                query_type: QueryType::ExactLookup,
                patterns: vec![
                    pattern(r"^how many\b", 2.0),
                    pattern(r"^count\b", 2.0),
                    pattern(r"^number of\b", 2.0),
                    pattern(r"^total\b", 1.5),
                    pattern(r"^list all\b", 2.0),
                    pattern(r"^show me\b", 1.0),
                    pattern(r"^find\b", 1.0),
                    pattern(r"^who is\b", 1.5),
                    pattern(r"^which\b", 1.0),
                ],
            },
            TypePatterns {
                query_type: QueryType::Analytical,
                patterns: vec![
                    pattern(r"\baverage\b", 2.0),
                    pattern(r"\bmean\b", 1.5),
                    pattern(r"\bmedian\b", 2.0),
                    pattern(r"\bmaximum\b", 1.0),
                    pattern(r"\bminimum\b", 1.0),
                    pattern(r"\bdistribution\b", 2.0),
                    pattern(r"\btrend\b", 1.5),
                    pattern(r"\bstatistics\b", 2.0),
                    pattern(r"\bstandard deviation\b", 2.0),
                ],
            },
            TypePatterns {
                query_type: QueryType::Comparison,
                patterns: vec![
                    pattern(r"\bcompare\b", 2.0),
                    pattern(r"\bvs\.?\b", 2.0),
                    pattern(r"\bversus\b", 2.0),
                    pattern(r"\bdifference between\b", 2.0),
                    pattern(r"\b(higher|lower|greater|fewer) than\b", 1.5),
                ],
            },
            TypePatterns {
                query_type: QueryType::Aggregation,
                patterns: vec![
                    pattern(r"\bgroup(ed)? by\b", 2.0),
                    pattern(r"\bbreak\s?down\b", 2.0),
                    pattern(r"\bper (party|district|province)\b", 2.0),
                    pattern(r"\bby (party|district|province|gender)\b", 1.5),
                    pattern(r"\bsummary\b", 1.0),
                    pattern(r"\bcategorize\b", 1.5),
                ],
            },
        ];

        Self {
            types,
            superlative: Regex::new(
                r"\b(youngest|oldest|most|fewest|highest|lowest|largest|smallest|top|best|worst)\b",
            )
            .expect("static pattern"),
            dimension: Regex::new(r"\b(party|parties|district|districts|province|provinces)\b")
                .expect("static pattern"),
            intents: vec![
                (
                    Regex::new(r"\b(how many|count|number of|total)\b").expect("static pattern"),
                    "count",
                ),
                (
                    Regex::new(r"\b(list|show|find|get)\b").expect("static pattern"),
                    "list",
                ),
                (
                    Regex::new(r"\b(average|mean|median|distribution|statistics)\b")
                        .expect("static pattern"),
                    "average",
                ),
                (
                    Regex::new(r"\b(compare|versus|vs)\b").expect("static pattern"),
                    "compare",
                ),
                (
                    Regex::new(r"\b(group|breakdown|break down|by party|by district)\b")
                        .expect("static pattern"),
                    "group-by",
                ),
            ],
        }
    }

    /// Classify a lowercased question, returning (type, confidence, intent)
    pub fn classify(&self, query: &str) -> (QueryType, f32, String) {
        let mut best_type = QueryType::SemanticSearch;
        let mut best_score = 0.0f32;

        for type_patterns in &self.types {
            let score: f32 = type_patterns
                .patterns
                .iter()
                .filter(|p| p.regex.is_match(query))
                .map(|p| p.weight)
                .sum();

            if score > best_score {
                best_score = score;
                best_type = type_patterns.query_type;
            }
        }

        // A superlative over a grouping dimension is a multi-step question
        // (pick the top group, then compute within it).
        if self.superlative.is_match(query) && self.dimension.is_match(query) {
            let complex_score = 2.5;
            if complex_score > best_score {
                best_score = complex_score;
                best_type = QueryType::Complex;
            }
        }

        let confidence = if best_score > 0.0 {
            (best_score / 2.0).min(MAX_RULE_CONFIDENCE)
        } else {
            NO_MATCH_CONFIDENCE
        };

        let intent = self.intent_for(query, best_type);
        (best_type, confidence, intent)
    }

    fn intent_for(&self, query: &str, query_type: QueryType) -> String {
        if query_type == QueryType::Complex {
            return "multi-step".to_string();
        }

        for (regex, intent) in &self.intents {
            if regex.is_match(query) {
                return (*intent).to_string();
            }
        }

        match query_type {
            QueryType::SemanticSearch => "search".to_string(),
            _ => "lookup".to_string(),
        }
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(query: &str) -> (QueryType, f32, String) {
        RuleClassifier::new().classify(&query.to_lowercase())
    }

    #[test]
    fn test_count_query() {
        let (qt, conf, intent) = classify("How many candidates in Kaski?");
        assert_eq!(qt, QueryType::ExactLookup);
        assert!(conf >= 0.7);
        assert_eq!(intent, "count");
    }

    #[test]
    fn test_analytical_query() {
        let (qt, conf, _) = classify("What is the average age of candidates?");
        assert_eq!(qt, QueryType::Analytical);
        assert!(conf >= 0.7);
    }

    #[test]
    fn test_comparison_query() {
        let (qt, _, intent) = classify("Compare Kaski versus Chitwan by candidate count");
        assert_eq!(qt, QueryType::Comparison);
        assert_eq!(intent, "compare");
    }

    #[test]
    fn test_aggregation_query() {
        let (qt, conf, _) = classify("Show the breakdown of candidates by party");
        assert_eq!(qt, QueryType::Aggregation);
        assert!(conf >= 0.7);
    }

    #[test]
    fn test_superlative_over_dimension_is_complex() {
        let (qt, conf, intent) = classify("Which party has the youngest candidates in Gandaki?");
        assert_eq!(qt, QueryType::Complex);
        assert!(conf >= 0.7);
        assert_eq!(intent, "multi-step");
    }

    #[test]
    fn test_unmatched_defaults_to_semantic_search() {
        let (qt, conf, _) = classify("candidates with a background in law");
        assert_eq!(qt, QueryType::SemanticSearch);
        assert!(conf < 0.7);
    }
}
