//! Complexity scoring and adaptive search-effort tuning
//!
//! The scorer derives a numeric complexity score from a question and its
//! filters; a monotonic step function maps the score to a base HNSW search
//! effort inside a configured band. The tuner then nudges that effort per
//! query shape (type + complexity band) from rolling latency history: a p95
//! over the latency budget lowers effort by one step, comfortable headroom
//! raises it. This is a slow control loop driven by tens of samples, never
//! per-request optimization.

use crate::classifier::QueryType;
use crate::config::{IndexConfig, TunerConfig};
use ahash::AHashMap;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};

/// Coarse complexity bucket used in shape signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ComplexityBand {
    Low,
    Mid,
    High,
}

impl ComplexityBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=2 => ComplexityBand::Low,
            3..=5 => ComplexityBand::Mid,
            _ => ComplexityBand::High,
        }
    }
}

/// A coarse bucket identifying a class of similar queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeSignature {
    pub query_type: QueryType,
    pub band: ComplexityBand,
}

/// One observation appended to a shape's rolling window
#[derive(Debug, Clone, Copy)]
struct Sample {
    latency_ms: f64,
}

/// Fixed-size ring buffer of latency samples plus the accumulated effort
/// adjustment for one shape signature
struct ShapeHistory {
    samples: Vec<Sample>,
    cursor: usize,
    adjustment: i64,
    since_last_decision: usize,
}

impl ShapeHistory {
    fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            cursor: 0,
            adjustment: 0,
            since_last_decision: 0,
        }
    }

    fn push(&mut self, sample: Sample, capacity: usize) {
        if self.samples.len() < capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.cursor] = sample;
        }
        self.cursor = (self.cursor + 1) % capacity.max(1);
        self.since_last_decision += 1;
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn p95_latency(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut latencies: Vec<f64> = self.samples.iter().map(|s| s.latency_ms).collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((latencies.len() as f64) * 0.95).ceil() as usize;
        latencies[idx.saturating_sub(1).min(latencies.len() - 1)]
    }
}

/// Domain keywords that raise complexity when present
const DOMAIN_KEYWORDS: &[&str] = &[
    "candidate",
    "candidates",
    "party",
    "parties",
    "district",
    "province",
    "constituency",
    "voter",
    "voters",
    "election",
    "voting",
];

/// Complexity scorer over question text and filters
pub struct ComplexityScorer {
    word: Regex,
    comparison: Regex,
}

impl ComplexityScorer {
    pub fn new() -> Self {
        Self {
            word: Regex::new(r"\b\w+\b").expect("static pattern"),
            comparison: Regex::new(
                r"\b(compare|versus|vs|than|most|least|youngest|oldest|highest|lowest|top|best)\b",
            )
            .expect("static pattern"),
        }
    }

    /// Weighted complexity score, clamped to [1, 10]
    pub fn score(&self, question: &str, filters: &[(String, String)]) -> u32 {
        let query = question.to_lowercase();
        let mut score = 1u32;

        let tokens = self.word.find_iter(&query).count();
        if tokens > 5 {
            score += 1;
        }
        if tokens > 10 {
            score += 1;
        }

        score += (filters.len() as u32).min(3);

        let keyword_hits = DOMAIN_KEYWORDS
            .iter()
            .filter(|k| query.contains(*k))
            .count() as u32;
        score += keyword_hits.min(2);

        if self.comparison.is_match(&query) {
            score += 2;
        }

        score.min(10)
    }
}

impl Default for ComplexityScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Average effort bookkeeping per query type, for `stats()`
#[derive(Default)]
struct EffortAccumulator {
    total: u64,
    count: u64,
}

/// Adaptive effort tuner
///
/// Histories are an arena of per-signature ring buffers behind individual
/// mutexes; the outer map lock is held only long enough to clone the Arc.
pub struct AdaptiveTuner {
    scorer: ComplexityScorer,
    index_config: IndexConfig,
    config: TunerConfig,
    histories: RwLock<AHashMap<ShapeSignature, Arc<Mutex<ShapeHistory>>>>,
    effort_by_type: RwLock<AHashMap<QueryType, EffortAccumulator>>,
}

impl AdaptiveTuner {
    pub fn new(index_config: IndexConfig, config: TunerConfig) -> Self {
        Self {
            scorer: ComplexityScorer::new(),
            index_config,
            config,
            histories: RwLock::new(AHashMap::new()),
            effort_by_type: RwLock::new(AHashMap::new()),
        }
    }

    /// Complexity score for a question (exposed for shape signatures)
    pub fn complexity(&self, question: &str, filters: &[(String, String)]) -> u32 {
        self.scorer.score(question, filters)
    }

    /// Base effort from the monotonic step function, before tuning
    fn base_effort(&self, band: ComplexityBand) -> usize {
        let cfg = &self.index_config;
        match band {
            ComplexityBand::Low => cfg.effort_min,
            ComplexityBand::Mid => cfg.effort_default.clamp(cfg.effort_min, cfg.effort_max),
            ComplexityBand::High => cfg.effort_max,
        }
    }

    /// Effort for a question, combining the step function with the
    /// signature's accumulated adjustment, clamped to the configured band
    pub fn effort_for(
        &self,
        question: &str,
        filters: &[(String, String)],
        query_type: QueryType,
    ) -> (usize, ShapeSignature) {
        let score = self.scorer.score(question, filters);
        let band = ComplexityBand::from_score(score);
        let signature = ShapeSignature { query_type, band };

        let base = self.base_effort(band) as i64;

        let adjustment = if self.config.enabled {
            self.histories
                .read()
                .unwrap()
                .get(&signature)
                .map(|h| h.lock().unwrap().adjustment)
                .unwrap_or(0)
        } else {
            0
        };

        let effort = (base + adjustment).clamp(
            self.index_config.effort_min as i64,
            self.index_config.effort_max as i64,
        ) as usize;

        {
            let mut by_type = self.effort_by_type.write().unwrap();
            let acc = by_type.entry(query_type).or_default();
            acc.total += effort as u64;
            acc.count += 1;
        }

        (effort, signature)
    }

    /// Record an observed latency for a shape signature and, once enough
    /// samples have accumulated since the last decision, adjust its effort.
    pub fn record(&self, signature: ShapeSignature, latency_ms: f64) {
        if !self.config.enabled {
            return;
        }

        let history = {
            let histories = self.histories.read().unwrap();
            histories.get(&signature).cloned()
        };

        let history = match history {
            Some(h) => h,
            None => {
                let mut histories = self.histories.write().unwrap();
                histories
                    .entry(signature)
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(ShapeHistory::new(self.config.window_size)))
                    })
                    .clone()
            }
        };

        let mut h = history.lock().unwrap();
        h.push(Sample { latency_ms }, self.config.window_size);

        if h.len() < self.config.min_samples || h.since_last_decision < self.config.min_samples {
            return;
        }

        let p95 = h.p95_latency();
        let step = self.config.effort_step as i64;
        let min = self.index_config.effort_min as i64;
        let max = self.index_config.effort_max as i64;
        let base = self.base_effort(signature.band) as i64;

        if p95 > self.config.latency_budget_ms {
            // Over budget: trade recall for latency.
            if base + h.adjustment - step >= min {
                h.adjustment -= step;
                tracing::debug!(
                    "Tuner: {:?} p95 {:.1}ms over budget, adjustment now {}",
                    signature,
                    p95,
                    h.adjustment
                );
            }
        } else if p95 < self.config.latency_budget_ms * 0.5 {
            // Comfortable headroom: recall would benefit from more effort.
            if base + h.adjustment + step <= max {
                h.adjustment += step;
                tracing::debug!(
                    "Tuner: {:?} p95 {:.1}ms well under budget, adjustment now {}",
                    signature,
                    p95,
                    h.adjustment
                );
            }
        }

        h.since_last_decision = 0;
    }

    /// Average effort handed out per query type
    pub fn average_effort_by_type(&self) -> Vec<(QueryType, f64)> {
        let by_type = self.effort_by_type.read().unwrap();
        let mut result: Vec<(QueryType, f64)> = by_type
            .iter()
            .filter(|(_, acc)| acc.count > 0)
            .map(|(qt, acc)| (*qt, acc.total as f64 / acc.count as f64))
            .collect();
        result.sort_by_key(|(qt, _)| qt.as_str());
        result
    }
}
