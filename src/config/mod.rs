//! Configuration management for chunav
//!
//! Handles loading, validation, and environment overrides for the query
//! pipeline configuration (cache TTLs, pool sizing, retrieval and tuner knobs).

use crate::error::{ChunavError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cache: CacheConfig,
    pub pool: PoolConfig,
    pub retrieval: RetrievalConfig,
    pub index: IndexConfig,
    pub tuner: TunerConfig,
    pub classifier: ClassifierConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub analytics: AnalyticsConfig,
}

/// Cache configuration with per-namespace TTLs
///
/// Embeddings are input-deterministic and get the longest TTL; search
/// results get the shortest since the index can change out of band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Embedding vectors TTL in seconds
    pub embedding_ttl_secs: u64,
    /// Vector search results TTL in seconds
    pub search_ttl_secs: u64,
    /// Structured query results TTL in seconds
    pub structured_ttl_secs: u64,
    /// Final answer payloads TTL in seconds
    pub answer_ttl_secs: u64,
}

/// Connection pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of live connections
    pub size: usize,
    /// Acquire timeout in milliseconds
    pub acquire_timeout_ms: u64,
    /// Idle connections older than this are retired and replaced
    pub max_idle_secs: u64,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Candidate expansion factor when reranking is enabled
    pub expansion_factor: usize,
    pub enable_reranking: bool,
    pub reranker_model: String,
}

/// HNSW index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Vector dimension (must match embedding dimension)
    pub vector_dim: usize,
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    /// Search effort band for the adaptive tuner
    pub effort_min: usize,
    pub effort_max: usize,
    pub effort_default: usize,
}

/// Adaptive tuner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    pub enabled: bool,
    /// Samples kept per shape signature
    pub window_size: usize,
    /// Minimum samples before the tuner starts adjusting
    pub min_samples: usize,
    /// Target p95 latency budget in milliseconds
    pub latency_budget_ms: f64,
    /// Effort adjustment applied per tuning decision
    pub effort_step: usize,
}

/// Classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Rule confidence at or above this skips the LLM fallback
    pub rule_confidence_threshold: f32,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

/// LLM service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub provider: String,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

/// Structured data store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    pub db_path: PathBuf,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ChunavError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ChunavError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ChunavError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CHUNAV_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("CHUNAV_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "LLM__ENABLED" => {
                self.llm.enabled = value.parse().map_err(|_| ChunavError::InvalidConfigValue {
                    path: path.to_string(),
                    message: format!("Cannot parse '{}' as boolean", value),
                })?;
            }
            "LLM__MODEL" => {
                self.llm.model = value.to_string();
            }
            "LLM__BASE_URL" => {
                self.llm.base_url = value.to_string();
            }
            "CACHE__ENABLED" => {
                self.cache.enabled =
                    value.parse().map_err(|_| ChunavError::InvalidConfigValue {
                        path: path.to_string(),
                        message: format!("Cannot parse '{}' as boolean", value),
                    })?;
            }
            "EMBEDDING__MODEL" => {
                self.embedding.model = value.to_string();
            }
            "ANALYTICS__DB_PATH" => {
                self.analytics.db_path = PathBuf::from(value);
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ChunavError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("chunav").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| ChunavError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".chunav"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                enabled: true,
                embedding_ttl_secs: 86_400,
                search_ttl_secs: 900,
                structured_ttl_secs: 1_800,
                answer_ttl_secs: 3_600,
            },
            pool: PoolConfig {
                size: 5,
                acquire_timeout_ms: 30_000,
                max_idle_secs: 300,
            },
            retrieval: RetrievalConfig {
                default_top_k: 5,
                max_top_k: 20,
                expansion_factor: 2,
                enable_reranking: true,
                reranker_model: "bge-reranker-base".to_string(),
            },
            index: IndexConfig {
                vector_dim: 384,
                hnsw_m: 32,
                hnsw_ef_construction: 128,
                effort_min: 16,
                effort_max: 256,
                effort_default: 100,
            },
            tuner: TunerConfig {
                enabled: true,
                window_size: 100,
                min_samples: 10,
                latency_budget_ms: 200.0,
                effort_step: 20,
            },
            classifier: ClassifierConfig {
                rule_confidence_threshold: 0.7,
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                dimension: 384,
            },
            llm: LlmConfig {
                enabled: false,
                provider: "deepseek".to_string(),
                base_url: "https://api.deepseek.com/v1".to_string(),
                api_key_env: "DEEPSEEK_API_KEY".to_string(),
                model: "deepseek-chat".to_string(),
                temperature: 0.0,
                timeout_secs: 30,
            },
            analytics: AnalyticsConfig {
                db_path: PathBuf::from("data/election_data.db"),
            },
        }
    }
}
