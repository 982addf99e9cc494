use crate::config::Config;
use crate::error::{ChunavError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_cache(config, &mut errors);
        Self::validate_pool(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_tuner(config, &mut errors);
        Self::validate_classifier(config, &mut errors);
        Self::validate_llm(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChunavError::ConfigValidation { errors })
        }
    }

    fn validate_cache(config: &Config, errors: &mut Vec<ValidationError>) {
        let c = &config.cache;
        for (path, ttl) in [
            ("cache.embedding_ttl_secs", c.embedding_ttl_secs),
            ("cache.search_ttl_secs", c.search_ttl_secs),
            ("cache.structured_ttl_secs", c.structured_ttl_secs),
            ("cache.answer_ttl_secs", c.answer_ttl_secs),
        ] {
            if ttl == 0 {
                errors.push(ValidationError::new(path, "TTL must be greater than 0"));
            }
        }
    }

    fn validate_pool(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.pool.size == 0 {
            errors.push(ValidationError::new(
                "pool.size",
                "Pool size must be greater than 0",
            ));
        }

        if config.pool.acquire_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "pool.acquire_timeout_ms",
                "Acquire timeout must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.retrieval;

        if r.default_top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                "default_top_k must be greater than 0",
            ));
        }

        if r.default_top_k > r.max_top_k {
            errors.push(ValidationError::new(
                "retrieval.default_top_k",
                format!(
                    "default_top_k ({}) cannot exceed max_top_k ({})",
                    r.default_top_k, r.max_top_k
                ),
            ));
        }

        if r.expansion_factor == 0 {
            errors.push(ValidationError::new(
                "retrieval.expansion_factor",
                "expansion_factor must be greater than 0",
            ));
        }

        if r.enable_reranking && r.reranker_model.is_empty() {
            errors.push(ValidationError::new(
                "retrieval.reranker_model",
                "Reranker model cannot be empty when reranking is enabled",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let i = &config.index;

        if i.vector_dim == 0 {
            errors.push(ValidationError::new(
                "index.vector_dim",
                "Vector dimension must be greater than 0",
            ));
        }

        if i.vector_dim != config.embedding.dimension {
            errors.push(ValidationError::new(
                "index.vector_dim",
                format!(
                    "Index dimension ({}) must match embedding dimension ({})",
                    i.vector_dim, config.embedding.dimension
                ),
            ));
        }

        if i.effort_min == 0 || i.effort_min > i.effort_max {
            errors.push(ValidationError::new(
                "index.effort_min",
                format!(
                    "Effort band [{}, {}] is invalid",
                    i.effort_min, i.effort_max
                ),
            ));
        }

        if i.effort_default < i.effort_min || i.effort_default > i.effort_max {
            errors.push(ValidationError::new(
                "index.effort_default",
                format!(
                    "Default effort {} outside band [{}, {}]",
                    i.effort_default, i.effort_min, i.effort_max
                ),
            ));
        }
    }

    fn validate_tuner(config: &Config, errors: &mut Vec<ValidationError>) {
        let t = &config.tuner;

        if t.window_size == 0 {
            errors.push(ValidationError::new(
                "tuner.window_size",
                "Window size must be greater than 0",
            ));
        }

        if t.min_samples > t.window_size {
            errors.push(ValidationError::new(
                "tuner.min_samples",
                format!(
                    "min_samples ({}) cannot exceed window_size ({})",
                    t.min_samples, t.window_size
                ),
            ));
        }

        if t.latency_budget_ms <= 0.0 {
            errors.push(ValidationError::new(
                "tuner.latency_budget_ms",
                "Latency budget must be positive",
            ));
        }
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.classifier.rule_confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "classifier.rule_confidence_threshold",
                format!("Threshold {} must be within [0, 1]", threshold),
            ));
        }
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        if !config.llm.enabled {
            return;
        }

        if config.llm.base_url.is_empty() {
            errors.push(ValidationError::new(
                "llm.base_url",
                "Base URL cannot be empty when LLM is enabled",
            ));
        }

        if config.llm.model.is_empty() {
            errors.push(ValidationError::new(
                "llm.model",
                "Model cannot be empty when LLM is enabled",
            ));
        }

        if !(0.0..=2.0).contains(&config.llm.temperature) {
            errors.push(ValidationError::new(
                "llm.temperature",
                format!("Temperature {} outside [0, 2]", config.llm.temperature),
            ));
        }

        if config.llm.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "llm.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let mut config = Config::default();
        config.pool.size = 0;

        let result = ConfigValidator::validate(&config);
        assert!(result.is_err());
    }

    #[test]
    fn test_effort_band_validation() {
        let mut config = Config::default();
        config.index.effort_min = 300;
        config.index.effort_max = 200;

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut config = Config::default();
        config.embedding.dimension = 768;

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_llm_validation_only_when_enabled() {
        let mut config = Config::default();
        config.llm.enabled = false;
        config.llm.model = String::new();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.llm.enabled = true;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
