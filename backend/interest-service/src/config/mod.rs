use crate::services::dispatcher::DispatcherConfig;
use crate::services::recommendation::RecommendationConfig;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service_name: String,

    // Redis (profiles, exclusion sets, embeddings, interaction stream)
    pub redis_url: String,

    // Interest profiles
    pub embedding_dimension: usize,
    pub profile_max_cas_retries: u32,

    // Recommendation
    pub recommend_max_candidates: usize,
    pub recommend_max_k: usize,
    pub recommend_default_k: usize,

    // Event dispatch
    pub dispatch_dedup_ttl_secs: u64,
    pub dedup_cleanup_interval_secs: u64,

    // Interaction stream consumer
    pub interaction_stream_key: String,
    pub interaction_consumer_group: String,
    pub interaction_consumer_name: String,
    pub stream_batch_size: usize,
    pub stream_block_ms: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("service_name", "interest-service")?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("embedding_dimension", 384)?
            .set_default("profile_max_cas_retries", 8)?
            .set_default("recommend_max_candidates", 5000)?
            .set_default("recommend_max_k", 100)?
            .set_default("recommend_default_k", 10)?
            .set_default("dispatch_dedup_ttl_secs", 3600)? // 1 hour
            .set_default("dedup_cleanup_interval_secs", 300)?
            .set_default("interaction_stream_key", "interest:interactions")?
            .set_default("interaction_consumer_group", "interest-service")?
            .set_default("interaction_consumer_name", "interest-service-1")?
            .set_default("stream_batch_size", 64)?
            .set_default("stream_block_ms", 5000)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<()> {
        if self.redis_url.is_empty() {
            return Err(anyhow!("Redis URL is required"));
        }

        if self.embedding_dimension == 0 {
            return Err(anyhow!("Embedding dimension must be greater than 0"));
        }

        if self.profile_max_cas_retries == 0 {
            return Err(anyhow!("Profile CAS retries must be greater than 0"));
        }

        if self.recommend_max_candidates == 0 {
            return Err(anyhow!("Recommendation candidate cap must be greater than 0"));
        }

        if self.recommend_default_k == 0 || self.recommend_default_k > self.recommend_max_k {
            return Err(anyhow!(
                "Recommendation k must satisfy 0 < default_k <= max_k"
            ));
        }

        if self.stream_batch_size == 0 {
            return Err(anyhow!("Stream batch size must be greater than 0"));
        }

        Ok(())
    }

    pub fn recommendation(&self) -> RecommendationConfig {
        RecommendationConfig {
            max_candidates: self.recommend_max_candidates,
            max_k: self.recommend_max_k,
            default_k: self.recommend_default_k,
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            dedup_ttl: Duration::from_secs(self.dispatch_dedup_ttl_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            service_name: "interest-service".to_string(),
            redis_url: "redis://localhost:6379".to_string(),
            embedding_dimension: 384,
            profile_max_cas_retries: 8,
            recommend_max_candidates: 5000,
            recommend_max_k: 100,
            recommend_default_k: 10,
            dispatch_dedup_ttl_secs: 3600,
            dedup_cleanup_interval_secs: 300,
            interaction_stream_key: "interest:interactions".to_string(),
            interaction_consumer_group: "interest-service".to_string(),
            interaction_consumer_name: "worker-1".to_string(),
            stream_batch_size: 64,
            stream_block_ms: 5000,
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let mut config = sample();
        config.embedding_dimension = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_default_k_above_max() {
        let mut config = sample();
        config.recommend_default_k = 200;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_component_configs() {
        let config = sample();
        assert_eq!(config.recommendation().max_candidates, 5000);
        assert_eq!(config.recommendation().max_k, 100);
        assert_eq!(config.recommendation().default_k, 10);
        assert_eq!(config.dispatcher().dedup_ttl, Duration::from_secs(3600));
    }
}
