use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

use crate::model_catalog::ModelSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub tracing: TracingConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Replaces the built-in model catalog when present.
    #[serde(default)]
    pub models: Option<Vec<ModelSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TracingConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Delay between poll cycles in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on handlers executing at once (default: 8)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Timeout applied to job types without their own entry in `timeouts`
    #[serde(default)]
    pub default_timeout_seconds: Option<u64>,
    /// Per job type execution timeout in seconds
    #[serde(default)]
    pub timeouts: HashMap<String, u64>,
    /// How many times finalization is attempted before giving up on a job (default: 5)
    #[serde(default = "default_finalize_attempts")]
    pub finalize_attempts: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            default_timeout_seconds: None,
            timeouts: HashMap::new(),
            finalize_attempts: default_finalize_attempts(),
        }
    }
}

impl JobsConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Execution bound for a job type, if any.
    pub fn timeout_for(&self, job_type: &str) -> Option<Duration> {
        self.timeouts
            .get(job_type)
            .copied()
            .or(self.default_timeout_seconds)
            .map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "jobs.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid(
                "jobs.max_concurrent_jobs must be greater than zero".to_string(),
            ));
        }
        if self.finalize_attempts == 0 {
            return Err(ConfigError::Invalid(
                "jobs.finalize_attempts must be greater than zero".to_string(),
            ));
        }
        if self.default_timeout_seconds == Some(0) {
            return Err(ConfigError::Invalid(
                "jobs.default_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if let Some((job_type, _)) = self.timeouts.iter().find(|(_, seconds)| **seconds == 0) {
            return Err(ConfigError::Invalid(format!(
                "jobs.timeouts.{job_type} must be greater than zero"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GenerationConfig {
    /// Scripted generator that never leaves the process
    Mock,
    /// Any server speaking the OpenAI chat completions protocol
    OpenAi {
        base_url: String,
        api_key: Option<String>,
        #[serde(default = "default_request_timeout")]
        request_timeout_seconds: u64,
        #[serde(default = "default_max_tokens")]
        max_tokens: u32,
        #[serde(default = "default_temperature")]
        temperature: f32,
    },
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self::Mock
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config_rs::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_poll_interval_ms() -> u64 {
    1000
}

const fn default_max_concurrent_jobs() -> usize {
    8
}

const fn default_finalize_attempts() -> u32 {
    5
}

const fn default_request_timeout() -> u64 {
    300 // 5 minutes, long generations are normal
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_type_timeout_overrides_default() {
        let config = JobsConfig {
            default_timeout_seconds: Some(60),
            timeouts: HashMap::from([("write_chunk".to_string(), 600)]),
            ..JobsConfig::default()
        };

        assert_eq!(
            config.timeout_for("write_chunk"),
            Some(Duration::from_secs(600))
        );
        assert_eq!(
            config.timeout_for("review_chunk"),
            Some(Duration::from_secs(60))
        );
        assert_eq!(JobsConfig::default().timeout_for("write_chunk"), None);
    }

    #[test]
    fn rejects_zero_values() {
        let config = JobsConfig {
            poll_interval_ms: 0,
            ..JobsConfig::default()
        };
        assert!(config.validate().is_err());

        let config = JobsConfig {
            timeouts: HashMap::from([("edit_chunk".to_string(), 0)]),
            ..JobsConfig::default()
        };
        assert!(config.validate().is_err());

        let config = JobsConfig {
            default_timeout_seconds: Some(0),
            ..JobsConfig::default()
        };
        assert!(config.validate().is_err());

        assert!(JobsConfig::default().validate().is_ok());
    }

    #[test]
    fn generation_config_is_tagged() {
        let config: GenerationConfig = serde_json::from_value(serde_json::json!({
            "type": "openai",
            "base_url": "http://localhost:11434/v1",
            "api_key": null
        }))
        .unwrap();

        match config {
            GenerationConfig::OpenAi {
                base_url,
                request_timeout_seconds,
                ..
            } => {
                assert_eq!(base_url, "http://localhost:11434/v1");
                assert_eq!(request_timeout_seconds, 300);
            }
            GenerationConfig::Mock => panic!("expected openai config"),
        }
    }
}
