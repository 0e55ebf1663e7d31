//! Run configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment variables
//! (`HYPORANK_BASE_URL`, `HYPORANK_MODEL`) and finally by CLI flags. Every
//! component receives the values it needs explicitly.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::chat_completions::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use crate::gateway::RetryPolicy;
use crate::oracle::SamplingParams;
use crate::prompts::{prompt_by_slug, PromptTemplate, DEFAULT_PROMPT, PROMPTS};
use crate::ranking::batch::DEFAULT_UNIT_CONCURRENCY;
use crate::ranking::comparison::DEFAULT_MAX_VERDICT_ATTEMPTS;
use crate::ranking::tournament::{
    TournamentConfig, DEFAULT_COMPARISON_CONCURRENCY, DEFAULT_R_MAX,
};
use crate::scoring::extract::DEFAULT_MIN_EVAL_FILES;
use crate::scoring::models::ModelSuffixMap;
use crate::scoring::pipeline::default_categories;

pub const ENV_BASE_URL: &str = "HYPORANK_BASE_URL";
pub const ENV_MODEL: &str = "HYPORANK_MODEL";
pub const DEFAULT_API_KEY_ENV: &str = "HYPORANK_API_KEY";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("API key not set (expected env var {0})")]
    MissingApiKey(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyporankConfig {
    pub oracle: OracleConfig,
    pub ranking: RankingConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub timeout_seconds: u64,
    pub retry: RetryConfig,
}

impl Default for OracleConfig {
    fn default() -> Self {
        let sampling = SamplingParams::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            timeout_seconds: DEFAULT_TIMEOUT.as_secs(),
            retry: RetryConfig::default(),
        }
    }
}

impl OracleConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request; `0` retries without bound.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts.unwrap_or(0),
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        let max_delay = Duration::from_millis(self.max_delay_ms);
        if self.max_attempts == 0 {
            return RetryPolicy::unbounded(base_delay, max_delay);
        }
        RetryPolicy {
            max_attempts: Some(self.max_attempts),
            base_delay,
            max_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub r_max: u32,
    pub comparison_concurrency: usize,
    pub unit_concurrency: usize,
    pub max_verdict_attempts: u32,
    /// Slug of the judge prompt template.
    pub prompt: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            r_max: DEFAULT_R_MAX,
            comparison_concurrency: DEFAULT_COMPARISON_CONCURRENCY,
            unit_concurrency: DEFAULT_UNIT_CONCURRENCY,
            max_verdict_attempts: DEFAULT_MAX_VERDICT_ATTEMPTS,
            prompt: DEFAULT_PROMPT.slug.to_string(),
        }
    }
}

impl RankingConfig {
    pub fn tournament(&self) -> TournamentConfig {
        TournamentConfig {
            r_max: self.r_max,
            comparison_concurrency: self.comparison_concurrency,
        }
    }

    pub fn template(&self) -> Result<PromptTemplate, ConfigError> {
        prompt_by_slug(&self.prompt).ok_or_else(|| {
            let known: Vec<&str> = PROMPTS.iter().map(|t| t.slug).collect();
            ConfigError::Invalid(format!(
                "unknown ranking.prompt {:?} (known: {})",
                self.prompt,
                known.join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub categories: Vec<String>,
    pub ranking_results_dir: String,
    pub min_eval_files: usize,
    pub model_suffixes: ModelSuffixMap,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            ranking_results_dir: "fan_1_res".to_string(),
            min_eval_files: DEFAULT_MIN_EVAL_FILES,
            model_suffixes: ModelSuffixMap::default(),
        }
    }
}

impl HyporankConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path` if given, otherwise start from defaults; then apply env
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`, so tests need not touch
    /// the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.oracle.base_url = url;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.trim().is_empty()) {
            self.oracle.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.to_string()))
        };
        if self.oracle.model.trim().is_empty() {
            return invalid("oracle.model must not be empty");
        }
        if self.oracle.base_url.trim().is_empty() {
            return invalid("oracle.base_url must not be empty");
        }
        if !self.oracle.temperature.is_finite() || self.oracle.temperature < 0.0 {
            return invalid("oracle.temperature must be a finite, non-negative number");
        }
        if let Some(top_p) = self.oracle.top_p {
            if !top_p.is_finite() || !(0.0..=1.0).contains(&top_p) {
                return invalid("oracle.top_p must be within [0, 1]");
            }
        }
        if self.oracle.timeout_seconds == 0 {
            return invalid("oracle.timeout_seconds must be >= 1");
        }
        if self.oracle.retry.max_delay_ms < self.oracle.retry.base_delay_ms {
            return invalid("oracle.retry.max_delay_ms must be >= base_delay_ms");
        }
        if self.ranking.r_max == 0 {
            return invalid("ranking.r_max must be >= 1");
        }
        if self.ranking.comparison_concurrency == 0 {
            return invalid("ranking.comparison_concurrency must be >= 1");
        }
        if self.ranking.unit_concurrency == 0 {
            return invalid("ranking.unit_concurrency must be >= 1");
        }
        if self.ranking.max_verdict_attempts == 0 {
            return invalid("ranking.max_verdict_attempts must be >= 1");
        }
        self.ranking.template()?;
        if self.scoring.ranking_results_dir.trim().is_empty() {
            return invalid("scoring.ranking_results_dir must not be empty");
        }
        Ok(())
    }
}
