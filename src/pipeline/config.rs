//! Pipeline configuration.
//!
//! Tuning for the research and extraction calls: timeouts, token ceilings,
//! the bounded extraction retry, web search, and the progress channel size.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Upper bound on internal extraction retries.
pub const MAX_EXTRACTION_RETRIES: u32 = 1;

/// Configuration for a [`super::ReportPipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Research settings
    /// Bound on the research call, including transport.
    pub research_timeout: Duration,
    /// Token ceiling for the research response.
    pub research_max_tokens: u32,
    /// Whether the research call may search the web.
    pub web_search: bool,
    /// Maximum search results per research call.
    pub web_search_max_results: u32,

    // Extraction settings
    /// Bound on each extraction call.
    pub extraction_timeout: Duration,
    /// Token ceiling for the extraction response.
    pub extraction_max_tokens: u32,
    /// Re-prompts allowed after a schema violation (0 or 1).
    pub extraction_retries: u32,

    // Shared LLM settings
    /// Model override. `None` uses the provider default.
    pub model: Option<String>,
    /// Sampling temperature for both calls.
    pub temperature: f64,

    /// Capacity of the progress channel between producer and consumer.
    pub stream_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            research_timeout: Duration::from_secs(120),
            research_max_tokens: 4000,
            web_search: true,
            web_search_max_results: 5,

            extraction_timeout: Duration::from_secs(120),
            extraction_max_tokens: 3000,
            extraction_retries: MAX_EXTRACTION_RETRIES,

            model: None,
            temperature: 0.3,

            stream_buffer: 16,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REPORT_RESEARCH_TIMEOUT_SECS` (default: 120)
    /// - `REPORT_RESEARCH_MAX_TOKENS` (default: 4000)
    /// - `REPORT_WEB_SEARCH` (default: true)
    /// - `REPORT_WEB_SEARCH_MAX_RESULTS` (default: 5)
    /// - `REPORT_EXTRACTION_TIMEOUT_SECS` (default: 120)
    /// - `REPORT_EXTRACTION_MAX_TOKENS` (default: 3000)
    /// - `REPORT_EXTRACTION_RETRIES` (default: 1, at most 1)
    /// - `REPORT_MODEL` (optional model override)
    /// - `REPORT_TEMPERATURE` (default: 0.3)
    /// - `REPORT_STREAM_BUFFER` (default: 16)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REPORT_RESEARCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REPORT_RESEARCH_TIMEOUT_SECS")?;
            config.research_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("REPORT_RESEARCH_MAX_TOKENS") {
            config.research_max_tokens = parse_env_value(&val, "REPORT_RESEARCH_MAX_TOKENS")?;
        }
        if let Ok(val) = std::env::var("REPORT_WEB_SEARCH") {
            config.web_search = parse_env_bool(&val, "REPORT_WEB_SEARCH")?;
        }
        if let Ok(val) = std::env::var("REPORT_WEB_SEARCH_MAX_RESULTS") {
            config.web_search_max_results =
                parse_env_value(&val, "REPORT_WEB_SEARCH_MAX_RESULTS")?;
        }

        if let Ok(val) = std::env::var("REPORT_EXTRACTION_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REPORT_EXTRACTION_TIMEOUT_SECS")?;
            config.extraction_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("REPORT_EXTRACTION_MAX_TOKENS") {
            config.extraction_max_tokens = parse_env_value(&val, "REPORT_EXTRACTION_MAX_TOKENS")?;
        }
        if let Ok(val) = std::env::var("REPORT_EXTRACTION_RETRIES") {
            config.extraction_retries = parse_env_value(&val, "REPORT_EXTRACTION_RETRIES")?;
        }

        if let Ok(val) = std::env::var("REPORT_MODEL") {
            if !val.trim().is_empty() {
                config.model = Some(val.trim().to_string());
            }
        }
        if let Ok(val) = std::env::var("REPORT_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "REPORT_TEMPERATURE")?;
        }
        if let Ok(val) = std::env::var("REPORT_STREAM_BUFFER") {
            config.stream_buffer = parse_env_value(&val, "REPORT_STREAM_BUFFER")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.research_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "research_timeout must be greater than 0".to_string(),
            ));
        }
        if self.extraction_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "extraction_timeout must be greater than 0".to_string(),
            ));
        }
        if self.research_max_tokens == 0 || self.extraction_max_tokens == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_tokens ceilings must be greater than 0".to_string(),
            ));
        }
        if self.extraction_retries > MAX_EXTRACTION_RETRIES {
            return Err(ConfigError::ValidationFailed(format!(
                "extraction_retries must be at most {}",
                MAX_EXTRACTION_RETRIES
            )));
        }
        if self.web_search && self.web_search_max_results == 0 {
            return Err(ConfigError::ValidationFailed(
                "web_search_max_results must be greater than 0 when web search is enabled"
                    .to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }
        if self.stream_buffer == 0 {
            return Err(ConfigError::ValidationFailed(
                "stream_buffer must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Builder method to set the research timeout.
    pub fn with_research_timeout(mut self, timeout: Duration) -> Self {
        self.research_timeout = timeout;
        self
    }

    /// Builder method to set the extraction timeout.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    /// Builder method to set the extraction retry budget.
    pub fn with_extraction_retries(mut self, retries: u32) -> Self {
        self.extraction_retries = retries;
        self
    }

    /// Builder method to enable or disable web search.
    pub fn with_web_search(mut self, enabled: bool) -> Self {
        self.web_search = enabled;
        self
    }

    /// Builder method to set the model override.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Builder method to set temperature.
    pub fn with_temperature(mut self, temp: f64) -> Self {
        self.temperature = temp;
        self
    }

    /// Builder method to set the progress channel capacity.
    pub fn with_stream_buffer(mut self, size: usize) -> Self {
        self.stream_buffer = size;
        self
    }

    /// Model name to put on requests. Empty defers to the provider.
    pub(crate) fn model_name(&self) -> &str {
        self.model.as_deref().unwrap_or("")
    }
}

/// Parse an environment variable value into a type.
pub(crate) fn parse_env_value<T: std::str::FromStr>(
    value: &str,
    key: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
pub(crate) fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
