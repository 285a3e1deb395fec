// diagnostic-engine-rs/src/config.rs
//
// Engine and analysis configuration, read from the environment.
//
// Configuration (.env file):
// - DIAG_MAX_WORKERS: probes running at once (default: 5)
// - DIAG_GLOBAL_DEADLINE_SECS: budget for the whole collection (default: 240)
// - DIAG_PROBE_TIMEOUT_SECS: budget for a single probe (default: 30)
// - DIAG_REDSHIFT_LOOKBACK_HOURS: warehouse error lookback (default: 24)
// - DIAG_CLOUDWATCH_WINDOW_MINUTES: aggregated error window (default: 60)
// - LLM_API_URL, LLM_MODEL, LLM_TEMPERATURE, LLM_MAX_TOKENS, LLM_TIMEOUT_SECS

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub max_workers: usize,
    pub global_deadline: Duration,
    pub probe_timeout: Duration,
    pub redshift_lookback_hours: u32,
    pub cloudwatch_window_minutes: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 5,
            global_deadline: Duration::from_secs(240),
            probe_timeout: Duration::from_secs(30),
            redshift_lookback_hours: 24,
            cloudwatch_window_minutes: 60,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_workers: config_rs::get_env_or("DIAG_MAX_WORKERS", defaults.max_workers),
            global_deadline: config_rs::get_env_duration_secs(
                "DIAG_GLOBAL_DEADLINE_SECS",
                defaults.global_deadline.as_secs(),
            ),
            probe_timeout: config_rs::get_env_duration_secs(
                "DIAG_PROBE_TIMEOUT_SECS",
                defaults.probe_timeout.as_secs(),
            ),
            redshift_lookback_hours: config_rs::get_env_or(
                "DIAG_REDSHIFT_LOOKBACK_HOURS",
                defaults.redshift_lookback_hours,
            ),
            cloudwatch_window_minutes: config_rs::get_env_or(
                "DIAG_CLOUDWATCH_WINDOW_MINUTES",
                defaults.cloudwatch_window_minutes,
            ),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "max_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.global_deadline.is_zero() {
            return Err(ConfigError::Invalid {
                field: "global_deadline",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.probe_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "probe_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.probe_timeout > self.global_deadline {
            return Err(ConfigError::Invalid {
                field: "probe_timeout",
                reason: format!(
                    "{}s exceeds the global deadline of {}s",
                    self.probe_timeout.as_secs(),
                    self.global_deadline.as_secs()
                ),
            });
        }
        Ok(())
    }
}

/// Settings for the OpenAI-compatible analysis client
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub api_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout: Duration::from_secs(60),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: config_rs::get_env_string("LLM_API_URL").unwrap_or(defaults.api_url),
            model: config_rs::get_env_string("LLM_MODEL").unwrap_or(defaults.model),
            temperature: config_rs::get_env_or("LLM_TEMPERATURE", defaults.temperature),
            max_tokens: config_rs::get_env_or("LLM_MAX_TOKENS", defaults.max_tokens),
            timeout: config_rs::get_env_duration_secs("LLM_TIMEOUT_SECS", defaults.timeout.as_secs()),
        }
    }
}
