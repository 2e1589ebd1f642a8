//! Runtime configuration.
//!
//! Configuration is read from process environment variables exactly once, at
//! CLI startup, and the resulting [`Config`] record is passed explicitly to
//! the components that need it. Nothing in the library reads the environment
//! after construction.
//!
//! Recognized variables:
//!
//! | Variable | Default | Effect |
//! |----------|---------|--------|
//! | `OPENAI_API_KEY` | (required) | Bearer token for the model endpoint |
//! | `OPENAI_BASE_URL` | `https://openrouter.ai/api/v1` | Chat-completions endpoint base |
//! | `MODEL_NAME` | (required) | Model identifier sent with each request |
//! | `DEFAULT_TEMPERATURE` | `0.7` | Sampling temperature |
//! | `DEFAULT_MAX_TOKENS` | `2000` | Per-reply token cap |
//! | `DEFAULT_TIMEOUT` | `60` | Per-attempt request timeout (seconds) |
//! | `DEFAULT_CONCURRENCY` | `5` | Worker pool size |
//! | `DEFAULT_RETRY_TIMES` | `3` | Retry budget inside the model invoker |
//! | `DEFAULT_RETRY_DELAY` | `1` | Backoff base delay (seconds) |

use std::env;

use crate::{Error, Result};

/// Immutable runtime configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key passed through to the model invoker.
    pub api_key: String,
    /// Endpoint base URL (the `/chat/completions` suffix is appended).
    pub base_url: String,
    /// Model identifier.
    pub model_name: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Maximum tokens per model reply.
    pub max_tokens: u32,
    /// Per-attempt request timeout in seconds.
    pub timeout_secs: u64,
    /// Worker pool size.
    pub concurrency: usize,
    /// Retry budget for transient transport errors.
    pub retry_times: u32,
    /// Base delay for exponential backoff, in seconds.
    pub retry_delay_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            model_name: String::new(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
            concurrency: 5,
            retry_times: 3,
            retry_delay_secs: 1,
        }
    }
}

impl Config {
    /// Build a configuration record from the process environment.
    ///
    /// Unset variables fall back to defaults; set-but-unparseable numeric
    /// variables are an error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        Ok(Self {
            api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model_name: env::var("MODEL_NAME").unwrap_or_default(),
            temperature: parse_var("DEFAULT_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_var("DEFAULT_MAX_TOKENS", defaults.max_tokens)?,
            timeout_secs: parse_var("DEFAULT_TIMEOUT", defaults.timeout_secs)?,
            concurrency: parse_var("DEFAULT_CONCURRENCY", defaults.concurrency)?,
            retry_times: parse_var("DEFAULT_RETRY_TIMES", defaults.retry_times)?,
            retry_delay_secs: parse_var("DEFAULT_RETRY_DELAY", defaults.retry_delay_secs)?,
        })
    }

    /// Validate required fields and numeric ranges.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(Error::config("missing required OPENAI_API_KEY"));
        }
        if self.model_name.is_empty() {
            return Err(Error::config("missing required MODEL_NAME"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(Error::config("max_tokens must be positive"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout must be positive"));
        }
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be positive"));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("cannot parse {name}={raw:?}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.concurrency, 5);
        assert_eq!(config.retry_times, 3);
        assert!(config.base_url.starts_with("https://"));
    }

    #[test]
    fn validate_rejects_missing_credentials() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            api_key: "sk-test".into(),
            model_name: "test-model".into(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let config = Config {
            api_key: "sk-test".into(),
            model_name: "test-model".into(),
            temperature: 3.5,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
