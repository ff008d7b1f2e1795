//! Client-wide defaults, loadable from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::request::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT};
use crate::retry::{Backoff, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffConfig {
    #[default]
    None,
    Exponential { base_ms: u64, max_ms: u64 },
}

impl From<BackoffConfig> for Backoff {
    fn from(config: BackoffConfig) -> Self {
        match config {
            BackoffConfig::None => Backoff::None,
            BackoffConfig::Exponential { base_ms, max_ms } => Backoff::exponential(
                Duration::from_millis(base_ms),
                Duration::from_millis(max_ms),
            ),
        }
    }
}

/// Defaults applied to requests created through `Network::request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub run_on_main_thread: bool,
    pub backoff: BackoffConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            run_on_main_thread: true,
            backoff: BackoffConfig::None,
        }
    }
}

impl NetworkConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let config = NetworkConfig::from_json("{}").unwrap();
        assert_eq!(config, NetworkConfig::default());
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn parses_exponential_backoff() {
        let config = NetworkConfig::from_json(
            r#"{"max_attempts":3,"run_on_main_thread":false,
                "backoff":{"kind":"exponential","base_ms":50,"max_ms":400}}"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 3);
        assert!(!config.run_on_main_thread);
        assert_eq!(
            config.retry_policy().delay_after(2),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn rejects_unknown_backoff_kind() {
        let err = NetworkConfig::from_json(r#"{"backoff":{"kind":"linear"}}"#).unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }
}
