//! Engine configuration.

use std::time::Duration;

use thiserror::Error;

pub const REQUEST_TIMEOUT_ENV: &str = "REPLAYKIT_REQUEST_TIMEOUT_MS";
pub const FEED_POLL_INTERVAL_ENV: &str = "REPLAYKIT_FEED_POLL_INTERVAL_MS";
pub const FEED_BATCH_SIZE_ENV: &str = "REPLAYKIT_FEED_BATCH_SIZE";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound for every event log call.
    pub request_timeout: Duration,
    /// Sleep between feed polls when a worker has caught up.
    pub feed_poll_interval: Duration,
    /// Maximum number of feed entries read per poll.
    pub feed_batch_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            feed_poll_interval: Duration::from_millis(250),
            feed_batch_size: 100,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `REPLAYKIT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            request_timeout: parse_positive(&lookup, REQUEST_TIMEOUT_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            feed_poll_interval: parse_positive(&lookup, FEED_POLL_INTERVAL_ENV)?
                .map(Duration::from_millis)
                .unwrap_or(defaults.feed_poll_interval),
            feed_batch_size: parse_positive(&lookup, FEED_BATCH_SIZE_ENV)?
                .map(|n| n as usize)
                .unwrap_or(defaults.feed_batch_size),
        })
    }
}

fn parse_positive(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(None);
    };
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            key,
            value,
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(Some(n)),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_are_read_in_milliseconds() {
        let config = EngineConfig::from_lookup(lookup(&[
            (REQUEST_TIMEOUT_ENV, "1500"),
            (FEED_POLL_INTERVAL_ENV, "10"),
            (FEED_BATCH_SIZE_ENV, "7"),
        ]))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert_eq!(config.feed_poll_interval, Duration::from_millis(10));
        assert_eq!(config.feed_batch_size, 7);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(FEED_BATCH_SIZE_ENV, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: FEED_BATCH_SIZE_ENV, .. }));

        let err = EngineConfig::from_lookup(lookup(&[(REQUEST_TIMEOUT_ENV, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: REQUEST_TIMEOUT_ENV, .. }));
    }
}
