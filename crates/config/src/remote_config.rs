//! Remote API configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How to reach the sync server and how hard to retry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the entity API, without a trailing `/entities`
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Attempts per remote call, the first one included
    pub max_attempts: u32,

    /// Delay before the first retry
    pub initial_backoff_ms: u64,

    /// Upper bound for the exponential backoff
    pub max_backoff_ms: u64,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,
}

impl RemoteConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.fitsync.app".to_string(),
            request_timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 10_000,
            auth_token: None,
        }
    }
}

impl ConfigSection for RemoteConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::http_url(&self.base_url, "remote.base_url"),
            Validator::in_range(
                self.request_timeout_secs,
                1,
                300,
                "remote.request_timeout_secs",
            ),
            Validator::in_range(self.max_attempts, 1, 10, "remote.max_attempts"),
            Validator::in_range(
                self.initial_backoff_ms,
                1,
                60_000,
                "remote.initial_backoff_ms",
            ),
        ];

        if self.max_backoff_ms < self.initial_backoff_ms {
            results.push(Err(ValidationError::with_value(
                "remote.max_backoff_ms",
                "must not be smaller than remote.initial_backoff_ms",
                self.max_backoff_ms,
            )));
        }

        if let Some(token) = &self.auth_token {
            results.push(Validator::not_empty(token, "remote.auth_token"));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.base_url = other.base_url;
        self.request_timeout_secs = other.request_timeout_secs;
        self.max_attempts = other.max_attempts;
        self.initial_backoff_ms = other.initial_backoff_ms;
        self.max_backoff_ms = other.max_backoff_ms;
        if other.auth_token.is_some() {
            self.auth_token = other.auth_token;
        }
    }

    fn section_name(&self) -> &'static str {
        "remote"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RemoteConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_reported_together() {
        let config = RemoteConfig {
            base_url: "api.fitsync.app".to_string(),
            request_timeout_secs: 0,
            max_attempts: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
            auth_token: Some(" ".to_string()),
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn test_merge_keeps_token_when_other_has_none() {
        let mut base = RemoteConfig {
            auth_token: Some("secret".to_string()),
            ..Default::default()
        };
        let other = RemoteConfig {
            max_attempts: 5,
            ..Default::default()
        };

        base.merge(other);
        assert_eq!(base.max_attempts, 5);
        assert_eq!(base.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_durations() {
        let config = RemoteConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.initial_backoff(), Duration::from_millis(200));
        assert_eq!(config.max_backoff(), Duration::from_secs(10));
    }
}
