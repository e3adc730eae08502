//! Controller configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_CONTEXT_TIMEOUT: &str = "REAPER_CONTEXT_TIMEOUT";
pub const ENV_EXECUTION_MAX_CONCURRENT: &str = "REAPER_EXECUTION_MAX_CONCURRENT_RECONCILES";
pub const ENV_MANAGED_MAX_CONCURRENT: &str = "REAPER_MANAGED_MAX_CONCURRENT_RECONCILES";
pub const ENV_RETRY_DELAY: &str = "REAPER_RETRY_DELAY";
pub const ENV_RESYNC_ON_START: &str = "REAPER_RESYNC_ON_START";

/// Settings shared by the TTL and count-limit controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Budget for one reconcile attempt. Zero disables the budget.
    #[serde(with = "humantime_serde")]
    pub reconcile_timeout: Duration,
    /// Worker count for the execution (TTL) controller; 0 means one worker.
    pub execution_max_concurrent_reconciles: usize,
    /// Worker count for the managed (count-limit) controller; 0 means one worker.
    pub managed_max_concurrent_reconciles: usize,
    /// Delay before a failed attempt is handed back to the queue.
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Enqueue already-terminal executions when a controller starts.
    pub resync_on_start: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            reconcile_timeout: Duration::from_secs(300),
            execution_max_concurrent_reconciles: 0,
            managed_max_concurrent_reconciles: 0,
            retry_delay: Duration::from_secs(5),
            resync_on_start: true,
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by any `REAPER_*` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(raw) = read(ENV_CONTEXT_TIMEOUT) {
            config.reconcile_timeout = parse_duration(ENV_CONTEXT_TIMEOUT, &raw)?;
        }
        if let Some(raw) = read(ENV_EXECUTION_MAX_CONCURRENT) {
            config.execution_max_concurrent_reconciles =
                parse_usize(ENV_EXECUTION_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = read(ENV_MANAGED_MAX_CONCURRENT) {
            config.managed_max_concurrent_reconciles =
                parse_usize(ENV_MANAGED_MAX_CONCURRENT, &raw)?;
        }
        if let Some(raw) = read(ENV_RETRY_DELAY) {
            config.retry_delay = parse_duration(ENV_RETRY_DELAY, &raw)?;
        }
        if let Some(raw) = read(ENV_RESYNC_ON_START) {
            config.resync_on_start = parse_bool(ENV_RESYNC_ON_START, &raw)?;
        }
        Ok(config)
    }

    pub fn execution_workers(&self) -> usize {
        self.execution_max_concurrent_reconciles.max(1)
    }

    pub fn managed_workers(&self) -> usize {
        self.managed_max_concurrent_reconciles.max(1)
    }
}

fn parse_duration(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(raw.trim()).map_err(|source| ConfigError::InvalidDuration {
        var: var.to_string(),
        source,
    })
}

fn parse_usize(var: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|source| ConfigError::InvalidInteger {
            var: var.to_string(),
            source,
        })
}

fn parse_bool(var: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            var: var.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.reconcile_timeout, Duration::from_secs(300));
        assert_eq!(config.execution_workers(), 1);
        assert_eq!(config.managed_workers(), 1);
    }

    #[test]
    fn test_overrides() {
        let config = ControllerConfig::from_lookup(lookup(&[
            (ENV_CONTEXT_TIMEOUT, "2m 30s"),
            (ENV_EXECUTION_MAX_CONCURRENT, "8"),
            (ENV_MANAGED_MAX_CONCURRENT, " 2 "),
            (ENV_RETRY_DELAY, "250ms"),
            (ENV_RESYNC_ON_START, "false"),
        ]))
        .unwrap();
        assert_eq!(config.reconcile_timeout, Duration::from_secs(150));
        assert_eq!(config.execution_workers(), 8);
        assert_eq!(config.managed_workers(), 2);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert!(!config.resync_on_start);
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config =
            ControllerConfig::from_lookup(lookup(&[(ENV_CONTEXT_TIMEOUT, "  ")])).unwrap();
        assert_eq!(config.reconcile_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_malformed_values_are_errors() {
        let err = ControllerConfig::from_lookup(lookup(&[(ENV_CONTEXT_TIMEOUT, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { ref var, .. } if var == ENV_CONTEXT_TIMEOUT));

        let err =
            ControllerConfig::from_lookup(lookup(&[(ENV_EXECUTION_MAX_CONCURRENT, "-1")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidInteger { .. }));

        let err = ControllerConfig::from_lookup(lookup(&[(ENV_RESYNC_ON_START, "maybe")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid boolean in REAPER_RESYNC_ON_START: maybe"
        );
    }

    #[test]
    fn test_serde_uses_human_durations() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"reconcile_timeout":"10s","retry_delay":"1m"}"#).unwrap();
        assert_eq!(config.reconcile_timeout, Duration::from_secs(10));
        assert_eq!(config.retry_delay, Duration::from_secs(60));
        assert!(config.resync_on_start);
    }
}
