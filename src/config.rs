//! Configuration for the polling watcher.
//!
//! # Configuration Precedence
//!
//! 1. **Programmatic**: values set via `with_*` methods
//! 2. **Environment variables**: values from `FDSTREAM_*` env vars
//! 3. **Defaults**: [`WatcherConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `FDSTREAM_EVENTS_CAPACITY` | `usize` (> 0) | `events_capacity` |
//! | `FDSTREAM_POLL_TIMEOUT_MS` | `u64` or `none` | `poll_timeout` |
//!
//! The stream itself has no configuration; only the notification service
//! shipped with the crate is tunable.

use std::time::Duration;

/// Environment variable name for the per-wait event buffer capacity.
pub const ENV_EVENTS_CAPACITY: &str = "FDSTREAM_EVENTS_CAPACITY";
/// Environment variable name for the default wait timeout in milliseconds.
pub const ENV_POLL_TIMEOUT_MS: &str = "FDSTREAM_POLL_TIMEOUT_MS";

const DEFAULT_EVENTS_CAPACITY: usize = 1024;
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Error raised when a configuration value cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but does not parse.
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value as found.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
    /// The event buffer must hold at least one event.
    #[error("events capacity must be greater than zero")]
    ZeroCapacity,
}

/// Tuning knobs for [`PollWatcher`](crate::watcher::PollWatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Maximum number of readiness events collected per wait.
    pub events_capacity: usize,
    /// Wait timeout used when `poll_once` is called without one.
    /// `None` blocks until an event or a wake-up arrives.
    pub poll_timeout: Option<Duration>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            events_capacity: DEFAULT_EVENTS_CAPACITY,
            poll_timeout: Some(DEFAULT_POLL_TIMEOUT),
        }
    }
}

impl WatcherConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `FDSTREAM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Sets the event buffer capacity.
    #[must_use]
    pub fn with_events_capacity(mut self, capacity: usize) -> Self {
        self.events_capacity = capacity;
        self
    }

    /// Sets the default wait timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Checks the configuration for values the watcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}

/// Apply environment variable overrides to a [`WatcherConfig`].
///
/// Only variables that are set are applied.
pub fn apply_env_overrides(config: &mut WatcherConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary variable lookup.
pub fn apply_overrides_from<F>(config: &mut WatcherConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup(ENV_EVENTS_CAPACITY) {
        config.events_capacity = parse_capacity(&val)?;
    }
    if let Some(val) = lookup(ENV_POLL_TIMEOUT_MS) {
        config.poll_timeout = parse_timeout(&val)?;
    }
    Ok(())
}

fn parse_capacity(val: &str) -> Result<usize, ConfigError> {
    let capacity = val
        .trim()
        .parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue {
            var: ENV_EVENTS_CAPACITY,
            value: val.to_string(),
            reason: "expected unsigned integer",
        })?;
    if capacity == 0 {
        return Err(ConfigError::ZeroCapacity);
    }
    Ok(capacity)
}

fn parse_timeout(val: &str) -> Result<Option<Duration>, ConfigError> {
    let trimmed = val.trim();
    if trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(|ms| Some(Duration::from_millis(ms)))
        .map_err(|_| ConfigError::InvalidValue {
            var: ENV_POLL_TIMEOUT_MS,
            value: val.to_string(),
            reason: "expected milliseconds or \"none\"",
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::init_test_logging;
    use std::collections::HashMap;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        init_test("defaults");
        let config = WatcherConfig::default();
        crate::assert_with_log!(
            config.events_capacity == 1024,
            "capacity",
            1024usize,
            config.events_capacity
        );
        crate::assert_with_log!(
            config.poll_timeout == Some(Duration::from_millis(100)),
            "timeout",
            Some(Duration::from_millis(100)),
            config.poll_timeout
        );
        assert!(config.validate().is_ok());
        crate::test_complete!("defaults");
    }

    #[test]
    fn overrides_apply() {
        init_test("overrides_apply");
        let mut config = WatcherConfig::default();
        apply_overrides_from(
            &mut config,
            lookup(&[(ENV_EVENTS_CAPACITY, " 64 "), (ENV_POLL_TIMEOUT_MS, "0")]),
        )
        .unwrap();
        assert_eq!(config.events_capacity, 64);
        assert_eq!(config.poll_timeout, Some(Duration::ZERO));

        apply_overrides_from(&mut config, lookup(&[(ENV_POLL_TIMEOUT_MS, "None")])).unwrap();
        assert_eq!(config.poll_timeout, None);
        crate::test_complete!("overrides_apply");
    }

    #[test]
    fn unset_variables_leave_values() {
        init_test("unset_variables_leave_values");
        let mut config = WatcherConfig::new().with_events_capacity(7);
        apply_overrides_from(&mut config, lookup(&[])).unwrap();
        assert_eq!(config.events_capacity, 7);
        crate::test_complete!("unset_variables_leave_values");
    }

    #[test]
    fn invalid_values_rejected() {
        init_test("invalid_values_rejected");
        let mut config = WatcherConfig::default();
        let err = apply_overrides_from(&mut config, lookup(&[(ENV_EVENTS_CAPACITY, "lots")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                var: ENV_EVENTS_CAPACITY,
                ..
            }
        ));
        let err =
            apply_overrides_from(&mut config, lookup(&[(ENV_EVENTS_CAPACITY, "0")])).unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
        let err = apply_overrides_from(&mut config, lookup(&[(ENV_POLL_TIMEOUT_MS, "-5")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_POLL_TIMEOUT_MS));
        crate::test_complete!("invalid_values_rejected");
    }

    #[test]
    fn zero_capacity_fails_validation() {
        init_test("zero_capacity_fails_validation");
        let config = WatcherConfig::new().with_events_capacity(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
        crate::test_complete!("zero_capacity_fails_validation");
    }
}
