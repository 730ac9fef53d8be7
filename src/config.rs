//! Configuration types.

use std::num::NonZeroUsize;

use crate::error::ConfigError;

/// Default capacity of the uncaught-failure broadcast channel.
pub const DEFAULT_FAILURE_CAPACITY: usize = 256;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Worker threads in the background pool.
    pub background_workers: usize,
    /// Thread name prefix for background workers.
    pub background_thread_name: String,
    /// Name of the dedicated main-context thread.
    pub main_thread_name: String,
    /// Buffered failure reports per subscriber before lagging.
    pub failure_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            background_workers: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            background_thread_name: "launchpad-background".to_string(),
            main_thread_name: "launchpad-main".to_string(),
            failure_capacity: DEFAULT_FAILURE_CAPACITY,
        }
    }
}

impl DispatcherConfig {
    /// Read overrides from `LAUNCHPAD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("LAUNCHPAD_BACKGROUND_WORKERS") {
            config.background_workers = parse_positive("LAUNCHPAD_BACKGROUND_WORKERS", &raw)?;
        }
        if let Some(name) = lookup("LAUNCHPAD_BACKGROUND_THREAD_NAME") {
            config.background_thread_name = name;
        }
        if let Some(name) = lookup("LAUNCHPAD_MAIN_THREAD_NAME") {
            config.main_thread_name = name;
        }
        if let Some(raw) = lookup("LAUNCHPAD_FAILURE_CAPACITY") {
            config.failure_capacity = parse_positive("LAUNCHPAD_FAILURE_CAPACITY", &raw)?;
        }

        Ok(config)
    }

    /// Set the number of background workers.
    pub fn with_background_workers(mut self, workers: usize) -> Self {
        self.background_workers = workers;
        self
    }

    /// Set the failure channel capacity.
    pub fn with_failure_capacity(mut self, capacity: usize) -> Self {
        self.failure_capacity = capacity;
        self
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a number: {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = DispatcherConfig::from_lookup(|_| None).unwrap();
        assert!(config.background_workers > 0);
        assert_eq!(config.failure_capacity, DEFAULT_FAILURE_CAPACITY);
        assert_eq!(config.main_thread_name, "launchpad-main");
    }

    #[test]
    fn overrides_applied() {
        let config = DispatcherConfig::from_lookup(lookup_from(&[
            ("LAUNCHPAD_BACKGROUND_WORKERS", "3"),
            ("LAUNCHPAD_MAIN_THREAD_NAME", "ui"),
            ("LAUNCHPAD_FAILURE_CAPACITY", " 16 "),
        ]))
        .unwrap();
        assert_eq!(config.background_workers, 3);
        assert_eq!(config.main_thread_name, "ui");
        assert_eq!(config.failure_capacity, 16);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[(
            "LAUNCHPAD_BACKGROUND_WORKERS",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "LAUNCHPAD_BACKGROUND_WORKERS"
        ));
    }

    #[test]
    fn garbage_capacity_rejected() {
        let err = DispatcherConfig::from_lookup(lookup_from(&[(
            "LAUNCHPAD_FAILURE_CAPACITY",
            "lots",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("lots"));
    }
}
