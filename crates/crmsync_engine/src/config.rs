//! Configuration for the sync engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Semaphore size used when no usable concurrency bound is configured.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Largest accepted concurrency bound.
pub const MAX_CONCURRENCY: usize = 10;

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`SyncConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Configuration for a sync runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on concurrent pull units. See
    /// [`effective_concurrency`](Self::effective_concurrency).
    pub max_concurrent_requests: Option<i64>,
    /// Recorded as the initiator of sync history entries.
    pub initiator: String,
    /// Worker pool size of each bus subscription.
    pub listener_workers: usize,
    /// Number of history entries returned when no limit is given.
    pub history_limit: usize,
    /// Disables the log listener.
    pub quiet: bool,
}

impl SyncConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self {
            max_concurrent_requests: None,
            initiator: "manual".to_string(),
            listener_workers: crmsync_events::DEFAULT_LISTENER_WORKERS,
            history_limit: 20,
            quiet: false,
        }
    }

    /// Parses a JSON configuration. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Sets the concurrency bound.
    pub fn with_max_concurrent_requests(mut self, max: i64) -> Self {
        self.max_concurrent_requests = Some(max);
        self
    }

    /// Sets the history initiator.
    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = initiator.into();
        self
    }

    /// Sets the per-subscription worker pool size.
    pub fn with_listener_workers(mut self, workers: usize) -> Self {
        self.listener_workers = workers;
        self
    }

    /// Sets the default history listing size.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Enables or disables quiet mode.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Returns the semaphore size for bounded pulls.
    ///
    /// Values in `1..=MAX_CONCURRENCY` are used as-is; anything else,
    /// including no value, yields [`DEFAULT_CONCURRENCY`]. Never zero.
    pub fn effective_concurrency(&self) -> usize {
        match self.max_concurrent_requests {
            Some(n) if (1..=MAX_CONCURRENCY as i64).contains(&n) => n as usize,
            _ => DEFAULT_CONCURRENCY,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    #[test]
    fn concurrency_bounds() {
        let config = SyncConfig::default();
        assert_eq!(config.effective_concurrency(), DEFAULT_CONCURRENCY);

        for (value, expected) in [(1, 1), (7, 7), (10, 10), (0, 5), (-3, 5), (11, 5)] {
            let config = SyncConfig::new().with_max_concurrent_requests(value);
            assert_eq!(config.effective_concurrency(), expected, "value {value}");
        }
    }

    #[test]
    fn json_defaults_missing_keys() {
        let config = SyncConfig::from_json(r#"{"max_concurrent_requests": 3}"#).unwrap();
        assert_eq!(config.effective_concurrency(), 3);
        assert_eq!(config.initiator, "manual");
        assert_eq!(config.history_limit, 20);
        assert!(!config.quiet);

        assert!(SyncConfig::from_json("{not json").is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"initiator": "scheduler", "quiet": true}}"#).unwrap();

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.initiator, "scheduler");
        assert!(config.quiet);

        let err = SyncConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    proptest! {
        #[test]
        fn effective_concurrency_is_never_zero(value in any::<Option<i64>>()) {
            let config = SyncConfig {
                max_concurrent_requests: value,
                ..SyncConfig::new()
            };
            let effective = config.effective_concurrency();
            prop_assert!((1..=MAX_CONCURRENCY).contains(&effective));
        }
    }
}
