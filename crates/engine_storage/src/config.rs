//! Storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Environment variable overriding [`StorageConfig::backup_dir`].
pub const BACKUP_DIR_ENV: &str = "ENGINE_BACKUP_DIR";

/// Environment variable overriding [`StorageConfig::max_backups`].
pub const MAX_BACKUPS_ENV: &str = "ENGINE_MAX_BACKUPS";

/// Configuration for a [`Storage`](crate::Storage) context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory snapshot files are written to and listed from.
    pub backup_dir: PathBuf,
    /// How many snapshots [`Storage::prune_backups`](crate::Storage::prune_backups)
    /// keeps when called with this config's limit. `None` keeps everything.
    pub max_backups: Option<usize>,
    /// Operations slower than this are logged at `debug`.
    pub slow_op_threshold: Duration,
    /// Thresholds used by the health report.
    pub health: HealthThresholds,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("backups"),
            max_backups: None,
            slow_op_threshold: Duration::from_millis(1),
            health: HealthThresholds::default(),
        }
    }
}

impl StorageConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration with `ENGINE_BACKUP_DIR` / `ENGINE_MAX_BACKUPS`
    /// applied. Unparseable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(BACKUP_DIR_ENV) {
            config.backup_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(MAX_BACKUPS_ENV) {
            match raw.parse::<usize>() {
                Ok(n) => config.max_backups = Some(n),
                Err(e) => warn!(value = %raw, error = %e, "ignoring invalid ENGINE_MAX_BACKUPS"),
            }
        }
        config
    }

    /// Override the backup directory.
    #[must_use]
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Limit the number of retained snapshots.
    #[must_use]
    pub fn with_max_backups(mut self, max: usize) -> Self {
        self.max_backups = Some(max);
        self
    }

    /// Override the slow-operation logging threshold.
    #[must_use]
    pub fn with_slow_op_threshold(mut self, threshold: Duration) -> Self {
        self.slow_op_threshold = threshold;
        self
    }

    /// Override the health thresholds.
    #[must_use]
    pub fn with_health(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }
}

/// Limits the health report compares storage statistics against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    /// Error rates are ignored until at least this many operations ran.
    pub min_samples: u64,
    /// Error rate (0.0–1.0) at which health becomes degraded.
    pub degraded_error_rate: f64,
    /// Error rate (0.0–1.0) at which health becomes critical.
    pub critical_error_rate: f64,
    /// Average latency of any per-tick operation above which health is degraded.
    pub degraded_avg_latency: Duration,
    /// Ratio between the largest and smallest non-empty table above which
    /// the store counts as skewed.
    pub skew_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            min_samples: 100,
            degraded_error_rate: 0.05,
            critical_error_rate: 0.25,
            degraded_avg_latency: Duration::from_micros(500),
            skew_ratio: 1000.0,
        }
    }
}
