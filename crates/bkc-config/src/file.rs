//! TOML configuration file
//!
//! Carries the injected per-category default node lists plus tuning knobs
//! for the tap aggregator and the HTTP transport. Every section is optional.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use bkc_common::Category;
use crate::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub nodes: NodeDefaults,
    pub tap: TapSettings,
    pub transport: TransportSettings,
}

impl FileConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }
}

/// Injected default node lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefaults {
    /// Defaults for the general fallback pool
    pub default: Vec<String>,
    pub full: Vec<String>,
    pub tap: Vec<String>,
    pub market: Vec<String>,
    pub bank: Vec<String>,
    pub admin: Vec<String>,
}

impl NodeDefaults {
    pub fn for_category(&self, category: Category) -> &[String] {
        match category {
            Category::General => &self.full,
            Category::HighFrequency => &self.tap,
            Category::Marketplace => &self.market,
            Category::Ledger => &self.bank,
            Category::Administrative => &self.admin,
        }
    }
}

pub const MIN_SYNC_INTERVAL_MS: i64 = 200;
pub const MAX_SYNC_INTERVAL_MS: i64 = 10_000;
pub const DEFAULT_SYNC_INTERVAL_MS: i64 = 650;

/// Tap aggregator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapSettings {
    /// Debounce window measured from the first tap of a batch
    pub batch_window_ms: u64,
    /// Pending batch size that forces an immediate flush
    pub max_batch: usize,
    /// Safety-net interval for forced synchronization
    pub sync_interval_ms: u64,
    /// Energy consumed locally by a single tap
    pub energy_per_tap: i64,
}

impl Default for TapSettings {
    fn default() -> Self {
        Self {
            batch_window_ms: 90,
            max_batch: 500,
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS as u64,
            energy_per_tap: 1,
        }
    }
}

impl TapSettings {
    pub fn batch_window(&self) -> Duration {
        Duration::from_millis(self.batch_window_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl TransportSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
