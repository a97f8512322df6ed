//! BKC client configuration
//!
//! Two kinds of input are combined once at startup:
//! - the TOML file of injected defaults ([`FileConfig`])
//! - explicit overrides supplied by the host (flags or environment, see
//!   [`ExplicitOverrides`])

pub mod address;
mod file;

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use bkc_common::{Category, View};

pub use address::{clamp_int, normalize_base, parse_nodes, same_address, uniq_nodes};
pub use file::{
    FileConfig, NodeDefaults, TapSettings, TransportSettings,
    DEFAULT_SYNC_INTERVAL_MS, MAX_SYNC_INTERVAL_MS, MIN_SYNC_INTERVAL_MS,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Explicit, host-supplied overrides. Raw strings, parsed here.
#[derive(Debug, Clone, Default)]
pub struct ExplicitOverrides {
    /// Single endpoint that replaces every other general pool source
    pub api: Option<String>,
    /// Comma-separated general nodes
    pub nodes: Option<String>,
    /// Comma-separated nodes per category
    pub per_category: BTreeMap<Category, String>,
    /// Origin the client was served from, used by the same-origin heuristic
    pub origin: Option<String>,
    pub tap_sync_ms: Option<String>,
    pub tab: Option<String>,
}

/// All address sources the pool registry is built from
#[derive(Debug, Clone, Default)]
pub struct PoolSources {
    pub explicit_single: Option<String>,
    pub explicit_nodes: Vec<String>,
    pub explicit_per_category: BTreeMap<Category, Vec<String>>,
    pub injected_default: Vec<String>,
    pub injected_per_category: BTreeMap<Category, Vec<String>>,
    pub origin: Option<String>,
}

impl PoolSources {
    pub fn explicit_for(&self, category: Category) -> &[String] {
        self.explicit_per_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn injected_for(&self, category: Category) -> &[String] {
        self.injected_per_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Fully assembled client configuration
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub pools: PoolSources,
    pub tap: TapSettings,
    pub transport: TransportSettings,
    pub initial_view: View,
}

impl ClientConfig {
    /// Load the optional TOML file and apply overrides
    pub fn load(path: Option<&Path>, overrides: ExplicitOverrides) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::assemble(file, overrides))
    }

    pub fn assemble(file: FileConfig, overrides: ExplicitOverrides) -> Self {
        let explicit_single = overrides
            .api
            .as_deref()
            .map(normalize_base)
            .filter(|s| !s.is_empty());

        let explicit_nodes = overrides
            .nodes
            .as_deref()
            .map(parse_nodes)
            .unwrap_or_default();

        let explicit_per_category = overrides
            .per_category
            .iter()
            .map(|(category, raw)| (*category, parse_nodes(raw)))
            .filter(|(_, nodes)| !nodes.is_empty())
            .collect();

        let injected_per_category = Category::ALL
            .into_iter()
            .map(|category| (category, file.nodes.for_category(category).to_vec()))
            .filter(|(_, nodes)| !nodes.is_empty())
            .collect();

        let pools = PoolSources {
            explicit_single,
            explicit_nodes,
            explicit_per_category,
            injected_default: file.nodes.default.clone(),
            injected_per_category,
            origin: overrides.origin.as_deref().map(normalize_base).filter(|s| !s.is_empty()),
        };

        let mut tap = file.tap;
        let sync_ms = match overrides.tap_sync_ms.as_deref() {
            Some(raw) => clamp_int(Some(raw), MIN_SYNC_INTERVAL_MS, MAX_SYNC_INTERVAL_MS, DEFAULT_SYNC_INTERVAL_MS),
            None => (tap.sync_interval_ms as i64).clamp(MIN_SYNC_INTERVAL_MS, MAX_SYNC_INTERVAL_MS),
        };
        tap.sync_interval_ms = sync_ms as u64;
        tap.max_batch = tap.max_batch.max(1);

        let initial_view = overrides.tab.as_deref().map(View::parse).unwrap_or_default();

        debug!(
            sync_interval_ms = tap.sync_interval_ms,
            batch_window_ms = tap.batch_window_ms,
            max_batch = tap.max_batch,
            view = ?initial_view,
            "Assembled client configuration"
        );

        Self {
            pools,
            tap,
            transport: file.transport,
            initial_view,
        }
    }
}
