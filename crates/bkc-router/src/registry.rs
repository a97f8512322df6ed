//! Pool registry
//!
//! Built once at startup. Each category pool is the ordered, deduplicated
//! union of its explicit nodes, its injected defaults and the general
//! fallback pool. The fallback pool itself takes the first non-empty source.

use std::collections::BTreeMap;

use reqwest::Url;
use tracing::info;

use bkc_common::Category;
use bkc_config::{normalize_base, same_address, uniq_nodes, PoolSources};

/// Used when no source names a node and the client runs locally
pub const LOCAL_FALLBACK_ADDRESS: &str = "http://127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct PoolRegistry {
    fallback: Vec<String>,
    pools: BTreeMap<Category, Vec<String>>,
}

impl PoolRegistry {
    pub fn build(sources: &PoolSources) -> Self {
        let fallback = Self::fallback_pool(sources);

        let pools: BTreeMap<Category, Vec<String>> = Category::ALL
            .into_iter()
            .map(|category| {
                let pool = uniq_nodes([
                    sources.explicit_for(category),
                    sources.injected_for(category),
                    fallback.as_slice(),
                ]);
                (category, pool)
            })
            .collect();

        for (category, pool) in &pools {
            info!(category = %category, nodes = ?pool, "Pool registered");
        }

        Self { fallback, pools }
    }

    /// Explicit single override, explicit node list, injected defaults, then
    /// the same-origin heuristic. First non-empty source wins.
    fn fallback_pool(sources: &PoolSources) -> Vec<String> {
        if let Some(single) = sources.explicit_single.as_deref() {
            let single = normalize_base(single);
            if !single.is_empty() {
                return vec![single];
            }
        }

        let explicit = uniq_nodes([sources.explicit_nodes.as_slice()]);
        if !explicit.is_empty() {
            return explicit;
        }

        let injected = uniq_nodes([sources.injected_default.as_slice()]);
        if !injected.is_empty() {
            return injected;
        }

        vec![same_origin_address(sources.origin.as_deref())]
    }

    /// Pool serving `category`; an empty category pool defers to the fallback pool
    pub fn pool(&self, category: Category) -> &[String] {
        match self.pools.get(&category) {
            Some(pool) if !pool.is_empty() => pool,
            _ => &self.fallback,
        }
    }

    pub fn fallback(&self) -> &[String] {
        &self.fallback
    }

    pub fn pool_size(&self, category: Category) -> usize {
        self.pool(category).len()
    }

    /// Pool entry matching `address`, in the pool's own spelling
    pub fn member(&self, category: Category, address: &str) -> Option<&str> {
        self.pool(category)
            .iter()
            .find(|node| same_address(node, address))
            .map(String::as_str)
    }

    pub fn position(&self, category: Category, address: &str) -> Option<usize> {
        self.pool(category).iter().position(|node| same_address(node, address))
    }
}

/// Local hosts talk to the default dev port; anything else calls back to its origin
fn same_origin_address(origin: Option<&str>) -> String {
    let Some(origin) = origin.map(normalize_base).filter(|o| !o.is_empty()) else {
        return LOCAL_FALLBACK_ADDRESS.to_string();
    };

    let host = Url::parse(&origin)
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_ascii_lowercase()));

    match host.as_deref() {
        Some("localhost") | Some("127.0.0.1") => LOCAL_FALLBACK_ADDRESS.to_string(),
        _ => origin,
    }
}
