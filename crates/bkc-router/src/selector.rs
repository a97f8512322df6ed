//! Node selector
//!
//! Resolves the sticky node of a category and rotates it round-robin when
//! a call fails. Each category keeps its own affinity entry.

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use bkc_common::{Category, IdentityHint};
use crate::affinity::{affinity_key, AffinityStore};
use crate::registry::PoolRegistry;

pub struct NodeSelector {
    registry: Arc<PoolRegistry>,
    store: Arc<dyn AffinityStore>,
    hint: Option<IdentityHint>,
}

impl NodeSelector {
    pub fn new(
        registry: Arc<PoolRegistry>,
        store: Arc<dyn AffinityStore>,
        hint: Option<IdentityHint>,
    ) -> Self {
        Self { registry, store, hint }
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn pool_size(&self, category: Category) -> usize {
        self.registry.pool_size(category)
    }

    /// Sticky node for `category`. A stored node that left the pool is
    /// replaced by a fresh pick (hint mod N, or uniform random without a
    /// hint). Returns `None` only for an empty pool.
    pub fn resolve(&self, category: Category) -> Option<String> {
        let key = affinity_key(category);

        if let Some(stored) = self.store.get(&key) {
            if let Some(member) = self.registry.member(category, &stored) {
                return Some(member.to_string());
            }
            debug!(category = %category, stored = %stored, "Stored node no longer in pool");
        }

        let pool = self.registry.pool(category);
        if pool.is_empty() {
            return None;
        }

        let index = match self.hint {
            Some(hint) => (hint.value() % pool.len() as u64) as usize,
            None => rand::thread_rng().gen_range(0..pool.len()),
        };
        let chosen = pool[index].clone();
        self.store.set(&key, &chosen);

        debug!(
            category = %category,
            address = %chosen,
            index,
            deterministic = self.hint.is_some(),
            "Selected sticky node"
        );
        Some(chosen)
    }

    /// Move `category` to the node after `current` (wrapping). Single-node
    /// pools are left untouched; an unknown `current` moves to the first node.
    pub fn rotate(&self, category: Category, current: &str) -> String {
        let pool = self.registry.pool(category);
        if pool.len() <= 1 {
            return current.to_string();
        }

        let next_index = match self.registry.position(category, current) {
            Some(index) => (index + 1) % pool.len(),
            None => 0,
        };
        let next = pool[next_index].clone();
        self.store.set(&affinity_key(category), &next);

        info!(category = %category, from = %current, to = %next, "Rotated to next node");
        next
    }
}
