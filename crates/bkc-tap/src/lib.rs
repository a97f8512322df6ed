//! BKC Tap Engine
//!
//! High-frequency tap handling on top of the request router:
//! - TapAggregator: batches taps and flushes them as single calls
//! - OptimisticCounters / reconcile: local counters and their overwrite
//! - TapBackend: the two calls a flush needs
//! - SyncLifecycle: periodic safety-net flush and shutdown flush

pub mod error;
pub mod state;
pub mod backend;
pub mod aggregator;
pub mod lifecycle;

#[cfg(test)]
mod testing;

pub use error::TapError;
pub use state::{reconcile, OptimisticCounters};
pub use backend::TapBackend;
pub use aggregator::{FlushOutcome, FlushReason, Phase, RejectReason, TapAggregator, TapOutcome};
pub use lifecycle::SyncLifecycle;

pub type Result<T> = std::result::Result<T, TapError>;
