//! Periodic safety net for the tap aggregator
//!
//! Forces a flush when taps sit unsynchronized longer than the sync
//! interval, and performs the final flush on shutdown.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::aggregator::{FlushOutcome, FlushReason, TapAggregator};

pub struct SyncLifecycle {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
    aggregator: Arc<TapAggregator>,
}

impl SyncLifecycle {
    /// Spawn the safety-net ticker
    pub fn start(aggregator: Arc<TapAggregator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let interval = aggregator.settings().sync_interval();
        let worker = Arc::clone(&aggregator);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "Tap safety net started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = worker.sync_if_stale().await;
                        if outcome != FlushOutcome::Empty {
                            debug!(outcome = ?outcome, "Safety net flushed stale taps");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Tap safety net shutting down");
                        break;
                    }
                }
            }
        });

        Self {
            shutdown_tx,
            handle,
            aggregator,
        }
    }

    /// Stop the ticker, stop accepting taps and flush what is still
    /// pending. Returns once every flush already in flight has completed.
    pub async fn shutdown(self) -> FlushOutcome {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Tap safety net ended abnormally");
        }

        self.aggregator.set_engine_enabled(false);
        let outcome = self.aggregator.flush(FlushReason::Shutdown).await;
        self.aggregator.drain().await;
        info!(outcome = ?outcome, "Final tap flush complete");
        outcome
    }
}
