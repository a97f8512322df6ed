//! Tap aggregator
//!
//! Collects taps into a pending batch and turns each batch into a single
//! `tap` call. A batch is flushed when whichever comes first:
//! - the debounce window, measured from the batch's first tap, elapses
//! - the batch reaches the size cap
//! - the periodic safety net finds the last synchronization stale
//!
//! Taps are accepted synchronously and move the optimistic counters at once.
//! Every successful flush is followed by an authoritative state fetch that
//! overwrites those counters.
//!
//! Timer-driven flushes are spawned on the ambient tokio runtime. Outside a
//! runtime taps are still accepted but stay pending until the next explicit
//! [`TapAggregator::flush`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use bkc_common::{AccountState, FeedbackHub, Notification};
use bkc_config::TapSettings;
use crate::backend::TapBackend;
use crate::error::TapError;
use crate::state::{reconcile, OptimisticCounters};

/// What triggered a flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Debounce window elapsed
    Debounce,
    /// Pending batch reached the size cap
    SizeCap,
    /// Safety-net timer found the last sync stale
    Periodic,
    /// Flush requested by the host
    Manual,
    /// Final flush on shutdown
    Shutdown,
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Debounce => "debounce",
            FlushReason::SizeCap => "size_cap",
            FlushReason::Periodic => "periodic",
            FlushReason::Manual => "manual",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Collecting,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EngineDisabled,
    NoEnergy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOutcome {
    /// Tap recorded; `pending` is the batch size after this tap (0 if it
    /// triggered a size-cap flush)
    Accepted { pending: usize },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing to send
    Empty,
    /// Taps accepted and local counters reconciled
    Synced { count: u64 },
    /// Taps accepted but the follow-up state fetch failed
    Unreconciled { count: u64, error: TapError },
    /// Tap call failed; the batch is dropped
    Failed { count: u64, error: TapError },
}

impl FlushOutcome {
    fn label(&self) -> &'static str {
        match self {
            FlushOutcome::Empty => "empty",
            FlushOutcome::Synced { .. } => "synced",
            FlushOutcome::Unreconciled { .. } => "unreconciled",
            FlushOutcome::Failed { .. } => "failed",
        }
    }
}

struct Collector {
    batch: Vec<DateTime<Utc>>,
    counters: OptimisticCounters,
    engine_enabled: bool,
    /// Bumped whenever a batch is taken; a debounce timer armed for an
    /// older generation does nothing
    generation: u64,
    in_flight: usize,
    last_sync: Option<Instant>,
}

pub struct TapAggregator {
    backend: Arc<dyn TapBackend>,
    settings: TapSettings,
    feedback: FeedbackHub,
    collector: Mutex<Collector>,
    /// Serializes network calls; taken after the batch is cleared
    flush_lock: tokio::sync::Mutex<()>,
    /// Signalled when the last in-flight flush is released
    drained: Notify,
}

/// One in-flight flush. Dropping it, on completion or when the flush future
/// is abandoned part-way, releases the in-flight slot and records the
/// outcome.
struct InFlight<'a> {
    aggregator: &'a TapAggregator,
    reason: FlushReason,
    outcome: Option<&'static str>,
}

impl InFlight<'_> {
    fn finish(&mut self, outcome: &FlushOutcome) {
        self.outcome = Some(outcome.label());
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let idle = {
            let mut collector = self.aggregator.collector.lock();
            collector.in_flight = collector.in_flight.saturating_sub(1);
            collector.in_flight == 0
        };
        if idle {
            self.aggregator.drained.notify_waiters();
        }

        let outcome = match self.outcome {
            Some(label) => label,
            None => {
                warn!(reason = self.reason.as_str(), "Tap flush abandoned, batch dropped");
                "cancelled"
            }
        };
        metrics::counter!(
            "bkc_tap_flushes_total",
            "reason" => self.reason.as_str(),
            "outcome" => outcome
        )
        .increment(1);
    }
}

impl TapAggregator {
    pub fn new(backend: Arc<dyn TapBackend>, settings: TapSettings, feedback: FeedbackHub) -> Self {
        Self {
            backend,
            settings,
            feedback,
            collector: Mutex::new(Collector {
                batch: Vec::new(),
                counters: OptimisticCounters::default(),
                engine_enabled: false,
                generation: 0,
                in_flight: 0,
                last_sync: None,
            }),
            flush_lock: tokio::sync::Mutex::new(()),
            drained: Notify::new(),
        }
    }

    pub fn settings(&self) -> &TapSettings {
        &self.settings
    }

    pub fn set_engine_enabled(&self, enabled: bool) {
        self.collector.lock().engine_enabled = enabled;
        info!(enabled, "Tap engine toggled");
    }

    pub fn engine_enabled(&self) -> bool {
        self.collector.lock().engine_enabled
    }

    pub fn counters(&self) -> OptimisticCounters {
        self.collector.lock().counters.clone()
    }

    pub fn pending(&self) -> usize {
        self.collector.lock().batch.len()
    }

    pub fn last_sync(&self) -> Option<Instant> {
        self.collector.lock().last_sync
    }

    pub fn phase(&self) -> Phase {
        let collector = self.collector.lock();
        if collector.in_flight > 0 {
            Phase::Flushing
        } else if !collector.batch.is_empty() {
            Phase::Collecting
        } else {
            Phase::Idle
        }
    }

    /// Overwrite the local counters with an authoritative snapshot
    pub fn reconcile_with(&self, state: &AccountState) {
        let mut collector = self.collector.lock();
        collector.counters = reconcile(&collector.counters, state);
    }

    /// Record one tap. Never blocks on the network.
    pub fn tap(self: &Arc<Self>) -> TapOutcome {
        let runtime = Handle::try_current().ok();
        let mut collector = self.collector.lock();

        if !collector.engine_enabled {
            return Self::reject(RejectReason::EngineDisabled);
        }
        if !collector.counters.has_energy() {
            return Self::reject(RejectReason::NoEnergy);
        }

        collector.batch.push(Utc::now());
        collector.counters.apply_tap(self.settings.energy_per_tap);
        let pending = collector.batch.len();

        let Some(runtime) = runtime else {
            debug!(pending, "No runtime, batch left for the next flush");
            return TapOutcome::Accepted { pending };
        };

        if pending >= self.settings.max_batch {
            let taken = Self::take_batch(&mut collector);
            drop(collector);
            if let Some(count) = taken {
                let this = Arc::clone(self);
                runtime.spawn(async move {
                    this.dispatch(count, FlushReason::SizeCap).await;
                });
            }
            return TapOutcome::Accepted { pending: 0 };
        }

        if pending == 1 {
            let generation = collector.generation;
            drop(collector);
            self.arm_debounce(&runtime, generation);
        }

        TapOutcome::Accepted { pending }
    }

    /// Flush whatever is pending now
    pub async fn flush(&self, reason: FlushReason) -> FlushOutcome {
        let taken = Self::take_batch(&mut self.collector.lock());
        match taken {
            Some(count) => self.dispatch(count, reason).await,
            None => FlushOutcome::Empty,
        }
    }

    /// Safety-net check: flush when no flush is in flight and the last
    /// successful synchronization is older than the sync interval
    pub async fn sync_if_stale(&self) -> FlushOutcome {
        let due = {
            let collector = self.collector.lock();
            collector.in_flight == 0
                && collector
                    .last_sync
                    .map_or(true, |at| at.elapsed() > self.settings.sync_interval())
        };

        if !due {
            return FlushOutcome::Empty;
        }
        self.flush(FlushReason::Periodic).await
    }

    /// Wait until no flush is in flight, spawned size-cap and debounce
    /// flushes included
    pub async fn drain(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.collector.lock().in_flight == 0 {
                return;
            }
            drained.await;
        }
    }

    fn reject(reason: RejectReason) -> TapOutcome {
        debug!(reason = ?reason, "Tap rejected");
        metrics::counter!("bkc_taps_rejected_total").increment(1);
        TapOutcome::Rejected(reason)
    }

    fn arm_debounce(self: &Arc<Self>, runtime: &Handle, generation: u64) {
        let this = Arc::clone(self);
        let window = self.settings.batch_window();

        runtime.spawn(async move {
            tokio::time::sleep(window).await;

            let taken = {
                let mut collector = this.collector.lock();
                if collector.generation != generation {
                    return;
                }
                Self::take_batch(&mut collector)
            };

            if let Some(count) = taken {
                this.dispatch(count, FlushReason::Debounce).await;
            }
        });
    }

    /// Clear the pending batch atomically and mark a flush in flight. The
    /// caller must hand the count to [`Self::dispatch`], which releases the
    /// in-flight slot.
    fn take_batch(collector: &mut Collector) -> Option<u64> {
        if collector.batch.is_empty() {
            return None;
        }

        let batch = std::mem::take(&mut collector.batch);
        collector.generation = collector.generation.wrapping_add(1);
        collector.in_flight += 1;

        let span_ms = match (batch.first(), batch.last()) {
            (Some(first), Some(last)) => (*last - *first).num_milliseconds(),
            _ => 0,
        };
        debug!(count = batch.len(), span_ms, "Batch taken for flush");

        Some(batch.len() as u64)
    }

    async fn dispatch(&self, count: u64, reason: FlushReason) -> FlushOutcome {
        let mut in_flight = InFlight {
            aggregator: self,
            reason,
            outcome: None,
        };
        let _serial = self.flush_lock.lock().await;
        debug!(count, reason = reason.as_str(), "Flushing taps");

        let outcome = match self.backend.submit_taps(count).await {
            Err(error) => {
                error!(count, reason = reason.as_str(), error = %error, "Tap flush failed, batch dropped");
                self.feedback.notify(Notification::bad(error.to_string()));
                FlushOutcome::Failed { count, error }
            }
            Ok(()) => {
                self.collector.lock().last_sync = Some(Instant::now());

                match self.backend.fetch_state().await {
                    Ok(state) => {
                        self.reconcile_with(&state);
                        self.feedback.publish_state(state);
                        debug!(count, reason = reason.as_str(), "Taps synchronized");
                        FlushOutcome::Synced { count }
                    }
                    Err(error) => {
                        warn!(count, error = %error, "Taps accepted but state refresh failed");
                        self.feedback.notify(Notification::bad(error.to_string()));
                        FlushOutcome::Unreconciled { count, error }
                    }
                }
            }
        };

        in_flight.finish(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use bkc_common::{Severity, TapQuota};
    use bkc_router::RouterError;
    use crate::testing::FakeBackend;

    fn settings() -> TapSettings {
        TapSettings::default()
    }

    fn server_state(energy: i64) -> AccountState {
        AccountState {
            energy,
            energy_max: 10_000,
            taps_total: 777,
            tap: TapQuota { daily_limit: 5_000, daily_remaining: 4_000, ..Default::default() },
            ..Default::default()
        }
    }

    fn aggregator(settings: TapSettings, energy: i64) -> (Arc<TapAggregator>, Arc<FakeBackend>, FeedbackHub) {
        let backend = Arc::new(FakeBackend::new(server_state(10_000)));
        let hub = FeedbackHub::new();
        let aggregator = Arc::new(TapAggregator::new(backend.clone(), settings, hub.clone()));
        aggregator.reconcile_with(&server_state(energy));
        aggregator.set_engine_enabled(true);
        (aggregator, backend, hub)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_batch_flushes_once_at_cap() {
        let (aggregator, backend, _) = aggregator(settings(), 10_000);

        for expected in 1..500 {
            assert_eq!(aggregator.tap(), TapOutcome::Accepted { pending: expected });
        }
        assert_eq!(aggregator.tap(), TapOutcome::Accepted { pending: 0 });
        assert_eq!(aggregator.pending(), 0);

        advance(500).await;
        assert_eq!(backend.submitted(), vec![500]);
        assert_eq!(backend.fetches(), 1);
        assert_eq!(aggregator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_tap_flushes_after_window() {
        let (aggregator, backend, _) = aggregator(settings(), 100);

        aggregator.tap();
        assert_eq!(aggregator.phase(), Phase::Collecting);

        advance(89).await;
        assert!(backend.submitted().is_empty());

        advance(2).await;
        assert_eq!(backend.submitted(), vec![1]);
        assert_eq!(aggregator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_taps_within_window_coalesce() {
        let (aggregator, backend, _) = aggregator(settings(), 100);

        for _ in 0..7 {
            aggregator.tap();
            advance(10).await;
        }

        advance(200).await;
        assert_eq!(backend.submitted(), vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_splits_and_preserves_total() {
        let (aggregator, backend, _) = aggregator(settings(), 10_000);

        for _ in 0..1_200 {
            aggregator.tap();
        }

        advance(200).await;
        let submitted = backend.submitted();
        assert!(submitted.len() >= 2);
        assert_eq!(submitted.iter().sum::<u64>(), 1_200);
        assert!(submitted.iter().all(|count| *count <= 500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_engine_rejects_without_network() {
        let (aggregator, backend, _) = aggregator(settings(), 100);
        aggregator.set_engine_enabled(false);

        assert_eq!(aggregator.tap(), TapOutcome::Rejected(RejectReason::EngineDisabled));
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(aggregator.counters().energy, 100);

        advance(1_000).await;
        assert!(backend.submitted().is_empty());
        assert_eq!(backend.fetches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_energy_exhaustion_rejects() {
        let (aggregator, backend, _) = aggregator(settings(), 3);

        for _ in 0..3 {
            assert!(matches!(aggregator.tap(), TapOutcome::Accepted { .. }));
        }
        assert_eq!(aggregator.tap(), TapOutcome::Rejected(RejectReason::NoEnergy));
        assert_eq!(aggregator.counters().energy, 0);

        advance(100).await;
        assert_eq!(backend.submitted(), vec![3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_flush_reconciles_counters() {
        let (aggregator, backend, hub) = aggregator(settings(), 100);
        backend.set_state(AccountState {
            energy: 77,
            energy_max: 500,
            taps_total: 12_345,
            tap: TapQuota { daily_remaining: 300, ..Default::default() },
            ..Default::default()
        });

        for _ in 0..5 {
            aggregator.tap();
        }
        assert_eq!(aggregator.counters().energy, 95);
        assert!(aggregator.last_sync().is_none());

        advance(100).await;
        assert_eq!(
            aggregator.counters(),
            OptimisticCounters {
                energy: 77,
                energy_max: 500,
                daily_remaining: 300,
                taps_total: 12_345,
                session_taps: 5,
            }
        );
        assert!(aggregator.last_sync().is_some());
        assert_eq!(hub.latest_state().map(|s| s.energy), Some(77));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_flush_drops_batch_and_notifies() {
        let (aggregator, backend, hub) = aggregator(settings(), 100);
        let mut notifications = hub.subscribe_notifications();
        backend.fail_submits(RouterError::Transport("connection refused".into()));

        aggregator.tap();
        aggregator.tap();
        advance(100).await;

        let notification = notifications.try_recv().unwrap();
        assert_eq!(notification.severity, Severity::Bad);
        assert!(notification.message.contains("connection refused"));
        assert_eq!(aggregator.pending(), 0);
        assert_eq!(aggregator.phase(), Phase::Idle);
        assert_eq!(backend.fetches(), 0);
        assert!(aggregator.last_sync().is_none());

        backend.recover();
        aggregator.tap();
        advance(100).await;
        assert_eq!(backend.submitted(), vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_refresh_failure_keeps_optimistic_counters() {
        let (aggregator, backend, _) = aggregator(settings(), 100);
        backend.fail_fetches(RouterError::Protocol { status: Some(503), message: "busy".into() });

        aggregator.tap();
        let outcome = aggregator.flush(FlushReason::Manual).await;

        assert!(matches!(outcome, FlushOutcome::Unreconciled { count: 1, .. }));
        assert_eq!(aggregator.counters().energy, 99);
        assert!(aggregator.last_sync().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_flush_and_stale_timer() {
        let (aggregator, backend, _) = aggregator(settings(), 100);

        assert_eq!(aggregator.flush(FlushReason::Manual).await, FlushOutcome::Empty);

        aggregator.tap();
        aggregator.tap();
        assert_eq!(aggregator.flush(FlushReason::Manual).await, FlushOutcome::Synced { count: 2 });

        // The timer armed by the first tap must not fire a second flush
        advance(200).await;
        assert_eq!(backend.submitted(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_if_stale_respects_interval() {
        let (aggregator, backend, _) = aggregator(settings(), 100);

        aggregator.tap();
        aggregator.flush(FlushReason::Manual).await;

        aggregator.tap();
        assert_eq!(aggregator.sync_if_stale().await, FlushOutcome::Empty);
        assert_eq!(aggregator.pending(), 1);

        // Past the debounce window too, so only check the call count
        advance(700).await;
        assert_eq!(backend.submitted(), vec![1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_flush_returns_to_idle() {
        let (aggregator, backend, _) = aggregator(settings(), 100);
        backend.slow_submits(Duration::from_millis(300));

        aggregator.tap();
        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), aggregator.flush(FlushReason::Manual)).await;
        assert!(abandoned.is_err());
        assert_eq!(aggregator.phase(), Phase::Idle);
        assert!(backend.submitted().is_empty());

        backend.slow_submits(Duration::ZERO);
        aggregator.tap();
        assert_eq!(aggregator.sync_if_stale().await, FlushOutcome::Synced { count: 1 });
        assert_eq!(backend.submitted(), vec![1]);
        assert_eq!(aggregator.phase(), Phase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_waits_for_spawned_flush() {
        let (aggregator, backend, _) = aggregator(TapSettings { max_batch: 3, ..settings() }, 100);
        backend.slow_submits(Duration::from_millis(300));

        for _ in 0..3 {
            aggregator.tap();
        }
        assert_eq!(aggregator.phase(), Phase::Flushing);

        aggregator.drain().await;
        assert_eq!(backend.submitted(), vec![3]);
        assert_eq!(aggregator.phase(), Phase::Idle);
    }

    #[test]
    fn test_tap_outside_runtime_stays_pending() {
        let backend = Arc::new(FakeBackend::new(server_state(100)));
        let aggregator = Arc::new(TapAggregator::new(
            backend.clone(),
            TapSettings { max_batch: 2, ..settings() },
            FeedbackHub::new(),
        ));
        aggregator.reconcile_with(&server_state(100));
        aggregator.set_engine_enabled(true);

        for expected in 1..=3 {
            assert_eq!(aggregator.tap(), TapOutcome::Accepted { pending: expected });
        }
        assert_eq!(aggregator.phase(), Phase::Collecting);
        assert!(backend.submitted().is_empty());

        let outcome = tokio_test::block_on(aggregator.flush(FlushReason::Manual));
        assert_eq!(outcome, FlushOutcome::Synced { count: 3 });
        assert_eq!(backend.submitted(), vec![3]);
    }

    #[test]
    fn test_flush_reason_labels() {
        assert_eq!(FlushReason::SizeCap.as_str(), "size_cap");
        assert_eq!(FlushReason::Periodic.as_str(), "periodic");
    }
}
