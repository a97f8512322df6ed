//! Optimistic and authoritative state slices
//!
//! The optimistic counters move on every accepted tap. The server's
//! `AccountState` replaces them wholesale after each successful flush.

use serde::{Deserialize, Serialize};

use bkc_common::AccountState;

/// Resource counters shown to the user between synchronizations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticCounters {
    pub energy: i64,
    pub energy_max: i64,
    pub daily_remaining: i64,
    pub taps_total: i64,
    /// Taps accepted by this client since it started. Not tracked by the server.
    pub session_taps: u64,
}

impl OptimisticCounters {
    /// Whether a tap may be taken from the current energy
    pub fn has_energy(&self) -> bool {
        self.energy > 0
    }

    /// Account for one accepted tap
    pub fn apply_tap(&mut self, energy_cost: i64) {
        self.energy = self.energy.saturating_sub(energy_cost).max(0);
        self.daily_remaining = self.daily_remaining.saturating_sub(1).max(0);
        self.taps_total = self.taps_total.saturating_add(1);
        self.session_taps = self.session_taps.saturating_add(1);
    }
}

/// Replace every server-backed counter with the authoritative snapshot.
/// Last fetch wins; nothing from the optimistic slice is merged back.
pub fn reconcile(local: &OptimisticCounters, authoritative: &AccountState) -> OptimisticCounters {
    OptimisticCounters {
        energy: authoritative.energy,
        energy_max: authoritative.energy_max,
        daily_remaining: authoritative.tap.daily_remaining,
        taps_total: authoritative.taps_total,
        session_taps: local.session_taps,
    }
}
