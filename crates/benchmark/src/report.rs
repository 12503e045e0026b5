//! Per-region accumulators and result reporting.

use crate::merit_stack::LegOutcome;
use boa_core::{SimulationResult, Volume};

/// Running totals for one region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionAccumulator {
    /// Volume accepted (MWh).
    pub accepted_volume: Volume,
    /// Volume dispatched but priced out (MWh).
    pub skipped_volume: Volume,
    /// Settlement periods evaluated.
    pub periods: u32,
    /// Legs where the asset fell outside the dispatched prefix.
    pub not_dispatched: u32,
}

impl RegionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one leg outcome for `volume` MWh.
    pub fn record(&mut self, outcome: LegOutcome, volume: Volume) {
        match outcome {
            LegOutcome::Accepted => self.accepted_volume += volume,
            LegOutcome::Skipped => self.skipped_volume += volume,
            LegOutcome::NotDispatched => self.not_dispatched += 1,
            LegOutcome::NoRequirement => {}
        }
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &RegionAccumulator) {
        self.accepted_volume += other.accepted_volume;
        self.skipped_volume += other.skipped_volume;
        self.periods += other.periods;
        self.not_dispatched += other.not_dispatched;
    }
}

/// Share of evaluated volume that was priced out, in percent.
///
/// Zero when nothing was accepted or skipped.
pub fn skip_rate_percent(accepted: Volume, skipped: Volume) -> f64 {
    let total = accepted + skipped;
    if total > 0.0 {
        (skipped / total) * 100.0
    } else {
        0.0
    }
}

/// Maps region accumulators into results.
#[derive(Debug, Clone, Copy)]
pub struct ResultReporter {
    reference_price: f64,
}

impl ResultReporter {
    /// Create a reporter pricing accepted volume at `reference_price`.
    pub fn new(reference_price: f64) -> Self {
        Self { reference_price }
    }

    /// Final result for one region.
    pub fn report(&self, gsp_group_id: &str, acc: &RegionAccumulator) -> SimulationResult {
        let estimated_revenue = if acc.accepted_volume > 0.0 && self.reference_price.is_finite() {
            acc.accepted_volume * self.reference_price
        } else {
            0.0
        };

        SimulationResult {
            gsp_group_id: gsp_group_id.to_string(),
            accepted_volume_mwh: acc.accepted_volume,
            skipped_volume_mwh: acc.skipped_volume,
            estimated_revenue,
            skip_rate_percent: skip_rate_percent(acc.accepted_volume, acc.skipped_volume),
        }
    }
}
