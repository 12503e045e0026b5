//! Merit-order stack for one leg of one settlement period.
//!
//! Models whether a hypothetical asset would have been dispatched and
//! cleared alongside the historical acceptances of a period.

use boa_core::{AcceptanceRecord, Price, Volume};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Market side evaluated by a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Leg {
    /// Generation increase, cheapest first.
    Offer,
    /// Demand increase, most valuable first.
    Bid,
}

impl Leg {
    /// Whether the record belongs on this leg's stack.
    #[inline]
    pub fn includes(self, record: &AcceptanceRecord) -> bool {
        match self {
            Leg::Offer => record.is_offer(),
            Leg::Bid => record.is_bid(),
        }
    }

    /// Whether an asset priced at `asset_price` clears against `marginal`.
    #[inline]
    pub fn clears(self, asset_price: f64, marginal: f64) -> bool {
        match self {
            Leg::Offer => asset_price <= marginal,
            Leg::Bid => asset_price >= marginal,
        }
    }
}

/// One entry in a merit-order stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeritStackEntry {
    pub price: Price,
    /// Magnitude of the accepted volume (always positive).
    pub volume: Volume,
    pub system_operator_flag: bool,
    /// The asset being benchmarked rather than a historical acceptance.
    pub is_hypothetical: bool,
}

/// Outcome of evaluating the asset on one leg of one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// No volume was required on this leg.
    NoRequirement,
    /// The asset fell outside the dispatched prefix.
    NotDispatched,
    /// Dispatched and priced within the marginal price (or no commercial comparator).
    Accepted,
    /// Dispatched but priced out by the marginal price.
    Skipped,
}

/// Sorted merit-order stack with the asset appended.
#[derive(Debug, Clone)]
pub struct MeritStack {
    leg: Leg,
    requirement: Volume,
    asset_price: f64,
    entries: Vec<MeritStackEntry>,
}

impl MeritStack {
    /// Build the stack from a period's records.
    ///
    /// Returns `None` when the leg has no volume requirement.
    pub fn build<'a>(
        leg: Leg,
        records: impl IntoIterator<Item = &'a AcceptanceRecord>,
        asset_price: f64,
        asset_volume: Volume,
    ) -> Option<Self> {
        let mut entries: Vec<MeritStackEntry> = records
            .into_iter()
            .filter(|r| leg.includes(r))
            .map(|r| MeritStackEntry {
                price: OrderedFloat(r.accepted_price),
                volume: r.total_volume_accepted.abs(),
                system_operator_flag: r.system_operator_flag,
                is_hypothetical: false,
            })
            .collect();

        let requirement: Volume = entries.iter().map(|e| e.volume).sum();
        if requirement <= 0.0 {
            return None;
        }

        // Appended last so equal-priced historical acceptances stay ahead of it
        entries.push(MeritStackEntry {
            price: OrderedFloat(asset_price),
            volume: asset_volume,
            system_operator_flag: false,
            is_hypothetical: true,
        });

        // Stable sorts
        match leg {
            Leg::Offer => entries.sort_by_key(|e| e.price),
            Leg::Bid => entries.sort_by_key(|e| Reverse(e.price)),
        }

        Some(Self {
            leg,
            requirement,
            asset_price,
            entries,
        })
    }

    /// Total historical volume on this leg.
    pub fn requirement(&self) -> Volume {
        self.requirement
    }

    /// Entries in merit order.
    pub fn entries(&self) -> &[MeritStackEntry] {
        &self.entries
    }

    /// Longest prefix whose cumulative volume stays within the requirement plus tolerance.
    pub fn dispatched(&self, tolerance: Volume) -> &[MeritStackEntry] {
        let limit = self.requirement + tolerance;
        let mut cumulative = 0.0;
        let mut len = 0;
        for entry in &self.entries {
            cumulative += entry.volume;
            if cumulative > limit {
                break;
            }
            len += 1;
        }
        &self.entries[..len]
    }

    /// Marginal price among dispatched commercial acceptances.
    ///
    /// Highest price on the offer leg, lowest on the bid leg.
    pub fn marginal_price(&self, dispatched: &[MeritStackEntry]) -> Option<f64> {
        let commercial = dispatched
            .iter()
            .filter(|e| !e.is_hypothetical && !e.system_operator_flag)
            .map(|e| e.price);
        let marginal = match self.leg {
            Leg::Offer => commercial.max(),
            Leg::Bid => commercial.min(),
        };
        marginal.map(|p| p.into_inner())
    }

    /// Decide the asset's outcome for this period.
    pub fn evaluate(&self, tolerance: Volume) -> LegOutcome {
        let dispatched = self.dispatched(tolerance);
        if !dispatched.iter().any(|e| e.is_hypothetical) {
            return LegOutcome::NotDispatched;
        }

        match self.marginal_price(dispatched) {
            // Only operator actions dispatched alongside the asset
            None => LegOutcome::Accepted,
            Some(marginal) if self.leg.clears(self.asset_price, marginal) => LegOutcome::Accepted,
            Some(_) => LegOutcome::Skipped,
        }
    }
}

/// Evaluate one leg, treating an absent requirement as its own outcome.
pub fn evaluate_leg<'a>(
    leg: Leg,
    records: impl IntoIterator<Item = &'a AcceptanceRecord>,
    asset_price: f64,
    asset_volume: Volume,
    tolerance: Volume,
) -> LegOutcome {
    match MeritStack::build(leg, records, asset_price, asset_volume) {
        Some(stack) => stack.evaluate(tolerance),
        None => LegOutcome::NoRequirement,
    }
}
