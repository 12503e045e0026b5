//! Settlement-period aggregation.
//!
//! Builds one canonical aggregate per (date, period, region) from raw
//! acceptance records.

use boa_core::{AcceptanceRecord, AggregateTotals, SettlementAggregate, SettlementKey};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Builder for settlement aggregates from acceptance records.
#[derive(Debug, Default)]
pub struct SettlementAggregator {
    /// Aggregates being built, keyed by (date, period, region).
    groups: BTreeMap<SettlementKey, AggregateInProgress>,
    /// Records folded in so far.
    record_count: usize,
}

/// An aggregate that's currently being built.
#[derive(Debug, Default)]
struct AggregateInProgress {
    totals: AggregateTotals,
    acceptance_ids: HashSet<String>,
}

impl AggregateInProgress {
    fn add_record(&mut self, record: &AcceptanceRecord) {
        let volume = record.total_volume_accepted;
        let totals = &mut self.totals;

        totals.net_volume += volume;
        if record.system_operator_flag {
            totals.system_volume += volume;
        }
        totals.balancing_cost += record.balancing_cost;

        if record.is_offer() {
            totals.offers_count += 1;
            totals.generation_mix.add(&record.bmu_fuel_type, volume);
        } else if record.is_bid() {
            totals.bids_count += 1;
            totals.consumption_mix.add(&record.bmu_fuel_type, volume.abs());
        }

        self.acceptance_ids.insert(record.acceptance_id.clone());
    }

    fn into_aggregate(self, key: SettlementKey) -> SettlementAggregate {
        let mut totals = self.totals;
        totals.energy_volume = totals.net_volume - totals.system_volume;
        totals.boas_count = self.acceptance_ids.len() as u32;

        SettlementAggregate {
            settlement_date: key.settlement_date,
            settlement_period: key.settlement_period,
            gsp_group_id: key.gsp_group_id,
            totals,
        }
    }
}

impl SettlementAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record into its group.
    pub fn add_record(&mut self, record: &AcceptanceRecord) {
        self.groups.entry(record.key()).or_default().add_record(record);
        self.record_count += 1;
    }

    /// Fold many records.
    pub fn add_records<'a>(&mut self, records: impl IntoIterator<Item = &'a AcceptanceRecord>) {
        for record in records {
            self.add_record(record);
        }
    }

    /// Finish and return aggregates ordered by (date, period, region).
    pub fn finish(self) -> Vec<SettlementAggregate> {
        debug!(
            records = self.record_count,
            groups = self.groups.len(),
            "finished settlement aggregation"
        );
        self.groups
            .into_iter()
            .map(|(key, group)| group.into_aggregate(key))
            .collect()
    }
}

/// Aggregate a batch of records in one call.
pub fn aggregate_records<'a>(
    records: impl IntoIterator<Item = &'a AcceptanceRecord>,
) -> Vec<SettlementAggregate> {
    let mut aggregator = SettlementAggregator::new();
    aggregator.add_records(records);
    aggregator.finish()
}
