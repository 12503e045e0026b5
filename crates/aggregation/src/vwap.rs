//! Running volume-weighted average accepted price within one settlement period.

use boa_core::{AcceptanceRecord, SettlementPeriod};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Running VWAP for a (date, period, region), one point per timed acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VwapSeries {
    pub settlement_date: NaiveDate,
    pub settlement_period: SettlementPeriod,
    pub gsp_group_id: String,
    pub times: Vec<NaiveDateTime>,
    pub vwap: Vec<f64>,
}

/// Accumulates price × |volume| the same way a bar accumulates trades.
#[derive(Debug, Default)]
struct VwapAccumulator {
    numerator: f64,
    weight: f64,
}

impl VwapAccumulator {
    fn add(&mut self, price: f64, volume: f64) {
        let weight = volume.abs();
        self.numerator += price * weight;
        self.weight += weight;
    }

    fn vwap(&self) -> Option<f64> {
        if self.weight > 0.0 {
            Some(self.numerator / self.weight)
        } else {
            None
        }
    }
}

/// Running VWAP ordered by accept time.
///
/// Records without an accept time are ignored. Acceptances with zero volume
/// before any weighted acceptance produce no point. Returns `None` when
/// nothing in the period can be weighted.
pub fn running_vwap(
    records: &[AcceptanceRecord],
    date: NaiveDate,
    period: SettlementPeriod,
    region: &str,
) -> Option<VwapSeries> {
    let mut timed: Vec<(NaiveDateTime, &AcceptanceRecord)> = records
        .iter()
        .filter(|r| {
            r.settlement_date == date && r.settlement_period == period && r.gsp_group_id == region
        })
        .filter_map(|r| r.accept_time.map(|t| (t, r)))
        .collect();
    timed.sort_by_key(|(t, _)| *t);

    let mut acc = VwapAccumulator::default();
    let mut times = Vec::with_capacity(timed.len());
    let mut vwap = Vec::with_capacity(timed.len());
    for (time, record) in timed {
        acc.add(record.accepted_price, record.total_volume_accepted);
        if let Some(value) = acc.vwap() {
            times.push(time);
            vwap.push(value);
        }
    }

    if vwap.is_empty() {
        return None;
    }
    Some(VwapSeries {
        settlement_date: date,
        settlement_period: period,
        gsp_group_id: region.to_string(),
        times,
        vwap,
    })
}
