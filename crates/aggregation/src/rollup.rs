//! Hourly and daily rollups of settlement aggregates.
//!
//! Numeric fields sum and fuel mixes merge per key, so rollups are
//! independent of row order and of whether they go through the hourly step.

use boa_core::{
    hour_of_period, AggregateTotals, DailyAggregate, HourlyAggregate, SettlementAggregate,
};
use chrono::NaiveDate;
use std::collections::BTreeMap;

type HourKey = (NaiveDate, u8, String);
type DayKey = (NaiveDate, String);

/// Roll settlement periods up to (date, hour, region).
pub fn rollup_hourly(rows: &[SettlementAggregate]) -> Vec<HourlyAggregate> {
    let mut buckets: BTreeMap<HourKey, AggregateTotals> = BTreeMap::new();
    for row in rows {
        let key = (
            row.settlement_date,
            hour_of_period(row.settlement_period),
            row.gsp_group_id.clone(),
        );
        buckets.entry(key).or_default().merge(&row.totals);
    }

    buckets
        .into_iter()
        .map(|((settlement_date, hour, gsp_group_id), totals)| HourlyAggregate {
            settlement_date,
            hour,
            gsp_group_id,
            totals,
        })
        .collect()
}

/// Roll settlement periods up to (date, region).
pub fn rollup_daily(rows: &[SettlementAggregate]) -> Vec<DailyAggregate> {
    merge_daily(
        rows.iter()
            .map(|row| ((row.settlement_date, row.gsp_group_id.clone()), &row.totals)),
    )
}

/// Roll hourly aggregates up to (date, region).
pub fn rollup_hourly_to_daily(rows: &[HourlyAggregate]) -> Vec<DailyAggregate> {
    merge_daily(
        rows.iter()
            .map(|row| ((row.settlement_date, row.gsp_group_id.clone()), &row.totals)),
    )
}

fn merge_daily<'a>(
    rows: impl Iterator<Item = (DayKey, &'a AggregateTotals)>,
) -> Vec<DailyAggregate> {
    let mut buckets: BTreeMap<DayKey, AggregateTotals> = BTreeMap::new();
    for (key, totals) in rows {
        buckets.entry(key).or_default().merge(totals);
    }

    buckets
        .into_iter()
        .map(|((settlement_date, gsp_group_id), totals)| DailyAggregate {
            settlement_date,
            gsp_group_id,
            totals,
        })
        .collect()
}
