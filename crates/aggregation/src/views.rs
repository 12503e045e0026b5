//! Query-time views over settlement aggregates.
//!
//! Nothing here is cached: each view is recomputed from the rows passed in.

use crate::rollup::{rollup_daily, rollup_hourly};
use boa_core::{
    AggregateTotals, DailyAggregate, DayType, Error, HourlyAggregate, Result, SettlementAggregate,
    SettlementPeriod,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Everything a client needs to display one day at 30-minute, hourly and daily resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyView {
    pub date: NaiveDate,
    pub day_type: DayType,
    pub settlement_period: Vec<SettlementAggregate>,
    pub hourly: Vec<HourlyAggregate>,
    pub daily: Vec<DailyAggregate>,
}

/// Build the view for `date` from any superset of its rows.
pub fn daily_view(rows: &[SettlementAggregate], date: NaiveDate) -> DailyView {
    let periods: Vec<SettlementAggregate> = rows
        .iter()
        .filter(|r| r.settlement_date == date)
        .cloned()
        .collect();

    DailyView {
        date,
        day_type: DayType::for_date(date),
        hourly: rollup_hourly(&periods),
        daily: rollup_daily(&periods),
        settlement_period: periods,
    }
}

/// Plottable numeric fields of an aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateField {
    NetVolume,
    BoasCount,
    BidsCount,
    OffersCount,
    SystemVolume,
    EnergyVolume,
    BalancingCost,
}

impl AggregateField {
    /// All fields in display order.
    pub const ALL: [AggregateField; 7] = [
        AggregateField::NetVolume,
        AggregateField::BoasCount,
        AggregateField::BidsCount,
        AggregateField::OffersCount,
        AggregateField::SystemVolume,
        AggregateField::EnergyVolume,
        AggregateField::BalancingCost,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateField::NetVolume => "net_volume",
            AggregateField::BoasCount => "boas_count",
            AggregateField::BidsCount => "bids_count",
            AggregateField::OffersCount => "offers_count",
            AggregateField::SystemVolume => "system_volume",
            AggregateField::EnergyVolume => "energy_volume",
            AggregateField::BalancingCost => "balancing_cost",
        }
    }

    /// Read this field from a set of totals.
    pub fn value(self, totals: &AggregateTotals) -> f64 {
        match self {
            AggregateField::NetVolume => totals.net_volume,
            AggregateField::BoasCount => f64::from(totals.boas_count),
            AggregateField::BidsCount => f64::from(totals.bids_count),
            AggregateField::OffersCount => f64::from(totals.offers_count),
            AggregateField::SystemVolume => totals.system_volume,
            AggregateField::EnergyVolume => totals.energy_volume,
            AggregateField::BalancingCost => totals.balancing_cost,
        }
    }

    /// Parse a comma-separated list of field names.
    pub fn parse_list(text: &str) -> Result<Vec<AggregateField>> {
        text.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for AggregateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregateField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AggregateField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown variable '{s}'")))
    }
}

/// Variables a client may request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableVariables {
    pub time: Vec<&'static str>,
    pub numeric: Vec<AggregateField>,
}

/// Time columns and plottable numeric fields.
pub fn available_variables() -> AvailableVariables {
    AvailableVariables {
        time: vec!["settlement_date", "settlement_period"],
        numeric: AggregateField::ALL.to_vec(),
    }
}

/// National (all-region) values for one settlement period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NationalPoint {
    pub settlement_date: NaiveDate,
    pub settlement_period: SettlementPeriod,
    #[serde(flatten)]
    pub values: BTreeMap<AggregateField, f64>,
}

/// Sum the selected fields across regions per (date, period).
pub fn national_series(
    rows: &[SettlementAggregate],
    fields: &[AggregateField],
) -> Vec<NationalPoint> {
    let mut points: BTreeMap<(NaiveDate, SettlementPeriod), BTreeMap<AggregateField, f64>> =
        BTreeMap::new();

    for row in rows {
        let values = points
            .entry((row.settlement_date, row.settlement_period))
            .or_insert_with(|| fields.iter().map(|&f| (f, 0.0)).collect());
        for &field in fields {
            *values.entry(field).or_insert(0.0) += field.value(&row.totals);
        }
    }

    points
        .into_iter()
        .map(|((settlement_date, settlement_period), values)| NationalPoint {
            settlement_date,
            settlement_period,
            values,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_row(day: u32, period: u8, gsp: &str, net: f64, boas: u32) -> SettlementAggregate {
        SettlementAggregate {
            settlement_date: NaiveDate::from_ymd_opt(2024, 10, day).unwrap(),
            settlement_period: period,
            gsp_group_id: gsp.to_string(),
            totals: AggregateTotals {
                net_volume: net,
                boas_count: boas,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_daily_view_selects_date() {
        let rows = vec![
            make_row(27, 1, "_A", 1.0, 1),
            make_row(27, 50, "_A", 2.0, 1),
            make_row(27, 1, "_B", 4.0, 2),
            make_row(28, 1, "_A", 8.0, 1),
        ];

        let view = daily_view(&rows, NaiveDate::from_ymd_opt(2024, 10, 27).unwrap());

        assert_eq!(view.day_type, DayType::Long);
        assert_eq!(view.settlement_period.len(), 3);
        assert_eq!(view.hourly.len(), 3);
        assert_eq!(view.daily.len(), 2);
        assert_eq!(view.daily[0].totals.net_volume, 3.0);
        assert_eq!(view.hourly.iter().map(|h| h.hour).max(), Some(24));
    }

    #[test]
    fn test_national_series_sums_regions() {
        let rows = vec![
            make_row(1, 2, "_A", 1.5, 1),
            make_row(1, 1, "_A", 1.0, 2),
            make_row(1, 1, "_B", -3.0, 3),
        ];
        let fields = [AggregateField::NetVolume, AggregateField::BoasCount];

        let series = national_series(&rows, &fields);

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].settlement_period, 1);
        assert_eq!(series[0].values[&AggregateField::NetVolume], -2.0);
        assert_eq!(series[0].values[&AggregateField::BoasCount], 5.0);
        assert_eq!(series[1].values[&AggregateField::NetVolume], 1.5);
        assert!(!series[0].values.contains_key(&AggregateField::BalancingCost));
    }

    #[test]
    fn test_parse_field_list() {
        let fields = AggregateField::parse_list("net_volume, balancing_cost").unwrap();
        assert_eq!(fields, vec![AggregateField::NetVolume, AggregateField::BalancingCost]);

        let err = AggregateField::parse_list("net_volume,price").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_available_variables() {
        let vars = available_variables();
        assert_eq!(vars.time, vec!["settlement_date", "settlement_period"]);
        assert_eq!(vars.numeric.len(), 7);
        assert_eq!(vars.numeric[0].to_string(), "net_volume");
    }
}
