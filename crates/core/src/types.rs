//! Core data types for the balancing acceptance pipeline.

use crate::error::{Error, Result};
use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Price type with ordering support (GBP/MWh).
pub type Price = OrderedFloat<f64>;

/// Energy volume in MWh.
pub type Volume = f64;

/// Settlement period number within a day (1-based).
pub type SettlementPeriod = u8;

/// Map a settlement period to its hour bucket (two half-hour periods per hour).
#[inline]
pub fn hour_of_period(period: SettlementPeriod) -> u8 {
    period.saturating_sub(1) / 2
}

/// Kind of settlement day, determined by the GB clock change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayType {
    /// Clocks go forward: 46 settlement periods.
    #[serde(rename = "S")]
    Short,
    /// Ordinary day: 48 settlement periods.
    #[serde(rename = "N")]
    Normal,
    /// Clocks go back: 50 settlement periods.
    #[serde(rename = "L")]
    Long,
}

impl DayType {
    /// Day type of a calendar date.
    pub fn for_date(date: NaiveDate) -> Self {
        if Some(date) == last_sunday(date.year(), 3) {
            DayType::Short
        } else if Some(date) == last_sunday(date.year(), 10) {
            DayType::Long
        } else {
            DayType::Normal
        }
    }

    /// Number of settlement periods in the day.
    pub fn periods(self) -> SettlementPeriod {
        match self {
            DayType::Short => 46,
            DayType::Normal => 48,
            DayType::Long => 50,
        }
    }

    /// Whether `period` is a valid settlement period for this day type.
    pub fn contains(self, period: SettlementPeriod) -> bool {
        (1..=self.periods()).contains(&period)
    }
}

/// Last Sunday of a month (months with 31 days only).
fn last_sunday(year: i32, month: u32) -> Option<NaiveDate> {
    let last = NaiveDate::from_ymd_opt(year, month, 31)?;
    let back = last.weekday().num_days_from_sunday();
    last.checked_sub_days(Days::new(u64::from(back)))
}

/// A single bid/offer acceptance as loaded from the raw data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceRecord {
    /// Settlement date.
    pub settlement_date: NaiveDate,
    /// Settlement period within the date.
    pub settlement_period: SettlementPeriod,
    /// GSP group (region) code.
    pub gsp_group_id: String,
    /// Accepted price (GBP/MWh).
    pub accepted_price: f64,
    /// Signed volume: positive = offer (generation up), negative = bid (demand up).
    pub total_volume_accepted: Volume,
    /// Operator-initiated action rather than a commercial one.
    pub system_operator_flag: bool,
    /// Fuel type of the balancing mechanism unit.
    pub bmu_fuel_type: String,
    /// Unique acceptance identifier.
    pub acceptance_id: String,
    /// Balancing cost of the acceptance.
    pub balancing_cost: f64,
    /// Time the acceptance was issued, when known.
    pub accept_time: Option<NaiveDateTime>,
}

impl AcceptanceRecord {
    /// Offer acceptance (positive volume).
    #[inline]
    pub fn is_offer(&self) -> bool {
        self.total_volume_accepted > 0.0
    }

    /// Bid acceptance (negative volume).
    #[inline]
    pub fn is_bid(&self) -> bool {
        self.total_volume_accepted < 0.0
    }

    /// Grouping key of the record.
    pub fn key(&self) -> SettlementKey {
        SettlementKey {
            settlement_date: self.settlement_date,
            settlement_period: self.settlement_period,
            gsp_group_id: self.gsp_group_id.clone(),
        }
    }
}

/// (date, period, region) grouping key, ordered in that priority.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SettlementKey {
    pub settlement_date: NaiveDate,
    pub settlement_period: SettlementPeriod,
    pub gsp_group_id: String,
}

/// Accepted volume broken down by fuel type.
///
/// Values are magnitudes: consumption mixes hold the absolute value of bid
/// volumes, so both mixes sum to a non-negative total. Fuels with no volume
/// are absent rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuelMix(BTreeMap<String, Volume>);

impl FuelMix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add volume for a fuel. Zero volume leaves the mix untouched.
    pub fn add(&mut self, fuel: &str, volume: Volume) {
        if volume == 0.0 {
            return;
        }
        *self.0.entry(fuel.to_string()).or_insert(0.0) += volume;
    }

    /// Merge another mix by per-fuel summation over the union of keys.
    pub fn merge(&mut self, other: &FuelMix) {
        for (fuel, &volume) in &other.0 {
            self.add(fuel, volume);
        }
    }

    /// Volume for a fuel, if present.
    pub fn get(&self, fuel: &str) -> Option<Volume> {
        self.0.get(fuel).copied()
    }

    /// Sum over all fuels.
    pub fn total(&self) -> Volume {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate fuels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Volume)> {
        self.0.iter().map(|(fuel, &volume)| (fuel.as_str(), volume))
    }
}

impl FromIterator<(String, Volume)> for FuelMix {
    fn from_iter<I: IntoIterator<Item = (String, Volume)>>(iter: I) -> Self {
        let mut mix = FuelMix::new();
        for (fuel, volume) in iter {
            mix.add(&fuel, volume);
        }
        mix
    }
}

/// Summable measures shared by settlement-period, hourly and daily aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateTotals {
    /// Sum of signed volume.
    pub net_volume: Volume,
    /// Sum of signed volume of system-operator actions.
    pub system_volume: Volume,
    /// `net_volume - system_volume`.
    pub energy_volume: Volume,
    /// Distinct acceptances (summed when rolled up).
    pub boas_count: u32,
    /// Records with negative volume.
    pub bids_count: u32,
    /// Records with positive volume.
    pub offers_count: u32,
    /// Sum of balancing cost.
    pub balancing_cost: f64,
    /// Offer volume by fuel.
    pub generation_mix: FuelMix,
    /// Bid volume magnitude by fuel.
    pub consumption_mix: FuelMix,
}

impl AggregateTotals {
    /// Fold another set of totals into this one.
    pub fn merge(&mut self, other: &AggregateTotals) {
        self.net_volume += other.net_volume;
        self.system_volume += other.system_volume;
        self.energy_volume += other.energy_volume;
        self.boas_count += other.boas_count;
        self.bids_count += other.bids_count;
        self.offers_count += other.offers_count;
        self.balancing_cost += other.balancing_cost;
        self.generation_mix.merge(&other.generation_mix);
        self.consumption_mix.merge(&other.consumption_mix);
    }
}

/// Canonical aggregate for one (date, period, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementAggregate {
    pub settlement_date: NaiveDate,
    pub settlement_period: SettlementPeriod,
    pub gsp_group_id: String,
    #[serde(flatten)]
    pub totals: AggregateTotals,
}

impl SettlementAggregate {
    /// Hour bucket of this period.
    pub fn hour(&self) -> u8 {
        hour_of_period(self.settlement_period)
    }
}

/// Aggregate for one (date, hour, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyAggregate {
    pub settlement_date: NaiveDate,
    pub hour: u8,
    pub gsp_group_id: String,
    #[serde(flatten)]
    pub totals: AggregateTotals,
}

/// Aggregate for one (date, region).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAggregate {
    pub settlement_date: NaiveDate,
    pub gsp_group_id: String,
    #[serde(flatten)]
    pub totals: AggregateTotals,
}

/// Which side(s) of the market a hypothetical asset participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Sells energy (generation increase).
    Offer,
    /// Buys energy (demand increase).
    Bid,
    /// Both sides, as a battery would.
    Both,
}

impl AssetType {
    /// Whether the offer leg applies.
    pub fn offers(self) -> bool {
        matches!(self, AssetType::Offer | AssetType::Both)
    }

    /// Whether the bid leg applies.
    pub fn bids(self) -> bool {
        matches!(self, AssetType::Bid | AssetType::Both)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AssetType::Offer => "offer",
            AssetType::Bid => "bid",
            AssetType::Both => "both",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "offer" => Ok(AssetType::Offer),
            "bid" => Ok(AssetType::Bid),
            "both" => Ok(AssetType::Both),
            other => Err(Error::validation(format!(
                "unknown asset_type '{other}', expected offer, bid or both"
            ))),
        }
    }
}

/// Benchmark outcome for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub gsp_group_id: String,
    /// Volume the asset would have had accepted (MWh).
    pub accepted_volume_mwh: Volume,
    /// Volume dispatched in merit order but priced out (MWh).
    pub skipped_volume_mwh: Volume,
    /// Accepted volume times the reference price.
    pub estimated_revenue: f64,
    /// `100 * skipped / (accepted + skipped)`, 0 when nothing was evaluated.
    pub skip_rate_percent: f64,
}
