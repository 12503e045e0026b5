//! Raw acceptance CSV loading with type coercion.
//!
//! Every field arrives as text. Rows whose date, period, region, acceptance id,
//! price or volume cannot be coerced are dropped and counted by reason; they
//! never abort the load.

use boa_core::{AcceptanceRecord, DayType, Result, SettlementPeriod};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Why a raw row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    /// The CSV row itself could not be decoded.
    Malformed,
    MissingRegion,
    MissingAcceptanceId,
    BadDate,
    BadPeriod,
    /// Period outside 1..=N for the day's clock-change type.
    PeriodOutOfRange,
    BadPrice,
    BadVolume,
    BadCost,
    BadFlag,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DropReason::Malformed => "malformed_row",
            DropReason::MissingRegion => "missing_region",
            DropReason::MissingAcceptanceId => "missing_acceptance_id",
            DropReason::BadDate => "bad_date",
            DropReason::BadPeriod => "bad_period",
            DropReason::PeriodOutOfRange => "period_out_of_range",
            DropReason::BadPrice => "bad_price",
            DropReason::BadVolume => "bad_volume",
            DropReason::BadCost => "bad_cost",
            DropReason::BadFlag => "bad_flag",
        };
        f.write_str(label)
    }
}

/// Statistics about load quality.
#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    /// Rows read from the source.
    pub rows_read: u64,
    /// Rows that survived coercion.
    pub rows_kept: u64,
    /// Dropped rows by reason.
    pub dropped: BTreeMap<DropReason, u64>,
}

impl LoadStats {
    /// Total dropped rows.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }

    /// Dropped rows for one reason.
    pub fn dropped_for(&self, reason: DropReason) -> u64 {
        self.dropped.get(&reason).copied().unwrap_or(0)
    }

    /// Fraction of rows dropped.
    pub fn drop_frac(&self) -> f64 {
        if self.rows_read > 0 {
            self.dropped_total() as f64 / self.rows_read as f64
        } else {
            0.0
        }
    }

    fn record_drop(&mut self, reason: DropReason) {
        *self.dropped.entry(reason).or_insert(0) += 1;
    }
}

/// One CSV row before coercion. Unknown columns are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAcceptanceRow {
    settlement_date: Option<String>,
    settlement_period: Option<String>,
    gsp_group_id: Option<String>,
    accepted_price: Option<String>,
    total_volume_accepted: Option<String>,
    system_operator_flag: Option<String>,
    bmu_fuel_type: Option<String>,
    acceptance_id: Option<String>,
    balancing_cost: Option<String>,
    accept_time: Option<String>,
}

/// Loader that turns raw CSV rows into typed acceptance records.
#[derive(Debug, Clone)]
pub struct CsvRecordLoader {
    /// Fuel label for rows without a fuel type.
    unknown_fuel_label: String,
}

impl CsvRecordLoader {
    /// Create a loader.
    pub fn new(unknown_fuel_label: impl Into<String>) -> Self {
        Self {
            unknown_fuel_label: unknown_fuel_label.into(),
        }
    }

    /// Load records from a CSV file.
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<(Vec<AcceptanceRecord>, LoadStats)> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let (records, stats) = self.read_from(file)?;
        debug!(
            path = %path.display(),
            rows_read = stats.rows_read,
            rows_kept = stats.rows_kept,
            "loaded acceptance csv"
        );
        Ok((records, stats))
    }

    /// Load records from any CSV reader with a header row.
    pub fn read_from<R: Read>(&self, reader: R) -> Result<(Vec<AcceptanceRecord>, LoadStats)> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut records = Vec::new();
        let mut stats = LoadStats::default();

        for row in csv_reader.deserialize::<RawAcceptanceRow>() {
            stats.rows_read += 1;
            let coerced = match row {
                Ok(raw) => self.coerce(raw),
                Err(e) => {
                    debug!(error = %e, "undecodable csv row");
                    Err(DropReason::Malformed)
                }
            };
            match coerced {
                Ok(record) => {
                    stats.rows_kept += 1;
                    records.push(record);
                }
                Err(reason) => stats.record_drop(reason),
            }
        }

        if stats.dropped_total() > 0 {
            warn!(
                dropped = stats.dropped_total(),
                rows_read = stats.rows_read,
                reasons = ?stats.dropped,
                "dropped rows that failed coercion"
            );
        }

        Ok((records, stats))
    }

    /// Coerce one raw row.
    fn coerce(&self, raw: RawAcceptanceRow) -> std::result::Result<AcceptanceRecord, DropReason> {
        let gsp_group_id = non_empty(raw.gsp_group_id).ok_or(DropReason::MissingRegion)?;
        let acceptance_id = non_empty(raw.acceptance_id).ok_or(DropReason::MissingAcceptanceId)?;

        let settlement_date = raw
            .settlement_date
            .as_deref()
            .and_then(parse_date)
            .ok_or(DropReason::BadDate)?;
        let settlement_period = raw
            .settlement_period
            .as_deref()
            .and_then(parse_period)
            .ok_or(DropReason::BadPeriod)?;
        if !DayType::for_date(settlement_date).contains(settlement_period) {
            return Err(DropReason::PeriodOutOfRange);
        }

        let accepted_price = raw
            .accepted_price
            .as_deref()
            .and_then(parse_number)
            .ok_or(DropReason::BadPrice)?;
        let total_volume_accepted = raw
            .total_volume_accepted
            .as_deref()
            .and_then(parse_number)
            .ok_or(DropReason::BadVolume)?;
        let balancing_cost = match raw.balancing_cost.as_deref() {
            None | Some("") => 0.0,
            Some(text) => parse_number(text).ok_or(DropReason::BadCost)?,
        };
        let system_operator_flag = match raw.system_operator_flag.as_deref() {
            None | Some("") => false,
            Some(text) => parse_flag(text).ok_or(DropReason::BadFlag)?,
        };

        let bmu_fuel_type =
            non_empty(raw.bmu_fuel_type).unwrap_or_else(|| self.unknown_fuel_label.clone());
        let accept_time = raw.accept_time.as_deref().and_then(parse_datetime);

        Ok(AcceptanceRecord {
            settlement_date,
            settlement_period,
            gsp_group_id,
            accepted_price,
            total_volume_accepted,
            system_operator_flag,
            bmu_fuel_type,
            acceptance_id,
            balancing_cost,
            accept_time,
        })
    }
}

impl Default for CsvRecordLoader {
    fn default() -> Self {
        Self::new("UNKNOWN")
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Periods may arrive as "12" or "12.0".
fn parse_period(text: &str) -> Option<SettlementPeriod> {
    let text = text.trim();
    if let Ok(period) = text.parse::<SettlementPeriod>() {
        return Some(period);
    }
    let value = parse_number(text)?;
    if value.fract() == 0.0 && (0.0..=f64::from(SettlementPeriod::MAX)).contains(&value) {
        Some(value as SettlementPeriod)
    } else {
        None
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" | "t" | "y" => Some(true),
        "0" | "0.0" | "false" | "f" | "n" => Some(false),
        _ => None,
    }
}

/// Accepts plain dates and the date part of timestamps.
fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            text.get(..10)
                .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
        })
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}
