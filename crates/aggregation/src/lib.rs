//! Settlement aggregation, caching and rollups.
//!
//! This crate provides:
//! - Per (date, period, region) aggregation of acceptance records
//! - A build-once yearly aggregate cache (SQLite or in-memory)
//! - Hourly and daily rollups, the daily view and national series
//! - Running VWAP within a settlement period

pub mod cache;
pub mod rollup;
pub mod settlement;
pub mod store;
pub mod views;
pub mod vwap;

pub use cache::{AggregateCache, MemoryAggregateCache, SqliteAggregateCache};
pub use rollup::{rollup_daily, rollup_hourly, rollup_hourly_to_daily};
pub use settlement::{aggregate_records, SettlementAggregator};
pub use store::AggregateStore;
pub use views::{
    available_variables, daily_view, national_series, AggregateField, AvailableVariables,
    DailyView, NationalPoint,
};
pub use vwap::{running_vwap, VwapSeries};
