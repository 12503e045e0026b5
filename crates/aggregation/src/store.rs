//! Build-once access to yearly settlement aggregates.

use crate::cache::AggregateCache;
use crate::settlement::aggregate_records;
use boa_core::{AcceptanceRecord, Error, Result, SettlementAggregate};
use boa_ingestion::RecordSource;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Yearly aggregate access over a cache.
///
/// At most one build runs per year. A caller that misses the cache while
/// another thread is building the same year waits on that year's lock and
/// then reads the stored result instead of building again.
pub struct AggregateStore<C: AggregateCache> {
    cache: C,
    build_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
}

impl<C: AggregateCache> AggregateStore<C> {
    /// Wrap a cache.
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying cache.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn year_lock(&self, year: i32) -> Arc<Mutex<()>> {
        self.build_locks.lock().entry(year).or_default().clone()
    }

    /// Cached aggregates for a year, building and storing them on a miss.
    ///
    /// Returns `None` when the year has no raw data.
    pub fn get_or_build(
        &self,
        year: i32,
        source: &dyn RecordSource,
    ) -> Result<Option<Vec<SettlementAggregate>>> {
        if let Some(rows) = self.cache.load(year)? {
            debug!(year, rows = rows.len(), "aggregate cache hit");
            return Ok(Some(rows));
        }

        let lock = self.year_lock(year);
        let _guard = lock.lock();

        // Another caller may have finished the build while we waited
        if let Some(rows) = self.cache.load(year)? {
            debug!(year, rows = rows.len(), "aggregate built by concurrent caller");
            return Ok(Some(rows));
        }
        self.build_locked(year, source)
    }

    /// Rebuild a year from raw records, replacing any cached aggregates.
    ///
    /// The cached year is only replaced once the new rows are built, so a
    /// source error leaves it intact. A year whose raw data has gone is
    /// dropped from the cache.
    pub fn rebuild(
        &self,
        year: i32,
        source: &dyn RecordSource,
    ) -> Result<Option<Vec<SettlementAggregate>>> {
        let lock = self.year_lock(year);
        let _guard = lock.lock();

        let started = Instant::now();
        let Some(records) = source.load_year(year)? else {
            let dropped = self.cache.invalidate(year)?;
            warn!(year, dropped, "no raw acceptances, cached aggregates discarded");
            return Ok(None);
        };
        self.store_records(year, &records, started).map(Some)
    }

    /// Discard a year's cached aggregates.
    pub fn invalidate(&self, year: i32) -> Result<bool> {
        let lock = self.year_lock(year);
        let _guard = lock.lock();
        self.cache.invalidate(year)
    }

    /// Caller must hold the year lock.
    fn build_locked(
        &self,
        year: i32,
        source: &dyn RecordSource,
    ) -> Result<Option<Vec<SettlementAggregate>>> {
        let started = Instant::now();
        let Some(records) = source.load_year(year)? else {
            warn!(year, "no raw acceptances, skipping aggregation");
            return Ok(None);
        };

        self.store_records(year, &records, started).map(Some)
    }

    fn store_records(
        &self,
        year: i32,
        records: &[AcceptanceRecord],
        started: Instant,
    ) -> Result<Vec<SettlementAggregate>> {
        let rows = aggregate_records(records);
        self.cache.store(year, &rows)?;
        info!(
            year,
            records = records.len(),
            rows = rows.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built settlement aggregates"
        );
        Ok(rows)
    }

    /// Aggregates for every date in `[start, end]`, building years as needed.
    ///
    /// Years without data are skipped; a range with no rows at all is
    /// reported as `Error::Unavailable`.
    pub fn load_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        source: &dyn RecordSource,
    ) -> Result<Vec<SettlementAggregate>> {
        if start > end {
            return Err(Error::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }

        let mut rows = Vec::new();
        for year in start.year()..=end.year() {
            match self.get_or_build(year, source)? {
                Some(year_rows) => rows.extend(
                    year_rows
                        .into_iter()
                        .filter(|r| r.settlement_date >= start && r.settlement_date <= end),
                ),
                None => warn!(year, "aggregates unavailable for year"),
            }
        }

        if rows.is_empty() {
            return Err(Error::unavailable(start, end));
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryAggregateCache, SqliteAggregateCache};
    use boa_ingestion::MemoryRecordSource;
    use std::io;
    use std::thread;

    struct UnreadableSource;

    impl RecordSource for UnreadableSource {
        fn load_year(&self, _year: i32) -> Result<Option<Vec<AcceptanceRecord>>> {
            Err(Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "raw file unreadable")))
        }
    }

    fn make_record(y: i32, m: u32, d: u32, period: u8, volume: f64, id: &str) -> AcceptanceRecord {
        AcceptanceRecord {
            settlement_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            settlement_period: period,
            gsp_group_id: "_A".to_string(),
            accepted_price: 70.0,
            total_volume_accepted: volume,
            system_operator_flag: false,
            bmu_fuel_type: "CCGT".to_string(),
            acceptance_id: id.to_string(),
            balancing_cost: 0.0,
            accept_time: None,
        }
    }

    fn source() -> MemoryRecordSource {
        MemoryRecordSource::from_records(vec![
            make_record(2024, 1, 1, 1, 5.0, "a"),
            make_record(2024, 1, 1, 1, -2.0, "b"),
            make_record(2024, 1, 2, 3, 1.0, "c"),
            make_record(2025, 1, 1, 1, 1.0, "d"),
        ])
    }

    #[test]
    fn test_second_call_is_cache_hit() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        let source = source();

        let first = store.get_or_build(2024, &source).unwrap().unwrap();
        let second = store.get_or_build(2024, &source).unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(source.load_count(), 1);
    }

    #[test]
    fn test_missing_year_reports_absence() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        let source = source();

        assert!(store.get_or_build(2019, &source).unwrap().is_none());
        assert!(!store.cache().contains(2019).unwrap());
    }

    #[test]
    fn test_rebuild_reloads_source() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        let source = source();

        store.get_or_build(2024, &source).unwrap();
        store.rebuild(2024, &source).unwrap();
        assert_eq!(source.load_count(), 2);

        assert!(store.invalidate(2024).unwrap());
        store.get_or_build(2024, &source).unwrap();
        assert_eq!(source.load_count(), 3);
    }

    #[test]
    fn test_failed_rebuild_keeps_cached_year() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        let built = store.get_or_build(2024, &source()).unwrap().unwrap();

        let err = store.rebuild(2024, &UnreadableSource).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        assert!(store.cache().contains(2024).unwrap());
        assert_eq!(store.cache().load(2024).unwrap(), Some(built));
    }

    #[test]
    fn test_failed_rebuild_keeps_sqlite_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = AggregateStore::new(SqliteAggregateCache::new(dir.path()));
        let built = store.get_or_build(2024, &source()).unwrap().unwrap();

        assert!(store.rebuild(2024, &UnreadableSource).is_err());
        assert_eq!(store.get_or_build(2024, &UnreadableSource).unwrap(), Some(built));
    }

    #[test]
    fn test_rebuild_without_raw_data_drops_year() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        store.get_or_build(2024, &source()).unwrap();

        let empty = MemoryRecordSource::default();
        assert!(store.rebuild(2024, &empty).unwrap().is_none());
        assert!(!store.cache().contains(2024).unwrap());
    }

    #[test]
    fn test_load_range_filters_and_skips_missing_years() {
        let store = AggregateStore::new(MemoryAggregateCache::new());
        let source = source();
        let start = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let rows = store.load_range(start, end, &source).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].totals.net_volume, 3.0);

        let empty = store.load_range(
            NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            &source,
        );
        assert!(empty.unwrap_err().is_unavailable());
    }

    #[test]
    fn test_concurrent_builds_run_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = AggregateStore::new(SqliteAggregateCache::new(dir.path()));
        let source = source();

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let rows = store.get_or_build(2024, &source).unwrap().unwrap();
                    assert_eq!(rows.len(), 2);
                });
            }
        });

        assert_eq!(source.load_count(), 1);
    }
}
