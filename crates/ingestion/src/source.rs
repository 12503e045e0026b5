//! Record sources and the per-request dataset handle.

use crate::loader::CsvRecordLoader;
use boa_core::{AcceptanceRecord, DataConfig, Error, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

/// Supplies raw acceptance records bucketed by calendar year.
pub trait RecordSource: Send + Sync {
    /// All records for a year, or `None` when the year has no raw data.
    fn load_year(&self, year: i32) -> Result<Option<Vec<AcceptanceRecord>>>;
}

/// One CSV file per year in a directory.
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    config: DataConfig,
    loader: CsvRecordLoader,
}

impl CsvRecordSource {
    /// Create a source from data configuration.
    pub fn new(config: DataConfig) -> Self {
        let loader = CsvRecordLoader::new(config.unknown_fuel_label.clone());
        Self { config, loader }
    }

    /// Path of a year's CSV.
    pub fn path_for(&self, year: i32) -> PathBuf {
        self.config.raw_file(year)
    }
}

impl RecordSource for CsvRecordSource {
    fn load_year(&self, year: i32) -> Result<Option<Vec<AcceptanceRecord>>> {
        let path = self.path_for(year);
        if !path.exists() {
            debug!(year, path = %path.display(), "no raw acceptance file");
            return Ok(None);
        }

        let (records, stats) = self.loader.read_path(&path)?;
        info!(
            year,
            records = records.len(),
            dropped = stats.dropped_total(),
            drop_frac = stats.drop_frac(),
            "loaded raw acceptances"
        );
        Ok(Some(records))
    }
}

/// In-memory source, bucketed by the year of each record's settlement date.
#[derive(Debug, Default)]
pub struct MemoryRecordSource {
    years: BTreeMap<i32, Vec<AcceptanceRecord>>,
    loads: AtomicUsize,
}

impl MemoryRecordSource {
    /// Bucket records by year.
    pub fn from_records(records: impl IntoIterator<Item = AcceptanceRecord>) -> Self {
        let mut years: BTreeMap<i32, Vec<AcceptanceRecord>> = BTreeMap::new();
        for record in records {
            years.entry(record.settlement_date.year()).or_default().push(record);
        }
        Self {
            years,
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of `load_year` calls served, including misses.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl RecordSource for MemoryRecordSource {
    fn load_year(&self, year: i32) -> Result<Option<Vec<AcceptanceRecord>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.years.get(&year).cloned())
    }
}

/// Materialised acceptance records for an inclusive date range.
///
/// Built per request and handed to the aggregator or simulator; nothing is
/// held globally.
#[derive(Debug, Clone)]
pub struct RecordSet {
    start: NaiveDate,
    end: NaiveDate,
    records: Vec<AcceptanceRecord>,
}

impl RecordSet {
    /// Load every year touched by `[start, end]` and keep records inside the range.
    ///
    /// Years without raw data are skipped; a range with no records at all is
    /// reported as `Error::Unavailable`.
    pub fn load_range(source: &dyn RecordSource, start: NaiveDate, end: NaiveDate) -> Result<Self> {
        check_range(start, end)?;

        let mut records = Vec::new();
        for year in start.year()..=end.year() {
            match source.load_year(year)? {
                Some(year_records) => records.extend(
                    year_records
                        .into_iter()
                        .filter(|r| r.settlement_date >= start && r.settlement_date <= end),
                ),
                None => warn!(year, "raw acceptances unavailable for year"),
            }
        }

        let set = Self { start, end, records };
        if set.is_empty() {
            return Err(Error::unavailable(start, end));
        }
        info!(%start, %end, records = set.len(), "materialised record set");
        Ok(set)
    }

    /// Build a set from records already in memory, keeping those inside the range.
    pub fn from_records(
        start: NaiveDate,
        end: NaiveDate,
        records: impl IntoIterator<Item = AcceptanceRecord>,
    ) -> Result<Self> {
        check_range(start, end)?;
        let records = records
            .into_iter()
            .filter(|r| r.settlement_date >= start && r.settlement_date <= end)
            .collect();
        Ok(Self { start, end, records })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn records(&self) -> &[AcceptanceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<()> {
    if start > end {
        return Err(Error::validation(format!(
            "start date {start} is after end date {end}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_record(day: NaiveDate, gsp: &str, id: &str) -> AcceptanceRecord {
        AcceptanceRecord {
            settlement_date: day,
            settlement_period: 1,
            gsp_group_id: gsp.to_string(),
            accepted_price: 50.0,
            total_volume_accepted: 1.0,
            system_operator_flag: false,
            bmu_fuel_type: "CCGT".to_string(),
            acceptance_id: id.to_string(),
            balancing_cost: 0.0,
            accept_time: None,
        }
    }

    #[test]
    fn test_range_spans_years() {
        let source = MemoryRecordSource::from_records(vec![
            make_record(date(2023, 12, 31), "_A", "1"),
            make_record(date(2024, 1, 1), "_B", "2"),
            make_record(date(2024, 1, 2), "_A", "3"),
        ]);

        let set = RecordSet::load_range(&source, date(2023, 12, 31), date(2024, 1, 1)).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(source.load_count(), 2);
        let years: Vec<i32> = set
            .records()
            .iter()
            .map(|r| r.settlement_date.year())
            .collect();
        assert_eq!(years, vec![2023, 2024]);
    }

    #[test]
    fn test_missing_years_are_unavailable() {
        let source =
            MemoryRecordSource::from_records(vec![make_record(date(2024, 6, 1), "_A", "1")]);

        let err = RecordSet::load_range(&source, date(2022, 1, 1), date(2022, 12, 31)).unwrap_err();
        assert!(err.is_unavailable());

        // Present year outside the filtered window is also unavailable
        let err = RecordSet::load_range(&source, date(2024, 1, 1), date(2024, 1, 31)).unwrap_err();
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_inverted_range_rejected() {
        let source = MemoryRecordSource::default();
        let err = RecordSet::load_range(&source, date(2024, 2, 1), date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_from_records_keeps_input_order_in_range() {
        let set = RecordSet::from_records(
            date(2024, 1, 1),
            date(2024, 1, 1),
            vec![
                make_record(date(2024, 1, 1), "_N", "1"),
                make_record(date(2024, 1, 2), "_A", "2"),
                make_record(date(2024, 1, 1), "_N", "3"),
            ],
        )
        .unwrap();
        let ids: Vec<&str> = set.records().iter().map(|r| r.acceptance_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_csv_source_reads_year_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = DataConfig {
            raw_dir: dir.path().to_path_buf(),
            ..DataConfig::default()
        };
        let source = CsvRecordSource::new(config);

        let mut file = std::fs::File::create(source.path_for(2024)).unwrap();
        writeln!(
            file,
            "settlement_date,settlement_period,gsp_group_id,accepted_price,total_volume_accepted,system_operator_flag,bmu_fuel_type,acceptance_id,balancing_cost"
        )
        .unwrap();
        writeln!(file, "2024-05-01,10,_C,60.0,3.0,0,WIND,X1,180.0").unwrap();
        writeln!(file, "2024-05-01,10,_C,bad,3.0,0,WIND,X2,180.0").unwrap();
        drop(file);

        let records = source.load_year(2024).unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gsp_group_id, "_C");

        assert!(source.load_year(2023).unwrap().is_none());
    }
}
