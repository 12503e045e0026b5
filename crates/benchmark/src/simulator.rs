//! Asset benchmark simulator.
//!
//! Replays historical acceptances region by region and period by period,
//! testing whether the hypothetical asset would have cleared.

use crate::merit_stack::{evaluate_leg, Leg};
use crate::report::{RegionAccumulator, ResultReporter};
use crate::request::SimulationRequest;
use boa_core::{
    AcceptanceRecord, BenchmarkConfig, Error, Result, SettlementPeriod, SimulationResult,
};
use boa_ingestion::RecordSet;
use chrono::NaiveDate;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Shared flag that stops a running simulation.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

type PeriodKey = (NaiveDate, SettlementPeriod);

/// One region's records grouped by settlement period.
#[derive(Debug)]
struct RegionBook<'a> {
    gsp_group_id: &'a str,
    periods: BTreeMap<PeriodKey, Vec<&'a AcceptanceRecord>>,
}

/// Group in-range records by region, keeping regions in first-seen order.
fn group_by_region(
    records: &[AcceptanceRecord],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<RegionBook<'_>> {
    let mut books: Vec<RegionBook<'_>> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records
        .iter()
        .filter(|r| r.settlement_date >= start && r.settlement_date <= end)
    {
        let gsp = record.gsp_group_id.as_str();
        let slot = *index.entry(gsp).or_insert_with(|| {
            books.push(RegionBook {
                gsp_group_id: gsp,
                periods: BTreeMap::new(),
            });
            books.len() - 1
        });
        books[slot]
            .periods
            .entry((record.settlement_date, record.settlement_period))
            .or_default()
            .push(record);
    }
    books
}

/// Merit-order benchmark of a hypothetical asset.
pub struct AssetBenchmark {
    config: BenchmarkConfig,
    cancel: CancelToken,
}

impl AssetBenchmark {
    /// Create a new simulator.
    pub fn new(config: BenchmarkConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that cancels runs of this simulator.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the benchmark over every region in the record set.
    ///
    /// Results are in first-seen region order. A request range holding no
    /// records is `Error::Unavailable`. A cancelled run returns
    /// `Error::Cancelled` and no partial results.
    pub fn simulate(
        &self,
        request: &SimulationRequest,
        records: &RecordSet,
    ) -> Result<Vec<SimulationResult>> {
        request.validate(self.config.both_revenue)?;
        let started = Instant::now();

        let books = group_by_region(records.records(), request.start_date, request.end_date);
        if books.is_empty() {
            return Err(Error::unavailable(request.start_date, request.end_date));
        }
        let accumulators = self.run_regions(&books, request)?;

        let reporter = ResultReporter::new(request.reference_price());
        let results: Vec<SimulationResult> = books
            .iter()
            .zip(&accumulators)
            .map(|(book, acc)| reporter.report(book.gsp_group_id, acc))
            .collect();

        let mut total = RegionAccumulator::new();
        for acc in &accumulators {
            total.merge(acc);
        }
        info!(
            asset_type = %request.asset_type,
            capacity_mw = request.capacity_mw,
            regions = results.len(),
            periods = total.periods,
            accepted_mwh = total.accepted_volume,
            skipped_mwh = total.skipped_volume,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "asset benchmark complete"
        );
        Ok(results)
    }

    fn worker_count(&self) -> usize {
        match self.config.workers {
            0 => num_cpus::get(),
            n => n as usize,
        }
    }

    fn run_regions(
        &self,
        books: &[RegionBook<'_>],
        request: &SimulationRequest,
    ) -> Result<Vec<RegionAccumulator>> {
        let workers = self.worker_count();
        if workers <= 1 || books.len() <= 1 {
            return books
                .iter()
                .map(|book| self.evaluate_region(book, request))
                .collect();
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::Other(format!("building region worker pool: {e}")))?;

        // Indexed collect keeps region order
        pool.install(|| {
            books
                .par_iter()
                .map(|book| self.evaluate_region(book, request))
                .collect()
        })
    }

    fn evaluate_region(
        &self,
        book: &RegionBook<'_>,
        request: &SimulationRequest,
    ) -> Result<RegionAccumulator> {
        let volume = request.volume_per_period();
        let tolerance = self.config.tolerance_mwh;
        let offer_price = request.offer_leg_price();
        let bid_price = request.bid_leg_price();

        let mut acc = RegionAccumulator::new();
        for records in book.periods.values() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            acc.periods += 1;

            if let Some(price) = offer_price {
                let outcome =
                    evaluate_leg(Leg::Offer, records.iter().copied(), price, volume, tolerance);
                acc.record(outcome, volume);
            }
            if let Some(price) = bid_price {
                let outcome =
                    evaluate_leg(Leg::Bid, records.iter().copied(), price, volume, tolerance);
                acc.record(outcome, volume);
            }
        }

        debug!(
            gsp_group_id = book.gsp_group_id,
            periods = acc.periods,
            accepted_mwh = acc.accepted_volume,
            skipped_mwh = acc.skipped_volume,
            not_dispatched = acc.not_dispatched,
            "region evaluated"
        );
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use boa_core::{AssetType, BothRevenuePolicy};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn make_record(
        day: u32,
        period: u8,
        gsp: &str,
        price: f64,
        volume: f64,
        so_flag: bool,
    ) -> AcceptanceRecord {
        AcceptanceRecord {
            settlement_date: date(day),
            settlement_period: period,
            gsp_group_id: gsp.to_string(),
            accepted_price: price,
            total_volume_accepted: volume,
            system_operator_flag: so_flag,
            bmu_fuel_type: "CCGT".to_string(),
            acceptance_id: format!("{gsp}-{day}-{period}-{price}"),
            balancing_cost: 0.0,
            accept_time: None,
        }
    }

    fn record_set(records: Vec<AcceptanceRecord>) -> RecordSet {
        RecordSet::from_records(date(1), date(30), records).unwrap()
    }

    fn request(asset_type: AssetType, bid: Option<f64>, offer: Option<f64>) -> SimulationRequest {
        SimulationRequest {
            asset_type,
            capacity_mw: 4.0,
            price_bid: bid,
            price_offer: offer,
            start_date: date(1),
            end_date: date(30),
        }
    }

    fn sequential() -> BenchmarkConfig {
        BenchmarkConfig {
            workers: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_cheap_offer_accepted() {
        let set = record_set(vec![make_record(1, 1, "_A", 40.0, 10.0, false)]);
        let results = AssetBenchmark::new(sequential())
            .simulate(&request(AssetType::Offer, None, Some(35.0)), &set)
            .unwrap();

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.accepted_volume_mwh, 2.0);
        assert_eq!(r.skipped_volume_mwh, 0.0);
        assert_eq!(r.skip_rate_percent, 0.0);
        assert_relative_eq!(r.estimated_revenue, 70.0);
    }

    #[test]
    fn test_offer_above_marginal_skipped() {
        let set = record_set(vec![
            make_record(1, 1, "_A", 40.0, 5.0, false),
            make_record(1, 1, "_A", 50.0, 5.0, false),
        ]);
        let results = AssetBenchmark::new(sequential())
            .simulate(&request(AssetType::Offer, None, Some(45.0)), &set)
            .unwrap();

        let r = &results[0];
        assert_eq!(r.accepted_volume_mwh, 0.0);
        assert_eq!(r.skipped_volume_mwh, 2.0);
        assert_eq!(r.skip_rate_percent, 100.0);
        assert_eq!(r.estimated_revenue, 0.0);
    }

    #[test]
    fn test_oversized_asset_is_noop() {
        let set = record_set(vec![make_record(1, 1, "_A", 40.0, 1.0, false)]);
        let results = AssetBenchmark::new(sequential())
            .simulate(&request(AssetType::Offer, None, Some(10.0)), &set)
            .unwrap();

        let r = &results[0];
        assert_eq!(r.accepted_volume_mwh, 0.0);
        assert_eq!(r.skipped_volume_mwh, 0.0);
        assert_eq!(r.skip_rate_percent, 0.0);
    }

    #[test]
    fn test_operator_only_period_auto_clears() {
        let set = record_set(vec![
            make_record(1, 1, "_A", 5.0, 6.0, true),
            make_record(1, 1, "_A", 900.0, 4.0, true),
        ]);
        let results = AssetBenchmark::new(sequential())
            .simulate(&request(AssetType::Offer, None, Some(500.0)), &set)
            .unwrap();

        assert_eq!(results[0].accepted_volume_mwh, 2.0);
        assert_eq!(results[0].skipped_volume_mwh, 0.0);
    }

    #[test]
    fn test_both_legs_per_period() {
        let set = record_set(vec![
            make_record(1, 1, "_A", 40.0, 10.0, false),
            make_record(1, 1, "_A", 20.0, -3.0, false),
            make_record(1, 1, "_A", 5.0, -3.0, false),
            make_record(1, 2, "_A", 40.0, 10.0, false),
        ]);
        let results = AssetBenchmark::new(sequential())
            .simulate(&request(AssetType::Both, Some(30.0), Some(35.0)), &set)
            .unwrap();

        // Period 1: offer dispatched first, bid 30 clears against marginal 20
        // Period 2: offer accepted, no bid requirement
        let r = &results[0];
        assert_eq!(r.accepted_volume_mwh, 6.0);
        assert_eq!(r.skipped_volume_mwh, 0.0);
        assert_relative_eq!(r.estimated_revenue, 6.0 * 32.5);
    }

    #[test]
    fn test_available_price_policy_runs_single_leg() {
        let config = BenchmarkConfig {
            workers: 1,
            both_revenue: BothRevenuePolicy::AvailablePrice,
            ..Default::default()
        };
        let set = record_set(vec![
            make_record(1, 1, "_A", 40.0, 10.0, false),
            make_record(1, 1, "_A", 20.0, -5.0, false),
        ]);
        let req = request(AssetType::Both, None, Some(35.0));

        let results = AssetBenchmark::new(config).simulate(&req, &set).unwrap();
        assert_eq!(results[0].accepted_volume_mwh, 2.0);
        assert_relative_eq!(results[0].estimated_revenue, 70.0);

        let strict = AssetBenchmark::new(sequential()).simulate(&req, &set);
        assert!(matches!(strict, Err(Error::Validation(_))));
    }

    #[test]
    fn test_regions_in_first_seen_order() {
        let mut records = Vec::new();
        for (i, gsp) in ["_N", "_C", "_P", "_A", "_H", "_B"].iter().enumerate() {
            let period = i as u8 + 1;
            records.push(make_record(2, period, gsp, 40.0, 10.0, false));
            records.push(make_record(3, period, gsp, 40.0, 1.0, false));
        }
        let set = record_set(records);
        let req = request(AssetType::Offer, None, Some(35.0));

        for workers in [1, 0, 4] {
            let config = BenchmarkConfig {
                workers,
                ..Default::default()
            };
            let results = AssetBenchmark::new(config).simulate(&req, &set).unwrap();
            let order: Vec<&str> = results.iter().map(|r| r.gsp_group_id.as_str()).collect();
            assert_eq!(order, vec!["_N", "_C", "_P", "_A", "_H", "_B"]);
            assert!(results.iter().all(|r| r.accepted_volume_mwh == 2.0));
        }
    }

    #[test]
    fn test_request_range_filters_records() {
        let set = record_set(vec![
            make_record(1, 1, "_A", 40.0, 10.0, false),
            make_record(20, 1, "_B", 40.0, 10.0, false),
        ]);
        let req = SimulationRequest {
            start_date: date(10),
            ..request(AssetType::Offer, None, Some(35.0))
        };

        let results = AssetBenchmark::new(sequential()).simulate(&req, &set).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].gsp_group_id, "_B");

        // Records exist, but none fall inside the requested window
        let gap = SimulationRequest {
            start_date: date(10),
            end_date: date(15),
            ..request(AssetType::Offer, None, Some(35.0))
        };
        let err = AssetBenchmark::new(sequential()).simulate(&gap, &set).unwrap_err();
        assert!(err.is_unavailable());
        assert!(matches!(
            err,
            Error::Unavailable { start, end } if start == date(10) && end == date(15)
        ));
    }

    #[test]
    fn test_invalid_request_rejected_before_work() {
        let set = record_set(vec![make_record(1, 1, "_A", 40.0, 10.0, false)]);
        let req = SimulationRequest {
            capacity_mw: 0.0,
            ..request(AssetType::Offer, None, Some(35.0))
        };
        let result = AssetBenchmark::new(sequential()).simulate(&req, &set);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_cancelled_run_returns_no_results() {
        let set = record_set(vec![make_record(1, 1, "_A", 40.0, 10.0, false)]);
        let benchmark = AssetBenchmark::new(sequential());
        benchmark.cancel_token().cancel();

        let result = benchmark.simulate(&request(AssetType::Offer, None, Some(35.0)), &set);
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_cancelled_pool_run_returns_no_results() {
        let mut records = Vec::new();
        for gsp in ["_A", "_B", "_C", "_D", "_E", "_F"] {
            for period in 1..=4 {
                records.push(make_record(1, period, gsp, 40.0, 10.0, false));
            }
        }
        let set = record_set(records);
        let req = request(AssetType::Both, Some(30.0), Some(35.0));
        let config = BenchmarkConfig {
            workers: 4,
            ..Default::default()
        };

        let benchmark = AssetBenchmark::new(config);
        assert_eq!(benchmark.simulate(&req, &set).unwrap().len(), 6);

        let token = benchmark.cancel_token();
        token.cancel();
        assert!(token.is_cancelled());
        let result = benchmark.simulate(&req, &set);
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
