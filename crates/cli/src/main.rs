//! boa CLI - balancing acceptance aggregation and asset benchmarking

use anyhow::{bail, Context};
use boa_aggregation::{
    available_variables, daily_view, national_series, running_vwap, AggregateField,
    AggregateStore, SqliteAggregateCache,
};
use boa_benchmark::{AssetBenchmark, SimulationRequest};
use boa_core::{AssetType, Config};
use boa_ingestion::{CsvRecordSource, RecordSet};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "boa")]
#[command(about = "Aggregate balancing acceptances and benchmark hypothetical assets")]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or refresh the settlement aggregate cache for a year
    Aggregate {
        #[arg(long)]
        year: i32,

        /// Discard any cached aggregates and rebuild from raw data
        #[arg(long)]
        rebuild: bool,
    },
    /// Settlement, hourly and daily aggregates for one date
    Daily {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,
    },
    /// National time series of selected variables
    Series {
        #[arg(long, value_name = "YYYY-MM-DD")]
        start: NaiveDate,

        #[arg(long, value_name = "YYYY-MM-DD")]
        end: NaiveDate,

        /// Comma-separated variable names
        #[arg(long, default_value = "net_volume")]
        vars: String,
    },
    /// List the variables available to `series`
    Variables,
    /// Running VWAP of accepted prices within one settlement period
    Vwap {
        #[arg(long, value_name = "YYYY-MM-DD")]
        date: NaiveDate,

        #[arg(long)]
        period: u8,

        /// GSP group code, e.g. _A
        #[arg(long)]
        region: String,
    },
    /// Benchmark a hypothetical asset against historical acceptances
    Benchmark {
        #[arg(long, value_name = "YYYY-MM-DD")]
        start: NaiveDate,

        #[arg(long, value_name = "YYYY-MM-DD")]
        end: NaiveDate,

        /// offer, bid or both
        #[arg(long)]
        asset_type: String,

        #[arg(long)]
        capacity_mw: f64,

        #[arg(long, allow_negative_numbers = true)]
        price_bid: Option<f64>,

        #[arg(long, allow_negative_numbers = true)]
        price_offer: Option<f64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_toml_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    config.validate().context("invalid configuration")?;

    // Logs go to stderr so stdout carries only JSON
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(cli.command, &config)
}

fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    let source = CsvRecordSource::new(config.data.clone());
    let store = AggregateStore::new(SqliteAggregateCache::new(&config.data.cache_dir));

    match command {
        Commands::Aggregate { year, rebuild } => {
            info!(year, rebuild, "aggregating year");
            let rows = if rebuild {
                store.rebuild(year, &source)
            } else {
                store.get_or_build(year, &source)
            }
            .with_context(|| format!("aggregating {year}"))?;

            let Some(rows) = rows else {
                bail!(
                    "no raw acceptances for {year} at {}",
                    source.path_for(year).display()
                );
            };
            print_json(&serde_json::json!({
                "year": year,
                "rows": rows.len(),
                "cache_file": store.cache().path_for(year),
            }))
        }
        Commands::Daily { date } => {
            let rows = store
                .load_range(date, date, &source)
                .with_context(|| format!("loading aggregates for {date}"))?;
            print_json(&daily_view(&rows, date))
        }
        Commands::Series { start, end, vars } => {
            let fields = AggregateField::parse_list(&vars)?;
            if fields.is_empty() {
                bail!("no variables requested");
            }
            let rows = store
                .load_range(start, end, &source)
                .with_context(|| format!("loading aggregates for {start}..{end}"))?;
            print_json(&national_series(&rows, &fields))
        }
        Commands::Variables => print_json(&available_variables()),
        Commands::Vwap {
            date,
            period,
            region,
        } => {
            let records = RecordSet::load_range(&source, date, date)
                .with_context(|| format!("loading acceptances for {date}"))?;
            match running_vwap(records.records(), date, period, &region) {
                Some(series) => print_json(&series),
                None => bail!("no timed acceptances for {region} on {date} period {period}"),
            }
        }
        Commands::Benchmark {
            start,
            end,
            asset_type,
            capacity_mw,
            price_bid,
            price_offer,
        } => {
            let request = SimulationRequest {
                asset_type: asset_type.parse::<AssetType>()?,
                capacity_mw,
                price_bid,
                price_offer,
                start_date: start,
                end_date: end,
            };
            request.validate(config.benchmark.both_revenue)?;

            let records = RecordSet::load_range(&source, start, end)
                .with_context(|| format!("loading acceptances for {start}..{end}"))?;
            let results = AssetBenchmark::new(config.benchmark.clone())
                .simulate(&request, &records)
                .context("running asset benchmark")?;
            print_json(&results)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
