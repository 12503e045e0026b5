//! Per-year storage for settlement aggregates.
//!
//! The cache only persists and returns whole years; deciding when to build is
//! the job of [`crate::store::AggregateStore`].

use boa_core::{AggregateTotals, Error, FuelMix, Result, SettlementAggregate};
use chrono::NaiveDate;
use parking_lot::RwLock;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for one calendar year of settlement aggregates per entry.
pub trait AggregateCache: Send + Sync {
    /// Aggregates for a year, or `None` on a cache miss.
    fn load(&self, year: i32) -> Result<Option<Vec<SettlementAggregate>>>;

    /// Replace a year's aggregates.
    fn store(&self, year: i32, rows: &[SettlementAggregate]) -> Result<()>;

    /// Drop a year. Returns whether anything was removed.
    fn invalidate(&self, year: i32) -> Result<bool>;

    /// Whether a year is present.
    fn contains(&self, year: i32) -> Result<bool>;
}

/// In-process cache.
#[derive(Debug, Default)]
pub struct MemoryAggregateCache {
    years: RwLock<HashMap<i32, Vec<SettlementAggregate>>>,
}

impl MemoryAggregateCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregateCache for MemoryAggregateCache {
    fn load(&self, year: i32) -> Result<Option<Vec<SettlementAggregate>>> {
        Ok(self.years.read().get(&year).cloned())
    }

    fn store(&self, year: i32, rows: &[SettlementAggregate]) -> Result<()> {
        self.years.write().insert(year, rows.to_vec());
        Ok(())
    }

    fn invalidate(&self, year: i32) -> Result<bool> {
        Ok(self.years.write().remove(&year).is_some())
    }

    fn contains(&self, year: i32) -> Result<bool> {
        Ok(self.years.read().contains_key(&year))
    }
}

const SCHEMA: &str = "
CREATE TABLE settlement_aggregate (
    row_id            INTEGER PRIMARY KEY,
    settlement_date   TEXT    NOT NULL,
    settlement_period INTEGER NOT NULL,
    gsp_group_id      TEXT    NOT NULL,
    net_volume        REAL    NOT NULL,
    system_volume     REAL    NOT NULL,
    energy_volume     REAL    NOT NULL,
    boas_count        INTEGER NOT NULL,
    bids_count        INTEGER NOT NULL,
    offers_count      INTEGER NOT NULL,
    balancing_cost    REAL    NOT NULL,
    UNIQUE (settlement_date, settlement_period, gsp_group_id)
);
CREATE TABLE fuel_mix (
    row_id    INTEGER NOT NULL REFERENCES settlement_aggregate(row_id),
    direction TEXT    NOT NULL CHECK (direction IN ('generation', 'consumption')),
    fuel      TEXT    NOT NULL,
    volume    REAL    NOT NULL,
    PRIMARY KEY (row_id, direction, fuel)
);
";

const GENERATION: &str = "generation";
const CONSUMPTION: &str = "consumption";

/// One SQLite file per year (`settlement_<year>.sqlite`) in a directory.
///
/// A year is written to a temporary file and renamed into place, so readers
/// see either the previous state or the complete year.
#[derive(Debug, Clone)]
pub struct SqliteAggregateCache {
    dir: PathBuf,
}

impl SqliteAggregateCache {
    /// Create a cache rooted at `dir`. The directory is created on first store.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding a year.
    pub fn path_for(&self, year: i32) -> PathBuf {
        self.dir.join(format!("settlement_{year}.sqlite"))
    }

    fn write_year(path: &Path, rows: &[SettlementAggregate]) -> rusqlite::Result<()> {
        let mut conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let tx = conn.transaction()?;
        {
            let mut insert_row = tx.prepare(
                "INSERT INTO settlement_aggregate
                 (row_id, settlement_date, settlement_period, gsp_group_id,
                  net_volume, system_volume, energy_volume,
                  boas_count, bids_count, offers_count, balancing_cost)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            let mut insert_mix = tx.prepare(
                "INSERT INTO fuel_mix (row_id, direction, fuel, volume) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (row_id, row) in rows.iter().enumerate() {
                let row_id = row_id as i64;
                let t = &row.totals;
                insert_row.execute(params![
                    row_id,
                    row.settlement_date.to_string(),
                    row.settlement_period,
                    row.gsp_group_id,
                    t.net_volume,
                    t.system_volume,
                    t.energy_volume,
                    t.boas_count,
                    t.bids_count,
                    t.offers_count,
                    t.balancing_cost,
                ])?;
                let mixes = [
                    (GENERATION, &t.generation_mix),
                    (CONSUMPTION, &t.consumption_mix),
                ];
                for (direction, mix) in mixes {
                    for (fuel, volume) in mix.iter() {
                        insert_mix.execute(params![row_id, direction, fuel, volume])?;
                    }
                }
            }
        }
        tx.commit()
    }

    fn read_year(path: &Path) -> Result<Vec<SettlementAggregate>> {
        let conn =
            Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(db_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT row_id, settlement_date, settlement_period, gsp_group_id,
                        net_volume, system_volume, energy_volume,
                        boas_count, bids_count, offers_count, balancing_cost
                 FROM settlement_aggregate ORDER BY row_id ASC",
            )
            .map_err(db_err)?;
        let raw_rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u8>(2)?,
                    row.get::<_, String>(3)?,
                    AggregateTotals {
                        net_volume: row.get(4)?,
                        system_volume: row.get(5)?,
                        energy_volume: row.get(6)?,
                        boas_count: row.get(7)?,
                        bids_count: row.get(8)?,
                        offers_count: row.get(9)?,
                        balancing_cost: row.get(10)?,
                        generation_mix: FuelMix::new(),
                        consumption_mix: FuelMix::new(),
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut index = HashMap::with_capacity(raw_rows.len());
        let mut rows = Vec::with_capacity(raw_rows.len());
        for (row_id, date, settlement_period, gsp_group_id, totals) in raw_rows {
            let settlement_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                Error::database(format!("bad settlement_date '{date}' in cache: {e}"))
            })?;
            index.insert(row_id, rows.len());
            rows.push(SettlementAggregate {
                settlement_date,
                settlement_period,
                gsp_group_id,
                totals,
            });
        }

        let mut stmt = conn
            .prepare("SELECT row_id, direction, fuel, volume FROM fuel_mix")
            .map_err(db_err)?;
        let mixes = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(db_err)?;
        for mix_row in mixes {
            let (row_id, direction, fuel, volume) = mix_row.map_err(db_err)?;
            let slot = index
                .get(&row_id)
                .and_then(|&i| rows.get_mut(i))
                .ok_or_else(|| {
                    Error::database(format!("fuel_mix references unknown row {row_id}"))
                })?;
            match direction.as_str() {
                GENERATION => slot.totals.generation_mix.add(&fuel, volume),
                CONSUMPTION => slot.totals.consumption_mix.add(&fuel, volume),
                other => {
                    return Err(Error::database(format!("unknown fuel_mix direction '{other}'")));
                }
            }
        }

        Ok(rows)
    }
}

impl AggregateCache for SqliteAggregateCache {
    fn load(&self, year: i32) -> Result<Option<Vec<SettlementAggregate>>> {
        let path = self.path_for(year);
        if !path.exists() {
            return Ok(None);
        }
        let rows = Self::read_year(&path)?;
        debug!(year, rows = rows.len(), path = %path.display(), "read aggregate cache");
        Ok(Some(rows))
    }

    fn store(&self, year: i32, rows: &[SettlementAggregate]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(year);
        let tmp = path.with_extension("sqlite.tmp");
        if tmp.exists() {
            fs::remove_file(&tmp)?;
        }

        if let Err(e) = Self::write_year(&tmp, rows) {
            let _ = fs::remove_file(&tmp);
            return Err(db_err(e));
        }
        fs::rename(&tmp, &path)?;
        debug!(year, rows = rows.len(), path = %path.display(), "wrote aggregate cache");
        Ok(())
    }

    fn invalidate(&self, year: i32) -> Result<bool> {
        let path = self.path_for(year);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }

    fn contains(&self, year: i32) -> Result<bool> {
        Ok(self.path_for(year).exists())
    }
}

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows() -> Vec<SettlementAggregate> {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let make = |period: u8, gsp: &str, gen: &[(&str, f64)], con: &[(&str, f64)]| {
            SettlementAggregate {
                settlement_date: day,
                settlement_period: period,
                gsp_group_id: gsp.to_string(),
                totals: AggregateTotals {
                    net_volume: 3.5,
                    system_volume: -1.0,
                    energy_volume: 4.5,
                    boas_count: 3,
                    bids_count: 1,
                    offers_count: 2,
                    balancing_cost: 120.25,
                    generation_mix: gen.iter().map(|(f, v)| (f.to_string(), *v)).collect(),
                    consumption_mix: con.iter().map(|(f, v)| (f.to_string(), *v)).collect(),
                },
            }
        };
        vec![
            make(1, "_A", &[("CCGT", 4.0), ("WIND", 0.5)], &[("PS", 1.0)]),
            make(1, "_B", &[], &[]),
            make(2, "_A", &[("NUCLEAR", 2.0)], &[]),
        ]
    }

    #[test]
    fn test_sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteAggregateCache::new(dir.path().join("cache"));
        let rows = sample_rows();

        assert!(!cache.contains(2024).unwrap());
        assert!(cache.load(2024).unwrap().is_none());

        cache.store(2024, &rows).unwrap();

        assert!(cache.contains(2024).unwrap());
        assert!(!cache.path_for(2024).with_extension("sqlite.tmp").exists());
        assert_eq!(cache.load(2024).unwrap().unwrap(), rows);
    }

    #[test]
    fn test_sqlite_store_replaces_year() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteAggregateCache::new(dir.path());
        let rows = sample_rows();

        cache.store(2024, &rows).unwrap();
        cache.store(2024, &rows[..1]).unwrap();

        assert_eq!(cache.load(2024).unwrap().unwrap().len(), 1);
    }

    #[test]
    fn test_sqlite_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SqliteAggregateCache::new(dir.path());
        cache.store(2023, &sample_rows()).unwrap();

        assert!(cache.invalidate(2023).unwrap());
        assert!(!cache.invalidate(2023).unwrap());
        assert!(cache.load(2023).unwrap().is_none());
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryAggregateCache::new();
        cache.store(2024, &sample_rows()).unwrap();

        assert!(cache.contains(2024).unwrap());
        assert_eq!(cache.load(2024).unwrap().unwrap().len(), 3);
        assert!(cache.invalidate(2024).unwrap());
        assert!(!cache.contains(2024).unwrap());
    }
}
