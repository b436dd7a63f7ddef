use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::bee::Bee;
use crate::config::SimulationConfig;
use crate::hive::Hive;
use crate::honeycomb::Honeycomb;
use crate::simulation::RunOutcome;
use crate::types::{BeeId, HoneycombId, Month};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("cannot write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialise report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-bee detail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeeRecord {
    pub bee_id: BeeId,
    pub honeycomb_id: HoneycombId,
    pub premium: f64,
    pub personal_reserve: f64,
    pub pool_share: f64,
    pub claim_count: usize,
    pub claim_history: Vec<f64>,
}

impl BeeRecord {
    pub fn from_bee(bee: &Bee) -> Self {
        BeeRecord {
            bee_id: bee.id,
            honeycomb_id: bee.honeycomb,
            premium: bee.premium,
            personal_reserve: bee.personal_reserve,
            pool_share: bee.pool_share,
            claim_count: bee.claim_count(),
            claim_history: bee.claim_history.clone(),
        }
    }
}

/// Hive-level totals at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiveSummary {
    pub honeycombs: usize,
    pub bees_per_honeycomb: usize,
    pub pool_ratio: f64,
    /// `None` when the aggregate tier is uncapped.
    pub max_charge_param: Option<f64>,
    pub reserve_fund: f64,
    pub total_personal_reserve: f64,
    pub total_pool_share: f64,
    pub total_claim_count: usize,
    pub total_claim_amount: f64,
}

impl HiveSummary {
    pub fn new(config: &SimulationConfig, hive: &Hive) -> Self {
        let claims = hive.claim_stats();
        HiveSummary {
            honeycombs: config.honeycombs,
            bees_per_honeycomb: config.bees_per_honeycomb,
            pool_ratio: config.pool_ratio,
            max_charge_param: config.max_charge.parameter(),
            reserve_fund: hive.reserve_fund,
            total_personal_reserve: hive.balance(),
            total_pool_share: hive.pool_balance(),
            total_claim_count: claims.count,
            total_claim_amount: claims.total,
        }
    }
}

/// Balance sums for one honeycomb; the histogram's only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoneycombBalance {
    pub honeycomb_id: HoneycombId,
    pub personal_reserve: f64,
    pub pool_share: f64,
}

impl HoneycombBalance {
    pub fn from_honeycomb(comb: &Honeycomb) -> Self {
        HoneycombBalance {
            honeycomb_id: comb.id,
            personal_reserve: comb.balance(),
            pool_share: comb.pool_balance(),
        }
    }
}

pub fn bee_records(hive: &Hive) -> Vec<BeeRecord> {
    hive.bees().map(BeeRecord::from_bee).collect()
}

pub fn honeycomb_balances(hive: &Hive) -> Vec<HoneycombBalance> {
    hive.honeycombs.iter().map(HoneycombBalance::from_honeycomb).collect()
}

/// Receives snapshots from the driver.
pub trait ReportSink {
    /// Called after the last day of every month on monthly horizons.
    fn period_closed(&mut self, month: Month, hive: &Hive) -> Result<(), ReportError>;

    /// Called once, when the run completes or halts on insolvency.
    fn run_finished(
        &mut self,
        summary: &HiveSummary,
        outcome: &RunOutcome,
        hive: &Hive,
    ) -> Result<(), ReportError>;
}

/// Discards everything. Used for batch runs where only the outcome matters.
pub struct NullSink;

impl ReportSink for NullSink {
    fn period_closed(&mut self, _month: Month, _hive: &Hive) -> Result<(), ReportError> {
        Ok(())
    }

    fn run_finished(&mut self, _: &HiveSummary, _: &RunOutcome, _: &Hive) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<(Month, Vec<BeeRecord>)>,
    pub summary: Option<HiveSummary>,
    pub outcome: Option<RunOutcome>,
    pub honeycombs: Vec<HoneycombBalance>,
}

impl ReportSink for MemorySink {
    fn period_closed(&mut self, month: Month, hive: &Hive) -> Result<(), ReportError> {
        self.snapshots.push((month, bee_records(hive)));
        Ok(())
    }

    fn run_finished(
        &mut self,
        summary: &HiveSummary,
        outcome: &RunOutcome,
        hive: &Hive,
    ) -> Result<(), ReportError> {
        self.summary = Some(summary.clone());
        self.outcome = Some(*outcome);
        self.honeycombs = honeycomb_balances(hive);
        Ok(())
    }
}

/// Writes snapshots under `dir`:
/// `bees_detail_mNN.csv` per month, then `bees_detail_final.csv`,
/// `honeycombs.ndjson` and `summary.json` at the end of the run.
pub struct SnapshotWriter {
    dir: PathBuf,
}

#[derive(Serialize)]
struct SummaryFile<'a> {
    outcome: &'a RunOutcome,
    summary: &'a HiveSummary,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, ReportError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;
        Ok(SnapshotWriter { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn create(&self, name: &str) -> Result<(PathBuf, BufWriter<File>), ReportError> {
        let path = self.dir.join(name);
        let file = File::create(&path).map_err(|source| io_error(&path, source))?;
        Ok((path, BufWriter::new(file)))
    }

    fn write_bees_csv(&self, name: &str, hive: &Hive) -> Result<(), ReportError> {
        let (path, mut w) = self.create(name)?;
        write_bees(&mut w, hive).map_err(|source| io_error(&path, source))?;
        info!(target: "beehive::report", path = %path.display(), "bee detail written");
        Ok(())
    }
}

impl ReportSink for SnapshotWriter {
    fn period_closed(&mut self, month: Month, hive: &Hive) -> Result<(), ReportError> {
        self.write_bees_csv(&format!("bees_detail_m{:02}.csv", month.0), hive)
    }

    fn run_finished(
        &mut self,
        summary: &HiveSummary,
        outcome: &RunOutcome,
        hive: &Hive,
    ) -> Result<(), ReportError> {
        self.write_bees_csv("bees_detail_final.csv", hive)?;

        let (path, mut w) = self.create("honeycombs.ndjson")?;
        for balance in honeycomb_balances(hive) {
            serde_json::to_writer(&mut w, &balance)?;
            writeln!(w).map_err(|source| io_error(&path, source))?;
        }
        w.flush().map_err(|source| io_error(&path, source))?;

        let (path, mut w) = self.create("summary.json")?;
        serde_json::to_writer_pretty(&mut w, &SummaryFile { outcome, summary })?;
        writeln!(w).map_err(|source| io_error(&path, source))?;
        w.flush().map_err(|source| io_error(&path, source))?;
        info!(target: "beehive::report", dir = %self.dir.display(), "run summary written");
        Ok(())
    }
}

fn write_bees(w: &mut impl Write, hive: &Hive) -> std::io::Result<()> {
    writeln!(w, "bee_id,honeycomb_id,premium,personal_reserve,pool_share,claim_count,claim_history")?;
    for bee in hive.bees() {
        let history: Vec<String> = bee.claim_history.iter().map(|c| format!("{c:.0}")).collect();
        writeln!(
            w,
            "{},{},{:.2},{:.2},{:.2},{},{}",
            bee.id.0,
            bee.honeycomb.0,
            bee.premium,
            bee.personal_reserve,
            bee.pool_share,
            bee.claim_count(),
            history.join(";"),
        )?;
    }
    w.flush()
}

fn io_error(path: &Path, source: std::io::Error) -> ReportError {
    ReportError::Io { path: path.display().to_string(), source }
}
