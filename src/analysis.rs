use std::fmt::Write as _;

use crate::report::HoneycombBalance;
use crate::simulation::{RunOutcome, RunResult};

/// Distribution statistics for a continuous metric across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DistStats {
    pub n: usize,
    pub min: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Cross-run view of a batch of independent simulations.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub runs: usize,
    pub insolvent_runs: usize,
    /// Final reserve fund of every run, insolvent ones included.
    pub final_reserve: Option<DistStats>,
    /// Month of insolvency, over insolvent runs only.
    pub insolvency_month: Option<DistStats>,
    pub claim_events: Option<DistStats>,
}

impl BatchStats {
    pub fn insolvency_rate(&self) -> f64 {
        if self.runs == 0 { 0.0 } else { self.insolvent_runs as f64 / self.runs as f64 }
    }
}

pub fn percentile_stats(values: &mut [f64]) -> Option<DistStats> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();

    let interp = |p: f64| -> f64 {
        let h = p * (n - 1) as f64;
        let lo = h.floor() as usize;
        let hi = (lo + 1).min(n - 1);
        let frac = h - lo as f64;
        values[lo] * (1.0 - frac) + values[hi] * frac
    };

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };

    Some(DistStats {
        n,
        min: values[0],
        p5: interp(0.05),
        p50: interp(0.50),
        p95: interp(0.95),
        max: values[n - 1],
        mean,
        std_dev: variance.sqrt(),
    })
}

pub fn analyse_batch(results: &[RunResult]) -> BatchStats {
    let mut reserves: Vec<f64> = results.iter().map(|r| r.summary.reserve_fund).collect();
    let mut events: Vec<f64> = results.iter().map(|r| r.outcome.events() as f64).collect();
    let mut months: Vec<f64> = results
        .iter()
        .filter_map(|r| match r.outcome {
            RunOutcome::Insolvent { month, .. } => Some(month.0 as f64),
            RunOutcome::Completed { .. } => None,
        })
        .collect();

    BatchStats {
        runs: results.len(),
        insolvent_runs: months.len(),
        final_reserve: percentile_stats(&mut reserves),
        insolvency_month: percentile_stats(&mut months),
        claim_events: percentile_stats(&mut events),
    }
}

/// Equal-width bucket counts over `[lo, lo + width * counts.len()]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lo: f64,
    pub width: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// `None` for empty input or zero bins. A constant input lands in one bucket.
    pub fn new(values: &[f64], bins: usize) -> Option<Self> {
        if values.is_empty() || bins == 0 {
            return None;
        }
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = hi - lo;
        if span <= 0.0 {
            let mut counts = vec![0; bins];
            counts[0] = values.len();
            return Some(Histogram { lo, width: 1.0, counts });
        }

        let width = span / bins as f64;
        let mut counts = vec![0; bins];
        for v in values {
            let i = (((v - lo) / width) as usize).min(bins - 1);
            counts[i] += 1;
        }
        Some(Histogram { lo, width, counts })
    }

    /// One text bar per bucket, scaled so the fullest bucket is `bar_width` wide.
    pub fn render(&self, bar_width: usize) -> String {
        let peak = self.counts.iter().copied().max().unwrap_or(0).max(1);
        let mut out = String::new();
        for (i, count) in self.counts.iter().enumerate() {
            let from = self.lo + self.width * i as f64;
            let to = from + self.width;
            let bar = "#".repeat(count * bar_width / peak);
            let _ = writeln!(out, "{from:>12.0} - {to:<12.0} | {count:>6} {bar}");
        }
        out
    }
}

/// Histograms of per-honeycomb personal reserve and pool share sums.
pub fn honeycomb_histograms(
    balances: &[HoneycombBalance],
    bins: usize,
) -> (Option<Histogram>, Option<Histogram>) {
    let personal: Vec<f64> = balances.iter().map(|b| b.personal_reserve).collect();
    let pool: Vec<f64> = balances.iter().map(|b| b.pool_share).collect();
    (Histogram::new(&personal, bins), Histogram::new(&pool, bins))
}
