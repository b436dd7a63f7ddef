use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bee::Bee;
use crate::config::{ConfigError, SimulationConfig};
use crate::hive::Hive;
use crate::report::{HiveSummary, NullSink, ReportError, ReportSink};
use crate::sampler::{DistributionSampler, Sampler};
use crate::types::{BeeId, Day, HiveId, HoneycombId, Month};
use crate::waterfall::ChargeError;

/// How a run ended. Both variants are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// Every configured day was simulated.
    Completed { days: u32, events: u64, charged: f64 },
    /// The reserve fund ran out on `day`. `events` includes the claim that did it.
    Insolvent { day: Day, month: Month, events: u64, charged: f64, shortfall: f64 },
}

impl RunOutcome {
    pub fn is_insolvent(&self) -> bool {
        matches!(self, RunOutcome::Insolvent { .. })
    }

    pub fn events(&self) -> u64 {
        match *self {
            RunOutcome::Completed { events, .. } | RunOutcome::Insolvent { events, .. } => events,
        }
    }
}

#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("simulation already finished ({0:?}); build a new one to run again")]
    AlreadyFinished(RunOutcome),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("sampler returned {got} premiums for a population of {expected}")]
    PremiumCount { expected: usize, got: usize },
}

/// One run's outcome and final totals, as produced by [`run_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub seed: u64,
    pub outcome: RunOutcome,
    pub summary: HiveSummary,
}

/// Drives the hive through the configured horizon.
///
/// Construction builds the population from one batch of premium draws.
/// [`Simulation::run`] then walks the days; each claim goes to a bee picked
/// uniformly across the whole hive. The first insolvency halts the run.
pub struct Simulation<S = DistributionSampler> {
    pub hive: Hive,
    config: SimulationConfig,
    sampler: S,
    outcome: Option<RunOutcome>,
    events: u64,
    charged: f64,
}

impl Simulation<DistributionSampler> {
    /// Validate `config` and build a seeded simulation from it.
    pub fn from_config(config: SimulationConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let sampler = DistributionSampler::from_config(&config)?;
        Self::with_sampler(config, sampler)
    }
}

impl<S: Sampler> Simulation<S> {
    pub fn with_sampler(config: SimulationConfig, mut sampler: S) -> Result<Self, SimulationError> {
        config.validate()?;
        let hive = build_hive(&config, &mut sampler)?;
        info!(
            target: "beehive::sim",
            honeycombs = config.honeycombs,
            bees = hive.population(),
            reserve_fund = hive.reserve_fund,
            pool = hive.pool_balance(),
            "hive constructed"
        );
        Ok(Simulation { hive, config, sampler, outcome: None, events: 0, charged: 0.0 })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// `None` until [`Simulation::run`] has finished.
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome
    }

    pub fn summary(&self) -> HiveSummary {
        HiveSummary::new(&self.config, &self.hive)
    }

    /// Run to completion or insolvency, reporting into `sink`.
    pub fn run(&mut self, sink: &mut impl ReportSink) -> Result<RunOutcome, SimulationError> {
        if let Some(outcome) = self.outcome {
            return Err(SimulationError::AlreadyFinished(outcome));
        }

        let days = self.config.horizon.days();
        let monthly = self.config.horizon.is_monthly();
        let counts = self.sampler.claim_counts(days as usize);

        for (d, count) in counts.into_iter().enumerate() {
            let day = Day(d as u32);
            let severities = self.sampler.claim_severities(count as usize);

            for fee in severities {
                let index = self.sampler.pick_bee(self.hive.population());
                let bee = self.hive.bee_at(index);
                self.events += 1;
                self.charged += fee;
                debug!(target: "beehive::sim", day = day.0, bee = self.hive.bee(bee).id.0, fee, "claim");

                if let Err(ChargeError::Insolvent { shortfall, reserve_fund }) =
                    self.hive.charge(bee, fee)
                {
                    warn!(
                        target: "beehive::sim",
                        day = day.0,
                        month = day.month().0,
                        events = self.events,
                        shortfall,
                        reserve_fund,
                        "hive insolvent, halting run"
                    );
                    let outcome = RunOutcome::Insolvent {
                        day,
                        month: day.month(),
                        events: self.events,
                        charged: self.charged,
                        shortfall,
                    };
                    return self.finish(outcome, sink);
                }
            }

            if monthly && day.closes_month() {
                self.close_month(day.month(), d as u32 + 1 < days, sink)?;
            }
        }

        if !monthly {
            info!(
                target: "beehive::sim",
                days,
                events = self.events,
                charged = self.charged,
                reserve_fund = self.hive.reserve_fund,
                personal = self.hive.balance(),
                pool = self.hive.pool_balance(),
                "period closed"
            );
        }

        let outcome = RunOutcome::Completed { days, events: self.events, charged: self.charged };
        self.finish(outcome, sink)
    }

    fn close_month(
        &mut self,
        month: Month,
        more_to_come: bool,
        sink: &mut impl ReportSink,
    ) -> Result<(), SimulationError> {
        info!(
            target: "beehive::sim",
            month = month.0,
            events = self.events,
            charged = self.charged,
            reserve_fund = self.hive.reserve_fund,
            personal = self.hive.balance(),
            pool = self.hive.pool_balance(),
            "month closed"
        );
        sink.period_closed(month, &self.hive)?;
        if more_to_come && self.config.renew_each_month {
            self.hive.renew_bees();
        }
        Ok(())
    }

    fn finish(
        &mut self,
        outcome: RunOutcome,
        sink: &mut impl ReportSink,
    ) -> Result<RunOutcome, SimulationError> {
        self.outcome = Some(outcome);
        sink.run_finished(&self.summary(), &outcome, &self.hive)?;
        info!(target: "beehive::sim", ?outcome, reserve_fund = self.hive.reserve_fund, "run finished");
        Ok(outcome)
    }
}

/// Build the honeycomb/bee graph from one batch of `honeycombs * bees_per_honeycomb`
/// premium draws. Ids are 1-based and run across the whole hive.
fn build_hive(config: &SimulationConfig, sampler: &mut impl Sampler) -> Result<Hive, SimulationError> {
    let expected = config.population();
    let premiums = sampler.premiums(expected);
    if premiums.len() != expected {
        return Err(SimulationError::PremiumCount { expected, got: premiums.len() });
    }

    let mut hive = Hive::new(HiveId(0), config.initial_reserve_fund, config.max_charge);
    let mut premiums = premiums.into_iter();
    let mut next_bee = 1u64;

    for c in 0..config.honeycombs {
        let comb_id = HoneycombId(c as u64 + 1);
        let comb = hive.add_honeycomb(comb_id);
        for premium in premiums.by_ref().take(config.bees_per_honeycomb) {
            hive.join(comb, Bee::new(BeeId(next_bee), comb_id, premium, config.pool_ratio));
            next_bee += 1;
        }
    }
    Ok(hive)
}

/// `runs` consecutive seeds from `start`, cut short at `u64::MAX`.
pub fn seed_range(start: u64, runs: u64) -> std::ops::Range<u64> {
    start..start.saturating_add(runs)
}

/// Run one independent simulation per seed in `seeds`, in parallel.
/// Every run builds its own hive; nothing is shared between them.
pub fn run_batch(
    base: &SimulationConfig,
    seeds: std::ops::Range<u64>,
) -> Result<Vec<RunResult>, SimulationError> {
    base.validate()?;
    seeds
        .into_par_iter()
        .map(|seed| {
            let config = SimulationConfig { seed, ..base.clone() };
            let mut sim = Simulation::from_config(config)?;
            let outcome = sim.run(&mut NullSink)?;
            Ok(RunResult { seed, outcome, summary: sim.summary() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::config::Horizon;
    use crate::report::MemorySink;
    use crate::waterfall::MaxChargePolicy;

    /// Replays fixed draws; runs dry with zeros.
    #[derive(Default)]
    struct ScriptedSampler {
        premiums: Vec<f64>,
        counts: Vec<u64>,
        severities: VecDeque<f64>,
        picks: VecDeque<usize>,
    }

    impl Sampler for ScriptedSampler {
        fn premiums(&mut self, n: usize) -> Vec<f64> {
            (0..n).map(|i| self.premiums.get(i).copied().unwrap_or(0.0)).collect()
        }

        fn claim_counts(&mut self, periods: usize) -> Vec<u64> {
            (0..periods).map(|i| self.counts.get(i).copied().unwrap_or(0)).collect()
        }

        fn claim_severities(&mut self, n: usize) -> Vec<f64> {
            (0..n).map(|_| self.severities.pop_front().unwrap_or(0.0)).collect()
        }

        fn pick_bee(&mut self, population: usize) -> usize {
            self.picks.pop_front().unwrap_or(0) % population
        }
    }

    fn tiny_config(horizon: Horizon, reserve: f64) -> SimulationConfig {
        SimulationConfig {
            honeycombs: 2,
            bees_per_honeycomb: 2,
            horizon,
            initial_reserve_fund: reserve,
            max_charge: MaxChargePolicy::Unlimited,
            ..SimulationConfig::canonical()
        }
    }

    fn scripted(
        premiums: &[f64],
        counts: &[u64],
        severities: &[f64],
        picks: &[usize],
    ) -> ScriptedSampler {
        ScriptedSampler {
            premiums: premiums.to_vec(),
            counts: counts.to_vec(),
            severities: severities.iter().copied().collect(),
            picks: picks.iter().copied().collect(),
        }
    }

    #[test]
    fn construction_splits_every_premium() {
        let sampler = scripted(&[2_000.0, 1_000.0, 400.0, 0.0], &[], &[], &[]);
        let sim = Simulation::with_sampler(tiny_config(Horizon::Days(1), 100.0), sampler).unwrap();

        assert_eq!(sim.hive.population(), 4);
        assert_eq!(sim.hive.honeycombs.len(), 2);
        let first = sim.hive.bee(sim.hive.bee_at(0));
        assert_eq!((first.personal_reserve, first.pool_share), (500.0, 1_500.0));
        let third = sim.hive.bee(sim.hive.bee_at(2));
        assert_eq!(third.id, BeeId(3));
        assert_eq!(third.honeycomb, HoneycombId(2));
        assert_eq!(sim.hive.reserve_fund, 100.0);
        assert_eq!(sim.outcome(), None);
    }

    struct NoPremiums;

    impl Sampler for NoPremiums {
        fn premiums(&mut self, _n: usize) -> Vec<f64> {
            vec![1_000.0]
        }

        fn claim_counts(&mut self, periods: usize) -> Vec<u64> {
            vec![0; periods]
        }

        fn claim_severities(&mut self, n: usize) -> Vec<f64> {
            vec![0.0; n]
        }

        fn pick_bee(&mut self, _population: usize) -> usize {
            0
        }
    }

    #[test]
    fn short_premium_batch_is_rejected() {
        let result = Simulation::with_sampler(tiny_config(Horizon::Days(1), 100.0), NoPremiums);
        assert!(matches!(result, Err(SimulationError::PremiumCount { expected: 4, got: 1 })));
    }

    #[test]
    fn quiet_horizon_completes() {
        let sampler = scripted(&[2_000.0; 4], &[], &[], &[]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(5), 100.0), sampler).unwrap();
        let outcome = sim.run(&mut MemorySink::default()).unwrap();
        assert_eq!(outcome, RunOutcome::Completed { days: 5, events: 0, charged: 0.0 });
    }

    #[test]
    fn claims_go_to_picked_bee() {
        let sampler = scripted(&[2_000.0; 4], &[2], &[100.0, 40.0], &[3, 1]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(1), 100.0), sampler).unwrap();
        sim.run(&mut MemorySink::default()).unwrap();

        assert_eq!(sim.hive.bee(sim.hive.bee_at(3)).claim_history, vec![100.0]);
        assert_eq!(sim.hive.bee(sim.hive.bee_at(1)).claim_history, vec![40.0]);
        assert_eq!(sim.hive.bee(sim.hive.bee_at(0)).claim_count(), 0);
    }

    #[test]
    fn insolvency_halts_at_triggering_claim() {
        // Reserve 200 against an uncoverable 300: the second day never runs.
        let sampler = scripted(&[0.0; 4], &[2, 5], &[300.0, 10.0, 10.0], &[0, 1, 2]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(3), 200.0), sampler).unwrap();
        let mut sink = MemorySink::default();

        let outcome = sim.run(&mut sink).unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Insolvent {
                day: Day(0),
                month: Month(1),
                events: 1,
                charged: 300.0,
                shortfall: 300.0,
            }
        );
        assert_eq!(sim.hive.claim_stats().count, 1);
        assert_eq!(sim.hive.reserve_fund, -100.0);
        assert_eq!(sink.outcome, Some(outcome));
        assert_eq!(sink.summary.as_ref().map(|s| s.reserve_fund), Some(-100.0));
    }

    #[test]
    fn run_after_terminal_state_is_rejected() {
        let sampler = scripted(&[2_000.0; 4], &[], &[], &[]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(1), 100.0), sampler).unwrap();
        sim.run(&mut NullSink).unwrap();
        assert!(matches!(sim.run(&mut NullSink), Err(SimulationError::AlreadyFinished(_))));
    }

    #[test]
    fn monthly_horizon_snapshots_each_month() {
        let sampler = scripted(&[2_000.0; 4], &[1], &[50.0], &[0]);
        let mut sim =
            Simulation::with_sampler(tiny_config(Horizon::Months(3), 100.0), sampler).unwrap();
        let mut sink = MemorySink::default();
        let outcome = sim.run(&mut sink).unwrap();

        assert_eq!(outcome, RunOutcome::Completed { days: 90, events: 1, charged: 50.0 });
        let months: Vec<Month> = sink.snapshots.iter().map(|(m, _)| *m).collect();
        assert_eq!(months, vec![Month(1), Month(2), Month(3)]);
        assert_eq!(sink.snapshots[0].1[0].personal_reserve, 450.0);
        assert_eq!(sink.honeycombs.len(), 2);
    }

    #[test]
    fn day_horizon_takes_no_monthly_snapshots() {
        let sampler = scripted(&[2_000.0; 4], &[], &[], &[]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(60), 100.0), sampler).unwrap();
        let mut sink = MemorySink::default();
        sim.run(&mut sink).unwrap();
        assert!(sink.snapshots.is_empty());
        assert!(sink.summary.is_some());
    }

    #[test]
    fn monthly_renewal_refills_between_months_only() {
        let sampler = scripted(&[2_000.0; 4], &[1], &[700.0], &[0]);
        let config = SimulationConfig {
            renew_each_month: true,
            ..tiny_config(Horizon::Months(2), 100.0)
        };
        let mut sim = Simulation::with_sampler(config, sampler).unwrap();
        let mut sink = MemorySink::default();
        sim.run(&mut sink).unwrap();

        // Month 1 closes with the claim applied, then every bee renews once.
        assert_eq!(sink.snapshots[0].1[0].personal_reserve, 0.0);
        assert_eq!(sink.snapshots[0].1[0].pool_share, 1_300.0);
        let bee = sim.hive.bee(sim.hive.bee_at(0));
        assert_eq!(bee.personal_reserve, 500.0);
        assert_eq!(bee.pool_share, 1_500.0);
        let other = sim.hive.bee(sim.hive.bee_at(1));
        assert_eq!(other.personal_reserve, 1_000.0);
    }

    #[test]
    fn invalid_config_rejected_before_construction() {
        let config = SimulationConfig { bees_per_honeycomb: 0, ..SimulationConfig::canonical() };
        assert!(matches!(
            Simulation::from_config(config),
            Err(SimulationError::Config(ConfigError::EmptyPopulation { .. }))
        ));
    }

    fn seeded_config() -> SimulationConfig {
        SimulationConfig {
            honeycombs: 20,
            bees_per_honeycomb: 5,
            horizon: Horizon::Months(2),
            ..SimulationConfig::canonical()
        }
    }

    #[test]
    fn same_seed_same_outcome() {
        let run = || {
            let mut sim = Simulation::from_config(seeded_config()).unwrap();
            sim.run(&mut NullSink).unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn seeded_run_with_ample_reserve_completes() {
        let mut sim = Simulation::from_config(seeded_config()).unwrap();
        let outcome = sim.run(&mut NullSink).unwrap();
        assert!(!outcome.is_insolvent(), "3M reserve should carry 100 bees for 2 months: {outcome:?}");
        assert_eq!(outcome.events() as usize, sim.hive.claim_stats().count);
        for bee in sim.hive.bees() {
            assert!(bee.personal_reserve >= 0.0 && bee.pool_share >= 0.0);
        }
    }

    #[test]
    fn seeded_run_without_reserve_goes_insolvent() {
        // Low-premium bees cannot cover a ~500 claim themselves, and a cap of 1
        // per bee leaves the aggregate tier short, so the empty reserve is hit.
        let config = SimulationConfig {
            initial_reserve_fund: 0.0,
            max_charge: MaxChargePolicy::Constant(1.0),
            ..seeded_config()
        };
        let mut sim = Simulation::from_config(config).unwrap();
        let outcome = sim.run(&mut NullSink).unwrap();
        assert!(outcome.is_insolvent(), "expected insolvency, got {outcome:?}");
        assert_eq!(outcome.events() as usize, sim.hive.claim_stats().count);
    }

    #[test]
    fn seed_range_stops_at_the_last_seed() {
        assert_eq!(seed_range(7, 3), 7..10);
        assert_eq!(seed_range(u64::MAX - 1, 5), u64::MAX - 1..u64::MAX);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn day_horizon_logs_a_period_summary() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .finish();

        let sampler = scripted(&[2_000.0; 4], &[1], &[50.0], &[0]);
        let mut sim = Simulation::with_sampler(tiny_config(Horizon::Days(5), 100.0), sampler).unwrap();
        tracing::subscriber::with_default(subscriber, || sim.run(&mut NullSink).unwrap());

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        let line = text.lines().find(|l| l.contains("period closed")).expect("no period summary");
        assert!(line.contains("days=5"), "{line}");
        assert!(line.contains("events=1"), "{line}");
    }

    #[test]
    fn batch_runs_use_consecutive_seeds() {
        let results = run_batch(&seeded_config(), 7..10).unwrap();
        let seeds: Vec<u64> = results.iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec![7, 8, 9]);

        let mut single = Simulation::from_config(SimulationConfig { seed: 8, ..seeded_config() }).unwrap();
        assert_eq!(results[1].outcome, single.run(&mut NullSink).unwrap());
    }
}
