use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beehive::analysis::{self, BatchStats, DistStats};
use beehive::config::{self, Horizon, SimulationConfig};
use beehive::report::{SnapshotWriter, honeycomb_balances};
use beehive::simulation::{self, RunOutcome, RunResult, Simulation};

/// Simulate a mutual-aid hive paying claims out of its tiered funds.
#[derive(Parser, Debug)]
#[command(name = "beehive")]
struct Cli {
    /// JSON config file; defaults to the canonical parameters
    #[arg(long, conflicts_with = "scenario")]
    config: Option<PathBuf>,

    /// Named scenario (canonical, constant-cap, gamma-severity, thin-reserve, large-honeycombs)
    #[arg(long)]
    scenario: Option<String>,

    #[arg(long)]
    seed: Option<u64>,

    /// Horizon in 30-day months
    #[arg(long, conflicts_with = "days")]
    months: Option<u32>,

    /// Horizon in days
    #[arg(long)]
    days: Option<u32>,

    /// Run N independent seeds in parallel and print cross-run statistics
    #[arg(long)]
    runs: Option<u64>,

    /// Directory for snapshot files (single run)
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Per-run CSV (batch mode)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Histogram buckets
    #[arg(long, default_value_t = 20)]
    bins: usize,

    #[arg(long)]
    quiet: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = base_config(&cli)?;
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    if let Some(m) = cli.months {
        config.horizon = Horizon::Months(m);
    }
    if let Some(d) = cli.days {
        config.horizon = Horizon::Days(d);
    }
    config.validate()?;

    match cli.runs {
        Some(n) => run_many(&config, n, &cli),
        None => run_once(config, &cli),
    }
}

fn base_config(cli: &Cli) -> Result<SimulationConfig, Box<dyn Error>> {
    if let Some(path) = &cli.config {
        return Ok(SimulationConfig::from_json_file(path)?);
    }
    match &cli.scenario {
        None => Ok(SimulationConfig::canonical()),
        Some(name) => config::scenarios()
            .into_iter()
            .find(|s| s.name == name.as_str())
            .map(|s| s.config)
            .ok_or_else(|| format!("unknown scenario {name:?}").into()),
    }
}

fn run_once(config: SimulationConfig, cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut sim = Simulation::from_config(config)?;
    let mut writer = SnapshotWriter::new(&cli.output_dir)?;
    let outcome = sim.run(&mut writer)?;

    if cli.quiet {
        return Ok(());
    }

    match outcome {
        RunOutcome::Completed { days, events, charged } => {
            println!("Completed {days} days: {events} claims, {charged:.0} charged");
        }
        RunOutcome::Insolvent { day, month, events, charged, shortfall } => {
            println!(
                "INSOLVENT on day {} (month {}) after {events} claims, {charged:.0} charged; \
                 last shortfall {shortfall:.0}",
                day.0, month.0
            );
        }
    }

    let s = sim.summary();
    println!("\n=== Hive summary ===");
    println!("  Honeycombs x bees:     {} x {}", s.honeycombs, s.bees_per_honeycomb);
    println!("  Pool ratio:            {}", s.pool_ratio);
    match s.max_charge_param {
        Some(p) => println!("  Max charge parameter:  {p}"),
        None => println!("  Max charge parameter:  unlimited"),
    }
    println!("  Reserve fund:          {:.0}", s.reserve_fund);
    println!("  Total personal:        {:.0}", s.total_personal_reserve);
    println!("  Total pool share:      {:.0}", s.total_pool_share);
    println!("  Claims:                {} totalling {:.0}", s.total_claim_count, s.total_claim_amount);

    let (personal, pool) = analysis::honeycomb_histograms(&honeycomb_balances(&sim.hive), cli.bins);
    if let Some(h) = personal {
        println!("\n=== Honeycomb personal reserve ===\n{}", h.render(50));
    }
    if let Some(h) = pool {
        println!("=== Honeycomb pool share ===\n{}", h.render(50));
    }
    println!("Snapshots written to {}", writer.dir().display());
    Ok(())
}

fn run_many(config: &SimulationConfig, n: u64, cli: &Cli) -> Result<(), Box<dyn Error>> {
    let start = config.seed;
    let results = simulation::run_batch(config, simulation::seed_range(start, n))?;

    if let Some(path) = &cli.csv {
        write_runs_csv(&results, path)?;
    }
    if cli.quiet {
        return Ok(());
    }

    let stats = analysis::analyse_batch(&results);
    print_batch(&stats);
    Ok(())
}

fn write_runs_csv(results: &[RunResult], path: &Path) -> Result<(), Box<dyn Error>> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "seed,insolvent,month,events,reserve_fund,total_personal_reserve,total_pool_share,total_claim_amount")?;
    for r in results {
        let month = match r.outcome {
            RunOutcome::Insolvent { month, .. } => month.0.to_string(),
            RunOutcome::Completed { .. } => String::new(),
        };
        writeln!(
            w,
            "{},{},{},{},{:.2},{:.2},{:.2},{:.2}",
            r.seed,
            r.outcome.is_insolvent(),
            month,
            r.outcome.events(),
            r.summary.reserve_fund,
            r.summary.total_personal_reserve,
            r.summary.total_pool_share,
            r.summary.total_claim_amount,
        )?;
    }
    w.flush()?;
    Ok(())
}

fn print_batch(stats: &BatchStats) {
    println!("\n=== Multi-run distribution (N={} runs) ===", stats.runs);
    println!(
        "  Insolvent runs: {} ({:.1}%)",
        stats.insolvent_runs,
        stats.insolvency_rate() * 100.0
    );
    println!(
        "{:>18} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12}",
        "", "min", "p5", "p50", "p95", "max", "mean", "stddev"
    );
    print_dist_row("Final reserve", stats.final_reserve.as_ref());
    print_dist_row("Claim events", stats.claim_events.as_ref());
    print_dist_row("Insolvency month", stats.insolvency_month.as_ref());
}

fn print_dist_row(label: &str, ds: Option<&DistStats>) {
    match ds {
        Some(ds) => println!(
            "{:>18} | {:>12.1} | {:>12.1} | {:>12.1} | {:>12.1} | {:>12.1} | {:>12.1} | {:>12.1}",
            label, ds.min, ds.p5, ds.p50, ds.p95, ds.max, ds.mean, ds.std_dev
        ),
        None => println!("{label:>18} | {:>12}", "-"),
    }
}
