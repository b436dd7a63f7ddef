//! Text histogram of per-honeycomb balances.
//!
//! Reads the `honeycombs.ndjson` snapshot a run leaves in its output
//! directory and prints one histogram for the personal reserve sums and one
//! for the pool share sums.

use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use clap::Parser;

use beehive::analysis::honeycomb_histograms;
use beehive::report::HoneycombBalance;

#[derive(Parser, Debug)]
#[command(name = "histogram")]
struct Cli {
    #[arg(default_value = "output/honeycombs.ndjson")]
    path: PathBuf,

    #[arg(long, default_value_t = 20)]
    bins: usize,

    /// Width of the fullest bar, in characters
    #[arg(long, default_value_t = 50)]
    width: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let file = File::open(&cli.path)
        .map_err(|e| format!("cannot open {}: {e}; run `beehive` first", cli.path.display()))?;

    let mut balances: Vec<HoneycombBalance> = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let balance = serde_json::from_str(&line)
            .map_err(|e| format!("line {}: {e}", line_no + 1))?;
        balances.push(balance);
    }

    println!("{} honeycombs from {}", balances.len(), cli.path.display());
    let (personal, pool) = honeycomb_histograms(&balances, cli.bins);
    if let Some(h) = personal {
        println!("\n=== Personal reserve per honeycomb ===\n{}", h.render(cli.width));
    }
    if let Some(h) = pool {
        println!("=== Pool share per honeycomb ===\n{}", h.render(cli.width));
    }
    Ok(())
}
