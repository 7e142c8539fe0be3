use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use penny_core::PennyParamsInput;

use penny_sim::environment::{run_single_flow_scenario, ScenarioSpec};
use penny_sim::montecarlo::{self, MonteCarloConfig};
use penny_sim::persistence::persist_result;
use penny_sim::random::StdRandom;

#[derive(Parser)]
#[command(name = "penny-sim", about = "Synthetic driver and validator for the Penny detector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive a single synthetic flow through the detector and report the outcome.
    Run {
        /// TOML file resolving to a `PennyParamsInput`.
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value = "synthetic-flow")]
        flow_id: String,
        #[arg(long, default_value_t = 2000)]
        packets: u32,
        #[arg(long, default_value_t = 1000)]
        payload_size: u32,
        #[arg(long)]
        retransmits: bool,
        #[arg(long, default_value_t = 1)]
        duplicate_factor: u32,
        #[arg(long)]
        reorder: bool,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        results_dir: Option<PathBuf>,
        #[arg(long, default_value = "ad-hoc")]
        experiment_folder: String,
        #[arg(long, default_value = "topo0")]
        topo_id: String,
    },
    /// Reproduce the theoretical Monte-Carlo classification-probability table.
    Montecarlo {
        #[arg(long, default_value_t = 1_000_000)]
        runs: u64,
        #[arg(long, default_value_t = 400)]
        max_n: usize,
        #[arg(long, default_value_t = 50)]
        max_dups: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    penny_core::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            flow_id,
            packets,
            payload_size,
            retransmits,
            duplicate_factor,
            reorder,
            seed,
            results_dir,
            experiment_folder,
            topo_id,
        } => {
            let raw = std::fs::read_to_string(&config)
                .with_context(|| format!("reading config file {}", config.display()))?;
            let input: PennyParamsInput =
                toml::from_str(&raw).with_context(|| format!("parsing config file {}", config.display()))?;
            let params = input.resolve().context("validating detector configuration")?;

            let spec = ScenarioSpec {
                flow_id,
                packet_count: packets,
                payload_size,
                retransmits_drops: retransmits,
                duplicate_factor,
                reorder,
                seed,
            };
            let outcome = run_single_flow_scenario(params, &spec);
            println!(
                "aggr_outcome={:?} final_outcome={:?} packets_sent={}",
                outcome.aggr_outcome, outcome.final_outcome, outcome.packets_sent
            );

            if let Some(dir) = results_dir {
                persist_result(
                    &dir,
                    &experiment_folder,
                    &topo_id,
                    params.drop_probability,
                    seed,
                    &outcome.export,
                );
            }
            Ok(())
        }
        Command::Montecarlo {
            runs,
            max_n,
            max_dups,
            seed,
        } => {
            let cfg = MonteCarloConfig { runs, max_n, max_dups };
            let mut rng = StdRandom::seed_from_u64(seed);
            let rows = montecarlo::run(&cfg, &mut rng);
            println!("n\td\ttot\tmax_dups\tbidir\tnon_bidir\tundecided");
            for row in rows {
                println!(
                    "{}\t{}\t{}\t{:.6}\t{:.6}\t{:.6}\t{:.6}",
                    row.n,
                    row.d,
                    row.total,
                    row.max_dups_prob,
                    row.bidir_prob,
                    row.non_bidir_prob,
                    row.undecided_prob
                );
            }
            Ok(())
        }
    }
}
