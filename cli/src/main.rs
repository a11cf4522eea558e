//! Command-line entry point: parses flags, builds and validates a
//! [`Config`], runs the simulation, and maps a fatal invariant violation to
//! a non-zero exit code (§6, §7).

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use consensus_sim_core::config::{
    default_partition_groups, Config, PartitionSchedule, DEFAULT_PARTITION_END_MS,
    DEFAULT_PARTITION_START_MS, DELAYED_BASE_DELAY_MS, DELAYED_JITTER_MS,
};
use consensus_sim_core::log::FileLogger;
use consensus_sim_core::model::Algo;
use consensus_sim_core::Simulation;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AlgoArg {
    Pow,
    Hybrid,
}

impl From<AlgoArg> for Algo {
    fn from(a: AlgoArg) -> Self {
        match a {
            AlgoArg::Pow => Algo::Pow,
            AlgoArg::Hybrid => Algo::Hybrid,
        }
    }
}

/// Deterministic discrete-event simulator of a small PoW / hybrid-PoW
/// consensus network.
#[derive(Debug, Parser)]
#[command(name = "consensus-sim", about = "Deterministic consensus network simulator")]
struct Cli {
    /// Block-production algorithm.
    #[arg(long, value_enum, default_value_t = AlgoArg::Pow)]
    algo: AlgoArg,

    /// RNG domain seed; identical seed + config reproduces the same log byte-for-byte.
    #[arg(long, default_value = "seed-0")]
    seed: String,

    /// Finality depth.
    #[arg(long, default_value_t = 4)]
    k: u64,

    /// Simulated time horizon, in milliseconds.
    #[arg(long, default_value_t = 12_000)]
    limit_ms: u64,

    /// Use a larger base delay (60ms) and jitter (80ms) on every link.
    #[arg(long, default_value_t = false)]
    delay: bool,

    /// Partition nodes [0,1,2] from [3,4] during [3000ms, 6000ms).
    #[arg(long, default_value_t = false)]
    partition: bool,

    /// Path to the JSON-Lines domain log.
    #[arg(long, default_value = "log.jsonl")]
    log: String,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut cfg = Config {
            seed: self.seed,
            algo: self.algo.into(),
            k_final: self.k,
            sim_time_limit_ms: self.limit_ms,
            log_path: self.log,
            ..Config::default()
        };

        if self.delay {
            cfg.base_delay_ms = DELAYED_BASE_DELAY_MS;
            cfg.jitter_ms = DELAYED_JITTER_MS;
        }
        if self.partition {
            cfg.partition = Some(PartitionSchedule {
                start_ms: DEFAULT_PARTITION_START_MS,
                end_ms: DEFAULT_PARTITION_END_MS,
                groups: default_partition_groups(),
            });
        }

        cfg
    }
}

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Parses flags, validates the config, and opens the log file — the
/// startup half of the binary, where `anyhow` carries whatever error
/// surfaces (matching the teacher's `run(self) -> anyhow::Result<..>`
/// commands). The simulation's own fatal invariant violations are handled
/// separately below since they still need an `ExitCode`, not a bail-out.
fn run() -> anyhow::Result<ExitCode> {
    init_tracing();

    let cfg = Cli::parse().into_config();
    cfg.validate().context("invalid configuration")?;

    tracing::info!(
        algo = ?cfg.algo,
        seed = %cfg.seed,
        k = cfg.k_final,
        limit_ms = cfg.sim_time_limit_ms,
        log = %cfg.log_path,
        "starting simulation"
    );

    let log_path = cfg.log_path.clone();
    let mut logger = FileLogger::create(&log_path)
        .with_context(|| format!("failed to open log file {log_path}"))?;

    let mut sim = Simulation::new(cfg);
    let result = sim.run(&mut logger);
    logger.flush();

    Ok(match result {
        Ok(()) => {
            tracing::info!("simulation completed cleanly");
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(%err, "fatal invariant violation");
            eprintln!("fatal invariant violation: {err}");
            ExitCode::FAILURE
        }
    })
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
