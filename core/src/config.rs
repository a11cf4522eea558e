//! Simulation tunables, and the validation that must pass before a run
//! starts (§7's "configuration errors" class — rejected up front, never as a
//! mid-run fatal).

use thiserror::Error;

use crate::model::Algo;

/// A partition window: only intra-group links carry traffic while
/// `start_ms <= t_ms < end_ms`. An empty `groups` list disables the
/// partition even inside the window (§8 boundary behavior).
#[derive(Debug, Clone)]
pub struct PartitionSchedule {
    pub start_ms: u64,
    pub end_ms: u64,
    pub groups: Vec<Vec<usize>>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub seed: String,
    pub algo: Algo,
    pub k_final: u64,
    pub n_nodes: usize,
    pub base_delay_ms: u64,
    pub jitter_ms: u64,
    pub sim_time_limit_ms: u64,
    #[allow(dead_code)] // informational only, per spec §6
    pub target_block_ms: u64,
    pub pow_difficulty: u64,
    pub hybrid_difficulty: u64,
    pub partition: Option<PartitionSchedule>,
    pub tx_rate_per_node_per_sec: f64,
    pub init_balance: u64,
    pub log_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            seed: "seed-0".to_string(),
            algo: Algo::Pow,
            k_final: 4,
            n_nodes: 5,
            base_delay_ms: 40,
            jitter_ms: 60,
            sim_time_limit_ms: 12_000,
            target_block_ms: 250,
            pow_difficulty: 1 << 18,
            hybrid_difficulty: 1 << 10,
            partition: None,
            tx_rate_per_node_per_sec: 2.0,
            init_balance: 1000,
            log_path: "log.jsonl".to_string(),
        }
    }
}

/// Applies the `--delay` flag: larger base delay and jitter.
pub const DELAYED_BASE_DELAY_MS: u64 = 60;
pub const DELAYED_JITTER_MS: u64 = 80;

/// Applies the `--partition` flag: the fixed default partition window.
pub const DEFAULT_PARTITION_START_MS: u64 = 3000;
pub const DEFAULT_PARTITION_END_MS: u64 = 6000;

pub fn default_partition_groups() -> Vec<Vec<usize>> {
    vec![vec![0, 1, 2], vec![3, 4]]
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sim_time_limit_ms must be positive, got {0}")]
    NonPositiveLimit(u64),
    #[error("seed must be non-empty")]
    EmptySeed,
    #[error("partition window start_ms ({start}) must be before end_ms ({end})")]
    InvalidPartitionWindow { start: u64, end: u64 },
    #[error("n_nodes must be at least 2, got {0}")]
    TooFewNodes(usize),
    #[error("algo must be pow or hybrid, genesis is not a configurable production algorithm")]
    GenesisNotProducible,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sim_time_limit_ms == 0 {
            return Err(ConfigError::NonPositiveLimit(self.sim_time_limit_ms));
        }
        if self.seed.is_empty() {
            return Err(ConfigError::EmptySeed);
        }
        if self.n_nodes < 2 {
            return Err(ConfigError::TooFewNodes(self.n_nodes));
        }
        if matches!(self.algo, Algo::Genesis) {
            return Err(ConfigError::GenesisNotProducible);
        }
        if let Some(p) = &self.partition {
            if p.start_ms >= p.end_ms {
                return Err(ConfigError::InvalidPartitionWindow {
                    start: p.start_ms,
                    end: p.end_ms,
                });
            }
        }
        Ok(())
    }

    pub fn difficulty_for(&self, algo: Algo) -> u64 {
        match algo {
            Algo::Pow => self.pow_difficulty,
            Algo::Hybrid => self.hybrid_difficulty,
            Algo::Genesis => 1,
        }
    }
}
