//! Immutable wire/domain types: transactions and blocks.

use serde::{Deserialize, Serialize};

/// Which block-production algorithm produced a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algo {
    Genesis,
    Pow,
    Hybrid,
}

impl Algo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algo::Genesis => "genesis",
            Algo::Pow => "pow",
            Algo::Hybrid => "hybrid",
        }
    }
}

/// A value transfer from `from` to `to`, ordered by `nonce` within the sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub from: usize,
    pub to: usize,
    pub amount: u64,
    pub nonce: u64,
    pub tid: String,
}

/// An immutable block. Once constructed, never mutated — a `recv_block`
/// carries an owned copy rather than a shared handle (§5 of the spec:
/// blocks cross node boundaries by value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub parent: String,
    pub height: u64,
    pub proposer: i64,
    pub algo: Algo,
    pub difficulty: u64,
    pub stake_epoch: u64,
    pub rnd_tag: String,
    pub nonce: u64,
    pub txs: Vec<Tx>,
    pub bhash: String,
    pub work: u64,
}

impl Block {
    /// The ASCII header pre-image hashed (together with the nonce) to
    /// produce `bhash`.
    pub fn header(parent: &str, height: u64, proposer: i64, algo: Algo) -> String {
        format!("{parent}|{height}|{proposer}|{algo}", algo = algo.as_str())
    }
}
