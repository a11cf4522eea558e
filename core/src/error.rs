//! Fatal safety-invariant violations (§7). These are the only `Result::Err`
//! path in the consensus engine; everything else (orphan blocks, duplicate
//! attaches, failed PoW re-verification, partitioned messages) is a silent,
//! expected drop, not an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("finality conflict at height {height}: already final as {existing}, attempted {attempted}")]
    FinalityConflict {
        height: u64,
        existing: String,
        attempted: String,
    },
    #[error("negative balance during finalized replay: node {node} owes {amount} but has {balance}")]
    NegativeBalance {
        node: usize,
        amount: u64,
        balance: u64,
    },
    #[error("nonce mismatch during finalized replay: node {node} tx nonce {tx_nonce} expected {expected}")]
    NonceMismatch {
        node: usize,
        tx_nonce: u64,
        expected: u64,
    },
}
