//! Domain-separated SHA-256 oracle.
//!
//! Every caller in this crate feeds the config seed as the first part and a
//! short literal domain tag as the second, so that two subsystems drawing
//! randomness for different purposes (link delay, leader election, tx
//! creation, ...) never collide even when fed the same remaining bytes.

use primitive_types::{U256, U512};
use sha2::{Digest, Sha256};

/// Concatenates `parts` and returns the raw 32-byte digest.
fn digest(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// SHA-256 of the concatenation of `parts`, as a 64-char lowercase hex string.
pub fn h_hex(parts: &[&[u8]]) -> String {
    hex::encode(digest(parts))
}

/// SHA-256 of the concatenation of `parts`, as a big-endian 256-bit integer.
pub fn h_int(parts: &[&[u8]]) -> U256 {
    U256::from_big_endian(&digest(parts))
}

/// Parses a hex block id (as produced by [`h_hex`]) back into a 256-bit
/// integer for the fork-choice tiebreak. Returns `U256::MAX` for malformed
/// input so a corrupt id never accidentally wins a tiebreak.
pub fn hex_to_u256(hex_str: &str) -> U256 {
    U256::from_str_radix(hex_str, 16).unwrap_or(U256::MAX)
}

/// `target = 2^256 / max(1, difficulty)`, widened to 512 bits since `2^256`
/// itself does not fit in a `U256` (it can arise when `difficulty == 1`).
pub fn target_for_difficulty(difficulty: u64) -> U512 {
    let denom = U512::from(difficulty.max(1));
    (U512::from(1u8) << 256) / denom
}

/// `true` iff the 256-bit hash value meets the PoW target for `difficulty`.
pub fn meets_target(hash: U256, difficulty: u64) -> bool {
    U512::from(hash) < target_for_difficulty(difficulty)
}

/// `work = 2^32 / max(1, difficulty)`, the per-block chain-weight contribution.
pub fn work_for_difficulty(difficulty: u64) -> u64 {
    (1u64 << 32) / difficulty.max(1)
}

/// Exact-integer firing threshold for the per-tick transaction probability
/// `p = rate * 2^256 / 10`, computed in `U512` rather than floating point.
/// `rate` is assumed to carry at most one decimal digit (true of the fixed
/// default of 2.0 tx/node/s), so `rate * 10` is an exact integer.
pub fn tick_fire_threshold(rate_per_sec: f64) -> U512 {
    let rate_tenths = (rate_per_sec * 10.0).round() as u64;
    U512::from(rate_tenths) * (U512::from(1u8) << 256) / U512::from(100u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_is_64_chars_and_lowercase() {
        let h = h_hex(&[b"seed-0", b"genesis"]);
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn deterministic_and_domain_separated() {
        let a = h_hex(&[b"seed-0", b"tick"]);
        let b = h_hex(&[b"seed-0", b"tick"]);
        let c = h_hex(&[b"seed-0", b"tx"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn h_int_matches_h_hex() {
        let parts: &[&[u8]] = &[b"seed-0", b"leader", &8u64.to_be_bytes()];
        let as_hex = h_hex(parts);
        let as_int = h_int(parts);
        assert_eq!(hex_to_u256(&as_hex), as_int);
    }

    #[test]
    fn target_shrinks_as_difficulty_grows() {
        let t1 = target_for_difficulty(1);
        let t_big = target_for_difficulty(1 << 18);
        assert!(t_big < t1);
    }

    #[test]
    fn work_is_inverse_of_difficulty() {
        assert_eq!(work_for_difficulty(1), 1u64 << 32);
        assert_eq!(work_for_difficulty(1 << 32), 1);
    }

    #[test]
    fn tick_threshold_is_monotonic_in_rate() {
        assert!(tick_fire_threshold(1.0) < tick_fire_threshold(2.0));
        assert!(tick_fire_threshold(0.0) == U512::zero());
    }
}
