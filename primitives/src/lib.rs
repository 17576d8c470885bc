//! LYRA2 Core Primitives
//!
//! Chain-wide constants and the difficulty/target arithmetic shared by the
//! consensus engine and the node.

#![cfg_attr(not(feature = "std"), no_std)]

pub use primitive_types::{H256, U256};

/// Block time in milliseconds: 2.5 seconds
pub const BLOCK_TIME_MS: u64 = 2_500;

/// Lowest accepted difficulty; anything below is clamped up to it
pub const MIN_DIFFICULTY: u128 = 1;

/// Easiest possible target (difficulty 1)
pub const POW_LIMIT: H256 = H256::repeat_byte(0xff);

pub type BlockNumber = u64;

/// Convert difficulty to target: `POW_LIMIT / difficulty`, never zero.
pub fn difficulty_to_target(difficulty: u128) -> H256 {
    let d = difficulty.max(MIN_DIFFICULTY);

    let pow_u = U256::from_big_endian(POW_LIMIT.as_bytes());
    let mut target_u = pow_u / U256::from(d);

    if target_u.is_zero() {
        target_u = U256::one();
    }

    let mut target_be = [0u8; 32];
    target_u.to_big_endian(&mut target_be);
    H256::from(target_be)
}

/// Hash meets target when, read as a big-endian integer, it is not above it.
pub fn hash_meets_target(hash: &H256, target: &H256) -> bool {
    hash <= target
}
