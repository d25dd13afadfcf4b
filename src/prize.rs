//! Prize split — 8 geometric tiers
//!
//! Tier k (0-based) receives `pool / 2^(k+1)`:
//!
//! | Tier | Share      |
//! |------|------------|
//! | 1    | 50%        |
//! | 2    | 25%        |
//! | 3    | 12.5%      |
//! | 4    | 6.25%      |
//! | 5    | 3.125%     |
//! | 6    | 1.5625%    |
//! | 7    | 0.78125%   |
//! | 8    | 0.390625%  |
//!
//! Total 99.609375% (255/256). The remainder stays unallocated.
//! The last tier is also the operator fee.
//!
//! Rounding: nearest integer, ties up, computed exactly in integer arithmetic.

use crate::types::TIERS;

/// Tier shares in percent, highest first
pub const TIER_PERCENT: [f64; TIERS] = [
    50.0, 25.0, 12.5, 6.25, 3.125, 1.5625, 0.78125, 0.390625,
];

/// Prize for `tier` (0 = first prize) out of `pool`
pub fn tier_prize(tier: usize, pool: u64) -> u64 {
    debug_assert!(tier < TIERS);
    let shift = tier as u32 + 1;
    let half = 1u128 << tier;
    ((pool as u128 + half) >> shift) as u64
}

/// All tier prizes for `pool`
pub fn prizes(pool: u64) -> [u64; TIERS] {
    std::array::from_fn(|tier| tier_prize(tier, pool))
}
