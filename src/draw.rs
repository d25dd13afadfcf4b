//! Winner derivation from a block hash
//!
//! The hash is consumed from its tail in 2-byte windows, one per tier:
//!
//! ```text
//! byte:   0 ......... 15 | 16 17 | ... | 28 29 | 30 31
//! tier:      unused      |   8   | ... |   2   |   1
//! ```
//!
//! For each window the higher-index byte is the base and the lower-index byte
//! the exponent:
//!
//! ```text
//! ticket = (hash[hi] ^ hash[hi-1]) mod pool + 1
//! ```
//!
//! The ticket falls in `[1, pool]` and selects the bet whose range contains it.

use crate::error::{LotteryError, RoundError};
use crate::prize::prizes;
use crate::types::{Bet, Hash, Round, Winner, HASH_SIZE, TIERS, WINDOW_SIZE};
use num_bigint::BigUint;
use num_traits::ToPrimitive;

/// `(base ^ exp) mod pool + 1`
///
/// Returns `None` for an empty pool.
pub fn winning_ticket(base: u8, exp: u8, pool: u64) -> Option<u64> {
    if pool == 0 {
        return None;
    }

    let modulus = BigUint::from(pool);
    // modpow with a zero exponent may return 1 unreduced
    let r = BigUint::from(base).modpow(&BigUint::from(exp), &modulus) % &modulus;
    // r < pool <= u64::MAX, so r + 1 fits
    r.to_u64().map(|r| r + 1)
}

/// Base and exponent bytes for `tier` (0 = first prize)
pub fn tier_window(hash: &Hash, tier: usize) -> (u8, u8) {
    debug_assert!(tier < TIERS);
    let hi = HASH_SIZE - 1 - tier * WINDOW_SIZE;
    (hash[hi], hash[hi - 1])
}

/// Position of the bet owning `ticket`: the first bet whose index is `>= ticket`
///
/// `bets` must be sorted ascending by index.
pub fn locate_bet(bets: &[Bet], ticket: u64) -> Option<usize> {
    let pos = bets.partition_point(|bet| bet.index < ticket);
    (pos < bets.len()).then_some(pos)
}

/// Draw all tier winners for a validated round.
///
/// Pure: the same hash and round always give the same winners.
pub fn draw_winners(hash: &Hash, round: &Round) -> Result<[Winner; TIERS], LotteryError> {
    if round.pool == 0 {
        return Err(LotteryError::EmptyPool);
    }
    round.validate()?;

    let mut winners = Vec::with_capacity(TIERS);
    for (tier, prize) in prizes(round.pool).into_iter().enumerate() {
        let (base, exp) = tier_window(hash, tier);
        let ticket = winning_ticket(base, exp, round.pool).ok_or(LotteryError::EmptyPool)?;
        let pos = locate_bet(&round.bets, ticket)
            .ok_or(RoundError::TicketBeyondLastBet(ticket))?;

        winners.push(Winner {
            participant: round.bets[pos].participant.clone(),
            ticket,
            prize,
            expired: false,
        });
    }

    // exactly TIERS pushes above
    Ok(std::array::from_fn(|tier| winners[tier].clone()))
}
