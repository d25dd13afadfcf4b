//! Core lottery types and constants

use crate::error::RoundError;
use serde::{Deserialize, Serialize};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Number of prize tiers drawn per block
pub const TIERS: usize = 8;

/// Block hash size in bytes
pub const HASH_SIZE: usize = 32;

/// Bytes of the hash consumed per tier
pub const WINDOW_SIZE: usize = 2;

/// Capacity shown to users is the remote balance divided by this
pub const CAPACITY_DIVISOR: u64 = 5;

/// Draw cycles a prize stays claimable before it expires
pub const PRIZE_RETENTION_CYCLES: u32 = 3;

/// Default blocks between draws (~1 day of bitcoin blocks)
pub const DEFAULT_DURATION_BLOCKS: u32 = 144;

pub type Hash = [u8; HASH_SIZE];

// =============================================================================
// ROUND STATE
// =============================================================================

/// A wager. `index` is the cumulative upper bound of the participant's
/// ticket range: the range is `(previous.index, index]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub participant: String,
    pub index: u64,
}

impl Bet {
    pub fn new(participant: impl Into<String>, index: u64) -> Self {
        Self {
            participant: participant.into(),
            index,
        }
    }
}

/// Active bets and the pool they add up to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub bets: Vec<Bet>,
    pub pool: u64,
}

impl Round {
    pub fn is_empty(&self) -> bool {
        self.bets.is_empty()
    }

    /// Append a bet of `amount` tickets, returning its index
    pub fn push(&mut self, participant: impl Into<String>, amount: u64) -> Option<u64> {
        let index = self.pool.checked_add(amount)?;
        self.bets.push(Bet::new(participant, index));
        self.pool = index;
        Some(index)
    }

    /// Check that bets partition `[1, pool]`: strictly ascending indices,
    /// the first one at least 1 and the last one equal to the pool.
    pub fn validate(&self) -> Result<(), RoundError> {
        let Some(last) = self.bets.last() else {
            return if self.pool == 0 {
                Ok(())
            } else {
                Err(RoundError::PoolWithoutBets(self.pool))
            };
        };

        if self.bets[0].index == 0 {
            return Err(RoundError::ZeroIndex);
        }
        if let Some(w) = self.bets.windows(2).find(|w| w[0].index >= w[1].index) {
            return Err(RoundError::NotAscending {
                prev: w[0].index,
                next: w[1].index,
            });
        }
        if last.index != self.pool {
            return Err(RoundError::PoolMismatch {
                last: last.index,
                pool: self.pool,
            });
        }
        Ok(())
    }
}

// =============================================================================
// DRAW RESULTS
// =============================================================================

/// A winning ticket and the prize attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub participant: String,
    /// 1-based winning index in `[1, pool]`
    pub ticket: u64,
    pub prize: u64,
    pub expired: bool,
}

/// Persisted winner, tagged with the draw it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub height: u32,
    /// 0 = first prize
    pub tier: u8,
    /// Pool value frozen at draw time
    pub pool: u64,
    pub winner: Winner,
}

/// One completed draw, handed to the payout subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draw {
    pub height: u32,
    pub pool: u64,
    pub winners: [Winner; TIERS],
}

// =============================================================================
// UPSTREAM / STATUS
// =============================================================================

/// New block notification as delivered by the chain client.
/// The hash is in reversed byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEvent {
    pub height: u32,
    pub hash: Hash,
}

impl BlockEvent {
    /// Hash in canonical byte order
    pub fn canonical_hash(&self) -> Hash {
        let mut hash = self.hash;
        hash.reverse();
        hash
    }
}

/// Lottery status snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub prize_pool: u64,
    pub capacity: u64,
    pub next_height: u32,
}

/// Opt-in notification subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: i64,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}
