//! Store seams used by the lottery

use crate::error::StoreError;
use crate::types::{Bet, Destination, Round, Winner, WinnerRecord};
use chrono::{DateTime, Utc};

pub trait BetStore {
    /// Active bets sorted ascending by index
    fn list(&self) -> Result<Vec<Bet>, StoreError>;

    /// Sum of active wagers (the last bet's index)
    fn aggregate_pool(&self) -> Result<u64, StoreError>;

    /// Snapshot the active round and clear it in one transaction.
    ///
    /// Bets placed concurrently land either in the returned round or in the
    /// next one.
    fn take_round(&self) -> Result<Round, StoreError>;

    /// Drop every active bet
    fn reset_all(&self) -> Result<(), StoreError> {
        self.take_round().map(|_| ())
    }

    /// Add a wager of `amount` tickets, returning the bet's index
    fn place_bet(&self, participant: &str, amount: u64) -> Result<u64, StoreError>;
}

pub trait WinnerStore {
    fn add(&self, height: u32, pool: u64, winners: &[Winner]) -> Result<(), StoreError>;

    /// Mark unclaimed prizes from draws below `older_than` as expired
    fn expire_prizes(&self, older_than: u32) -> Result<usize, StoreError>;

    fn winners_at(&self, height: u32) -> Result<Vec<WinnerRecord>, StoreError>;

    /// Record a payout; claimed prizes never expire.
    /// Returns false if the record does not exist or already expired.
    fn claim(&self, height: u32, tier: u8) -> Result<bool, StoreError>;
}

pub trait TargetStore {
    /// Highest scheduled height, 0 if none
    fn next_height(&self) -> Result<u32, StoreError>;
    fn add_height(&self, height: u32) -> Result<(), StoreError>;
    fn delete_height(&self, height: u32) -> Result<(), StoreError>;
}

pub trait NotificationStore {
    /// `None` when the participant has not opted in
    fn destination(&self, participant: &str) -> Result<Option<Destination>, StoreError>;
    fn subscribe(&self, participant: &str, destination: Destination) -> Result<(), StoreError>;
    fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    fn expire_stale(&self) -> Result<usize, StoreError> {
        self.expire_stale_at(Utc::now())
    }
}

/// Everything the lottery needs from persistence
pub trait Store: BetStore + WinnerStore + TargetStore + NotificationStore + Send + Sync {}

impl<T> Store for T where T: BetStore + WinnerStore + TargetStore + NotificationStore + Send + Sync {}
