//! Error types

use thiserror::Error;

/// Persistence failure
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sled: {0}")]
    Sled(#[from] sled::Error),
    #[error("transaction: {0}")]
    Transaction(String),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
    #[error("corrupt key in tree {0}")]
    CorruptKey(&'static str),
    #[error("invalid bet: {0}")]
    InvalidBet(String),
}

impl From<sled::transaction::TransactionError<StoreError>> for StoreError {
    fn from(err: sled::transaction::TransactionError<StoreError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => StoreError::Sled(e),
        }
    }
}

/// Bets that do not partition `[1, pool]`
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RoundError {
    #[error("pool {0} without bets")]
    PoolWithoutBets(u64),
    #[error("bet with index 0")]
    ZeroIndex,
    #[error("indices not ascending: {prev} then {next}")]
    NotAscending { prev: u64, next: u64 },
    #[error("last index {last} != pool {pool}")]
    PoolMismatch { last: u64, pool: u64 },
    #[error("ticket {0} beyond last bet")]
    TicketBeyondLastBet(u64),
}

/// Chain client failure
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivery failure
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("delivery to {chat_id} failed: {reason}")]
    Delivery { chat_id: i64, reason: String },
}

/// Malformed block feed line
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeedError {
    #[error("expected `<height> <hash>`, got {0:?}")]
    Malformed(String),
    #[error("invalid height: {0}")]
    Height(String),
    #[error("invalid hash: {0}")]
    Hash(String),
}

#[derive(Error, Debug)]
pub enum LotteryError {
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Upstream(#[from] ChainError),
    #[error("prize pool is zero")]
    EmptyPool,
    #[error("inconsistent round: {0}")]
    InconsistentRound(#[from] RoundError),
    #[error("payout channel closed")]
    PayoutClosed,
}

/// Attach the failing operation to a store error
pub trait StoreContext<T> {
    fn context(self, context: &'static str) -> Result<T, LotteryError>;
}

impl<T> StoreContext<T> for Result<T, StoreError> {
    fn context(self, context: &'static str) -> Result<T, LotteryError> {
        self.map_err(|source| LotteryError::Store { context, source })
    }
}
