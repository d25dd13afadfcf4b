//! Persistent storage (sled)
//!
//! Trees:
//! - `round`: single key holding the active [`Round`]
//! - `winners`: `height(BE u32) ‖ tier(u8)` → [`WinnerRecord`]
//! - `targets`: `height(BE u32)` → empty
//! - `notifications`: participant → [`Destination`]
//!
//! Keys are big-endian so sled's byte ordering is numeric ordering.

use crate::error::StoreError;
use crate::store::{BetStore, NotificationStore, TargetStore, WinnerStore};
use crate::types::{Bet, Destination, Round, Winner, WinnerRecord};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::ConflictableTransactionError;
use std::path::Path;

const ROUND_KEY: &[u8] = b"active";

pub struct Storage {
    db: sled::Db,
    round: sled::Tree,
    winners: sled::Tree,
    targets: sled::Tree,
    notifications: sled::Tree,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            round: db.open_tree("round")?,
            winners: db.open_tree("winners")?,
            targets: db.open_tree("targets")?,
            notifications: db.open_tree("notifications")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn load_round(&self) -> Result<Round, StoreError> {
        match self.round.get(ROUND_KEY)? {
            Some(bytes) => decode(&bytes),
            None => Ok(Round::default()),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(bytes)?)
}

fn winner_key(height: u32, tier: u8) -> [u8; 5] {
    let mut key = [0u8; 5];
    key[..4].copy_from_slice(&height.to_be_bytes());
    key[4] = tier;
    key
}

fn height_from_key(key: &[u8], tree: &'static str) -> Result<u32, StoreError> {
    let bytes: [u8; 4] = key.try_into().map_err(|_| StoreError::CorruptKey(tree))?;
    Ok(u32::from_be_bytes(bytes))
}

// =============================================================================
// BETS
// =============================================================================

impl BetStore for Storage {
    fn list(&self) -> Result<Vec<Bet>, StoreError> {
        Ok(self.load_round()?.bets)
    }

    fn aggregate_pool(&self) -> Result<u64, StoreError> {
        Ok(self.load_round()?.pool)
    }

    fn take_round(&self) -> Result<Round, StoreError> {
        let taken = self.round.transaction(|tx| {
            let bytes = tx.remove(ROUND_KEY)?;
            Ok::<_, ConflictableTransactionError<StoreError>>(bytes)
        })?;

        match taken {
            Some(bytes) => decode(&bytes),
            None => Ok(Round::default()),
        }
    }

    fn place_bet(&self, participant: &str, amount: u64) -> Result<u64, StoreError> {
        if amount == 0 {
            return Err(StoreError::InvalidBet("zero amount".into()));
        }

        let index = self.round.transaction(|tx| {
            let mut round: Round = match tx.get(ROUND_KEY)? {
                Some(bytes) => decode(&bytes).map_err(ConflictableTransactionError::Abort)?,
                None => Round::default(),
            };
            let index = round.push(participant, amount).ok_or_else(|| {
                ConflictableTransactionError::Abort(StoreError::InvalidBet("pool overflow".into()))
            })?;
            tx.insert(ROUND_KEY, encode(&round).map_err(ConflictableTransactionError::Abort)?)?;
            Ok::<_, ConflictableTransactionError<StoreError>>(index)
        })?;

        Ok(index)
    }
}

// =============================================================================
// WINNERS
// =============================================================================

impl WinnerStore for Storage {
    fn add(&self, height: u32, pool: u64, winners: &[Winner]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for (tier, winner) in winners.iter().enumerate() {
            let tier = u8::try_from(tier)
                .map_err(|_| StoreError::InvalidBet(format!("tier {tier} out of range")))?;
            let record = WinnerRecord {
                height,
                tier,
                pool,
                winner: winner.clone(),
            };
            batch.insert(&winner_key(height, tier)[..], encode(&record)?);
        }
        self.winners.apply_batch(batch)?;
        Ok(())
    }

    fn expire_prizes(&self, older_than: u32) -> Result<usize, StoreError> {
        let mut batch = sled::Batch::default();
        let mut expired = 0;

        for item in self.winners.range(..older_than.to_be_bytes()) {
            let (key, value) = item?;
            let mut record: WinnerRecord = decode(&value)?;
            if record.winner.expired || record.winner.prize == 0 {
                continue;
            }
            record.winner.expired = true;
            batch.insert(key, encode(&record)?);
            expired += 1;
        }

        if expired > 0 {
            self.winners.apply_batch(batch)?;
        }
        Ok(expired)
    }

    fn winners_at(&self, height: u32) -> Result<Vec<WinnerRecord>, StoreError> {
        self.winners
            .scan_prefix(height.to_be_bytes())
            .map(|item| decode(&item?.1))
            .collect()
    }

    fn claim(&self, height: u32, tier: u8) -> Result<bool, StoreError> {
        let key = winner_key(height, tier);
        let claimed = self.winners.transaction(|tx| {
            let Some(bytes) = tx.get(key)? else {
                return Ok(false);
            };
            let mut record: WinnerRecord =
                decode(&bytes).map_err(ConflictableTransactionError::Abort)?;
            if record.winner.expired {
                return Ok(false);
            }
            record.winner.prize = 0;
            tx.insert(&key[..], encode(&record).map_err(ConflictableTransactionError::Abort)?)?;
            Ok::<_, ConflictableTransactionError<StoreError>>(true)
        })?;
        Ok(claimed)
    }
}

// =============================================================================
// TARGET HEIGHTS
// =============================================================================

impl TargetStore for Storage {
    fn next_height(&self) -> Result<u32, StoreError> {
        match self.targets.last()? {
            Some((key, _)) => height_from_key(&key, "targets"),
            None => Ok(0),
        }
    }

    fn add_height(&self, height: u32) -> Result<(), StoreError> {
        self.targets.insert(height.to_be_bytes(), sled::IVec::default())?;
        Ok(())
    }

    fn delete_height(&self, height: u32) -> Result<(), StoreError> {
        self.targets.remove(height.to_be_bytes())?;
        Ok(())
    }
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

impl NotificationStore for Storage {
    fn destination(&self, participant: &str) -> Result<Option<Destination>, StoreError> {
        self.notifications
            .get(participant.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn subscribe(&self, participant: &str, destination: Destination) -> Result<(), StoreError> {
        self.notifications
            .insert(participant.as_bytes(), encode(&destination)?)?;
        Ok(())
    }

    fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut batch = sled::Batch::default();
        let mut removed = 0;

        for item in self.notifications.iter() {
            let (key, value) = item?;
            let destination: Destination = decode(&value)?;
            if destination.expires_at <= now {
                batch.remove(key);
                removed += 1;
            }
        }

        if removed > 0 {
            self.notifications.apply_batch(batch)?;
        }
        Ok(removed)
    }
}
