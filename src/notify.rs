//! Winner notifications
//!
//! Best effort: one message per participant, no retries, failures only logged.

use crate::error::NotifyError;
use crate::store::NotificationStore;
use crate::types::{Destination, Winner};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Message delivery transport
pub trait Notifier: Send + Sync {
    fn notify(&self, destination: &Destination, message: &str) -> Result<(), NotifyError>;
}

/// Writes deliveries to the log instead of sending them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, destination: &Destination, message: &str) -> Result<(), NotifyError> {
        info!("Notify chat {}: {}", destination.chat_id, message);
        Ok(())
    }
}

pub fn congratulations(prize: u64) -> String {
    format!("Congratulations! You won {prize} sats in the lottery, claim them before they expire")
}

/// Total prize per participant across all tiers
pub fn aggregate_prizes(winners: &[Winner]) -> BTreeMap<&str, u64> {
    let mut totals = BTreeMap::new();
    for winner in winners {
        *totals.entry(winner.participant.as_str()).or_insert(0u64) += winner.prize;
    }
    totals
}

/// Send one message per winning participant that opted in.
///
/// Returns the number of messages delivered.
pub fn notify_winners<S, N>(store: &S, notifier: &N, winners: &[Winner]) -> usize
where
    S: NotificationStore + ?Sized,
    N: Notifier + ?Sized,
{
    let mut delivered = 0;

    for (participant, prize) in aggregate_prizes(winners) {
        let destination = match store.destination(participant) {
            Ok(Some(destination)) => destination,
            Ok(None) => continue,
            Err(e) => {
                warn!("Getting notification destination for {}: {}", participant, e);
                continue;
            }
        };

        match notifier.notify(&destination, &congratulations(prize)) {
            Ok(()) => delivered += 1,
            Err(e) => warn!("Notifying {}: {}", participant, e),
        }
    }

    delivered
}
