//! Lottery integration tests
//!
//! Run with: cargo test --test lottery_test

use blockraffle::{
    Bet, BetStore, BlockEvent, Destination, Draw, Hash, Lottery, LotteryConfig, LotteryError,
    NotificationStore, Notifier, NotifyError, Round, StaticChain, StoreError, Storage,
    TargetStore, Winner, WinnerRecord, WinnerStore, HASH_SIZE, TIERS,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// HELPERS
// =============================================================================

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, destination: &Destination, message: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((destination.chat_id, message.to_string()));
        Ok(())
    }
}

struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, destination: &Destination, _message: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Delivery {
            chat_id: destination.chat_id,
            reason: "unreachable".into(),
        })
    }
}

struct Fixture<N> {
    storage: Arc<Storage>,
    notifier: Arc<N>,
    lottery: Lottery<Storage, N>,
    payouts: mpsc::Receiver<Draw>,
}

fn fixture<N: Notifier + 'static>(notifier: N, duration: u32) -> Fixture<N> {
    let storage = Arc::new(Storage::temporary().unwrap());
    let notifier = Arc::new(notifier);
    let (tx, payouts) = mpsc::channel(4);
    let config = LotteryConfig {
        duration,
        ..Default::default()
    };
    let lottery = Lottery::new(config, storage.clone(), notifier.clone(), tx);
    Fixture {
        storage,
        notifier,
        lottery,
        payouts,
    }
}

/// Canonical hash whose first tier window is (5, 3), all other bytes zero
fn reference_hash() -> Hash {
    let mut hash = [0u8; HASH_SIZE];
    hash[31] = 5;
    hash[30] = 3;
    hash
}

/// Block event as the chain client delivers it (reversed bytes)
fn block(height: u32, canonical: Hash) -> BlockEvent {
    let mut hash = canonical;
    hash.reverse();
    BlockEvent { height, hash }
}

/// A:50, B:100, C:850 -> indices 50, 150, 1000
fn place_reference_bets(storage: &Storage) {
    storage.place_bet("A", 50).unwrap();
    storage.place_bet("B", 100).unwrap();
    storage.place_bet("C", 850).unwrap();
}

fn subscribe(storage: &Storage, participant: &str, chat_id: i64) {
    storage
        .subscribe(
            participant,
            Destination {
                chat_id,
                expires_at: chrono::Utc::now() + chrono::Duration::days(1),
            },
        )
        .unwrap();
}

/// Sled storage whose winner writes always fail
struct WinnersDown(Storage);

impl BetStore for WinnersDown {
    fn list(&self) -> Result<Vec<Bet>, StoreError> {
        self.0.list()
    }
    fn aggregate_pool(&self) -> Result<u64, StoreError> {
        self.0.aggregate_pool()
    }
    fn take_round(&self) -> Result<Round, StoreError> {
        self.0.take_round()
    }
    fn place_bet(&self, participant: &str, amount: u64) -> Result<u64, StoreError> {
        self.0.place_bet(participant, amount)
    }
}

impl WinnerStore for WinnersDown {
    fn add(&self, _height: u32, _pool: u64, _winners: &[Winner]) -> Result<(), StoreError> {
        Err(StoreError::CorruptKey("winners"))
    }
    fn expire_prizes(&self, older_than: u32) -> Result<usize, StoreError> {
        self.0.expire_prizes(older_than)
    }
    fn winners_at(&self, height: u32) -> Result<Vec<WinnerRecord>, StoreError> {
        self.0.winners_at(height)
    }
    fn claim(&self, height: u32, tier: u8) -> Result<bool, StoreError> {
        self.0.claim(height, tier)
    }
}

impl TargetStore for WinnersDown {
    fn next_height(&self) -> Result<u32, StoreError> {
        self.0.next_height()
    }
    fn add_height(&self, height: u32) -> Result<(), StoreError> {
        self.0.add_height(height)
    }
    fn delete_height(&self, height: u32) -> Result<(), StoreError> {
        self.0.delete_height(height)
    }
}

impl NotificationStore for WinnersDown {
    fn destination(&self, participant: &str) -> Result<Option<Destination>, StoreError> {
        self.0.destination(participant)
    }
    fn subscribe(&self, participant: &str, destination: Destination) -> Result<(), StoreError> {
        self.0.subscribe(participant, destination)
    }
    fn expire_stale_at(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.0.expire_stale_at(now)
    }
}

// =============================================================================
// RAFFLE
// =============================================================================

#[tokio::test]
async fn test_reference_draw() {
    let mut f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);

    let draw = f.lottery.raffle(500, &reference_hash()).await.unwrap().unwrap();

    assert_eq!(draw.pool, 1000);
    assert_eq!(draw.winners[0].participant, "B");
    assert_eq!(draw.winners[0].ticket, 126);
    assert_eq!(draw.winners[0].prize, 500);
    // 0^0 mod 1000 = 1 -> ticket 2 -> A for every other tier
    assert!(draw.winners[1..].iter().all(|w| w.participant == "A"));
    let prizes: Vec<u64> = draw.winners.iter().map(|w| w.prize).collect();
    assert_eq!(prizes, vec![500, 250, 125, 63, 31, 16, 8, 4]);

    // round was consumed
    assert_eq!(f.storage.aggregate_pool().unwrap(), 0);
    assert!(f.storage.list().unwrap().is_empty());

    // persisted with height and frozen pool
    let records = f.storage.winners_at(500).unwrap();
    assert_eq!(records.len(), TIERS);
    assert!(records.iter().all(|r| r.height == 500 && r.pool == 1000));
    assert_eq!(records[0].winner, draw.winners[0]);

    // handed off exactly once
    assert_eq!(f.payouts.recv().await, Some(draw));
    assert!(f.payouts.try_recv().is_err());
}

#[tokio::test]
async fn test_same_inputs_same_winners() {
    let a = fixture(RecordingNotifier::default(), 10);
    let b = fixture(RecordingNotifier::default(), 10);
    let hash: Hash = std::array::from_fn(|i| (i * 37 % 251) as u8);

    for f in [&a, &b] {
        for (i, amount) in [13u64, 400, 7, 90, 1234].into_iter().enumerate() {
            f.storage.place_bet(&format!("p{i}"), amount).unwrap();
        }
    }

    let first = a.lottery.raffle(10, &hash).await.unwrap().unwrap();
    let second = b.lottery.raffle(10, &hash).await.unwrap().unwrap();
    assert_eq!(first.winners, second.winners);
}

#[tokio::test]
async fn test_empty_round() {
    let mut f = fixture(RecordingNotifier::default(), 10);
    subscribe(&f.storage, "A", 1);

    assert!(f.lottery.raffle(500, &reference_hash()).await.unwrap().is_none());
    assert!(f.storage.winners_at(500).unwrap().is_empty());
    assert!(f.notifier.sent().is_empty());
    assert!(f.payouts.try_recv().is_err());
}

#[tokio::test]
async fn test_multi_tier_winner_notified_once() {
    let f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);
    subscribe(&f.storage, "A", 11);
    subscribe(&f.storage, "B", 22);

    f.lottery.raffle(500, &reference_hash()).await.unwrap();

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 2);
    let a: Vec<_> = sent.iter().filter(|(chat, _)| *chat == 11).collect();
    assert_eq!(a.len(), 1);
    // 250 + 125 + 63 + 31 + 16 + 8 + 4
    assert!(a[0].1.contains("497"));
    assert!(sent.iter().any(|(chat, msg)| *chat == 22 && msg.contains("500")));
}

#[tokio::test]
async fn test_notification_failure_does_not_abort() {
    let f = fixture(FailingNotifier, 10);
    place_reference_bets(&f.storage);
    subscribe(&f.storage, "A", 1);

    let draw = f.lottery.raffle(500, &reference_hash()).await.unwrap();
    assert!(draw.is_some());
    assert_eq!(f.storage.winners_at(500).unwrap().len(), TIERS);
}

#[tokio::test]
async fn test_expiry_window() {
    let f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);
    f.lottery.raffle(100, &reference_hash()).await.unwrap();

    // window is 3 * 10 blocks: 130 - 30 = 100 is not older than 100
    assert_eq!(f.lottery.expire(130).unwrap().prizes, 0);
    assert_eq!(f.lottery.expire(131).unwrap().prizes, TIERS);
    assert_eq!(f.lottery.expire(131).unwrap().prizes, 0);
    assert!(f.storage.winners_at(100).unwrap().iter().all(|r| r.winner.expired));
}

#[tokio::test]
async fn test_subscribe_uses_configured_ttl() {
    let storage = Arc::new(Storage::temporary().unwrap());
    let (tx, _payouts) = mpsc::channel(1);
    let config = LotteryConfig {
        notification_ttl_days: 7,
        ..Default::default()
    };
    let lottery = Lottery::new(config, storage.clone(), Arc::new(RecordingNotifier::default()), tx);

    let before = Utc::now();
    lottery.subscribe("A", 42).unwrap();
    let after = Utc::now();

    let destination = storage.destination("A").unwrap().unwrap();
    assert_eq!(destination.chat_id, 42);
    assert!(destination.expires_at >= before + chrono::Duration::days(7));
    assert!(destination.expires_at <= after + chrono::Duration::days(7));

    // still active six days in, gone after the ttl
    assert_eq!(storage.expire_stale_at(before + chrono::Duration::days(6)).unwrap(), 0);
    assert_eq!(storage.expire_stale_at(after + chrono::Duration::days(8)).unwrap(), 1);
    assert!(storage.destination("A").unwrap().is_none());
}

#[tokio::test]
async fn test_info() {
    let f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);
    f.storage.add_height(777).unwrap();

    let chain = StaticChain::new(700, 5_000);
    let info = f.lottery.info(&chain).await.unwrap();
    assert_eq!(info.prize_pool, 1000);
    assert_eq!(info.capacity, 1000);
    assert_eq!(info.next_height, 777);

    // read only
    assert_eq!(f.storage.aggregate_pool().unwrap(), 1000);
}

// =============================================================================
// WATCHER
// =============================================================================

#[tokio::test]
async fn test_watcher_draws_once_per_target() {
    let mut f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);

    let chain = StaticChain::new(100, 0);
    let (blocks, rx) = mpsc::channel(8);
    let watcher = f.lottery.start(&chain, rx).await.unwrap();
    assert_eq!(f.storage.next_height().unwrap(), 110);

    blocks.send(block(105, [9u8; HASH_SIZE])).await.unwrap();
    blocks.send(block(110, reference_hash())).await.unwrap();

    let draw = f.payouts.recv().await.unwrap();
    assert_eq!(draw.height, 110);
    assert_eq!(draw.winners[0].participant, "B");

    // replayed block no longer matches; the next target has no bets
    blocks.send(block(110, reference_hash())).await.unwrap();
    blocks.send(block(120, reference_hash())).await.unwrap();
    drop(blocks);

    watcher.await.unwrap().unwrap();
    assert!(f.payouts.try_recv().is_err());
    assert_eq!(f.storage.next_height().unwrap(), 130);
    assert_eq!(f.storage.winners_at(110).unwrap().len(), TIERS);
    assert!(f.storage.winners_at(120).unwrap().is_empty());
}

#[tokio::test]
async fn test_startup_drops_missed_target() {
    let f = fixture(RecordingNotifier::default(), 50);
    f.storage.add_height(100).unwrap();

    let chain = StaticChain::new(151, 0);
    let (blocks, rx) = mpsc::channel(1);
    let watcher = f.lottery.start(&chain, rx).await.unwrap();
    drop(blocks);
    watcher.await.unwrap().unwrap();

    assert_eq!(f.storage.next_height().unwrap(), 201);
    f.storage.delete_height(201).unwrap();
    assert_eq!(f.storage.next_height().unwrap(), 0);
}

#[tokio::test]
async fn test_startup_keeps_reached_target() {
    let f = fixture(RecordingNotifier::default(), 50);
    f.storage.add_height(100).unwrap();

    let chain = StaticChain::new(100, 0);
    let (blocks, rx) = mpsc::channel(1);
    let watcher = f.lottery.start(&chain, rx).await.unwrap();
    drop(blocks);
    watcher.await.unwrap().unwrap();

    assert_eq!(f.storage.next_height().unwrap(), 100);
}

#[tokio::test]
async fn test_watcher_recovers_from_skipped_target() {
    let mut f = fixture(RecordingNotifier::default(), 10);
    place_reference_bets(&f.storage);

    let chain = StaticChain::new(100, 0);
    let (blocks, rx) = mpsc::channel(8);
    let watcher = f.lottery.start(&chain, rx).await.unwrap();

    // 110 never shows up
    blocks.send(block(115, reference_hash())).await.unwrap();
    blocks.send(block(125, reference_hash())).await.unwrap();

    let draw = f.payouts.recv().await.unwrap();
    assert_eq!(draw.height, 125);
    drop(blocks);
    watcher.await.unwrap().unwrap();

    assert!(f.storage.winners_at(110).unwrap().is_empty());
    assert_eq!(f.storage.next_height().unwrap(), 135);
}

#[tokio::test]
async fn test_winner_store_failure_keeps_watcher_running() {
    let storage = Arc::new(WinnersDown(Storage::temporary().unwrap()));
    let (tx, mut payouts) = mpsc::channel(4);
    let config = LotteryConfig {
        duration: 10,
        ..Default::default()
    };
    let lottery = Lottery::new(config, storage.clone(), Arc::new(RecordingNotifier::default()), tx);
    place_reference_bets(&storage.0);

    let chain = StaticChain::new(100, 0);
    let (blocks, rx) = mpsc::channel(8);
    let watcher = lottery.start(&chain, rx).await.unwrap();

    assert!(matches!(
        lottery.raffle(50, &reference_hash()).await,
        Err(LotteryError::Store { context: "saving winners", .. })
    ));

    place_reference_bets(&storage.0);
    blocks.send(block(110, reference_hash())).await.unwrap();
    drop(blocks);

    assert!(watcher.await.unwrap().is_ok());
    assert_eq!(storage.next_height().unwrap(), 120);
    assert!(payouts.try_recv().is_err());
    // the round was consumed even though no winners were stored
    assert_eq!(storage.aggregate_pool().unwrap(), 0);
    assert!(storage.winners_at(110).unwrap().is_empty());
}

#[tokio::test]
async fn test_closed_payout_channel_is_fatal() {
    let f = fixture(RecordingNotifier::default(), 10);
    let Fixture {
        storage,
        lottery,
        payouts,
        ..
    } = f;
    drop(payouts);
    place_reference_bets(&storage);

    let chain = StaticChain::new(100, 0);
    let (blocks, rx) = mpsc::channel(8);
    let watcher = lottery.start(&chain, rx).await.unwrap();
    blocks.send(block(110, reference_hash())).await.unwrap();

    let res = watcher.await.unwrap();
    assert!(matches!(res, Err(LotteryError::PayoutClosed)));
    // winners were persisted before the hand-off and the target still moved
    assert_eq!(storage.winners_at(110).unwrap().len(), TIERS);
    assert_eq!(storage.next_height().unwrap(), 120);
}
