//! Periodic lottery driven by block heights
//!
//! A single task drains the block feed. When a block at the target height
//! arrives its hash seeds a draw, which runs to completion before the next
//! block is looked at, so there is exactly one draw per target height.
//!
//! Draw steps:
//! 1. take the active round (snapshot + clear, one transaction)
//! 2. derive 8 tier winners from the hash
//! 3. persist winners with height and frozen pool
//! 4. hand the batch to the payout channel
//! 5. notify winners
//! 6. expire old prizes and subscriptions
//!
//! The round is committed at step 1 and never restored. If a later step
//! fails before winners are persisted the pool is lost and logged for manual
//! reconciliation.

use crate::chain::ChainClient;
use crate::draw::draw_winners;
use crate::error::{LotteryError, StoreContext};
use crate::notify::{notify_winners, Notifier};
use crate::scheduler::HeightScheduler;
use crate::store::{BetStore, Store, TargetStore};
use crate::types::{
    BlockEvent, Destination, Draw, Hash, Info, CAPACITY_DIVISOR, DEFAULT_DURATION_BLOCKS,
    PRIZE_RETENTION_CYCLES,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotteryConfig {
    /// Blocks between draws
    pub duration: u32,
    /// Lifetime of a notification subscription
    pub notification_ttl_days: i64,
    /// Draws buffered towards the payout subsystem
    pub payout_buffer: usize,
}

impl Default for LotteryConfig {
    fn default() -> Self {
        Self {
            duration: DEFAULT_DURATION_BLOCKS,
            notification_ttl_days: 30,
            payout_buffer: 16,
        }
    }
}

/// Counts from one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Expired {
    pub prizes: usize,
    pub subscriptions: usize,
}

pub struct Lottery<S, N> {
    config: LotteryConfig,
    store: Arc<S>,
    notifier: Arc<N>,
    payouts: mpsc::Sender<Draw>,
}

impl<S, N> Clone for Lottery<S, N> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
            notifier: self.notifier.clone(),
            payouts: self.payouts.clone(),
        }
    }
}

impl<S, N> Lottery<S, N>
where
    S: Store + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        config: LotteryConfig,
        store: Arc<S>,
        notifier: Arc<N>,
        payouts: mpsc::Sender<Draw>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            payouts,
        }
    }

    pub fn config(&self) -> &LotteryConfig {
        &self.config
    }

    /// Reconcile the target height with the chain and spawn the block watcher.
    ///
    /// Fails if the chain client is unreachable or the target cannot be
    /// persisted. The returned task ends when the feed closes, or with
    /// [`LotteryError::PayoutClosed`] if the payout side went away.
    pub async fn start<C: ChainClient>(
        &self,
        chain: &C,
        blocks: mpsc::Receiver<BlockEvent>,
    ) -> Result<JoinHandle<Result<(), LotteryError>>, LotteryError> {
        let height = chain.current_height().await?;
        let scheduler = HeightScheduler::reconcile(&*self.store, height, self.config.duration)?;

        let lottery = self.clone();
        Ok(tokio::spawn(async move { lottery.watch(scheduler, blocks).await }))
    }

    /// Block watcher loop
    pub async fn watch(
        &self,
        mut scheduler: HeightScheduler,
        mut blocks: mpsc::Receiver<BlockEvent>,
    ) -> Result<(), LotteryError> {
        while let Some(block) = blocks.recv().await {
            if !scheduler.is_due(block.height) {
                debug!("Block {} is not the target {}", block.height, scheduler.target());
                if let Err(e) = scheduler.skip_missed(&*self.store, block.height) {
                    error!("{}", e);
                }
                continue;
            }

            let result = self.raffle(block.height, &block.canonical_hash()).await;
            scheduler.advance(&*self.store);

            match result {
                Ok(Some(draw)) => info!("Lottery at height {} done, pool {}", draw.height, draw.pool),
                Ok(None) => info!("Lottery at height {} had no bets", block.height),
                Err(LotteryError::PayoutClosed) => {
                    error!("Payout channel closed, stopping lottery");
                    return Err(LotteryError::PayoutClosed);
                }
                Err(e) => error!("Lottery at height {} failed: {}", block.height, e),
            }
        }

        info!("Block feed closed, lottery stopped");
        Ok(())
    }

    /// Run the draw for `height` with the block hash in canonical order.
    ///
    /// Returns `None` when there were no bets.
    pub async fn raffle(&self, height: u32, hash: &Hash) -> Result<Option<Draw>, LotteryError> {
        let round = self.store.take_round().context("taking active round")?;

        if round.is_empty() {
            self.expire(height)?;
            return Ok(None);
        }

        let pool = round.pool;
        let winners = match draw_winners(hash, &round) {
            Ok(winners) => winners,
            Err(e) => {
                error!("Round at height {} lost, pool {} needs reconciliation", height, pool);
                return Err(e);
            }
        };

        if let Err(e) = self.store.add(height, pool, &winners).context("saving winners") {
            error!("Round at height {} lost, pool {} needs reconciliation", height, pool);
            return Err(e);
        }

        let draw = Draw {
            height,
            pool,
            winners,
        };
        self.payouts
            .send(draw.clone())
            .await
            .map_err(|_| LotteryError::PayoutClosed)?;

        let notified = notify_winners(&*self.store, &*self.notifier, &draw.winners);
        debug!("Notified {} winners", notified);

        self.expire(height)?;
        Ok(Some(draw))
    }

    /// Expire prizes older than the retention window and stale subscriptions
    pub fn expire(&self, height: u32) -> Result<Expired, LotteryError> {
        let window = self.config.duration.saturating_mul(PRIZE_RETENTION_CYCLES);
        let prizes = self
            .store
            .expire_prizes(height.saturating_sub(window))
            .context("expiring prizes")?;
        info!("Expired prizes: {}", prizes);

        let subscriptions = self
            .store
            .expire_stale()
            .context("expiring notifications")?;
        if subscriptions > 0 {
            info!("Expired notification subscriptions: {}", subscriptions);
        }

        Ok(Expired {
            prizes,
            subscriptions,
        })
    }

    /// Opt `participant` into win notifications for the configured lifetime
    pub fn subscribe(&self, participant: &str, chat_id: i64) -> Result<(), LotteryError> {
        let expires_at =
            chrono::Utc::now() + chrono::Duration::days(self.config.notification_ttl_days);
        self.store
            .subscribe(participant, Destination { chat_id, expires_at })
            .context("saving subscription")
    }

    pub async fn info<C: ChainClient>(&self, chain: &C) -> Result<Info, LotteryError> {
        info(&*self.store, chain).await
    }
}

/// Pool, capacity and next target. Reads only.
pub async fn info<S, C>(store: &S, chain: &C) -> Result<Info, LotteryError>
where
    S: BetStore + TargetStore + ?Sized,
    C: ChainClient,
{
    let remote_balance = chain.remote_balance().await?;
    let prize_pool = store.aggregate_pool().context("getting prize pool")?;
    let next_height = store.next_height().context("getting next height")?;

    Ok(Info {
        prize_pool,
        capacity: remote_balance / CAPACITY_DIVISOR,
        next_height,
    })
}
