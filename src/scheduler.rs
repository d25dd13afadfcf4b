//! Target height scheduling
//!
//! The target is the next block height a draw must happen at. It moves
//! forward by `duration` blocks after every draw attempt, whether the draw
//! produced winners, found no bets or failed, so the lottery never stalls.

use crate::error::{LotteryError, StoreContext};
use crate::store::TargetStore;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeightScheduler {
    target: u32,
    duration: u32,
}

impl HeightScheduler {
    /// Reconcile the persisted target with the chain height.
    ///
    /// - no target yet: schedule `height + duration`
    /// - target already passed (node was down when it was mined): drop it
    ///   without drawing and schedule `height + duration`
    /// - otherwise keep the persisted target
    pub fn reconcile<S: TargetStore + ?Sized>(
        store: &S,
        chain_height: u32,
        duration: u32,
    ) -> Result<Self, LotteryError> {
        let persisted = store.next_height().context("reading next height")?;

        if persisted != 0 && chain_height <= persisted {
            info!("Next block height target: {}", persisted);
            return Ok(Self { target: persisted, duration });
        }

        if persisted != 0 {
            warn!(
                "Missed target {} (chain at {}), no draw for that height",
                persisted, chain_height
            );
            store
                .delete_height(persisted)
                .context("deleting stale height")?;
        }

        let target = chain_height.saturating_add(duration);
        store.add_height(target).context("saving next height")?;
        info!("Next block height target: {}", target);

        Ok(Self { target, duration })
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn is_due(&self, height: u32) -> bool {
        height == self.target
    }

    /// Drop a target the chain has already passed without a draw and
    /// schedule `height + duration`. Returns false if the target still lies
    /// ahead.
    pub fn skip_missed<S: TargetStore + ?Sized>(
        &mut self,
        store: &S,
        height: u32,
    ) -> Result<bool, LotteryError> {
        if height <= self.target {
            return Ok(false);
        }

        warn!("Missed target {} (chain at {}), no draw for that height", self.target, height);
        store
            .delete_height(self.target)
            .context("deleting stale height")?;
        self.target = height.saturating_add(self.duration);
        store.add_height(self.target).context("saving next height")?;
        info!("Next block height target: {}", self.target);
        Ok(true)
    }

    /// Move to the next target and persist it.
    ///
    /// The in-memory target advances even if persisting fails.
    pub fn advance<S: TargetStore + ?Sized>(&mut self, store: &S) -> u32 {
        self.target = self.target.saturating_add(self.duration);
        if let Err(e) = store.add_height(self.target).context("saving next height") {
            error!("{}", e);
        }
        info!("Next block height target: {}", self.target);
        self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Storage;

    #[test]
    fn test_first_run_schedules_ahead() {
        let store = Storage::temporary().unwrap();
        let scheduler = HeightScheduler::reconcile(&store, 1000, 144).unwrap();
        assert_eq!(scheduler.target(), 1144);
        assert_eq!(store.next_height().unwrap(), 1144);
    }

    #[test]
    fn test_target_reached_is_kept() {
        let store = Storage::temporary().unwrap();
        store.add_height(100).unwrap();
        let scheduler = HeightScheduler::reconcile(&store, 100, 50).unwrap();
        assert_eq!(scheduler.target(), 100);
        assert!(scheduler.is_due(100));
    }

    #[test]
    fn test_missed_target_is_dropped() {
        let store = Storage::temporary().unwrap();
        store.add_height(100).unwrap();
        let scheduler = HeightScheduler::reconcile(&store, 151, 50).unwrap();
        assert_eq!(scheduler.target(), 201);
        assert_eq!(store.next_height().unwrap(), 201);

        store.delete_height(201).unwrap();
        // 100 must be gone, not just shadowed
        assert_eq!(store.next_height().unwrap(), 0);
    }

    #[test]
    fn test_advance_persists() {
        let store = Storage::temporary().unwrap();
        let mut scheduler = HeightScheduler::reconcile(&store, 0, 10).unwrap();
        assert_eq!(scheduler.advance(&store), 20);
        assert_eq!(scheduler.advance(&store), 30);
        assert_eq!(store.next_height().unwrap(), 30);
    }

    #[test]
    fn test_skip_missed_while_running() {
        let store = Storage::temporary().unwrap();
        let mut scheduler = HeightScheduler::reconcile(&store, 100, 50).unwrap();
        assert!(!scheduler.skip_missed(&store, 150).unwrap());
        assert!(scheduler.skip_missed(&store, 160).unwrap());
        assert_eq!(scheduler.target(), 210);
        assert_eq!(store.next_height().unwrap(), 210);
    }
}
