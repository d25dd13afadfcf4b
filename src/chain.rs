//! Chain client seam

use crate::error::ChainError;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Node queries the lottery needs from the chain / payment backend
pub trait ChainClient: Send + Sync {
    /// Best block height
    fn current_height(&self) -> impl Future<Output = Result<u32, ChainError>> + Send;

    /// Liquidity available on the remote side of our channels (informational)
    fn remote_balance(&self) -> impl Future<Output = Result<u64, ChainError>> + Send;
}

/// Client answering with values set by the operator
#[derive(Debug, Default)]
pub struct StaticChain {
    height: AtomicU32,
    remote_balance: AtomicU64,
}

impl StaticChain {
    pub fn new(height: u32, remote_balance: u64) -> Self {
        Self {
            height: AtomicU32::new(height),
            remote_balance: AtomicU64::new(remote_balance),
        }
    }

    /// Track the highest height seen
    pub fn observe(&self, height: u32) {
        self.height.fetch_max(height, Ordering::Relaxed);
    }
}

impl ChainClient for StaticChain {
    async fn current_height(&self) -> Result<u32, ChainError> {
        Ok(self.height.load(Ordering::Relaxed))
    }

    async fn remote_balance(&self) -> Result<u64, ChainError> {
        Ok(self.remote_balance.load(Ordering::Relaxed))
    }
}
