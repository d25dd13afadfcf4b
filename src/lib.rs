pub mod chain;
pub mod db;
pub mod draw;
pub mod error;
pub mod feed;
pub mod lottery;
pub mod notify;
pub mod prize;
pub mod scheduler;
pub mod store;
pub mod types;

pub use chain::{ChainClient, StaticChain};
pub use db::Storage;
pub use draw::{draw_winners, locate_bet, winning_ticket};
pub use error::{ChainError, FeedError, LotteryError, NotifyError, RoundError, StoreError};
pub use feed::{parse_block_line, spawn_line_feed};
pub use lottery::{info, Expired, Lottery, LotteryConfig};
pub use notify::{aggregate_prizes, notify_winners, LogNotifier, Notifier};
pub use prize::{prizes, tier_prize, TIER_PERCENT};
pub use scheduler::HeightScheduler;
pub use store::{BetStore, NotificationStore, Store, TargetStore, WinnerStore};
pub use types::*;
