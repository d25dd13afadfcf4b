//! blockraffle — block-height lottery service
//!
//! Reads blocks from stdin (`<height> <hash>` per line), draws winners at each
//! target height and logs the payout batches.

use anyhow::Context;
use blockraffle::{
    spawn_line_feed, BlockEvent, ChainClient, Draw, LogNotifier, Lottery, LotteryConfig,
    StaticChain, Storage, DEFAULT_DURATION_BLOCKS,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "blockraffle", version, about = "Block-height lottery")]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Blocks between draws
    #[arg(long, default_value_t = DEFAULT_DURATION_BLOCKS)]
    duration: u32,

    /// Current chain height at startup
    #[arg(long, default_value_t = 0)]
    chain_height: u32,

    /// Remote channel balance, used for the advertised capacity
    #[arg(long, default_value_t = 0)]
    remote_balance: u64,

    /// Days a notification subscription stays active
    #[arg(long, default_value_t = 30)]
    notification_ttl_days: i64,

    /// Draws buffered towards the payout subsystem
    #[arg(long, default_value_t = 16)]
    payout_buffer: usize,

    /// Seconds between status lines
    #[arg(long, default_value_t = 60)]
    status_interval: u64,
}

/// Payout subsystem stand-in: logs every batch
async fn log_payouts(mut draws: mpsc::Receiver<Draw>) {
    while let Some(draw) = draws.recv().await {
        info!("Payout batch for height {} (pool {})", draw.height, draw.pool);
        for (tier, winner) in draw.winners.iter().enumerate() {
            info!(
                "  #{} {} ticket {} prize {}",
                tier + 1,
                winner.participant,
                winner.ticket,
                winner.prize
            );
        }
    }
}

/// Forward feed events to the lottery, tracking the chain tip on the way
async fn relay_blocks(
    chain: Arc<StaticChain>,
    mut feed: mpsc::Receiver<BlockEvent>,
    out: mpsc::Sender<BlockEvent>,
) {
    while let Some(block) = feed.recv().await {
        chain.observe(block.height);
        if out.send(block).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blockraffle=info".parse()?),
        )
        .init();

    let args = Args::parse();

    info!("════════════════════════════════════════════════════════════");
    info!("  blockraffle v{}", VERSION);
    info!("════════════════════════════════════════════════════════════");
    info!("Data dir: {} | Duration: {} blocks", args.data_dir.display(), args.duration);

    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating {}", args.data_dir.display()))?;
    let storage = Arc::new(Storage::open(&args.data_dir).context("opening storage")?);
    let chain = Arc::new(StaticChain::new(args.chain_height, args.remote_balance));

    let config = LotteryConfig {
        duration: args.duration,
        notification_ttl_days: args.notification_ttl_days,
        payout_buffer: args.payout_buffer,
    };

    let (payout_tx, payout_rx) = mpsc::channel(config.payout_buffer.max(1));
    tokio::spawn(log_payouts(payout_rx));

    let lottery = Lottery::new(config, storage.clone(), Arc::new(LogNotifier), payout_tx);

    let chain_height = chain.current_height().await?;
    info!("Chain height: {}", chain_height);

    // Target is reconciled against the startup height before any feed block
    // can move the chain tip.
    let (block_tx, block_rx) = mpsc::channel(64);
    let mut watcher = lottery
        .start(&*chain, block_rx)
        .await
        .context("starting lottery")?;

    let (feed_rx, _feed) = spawn_line_feed(tokio::io::stdin(), 64);
    tokio::spawn(relay_blocks(chain.clone(), feed_rx, block_tx));

    // Status printer
    let status_lottery = lottery.clone();
    let status_chain = chain.clone();
    let interval_secs = args.status_interval.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match status_lottery.info(&*status_chain).await {
                Ok(info) => info!(
                    "Status: pool {} | capacity {} | next draw at {}",
                    info.prize_pool, info.capacity, info.next_height
                ),
                Err(e) => error!("Status: {}", e),
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
        res = &mut watcher => match res {
            Ok(Ok(())) => info!("Block feed ended"),
            Ok(Err(e)) => error!("Lottery stopped: {}", e),
            Err(e) => error!("Lottery task panicked: {}", e),
        },
    }

    storage.flush().context("flushing storage")?;
    Ok(())
}
