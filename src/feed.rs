//! Line-oriented block feed
//!
//! Each line is `<height> <hash>`, the hash in the usual 64-char display hex
//! (as printed by `bitcoin-cli getblockhash`). Display order is the reverse of
//! the internal byte order chain clients deliver, so the parsed event carries
//! the hash reversed, like a block notification from a node would.

use crate::error::FeedError;
use crate::types::{BlockEvent, Hash, HASH_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub fn parse_block_line(line: &str) -> Result<BlockEvent, FeedError> {
    let mut parts = line.split_whitespace();
    let (Some(height), Some(hash), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FeedError::Malformed(line.to_string()));
    };

    let height: u32 = height
        .parse()
        .map_err(|_| FeedError::Height(height.to_string()))?;

    let bytes = hex::decode(hash).map_err(|e| FeedError::Hash(e.to_string()))?;
    let mut hash: Hash = bytes
        .try_into()
        .map_err(|b: Vec<u8>| FeedError::Hash(format!("{} bytes, want {}", b.len(), HASH_SIZE)))?;
    hash.reverse();

    Ok(BlockEvent { height, hash })
}

/// Read block events from `reader` until EOF.
///
/// Blank lines and `#` comments are ignored, malformed lines logged and skipped.
pub fn spawn_line_feed<R>(reader: R, buffer: usize) -> (mpsc::Receiver<BlockEvent>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(buffer.max(1));

    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Block feed read error: {}", e);
                    break;
                }
            };

            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match parse_block_line(line) {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        debug!("Block feed receiver dropped");
                        break;
                    }
                }
                Err(e) => warn!("Skipping feed line: {}", e),
            }
        }
    });

    (rx, handle)
}
