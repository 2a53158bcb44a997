use std::sync::Arc;

use deb_block::PendingBlock;
use deb_store::{BlockRef, BlockStore, Location, PutTarget};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{SpaceError, SpaceResult};

/// Result of writing one sealed block.
#[derive(Debug)]
pub struct BlockOutcome {
    /// Position of the block in its write flow, from 0.
    pub seq: usize,
    /// The stored block being rewritten, if any.
    pub origin: Option<BlockRef>,
    /// Transactions this write added.
    pub transactions: usize,
    pub result: SpaceResult<BlockRef>,
}

/// A task that persists sealed blocks for one append.
///
/// Blocks are written in submission order. A failed block does not stop
/// the flow; its error is recorded in that block's outcome and later blocks
/// are still written.
pub struct WriteFlow {
    blocks: mpsc::Sender<PendingBlock>,
    task: JoinHandle<Vec<BlockOutcome>>,
}

impl WriteFlow {
    pub fn spawn(store: Arc<dyn BlockStore>, location: Location, buffer: usize) -> Self {
        let (blocks, mut rx) = mpsc::channel::<PendingBlock>(buffer);
        let task = tokio::spawn(async move {
            let mut outcomes = Vec::new();
            while let Some(pending) = rx.recv().await {
                let seq = outcomes.len();
                let origin = pending.origin.clone();
                let transactions = pending.appended;
                let result = write_block(store.as_ref(), &location, pending).await;
                match &result {
                    Ok(written) => {
                        debug!(seq, block = %written, transactions, "block written");
                    }
                    Err(err) if err.is_conflict() => {
                        warn!(seq, error = %err, "block write conflict");
                    }
                    Err(err) => {
                        warn!(seq, error = %err, "block write failed");
                    }
                }
                outcomes.push(BlockOutcome {
                    seq,
                    origin,
                    transactions,
                    result,
                });
            }
            outcomes
        });
        Self { blocks, task }
    }

    pub async fn submit(&self, block: PendingBlock) -> SpaceResult<()> {
        self.blocks
            .send(block)
            .await
            .map_err(|_| SpaceError::FlowClosed("write"))
    }

    /// Stop accepting blocks and wait for every submitted block's outcome.
    pub async fn close(self) -> SpaceResult<Vec<BlockOutcome>> {
        drop(self.blocks);
        self.task.await.map_err(|_| SpaceError::FlowClosed("write"))
    }
}

async fn write_block(
    store: &dyn BlockStore,
    location: &Location,
    pending: PendingBlock,
) -> SpaceResult<BlockRef> {
    let data = pending.block.encode()?;
    let target = match pending.origin {
        None => PutTarget::New(location.clone()),
        Some(origin) => {
            let current = store.get(&origin.id).await?;
            if current.version != origin.version {
                return Err(SpaceError::ConcurrentModification {
                    block: origin.id,
                    expected: origin.version,
                    found: current.version,
                });
            }
            PutTarget::Existing {
                id: origin.id,
                expected: origin.version,
            }
        }
    };
    Ok(store.put(target, data).await?)
}
