use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use deb_block::DataBlock;
use deb_store::{BlockRef, BlockStore, Location};
use deb_types::Transaction;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::error::{SpaceError, SpaceResult};
use crate::pipeline::Pipeline;

/// A transaction together with the stored block it was read from.
#[derive(Debug)]
struct Tagged {
    block: BlockRef,
    transaction: Transaction,
}

type ReadItem = SpaceResult<Tagged>;

/// Lazy stream of a space's transactions, in storage order.
///
/// Backed by a read-flow task that fetches and decodes one block at a time.
/// A store or decode failure arrives as a single `Err` item after every
/// transaction read before it, and the stream then ends. Dropping the
/// stream stops the task and releases its store cursor. A stream is
/// consumed once; open another with `Space::transactions`.
pub struct TransactionStream {
    items: ReceiverStream<ReadItem>,
    task: JoinHandle<()>,
    last_block: Option<BlockRef>,
}

impl TransactionStream {
    pub(crate) fn spawn(
        store: Arc<dyn BlockStore>,
        location: Location,
        pipeline: Pipeline,
        buffer: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        let task = tokio::spawn(async move {
            if let Err(err) = read_flow(store, &location, &pipeline, &tx).await {
                warn!(location = %location, error = %err, "read flow failed");
                let _ = tx.send(Err(err)).await;
            }
        });
        Self {
            items: ReceiverStream::new(rx),
            task,
            last_block: None,
        }
    }

    /// The stored block the most recently yielded transaction came from.
    ///
    /// Pass its id to [`BlockStore::get`] to re-read that block (and its
    /// current version) before retrying a conflicting append.
    pub fn last_block(&self) -> Option<&BlockRef> {
        self.last_block.as_ref()
    }
}

impl Stream for TransactionStream {
    type Item = SpaceResult<Transaction>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.items).poll_next(cx) {
            Poll::Ready(Some(Ok(tagged))) => {
                this.last_block = Some(tagged.block);
                Poll::Ready(Some(Ok(tagged.transaction)))
            }
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(err))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TransactionStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_flow(
    store: Arc<dyn BlockStore>,
    location: &Location,
    pipeline: &Pipeline,
    out: &mpsc::Sender<ReadItem>,
) -> SpaceResult<()> {
    let mut cursor = store.scan(location).await?;
    while let Some(stored) = cursor.next().await? {
        let block_ref = stored.block_ref();
        let block = DataBlock::decode(&stored.data).map_err(|e| SpaceError::corrupt(&stored.id, e))?;
        debug!(block = %block_ref, transactions = block.len(), "block read");

        for transaction in block.into_transactions() {
            let Some(transaction) = pipeline.apply(transaction) else {
                continue;
            };
            let item = Tagged {
                block: block_ref.clone(),
                transaction,
            };
            if out.send(Ok(item)).await.is_err() {
                // Consumer went away.
                return Ok(());
            }
        }
    }
    Ok(())
}
