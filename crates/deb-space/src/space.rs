use std::fmt;
use std::sync::Arc;

use deb_block::{BlockPacker, DataBlock};
use deb_store::{BlockId, BlockStore, Location, Version};
use deb_types::{Account, DateRange, Filter, MomentRange, Transaction};
use serde::Serialize;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::config::SpaceConfig;
use crate::error::{SpaceError, SpaceResult};
use crate::pipeline::{Pipeline, Stage};
use crate::read::TransactionStream;
use crate::report::{AppendError, AppendReport};
use crate::write::WriteFlow;

/// Size and contents of one stored block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub id: BlockId,
    pub version: Version,
    /// Encoded size in bytes.
    pub size: usize,
    /// Transactions stored in the block, before any slice or projection.
    pub transactions: usize,
}

/// A logical, unbounded set of transactions persisted as blocks under one
/// store location.
///
/// A `Space` is a cheap handle: it holds the store, the location, its
/// configuration and a pipeline of slice/projection stages, never the
/// transactions themselves. Cloning it shares the store.
///
/// Spaces returned by [`Space::slice`] and [`Space::projection`] are
/// derived: reading them re-runs the base read through the extra stage, and
/// appending to them fails with [`SpaceError::ReadOnly`].
#[derive(Clone)]
pub struct Space {
    store: Arc<dyn BlockStore>,
    location: Location,
    config: SpaceConfig,
    pipeline: Pipeline,
}

impl Space {
    /// Create an empty space at a freshly allocated root location.
    pub async fn create(store: Arc<dyn BlockStore>, config: SpaceConfig) -> SpaceResult<Self> {
        config.validate_for(store.record_limit())?;
        let location = store.new_location(None).await?;
        info!(location = %location, "space created");
        Ok(Self::bind(store, location, config))
    }

    /// Create an empty space at a fresh location nested under `parent`.
    pub async fn create_under(
        store: Arc<dyn BlockStore>,
        parent: &Location,
        config: SpaceConfig,
    ) -> SpaceResult<Self> {
        config.validate_for(store.record_limit())?;
        let location = store.new_location(Some(parent)).await?;
        info!(location = %location, parent = %parent, "space created");
        Ok(Self::bind(store, location, config))
    }

    /// Bind to an existing location.
    pub async fn open(
        store: Arc<dyn BlockStore>,
        location: Location,
        config: SpaceConfig,
    ) -> SpaceResult<Self> {
        config.validate_for(store.record_limit())?;
        if !store.has_location(&location).await? {
            return Err(SpaceError::InvalidLocation(format!("{location} does not exist")));
        }
        debug!(location = %location, "space opened");
        Ok(Self::bind(store, location, config))
    }

    fn bind(store: Arc<dyn BlockStore>, location: Location, config: SpaceConfig) -> Self {
        Self {
            store,
            location,
            config,
            pipeline: Pipeline::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn config(&self) -> &SpaceConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// `true` for sliced or projected spaces.
    pub fn is_derived(&self) -> bool {
        !self.pipeline.is_empty()
    }

    /// The transactions touching any of `accounts`, dated within any of
    /// `dates` and recorded within any of `moments`. An empty list leaves
    /// that dimension unrestricted. Entries are kept whole.
    pub fn slice(
        &self,
        accounts: Vec<Account>,
        dates: Vec<DateRange>,
        moments: Vec<MomentRange>,
    ) -> SpaceResult<Space> {
        let filter = Filter::new(accounts, dates, moments)?;
        Ok(self.derive(Stage::Slice(filter)))
    }

    /// Like [`Space::slice`], but each transaction keeps only its entries
    /// for the listed accounts. The result may be unbalanced.
    pub fn projection(
        &self,
        accounts: Vec<Account>,
        dates: Vec<DateRange>,
        moments: Vec<MomentRange>,
    ) -> SpaceResult<Space> {
        let filter = Filter::new(accounts, dates, moments)?;
        Ok(self.derive(Stage::Projection(filter)))
    }

    fn derive(&self, stage: Stage) -> Space {
        Space {
            store: Arc::clone(&self.store),
            location: self.location.clone(),
            config: self.config.clone(),
            pipeline: self.pipeline.with(stage),
        }
    }

    /// Open a read flow over the space. Must be called within a tokio
    /// runtime.
    pub fn transactions(&self) -> TransactionStream {
        TransactionStream::spawn(
            Arc::clone(&self.store),
            self.location.clone(),
            self.pipeline.clone(),
            self.config.read_buffer,
        )
    }

    /// Read every transaction into memory.
    pub async fn collect(&self) -> SpaceResult<Vec<Transaction>> {
        self.transactions().collect().await
    }

    /// Per-block statistics, in storage order.
    pub async fn blocks(&self) -> SpaceResult<Vec<BlockInfo>> {
        let mut cursor = self.store.scan(&self.location).await?;
        let mut infos = Vec::new();
        while let Some(stored) = cursor.next().await? {
            let block =
                DataBlock::decode(&stored.data).map_err(|e| SpaceError::corrupt(&stored.id, e))?;
            infos.push(BlockInfo {
                size: stored.data.len(),
                transactions: block.len(),
                id: stored.id,
                version: stored.version,
            });
        }
        Ok(infos)
    }

    /// Append every transaction of `other`, in its read order.
    ///
    /// `other` may be any space, including `self` or a space derived from
    /// it; its contents are read while this space is written.
    pub async fn append(&self, other: &Space) -> Result<AppendReport, AppendError> {
        // Topping up our own tail while reading it would feed appended
        // transactions back into the source.
        let reuse_tail = other.location != self.location;
        self.append_from(other.transactions(), reuse_tail).await
    }

    /// Append an in-memory batch.
    pub async fn append_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<AppendReport, AppendError> {
        let source = tokio_stream::iter(transactions.into_iter().map(Ok));
        self.append_from(source, true).await
    }

    async fn append_from<S>(
        &self,
        mut source: S,
        reuse_tail: bool,
    ) -> Result<AppendReport, AppendError>
    where
        S: Stream<Item = SpaceResult<Transaction>> + Unpin,
    {
        if self.is_derived() {
            return Err(SpaceError::ReadOnly.into());
        }
        let mut packer = self.packer(reuse_tail).await?;
        let flow = WriteFlow::spawn(
            Arc::clone(&self.store),
            self.location.clone(),
            self.config.write_buffer,
        );

        let mut source_error = None;
        let mut unwritten = 0;
        while let Some(item) = source.next().await {
            let sealed = match item.and_then(|tx| packer.push(tx).map_err(SpaceError::from)) {
                Ok(sealed) => sealed,
                Err(err) => {
                    warn!(location = %self.location, error = %err, "append source failed");
                    source_error = Some(err);
                    break;
                }
            };
            if let Some(block) = sealed {
                let count = block.appended;
                if let Err(err) = flow.submit(block).await {
                    unwritten += count;
                    source_error = Some(err);
                    break;
                }
            }
        }

        if source_error.is_some() {
            // The open block is incomplete; it is dropped rather than written.
            unwritten += packer.pending();
        } else if let Some(last) = packer.finish() {
            let count = last.appended;
            if let Err(err) = flow.submit(last).await {
                unwritten += count;
                source_error = Some(err);
            }
        }

        let outcomes = match flow.close().await {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(
                    location = %self.location,
                    unwritten,
                    "write flow ended abnormally; outcomes of submitted blocks are unknown"
                );
                return Err(err.into());
            }
        };
        let report = AppendReport::from_outcomes(outcomes, source_error, unwritten);
        info!(
            location = %self.location,
            committed = report.committed.len(),
            failed = report.failures.len(),
            transactions = report.transactions_written,
            unwritten = report.unwritten,
            "append finished"
        );
        report.into_result()
    }

    async fn packer(&self, reuse_tail: bool) -> SpaceResult<BlockPacker> {
        let soft_limit = self.config.block.soft_limit;
        if !(reuse_tail && self.config.reuse_tail_block) {
            return Ok(BlockPacker::new(soft_limit));
        }
        match self.store.last_block(&self.location).await? {
            Some(tail) => {
                let block =
                    DataBlock::decode(&tail.data).map_err(|e| SpaceError::corrupt(&tail.id, e))?;
                Ok(BlockPacker::resume(soft_limit, tail.block_ref(), block))
            }
            None => Ok(BlockPacker::new(soft_limit)),
        }
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("location", &self.location)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample, CrashingStore, FlakyStore, GatedStore};
    use deb_block::{transaction_size, BlockConfig, EMPTY_BLOCK_SIZE};
    use deb_store::{FileBlockStore, InMemoryBlockStore};
    use deb_types::{Date, Entries, Moment};
    use proptest::prelude::*;

    fn a(id: u16) -> Account {
        Account::new(id)
    }

    /// A config whose blocks hold exactly `per_block` sample transactions.
    fn small_blocks(per_block: usize) -> SpaceConfig {
        let per_tx = transaction_size(&sample(0)).unwrap();
        SpaceConfig {
            block: BlockConfig {
                soft_limit: EMPTY_BLOCK_SIZE + per_block * per_tx,
                record_limit: 64 * 1024,
            },
            ..Default::default()
        }
    }

    async fn memory_space(config: SpaceConfig) -> (Arc<InMemoryBlockStore>, Space) {
        let store = Arc::new(InMemoryBlockStore::new());
        let space = Space::create(store.clone(), config).await.unwrap();
        (store, space)
    }

    fn samples(range: std::ops::Range<u64>) -> Vec<Transaction> {
        range.map(sample).collect()
    }

    #[tokio::test]
    async fn single_transaction_scenario() {
        let (_, space) = memory_space(SpaceConfig::default()).await;
        let d1 = Date::from_days(19_500);
        let tx = Transaction::new(
            Moment::from_micros(100),
            d1,
            [(a(1), 500), (a(2), -500)].into(),
        );
        space.append_transactions(vec![tx.clone()]).await.unwrap();

        assert_eq!(space.collect().await.unwrap(), vec![tx.clone()]);
        let on_a1 = space.slice(vec![a(1)], vec![], vec![]).unwrap();
        assert_eq!(on_a1.collect().await.unwrap(), vec![tx.clone()]);
        let on_a3 = space.slice(vec![a(3)], vec![], vec![]).unwrap();
        assert!(on_a3.collect().await.unwrap().is_empty());

        let projected = space.projection(vec![a(1)], vec![], vec![]).unwrap();
        let out = projected.collect().await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entries, Entries::from([(a(1), 500)]));
        assert_eq!(out[0].moment, tx.moment);
        assert_eq!(out[0].date, d1);
    }

    #[tokio::test]
    async fn large_append_splits_into_bounded_blocks() {
        let config = small_blocks(7);
        let soft_limit = config.block.soft_limit;
        let (store, space) = memory_space(config).await;
        let input = samples(0..100);

        let report = space.append_transactions(input.clone()).await.unwrap();
        assert_eq!(report.committed.len(), 15);
        assert_eq!(report.transactions_written, 100);

        let stored = store.snapshot(space.location());
        assert_eq!(stored.len(), 15);
        assert!(stored.iter().all(|b| b.data.len() <= soft_limit));
        assert_eq!(space.collect().await.unwrap(), input);
    }

    #[tokio::test]
    async fn append_tops_up_tail_block() {
        let (store, space) = memory_space(small_blocks(4)).await;
        space.append_transactions(samples(0..2)).await.unwrap();
        let before = space.blocks().await.unwrap();
        assert_eq!(before.len(), 1);

        space.append_transactions(samples(2..5)).await.unwrap();
        let after = space.blocks().await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, before[0].id);
        assert_ne!(after[0].version, before[0].version);
        assert_eq!(after[0].transactions, 4);
        assert_eq!(after[1].transactions, 1);
        assert_eq!(store.block_count(space.location()), 2);
        assert_eq!(space.collect().await.unwrap(), samples(0..5));
    }

    #[tokio::test]
    async fn tail_reuse_can_be_disabled() {
        let config = SpaceConfig {
            reuse_tail_block: false,
            ..small_blocks(4)
        };
        let (_, space) = memory_space(config).await;
        space.append_transactions(samples(0..2)).await.unwrap();
        space.append_transactions(samples(2..3)).await.unwrap();
        let blocks = space.blocks().await.unwrap();
        assert_eq!(blocks.iter().map(|b| b.transactions).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn self_append_doubles_contents() {
        let (_, space) = memory_space(small_blocks(3)).await;
        let input = samples(0..8);
        space.append_transactions(input.clone()).await.unwrap();

        space.append(&space).await.unwrap();
        let mut expected = input.clone();
        expected.extend(input);
        assert_eq!(space.collect().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn append_copies_a_slice_of_another_space() {
        let store = Arc::new(InMemoryBlockStore::new());
        let source = Space::create(store.clone(), small_blocks(5)).await.unwrap();
        source.append_transactions(samples(0..20)).await.unwrap();

        let target = Space::create_under(store.clone(), source.location(), SpaceConfig::default())
            .await
            .unwrap();
        assert_eq!(target.location().parent().as_ref(), Some(source.location()));

        let range = MomentRange::new(Moment::from_micros(5), Moment::from_micros(9)).unwrap();
        let window = source.slice(vec![], vec![], vec![range]).unwrap();
        target.append(&window).await.unwrap();
        assert_eq!(target.collect().await.unwrap(), samples(5..9));
    }

    #[tokio::test]
    async fn derived_space_is_read_only() {
        let (_, space) = memory_space(SpaceConfig::default()).await;
        let derived = space.slice(vec![a(1)], vec![], vec![]).unwrap();
        assert!(derived.is_derived());
        assert!(!space.is_derived());
        let err = derived.append_transactions(samples(0..1)).await.unwrap_err();
        assert!(matches!(err, AppendError::Failed(SpaceError::ReadOnly)));
    }

    #[tokio::test]
    async fn inverted_range_rejected() {
        let (_, space) = memory_space(SpaceConfig::default()).await;
        let inverted = DateRange {
            start: Date::from_days(10),
            end: Date::from_days(2),
        };
        let err = space.slice(vec![], vec![inverted], vec![]).unwrap_err();
        assert!(matches!(err, SpaceError::InvalidRange(_)));
    }

    #[tokio::test]
    async fn date_ranges_are_half_open() {
        let (_, space) = memory_space(SpaceConfig::default()).await;
        let input = samples(0..30);
        space.append_transactions(input.clone()).await.unwrap();

        let range = DateRange::new(Date::from_days(19_003), Date::from_days(19_005)).unwrap();
        let got = space.slice(vec![], vec![range], vec![]).unwrap().collect().await.unwrap();
        let expected: Vec<_> = input.into_iter().filter(|t| range.contains(t.date)).collect();
        assert_eq!(got, expected);
        assert!(got.iter().all(|t| t.date != Date::from_days(19_005)));
        assert_eq!(got.len(), 2);
    }

    #[tokio::test]
    async fn open_checks_location() {
        let store: Arc<dyn BlockStore> = Arc::new(InMemoryBlockStore::new());
        let err = Space::open(store.clone(), Location::root(77), SpaceConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SpaceError::InvalidLocation(_)));

        let created = Space::create(store.clone(), SpaceConfig::default()).await.unwrap();
        let opened = Space::open(store, created.location().clone(), SpaceConfig::default())
            .await
            .unwrap();
        assert_eq!(opened.location(), created.location());
    }

    #[tokio::test]
    async fn config_must_fit_store() {
        let store = Arc::new(InMemoryBlockStore::with_record_limit(4096));
        let err = Space::create(store, SpaceConfig::default()).await.unwrap_err();
        assert!(matches!(err, SpaceError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn oversized_transaction_fails_append() {
        let (store, space) = memory_space(small_blocks(1)).await;
        let huge = Transaction::new(
            Moment::from_micros(1),
            Date::from_days(1),
            (0..10).map(|i| (a(i), 0)).collect(),
        );
        let err = space.append_transactions(vec![huge]).await.unwrap_err();
        assert!(matches!(
            err,
            AppendError::Failed(SpaceError::TransactionTooLarge { .. })
        ));
        assert_eq!(store.block_count(space.location()), 0);
    }

    #[tokio::test]
    async fn concurrent_appends_of_new_blocks_both_land() {
        let (_, space) = memory_space(small_blocks(4)).await;
        let other = space.clone();
        let (left, right) = tokio::join!(
            space.append_transactions(samples(0..10)),
            other.append_transactions(samples(100..110)),
        );
        left.unwrap();
        right.unwrap();

        let mut all = space.collect().await.unwrap();
        all.sort_by_key(|t| t.moment);
        let mut expected = samples(0..10);
        expected.extend(samples(100..110));
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn racing_tail_rewrites_one_wins() {
        let inner = Arc::new(InMemoryBlockStore::new());
        let seed = Space::create(inner.clone(), SpaceConfig::default()).await.unwrap();
        seed.append_transactions(samples(0..1)).await.unwrap();
        let v1 = seed.blocks().await.unwrap()[0].clone();

        let gated = Arc::new(GatedStore::new(inner.clone(), 2));
        let left = Space::open(gated, seed.location().clone(), SpaceConfig::default())
            .await
            .unwrap();
        let right = left.clone();
        let (l, r) = tokio::join!(
            left.append_transactions(samples(1..2)),
            right.append_transactions(samples(2..3)),
        );

        let (won, lost) = match (l, r) {
            (Ok(won), Err(lost)) => (won, lost),
            (Err(lost), Ok(won)) => (won, lost),
            other => panic!("expected exactly one winner, got {other:?}"),
        };
        assert_eq!(won.committed.len(), 1);
        match lost {
            AppendError::Failed(SpaceError::ConcurrentModification { block, expected, .. }) => {
                assert_eq!(block, v1.id);
                assert_eq!(expected, v1.version);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        let stored = seed.collect().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], sample(0));
    }

    #[tokio::test]
    async fn source_failure_before_any_block_is_failed() {
        let inner = Arc::new(InMemoryBlockStore::new());
        let source = Space::create(inner.clone(), small_blocks(2)).await.unwrap();
        source.append_transactions(samples(0..6)).await.unwrap();
        let flaky = Space::open(
            Arc::new(FlakyStore::new(inner, 1)),
            source.location().clone(),
            SpaceConfig::default(),
        )
        .await
        .unwrap();

        let (store, target) = memory_space(SpaceConfig::default()).await;
        let err = target.append(&flaky).await.unwrap_err();
        assert!(matches!(err, AppendError::Failed(SpaceError::StoreUnavailable(_))));
        assert_eq!(store.block_count(target.location()), 0);
    }

    #[tokio::test]
    async fn source_failure_after_sealed_blocks_is_partial() {
        let inner = Arc::new(InMemoryBlockStore::new());
        let source = Space::create(inner.clone(), small_blocks(10)).await.unwrap();
        source.append_transactions(samples(0..20)).await.unwrap();
        let flaky = Space::open(
            Arc::new(FlakyStore::new(inner, 1)),
            source.location().clone(),
            SpaceConfig::default(),
        )
        .await
        .unwrap();

        let (_, target) = memory_space(small_blocks(4)).await;
        let err = target.append(&flaky).await.unwrap_err();
        let report = err.report().expect("partial report");
        assert_eq!(report.committed.len(), 2);
        assert_eq!(report.transactions_written, 8);
        assert_eq!(report.unwritten, 2);
        assert!(matches!(report.source_error, Some(SpaceError::StoreUnavailable(_))));
        assert_eq!(target.collect().await.unwrap(), samples(0..8));
    }

    #[tokio::test]
    async fn file_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let location = {
            let store = Arc::new(FileBlockStore::open(dir.path()).await.unwrap());
            let space = Space::create(store, small_blocks(3)).await.unwrap();
            space.append_transactions(samples(0..10)).await.unwrap();
            space.location().clone()
        };

        let store = Arc::new(FileBlockStore::open(dir.path()).await.unwrap());
        let space = Space::open(store, location, small_blocks(3)).await.unwrap();
        assert_eq!(space.collect().await.unwrap(), samples(0..10));
        assert_eq!(space.blocks().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn crashed_write_flow_fails_the_append() {
        let inner = Arc::new(InMemoryBlockStore::new());
        let crashing: Arc<dyn BlockStore> = Arc::new(CrashingStore::new(inner.clone(), 1));
        let space = Space::create(crashing, small_blocks(2)).await.unwrap();

        let err = space.append_transactions(samples(0..6)).await.unwrap_err();
        assert!(matches!(err, AppendError::Failed(SpaceError::FlowClosed("write"))));
        // The block written before the crash is still there.
        assert_eq!(inner.block_count(space.location()), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn batched_appends_preserve_order(
            batches in proptest::collection::vec(1usize..25, 1..6),
            per_block in 1usize..6,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (expected, read) = rt.block_on(async move {
                let (_, space) = memory_space(small_blocks(per_block)).await;
                let mut expected = Vec::new();
                let mut next = 0u64;
                for size in batches {
                    let batch = samples(next..next + size as u64);
                    next += size as u64;
                    space.append_transactions(batch.clone()).await.unwrap();
                    expected.extend(batch);
                }
                (expected, space.collect().await.unwrap())
            });
            prop_assert_eq!(read, expected);
        }
    }
}
