use super::serial::SerialScheduler;
use crate::error::ChainError;
use crate::executor::Vm;
use crate::state::{
    ChunkStore, FrozenLayer, MultiLayerStore, ReadWriteSet, RwSetStore, StoreView,
};
use crate::storage::KvBackend;
use futures::FutureExt;
use log::{debug, info, trace};
use std::collections::VecDeque;
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tessera_common::{
    block::BlockHeader, config::GlobalConfig, receipt::Receipt, transaction::Transaction,
};

/// Everything one speculative chunk hands back to the merge stage.
struct ChunkOutput {
    /// Private writes, frozen so the merge folds them in sorted order.
    writes: FrozenLayer,
    rw_set: ReadWriteSet,
    receipts: Vec<Receipt>,
    tx_count: usize,
}

/// Chunked-pipeline speculative scheduler.
///
/// Three stages per restart window: a serial in-order split stage that
/// hands out fixed-size chunks, a parallel execute stage bounded to
/// `max_execute_tasks` in-flight chunks, and a serial in-order merge
/// stage. Each chunk runs a serial scheduler over its private store and a
/// read/write-set tracker; the merge stage replays any chunk whose reads
/// raced a committed write. The receipt sequence is element-wise equal to
/// the serial scheduler's.
pub struct ParallelScheduler<V> {
    vm: Arc<V>,
    config: GlobalConfig,
}

impl<V: Vm + 'static> ParallelScheduler<V> {
    pub fn new(vm: Arc<V>, config: GlobalConfig) -> Self {
        Self { vm, config }
    }

    /// Execute a whole block on the store's own mutable layer and freeze
    /// it. A storage fault discards the layer; replays stay internal.
    pub async fn execute_block<B: KvBackend>(
        &self,
        store: &mut MultiLayerStore<B>,
        header: &BlockHeader,
        transactions: &[Transaction],
    ) -> Result<(Vec<Receipt>, Arc<FrozenLayer>), ChainError> {
        store.push_mutable()?;
        match self.execute_all(store, header, transactions).await {
            Ok(receipts) => {
                let layer = store.pop_mutable()?;
                Ok((receipts, layer))
            }
            Err(err) => {
                store.discard_mutable();
                Err(err)
            }
        }
    }

    async fn execute_all<B: KvBackend>(
        &self,
        store: &MultiLayerStore<B>,
        header: &BlockHeader,
        transactions: &[Transaction],
    ) -> Result<Vec<Receipt>, ChainError> {
        if transactions.is_empty() {
            return Ok(Vec::new());
        }

        let chunk_size = self.config.chunk_size.max(1);
        let max_tasks = match self.config.max_execute_tasks {
            0 => super::optimal_parallelism(),
            tasks => tasks,
        };
        let transactions = Arc::new(transactions.to_vec());
        let header = Arc::new(header.clone());
        let global = store.mutable_layer()?.clone();

        let mut receipts = Vec::with_capacity(transactions.len());
        let mut offset = 0usize;
        let mut rounds = 0usize;
        let mut replays = 0usize;

        // Each iteration is one pipeline round over the restart window
        // starting right after the last merged transaction.
        while offset < transactions.len() {
            rounds += 1;
            let abort = Arc::new(AtomicBool::new(false));
            let view = store.view();
            let chunk_count = (transactions.len() - offset).div_ceil(chunk_size);

            let mut pending: VecDeque<JoinHandle<Result<ChunkOutput, ChainError>>> =
                VecDeque::new();
            let mut next_chunk = 0usize;
            // Union of the write sets merged this round; candidates are
            // validated against it.
            let mut committed = ReadWriteSet::default();
            let mut aborted = false;
            let mut fatal: Option<ChainError> = None;

            loop {
                // Split stage: serial, in order, at most `max_tasks` chunks
                // in flight.
                while !aborted && pending.len() < max_tasks && next_chunk < chunk_count {
                    let start = offset + next_chunk * chunk_size;
                    let end = (start + chunk_size).min(transactions.len());
                    if log::log_enabled!(log::Level::Trace) {
                        trace!("dispatching chunk {} covering [{}, {})", next_chunk, start, end);
                    }
                    pending.push_back(self.spawn_chunk(
                        view.clone(),
                        header.clone(),
                        transactions.clone(),
                        start..end,
                        abort.clone(),
                    ));
                    next_chunk += 1;
                }

                // Merge stage: serial, in chunk order.
                let Some(handle) = pending.pop_front() else {
                    break;
                };
                let output = match handle.await {
                    Ok(Ok(output)) => output,
                    Ok(Err(err)) => {
                        fatal.get_or_insert(err);
                        abort.store(true, Ordering::Relaxed);
                        aborted = true;
                        continue;
                    }
                    Err(join_err) => {
                        fatal.get_or_insert(ChainError::TaskFailure(join_err.to_string()));
                        abort.store(true, Ordering::Relaxed);
                        aborted = true;
                        continue;
                    }
                };
                if aborted {
                    // Draining a cancelled round; results are discarded.
                    continue;
                }

                if committed.has_raw_conflict(&output.rw_set) {
                    // The candidate read something a committed chunk
                    // wrote: everything from here on is stale. Restart
                    // the window after the merged prefix.
                    replays += 1;
                    if log::log_enabled!(log::Level::Debug) {
                        debug!(
                            "raw conflict after {} merged transactions, replaying",
                            offset
                        );
                    }
                    abort.store(true, Ordering::Relaxed);
                    aborted = true;
                    continue;
                }

                for (key, record) in output.writes.iter() {
                    global.apply(key.clone(), record.clone());
                }
                committed.merge_writes(&output.rw_set);
                receipts.extend(output.receipts);
                offset += output.tx_count;
            }

            if let Some(err) = fatal {
                return Err(err);
            }
        }

        info!(
            "parallel block {} done: {} receipts in {} rounds ({} replays)",
            header.number(),
            receipts.len(),
            rounds,
            replays
        );
        Ok(receipts)
    }

    fn spawn_chunk<B: KvBackend>(
        &self,
        view: StoreView<B>,
        header: Arc<BlockHeader>,
        transactions: Arc<Vec<Transaction>>,
        range: Range<usize>,
        abort: Arc<AtomicBool>,
    ) -> JoinHandle<Result<ChunkOutput, ChainError>> {
        let vm = self.vm.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            let task = execute_chunk(vm, config, view, header, transactions, range, abort);
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => {
                    let message = if let Some(&message) = payload.downcast_ref::<&str>() {
                        message.to_string()
                    } else if let Some(message) = payload.downcast_ref::<String>() {
                        message.clone()
                    } else {
                        "unknown panic payload".to_string()
                    };
                    Err(ChainError::TaskFailure(format!(
                        "chunk execution panicked: {message}"
                    )))
                }
            }
        })
    }
}

/// Execute stage body: a serial scheduler over a tracked, chunk-private
/// store. The abort flag is observed between transactions only.
async fn execute_chunk<B: KvBackend, V: Vm>(
    vm: Arc<V>,
    config: GlobalConfig,
    view: StoreView<B>,
    header: Arc<BlockHeader>,
    transactions: Arc<Vec<Transaction>>,
    range: Range<usize>,
    abort: Arc<AtomicBool>,
) -> Result<ChunkOutput, ChainError> {
    let chunk = &transactions[range.clone()];
    let mut tracked = RwSetStore::new(ChunkStore::new(view));

    let inner = SerialScheduler::new(vm, config);
    let receipts = inner
        .run(
            &mut tracked,
            &header,
            chunk,
            range.start as i64,
            Some(&abort),
        )
        .await?;

    let (chunk_store, rw_set) = tracked.into_parts();
    Ok(ChunkOutput {
        writes: chunk_store.into_writes(),
        rw_set,
        receipts,
        tx_count: chunk.len(),
    })
}
