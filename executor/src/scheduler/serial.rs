use crate::error::ChainError;
use crate::executor::{BlockContext, TransactionExecutor, Vm};
use crate::state::{FrozenLayer, MultiLayerStore, Rollbackable, StateStore};
use crate::storage::KvBackend;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_common::{
    block::BlockHeader, config::GlobalConfig, receipt::Receipt, transaction::Transaction,
};

/// Reference scheduler: transactions run one by one over a single
/// rollbackable log. Also the inner loop of every speculative chunk.
pub struct SerialScheduler<V> {
    vm: Arc<V>,
    config: GlobalConfig,
}

impl<V: Vm> SerialScheduler<V> {
    pub fn new(vm: Arc<V>, config: GlobalConfig) -> Self {
        Self { vm, config }
    }

    /// Execute a whole block on the store's own mutable layer and freeze
    /// it. On any storage fault the layer is discarded; nothing partial
    /// escapes.
    pub async fn execute_block<B: KvBackend>(
        &self,
        store: &mut MultiLayerStore<B>,
        header: &BlockHeader,
        transactions: &[Transaction],
    ) -> Result<(Vec<Receipt>, Arc<FrozenLayer>), ChainError> {
        store.push_mutable()?;
        let receipts = match self.run(store, header, transactions, 0, None).await {
            Ok(receipts) => receipts,
            Err(err) => {
                store.discard_mutable();
                return Err(err);
            }
        };
        let layer = store.pop_mutable()?;
        debug!(
            "serial block {} done: {} receipts, {} dirty records",
            header.number(),
            receipts.len(),
            layer.len()
        );
        Ok((receipts, layer))
    }

    /// In-order execution over any state store, with an optional abort
    /// flag observed between transactions.
    pub(crate) async fn run<S: StateStore>(
        &self,
        state: &mut S,
        header: &BlockHeader,
        transactions: &[Transaction],
        start_context_id: i64,
        abort: Option<&AtomicBool>,
    ) -> Result<Vec<Receipt>, ChainError> {
        let context = BlockContext::new(Arc::new(header.clone()), self.config.clone());
        let executor = TransactionExecutor::new(&context, self.vm.as_ref());

        let mut log = Rollbackable::new(state);
        let mut receipts = Vec::with_capacity(transactions.len());
        for (index, tx) in transactions.iter().enumerate() {
            if let Some(flag) = abort {
                if flag.load(Ordering::Relaxed) {
                    break;
                }
            }
            let receipt = executor
                .execute(tx, &mut log, start_context_id + index as i64)
                .await?;
            receipts.push(receipt);
        }
        Ok(receipts)
    }
}
