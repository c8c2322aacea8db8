//! Single-transaction driver: savepoint, dispatch to a precompiled handler
//! or the opaque VM callback, rollback on revert, receipt assembly.

use crate::error::ChainError;
use crate::precompiled::{PrecompiledError, PrecompiledRegistry};
use crate::state::{Rollbackable, StateStore, VmState};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use std::sync::Arc;
use tessera_common::{
    block::BlockHeader,
    config::GlobalConfig,
    crypto::{Address, Hash, Hashable},
    receipt::{status, LogEntry, Receipt},
    transaction::Transaction,
};

/// Per-call environment handed to precompiled handlers and the VM.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub tx_hash: Hash,
    /// Index of the transaction within the block's restart window; used
    /// for deterministic logging only.
    pub context_id: i64,
    pub sender: Address,
    /// Transaction originator; equals `sender` for top-level calls.
    pub origin: Address,
    /// Empty for deployments.
    pub to: Option<Address>,
    pub input: Bytes,
    pub gas_limit: u64,
}

impl CallContext {
    pub fn from_transaction(tx: &Transaction, context_id: i64) -> Self {
        Self {
            tx_hash: tx.hash(),
            context_id,
            sender: *tx.sender(),
            origin: *tx.sender(),
            to: tx.to().copied(),
            input: tx.input().clone(),
            gas_limit: tx.gas_limit(),
        }
    }
}

/// Raw outcome of the opaque byte-code interpreter.
#[derive(Debug, Clone)]
pub struct VmOutput {
    pub status: i32,
    pub gas_used: u64,
    pub output: Bytes,
    pub logs: Vec<LogEntry>,
    pub new_address: Option<Address>,
}

impl VmOutput {
    pub fn success(gas_used: u64, output: Bytes) -> Self {
        Self {
            status: status::SUCCESS,
            gas_used,
            output,
            logs: Vec::new(),
            new_address: None,
        }
    }

    pub fn revert(gas_used: u64, output: Bytes) -> Self {
        Self {
            status: status::REVERT,
            gas_used,
            output,
            logs: Vec::new(),
            new_address: None,
        }
    }
}

/// The byte-code interpreter boundary. The callback reads and writes
/// exclusively through the provided state view and must not retain it.
/// Nested call frames take their own savepoints through the same view.
#[async_trait]
pub trait Vm: Send + Sync {
    async fn execute(
        &self,
        header: &BlockHeader,
        ctx: &CallContext,
        state: &mut dyn VmState,
    ) -> Result<VmOutput, ChainError>;
}

/// Everything shared by the executors of one block. Owns the precompiled
/// registry; executors borrow it for the block's lifetime.
pub struct BlockContext {
    header: Arc<BlockHeader>,
    config: GlobalConfig,
    registry: PrecompiledRegistry,
}

impl BlockContext {
    pub fn new(header: Arc<BlockHeader>, config: GlobalConfig) -> Self {
        Self {
            header,
            config,
            registry: PrecompiledRegistry::new(),
        }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn registry(&self) -> &PrecompiledRegistry {
        &self.registry
    }
}

/// Drives one transaction at a time. Strictly single threaded per
/// instance; instantiate one per chunk for parallel execution.
pub struct TransactionExecutor<'a, V> {
    context: &'a BlockContext,
    vm: &'a V,
}

impl<'a, V: Vm> TransactionExecutor<'a, V> {
    pub fn new(context: &'a BlockContext, vm: &'a V) -> Self {
        Self { context, vm }
    }

    pub async fn execute<S: StateStore>(
        &self,
        tx: &Transaction,
        state: &mut Rollbackable<'_, S>,
        context_id: i64,
    ) -> Result<Receipt, ChainError> {
        let ctx = CallContext::from_transaction(tx, context_id);
        let savepoint = state.savepoint();

        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "executing tx {} context_id={} to={:?}",
                ctx.tx_hash,
                context_id,
                ctx.to.as_ref().map(Address::to_hex)
            );
        }

        if let Some(contract) = ctx.to.and_then(|to| self.context.registry.lookup(&to)) {
            return match contract
                .call(&ctx, &self.context.header, &self.context.config, state)
                .await
            {
                Ok(result) => Ok(Receipt::success(result.gas_used, result.output, Vec::new())),
                Err(PrecompiledError::Revert { code, message }) => {
                    if log::log_enabled!(log::Level::Debug) {
                        debug!(
                            "tx {} precompiled revert code={} message={}",
                            ctx.tx_hash, code, message
                        );
                    }
                    state.rollback_to(savepoint);
                    Ok(Receipt::failure(code, 0, Bytes::from(message)))
                }
                Err(PrecompiledError::Fatal(err)) => Err(err),
            };
        }

        let result = self.vm.execute(&self.context.header, &ctx, state).await?;
        if result.status != status::SUCCESS {
            if log::log_enabled!(log::Level::Debug) {
                debug!("tx {} reverted with status {}", ctx.tx_hash, result.status);
            }
            state.rollback_to(savepoint);
            return Ok(Receipt::failure(result.status, result.gas_used, result.output));
        }

        if tx.is_deployment() {
            let address = result
                .new_address
                .unwrap_or_else(|| tx.deployment_address());
            return Ok(Receipt::deployed(
                result.gas_used,
                result.output,
                address,
                result.logs,
            ));
        }
        Ok(Receipt::success(result.gas_used, result.output, result.logs))
    }
}
