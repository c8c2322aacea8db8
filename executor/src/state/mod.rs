mod layer;
mod multilayer;
mod rollback;
mod rwset;
pub mod table;

pub use layer::{EntryState, FrozenLayer, MutableLayer};
pub use multilayer::{ChunkStore, MultiLayerStore, StoreView};
pub use rollback::Rollbackable;
pub use rwset::{ReadWriteSet, RwSetStore};

use crate::error::ChainError;
use async_trait::async_trait;
use tessera_common::state::{Entry, StateKey, TableInfo};

/// Reserved system tables.
pub mod sys {
    /// Table metadata; its own schema is `key_field,value_fields`.
    pub const TABLES: &str = "s_tables";
    /// Chain-wide configuration values with activation block numbers.
    pub const CONFIG: &str = "s_config";
    /// Consensus node list.
    pub const CONSENSUS: &str = "s_consensus";
    /// Per-table authorized writer sets.
    pub const TABLE_ACCESS: &str = "s_table_access";
    /// Account status records.
    pub const ACCOUNTS: &str = "s_accounts";

    /// Reserved namespace prefix: user tables may not start with it.
    pub const PREFIX: &str = "s_";
}

/// The layered-state interface every wrapper in the execution stack
/// implements: the store itself, chunk-private stores, the read/write-set
/// tracker and the rollback journal all compose through it.
///
/// `front`/`restore` are the raw top-layer primitives the rollback journal
/// is built on; they bypass tombstone resolution and read/write tracking.
#[async_trait]
pub trait StateStore: Send {
    /// Tombstone-resolved read through all layers.
    async fn get(&mut self, key: &StateKey) -> Result<Option<Entry>, ChainError>;

    /// Multi-read preserving argument order.
    async fn get_some(&mut self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError>;

    /// Materialized scan of a table's live rows in key order.
    async fn scan_prefix(&mut self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError>;

    async fn put(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError>;

    /// Tombstoning delete.
    async fn remove(&mut self, key: &StateKey) -> Result<(), ChainError>;

    /// Raw observation of the writable layer, before resolution.
    fn front(&self, key: &StateKey) -> EntryState;

    /// Undo primitive: reinstate a prior raw observation.
    fn restore(&mut self, key: StateKey, prior: EntryState);
}

/// The state surface handed to the VM callback and to precompiled
/// handlers. Savepoints nest: inner call frames take their own savepoint
/// and revert unwinds to it only.
#[async_trait]
pub trait VmState: StateStore {
    fn savepoint(&self) -> i64;

    /// Truncate the journal back to `savepoint`, undoing writes in reverse
    /// order.
    fn rollback_to(&mut self, savepoint: i64);

    /// Look up table metadata, authorized writers included.
    async fn open_table(&mut self, name: &str) -> Result<Option<TableInfo>, ChainError>;
}
