use super::{table, EntryState, StateStore, VmState};
use crate::error::ChainError;
use async_trait::async_trait;
use log::trace;
use tessera_common::state::{Entry, StateKey, TableInfo};

struct Record {
    key: StateKey,
    prior: EntryState,
}

/// Undo journal over any state store. Each mutation first captures the raw
/// top-layer observation of the key; rolling back to a savepoint replays
/// the journal suffix in reverse, which restores the exact pre-write state
/// including the difference between "was absent" and "was deleted".
///
/// One journal belongs to one executor invocation; it is not concurrent.
pub struct Rollbackable<'a, S: StateStore> {
    inner: &'a mut S,
    records: Vec<Record>,
}

impl<'a, S: StateStore> Rollbackable<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            records: Vec::new(),
        }
    }

    pub fn journal_len(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl<S: StateStore> StateStore for Rollbackable<'_, S> {
    async fn get(&mut self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        self.inner.get(key).await
    }

    async fn get_some(&mut self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        self.inner.get_some(keys).await
    }

    async fn scan_prefix(&mut self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        self.inner.scan_prefix(table).await
    }

    async fn put(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError> {
        let prior = self.inner.front(&key);
        self.records.push(Record {
            key: key.clone(),
            prior,
        });
        self.inner.put(key, entry).await
    }

    async fn remove(&mut self, key: &StateKey) -> Result<(), ChainError> {
        let prior = self.inner.front(key);
        self.records.push(Record {
            key: key.clone(),
            prior,
        });
        self.inner.remove(key).await
    }

    fn front(&self, key: &StateKey) -> EntryState {
        self.inner.front(key)
    }

    fn restore(&mut self, key: StateKey, prior: EntryState) {
        self.inner.restore(key, prior);
    }
}

#[async_trait]
impl<S: StateStore> VmState for Rollbackable<'_, S> {
    fn savepoint(&self) -> i64 {
        self.records.len() as i64
    }

    fn rollback_to(&mut self, savepoint: i64) {
        let savepoint = savepoint.max(0) as usize;
        if log::log_enabled!(log::Level::Trace) {
            trace!(
                "rollback from {} to {}",
                self.records.len(),
                savepoint
            );
        }
        while self.records.len() > savepoint {
            let record = self.records.pop().expect("journal length checked");
            self.inner.restore(record.key, record.prior);
        }
    }

    async fn open_table(&mut self, name: &str) -> Result<Option<TableInfo>, ChainError> {
        table::read_table_info(self, name).await
    }
}
