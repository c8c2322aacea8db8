use super::{EntryState, StateStore};
use crate::error::ChainError;
use async_trait::async_trait;
use std::collections::HashMap;
use tessera_common::state::{Entry, StateKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RwFlag {
    read: bool,
    write: bool,
}

/// Trace of the keys a chunk touched. Instances are filled by one thread
/// and only compared after both chunks have completed, so no locking is
/// involved.
#[derive(Debug, Clone, Default)]
pub struct ReadWriteSet {
    set: HashMap<StateKey, RwFlag>,
}

impl ReadWriteSet {
    fn mark(&mut self, key: &StateKey, write: bool) {
        let flag = self.set.entry(key.clone()).or_default();
        // A write on a previously read key keeps the read flag
        flag.read |= !write;
        flag.write |= write;
    }

    pub fn merge_writes(&mut self, other: &ReadWriteSet) {
        for (key, flag) in &other.set {
            if flag.write {
                self.mark(key, true);
            }
        }
    }

    /// Read-after-write test: does `other` read anything this set wrote?
    ///
    /// The direction is deliberate. A later chunk that read a key this
    /// chunk wrote speculated on a stale value and must be replayed. A
    /// later chunk that only wrote the same key is order-safe, because the
    /// serial merge overlays its writes last.
    pub fn has_raw_conflict(&self, other: &ReadWriteSet) -> bool {
        if self.set.is_empty() || other.set.is_empty() {
            return false;
        }
        for (key, flag) in &other.set {
            if flag.read && self.set.get(key).is_some_and(|f| f.write) {
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn is_read(&self, key: &StateKey) -> bool {
        self.set.get(key).is_some_and(|f| f.read)
    }

    pub fn is_written(&self, key: &StateKey) -> bool {
        self.set.get(key).is_some_and(|f| f.write)
    }
}

/// State wrapper recording every read and write into a [`ReadWriteSet`].
/// The raw `front`/`restore` primitives pass through untracked: rollback
/// traffic is bookkeeping, not speculation.
pub struct RwSetStore<S> {
    inner: S,
    set: ReadWriteSet,
}

impl<S> RwSetStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            set: ReadWriteSet::default(),
        }
    }

    pub fn read_write_set(&self) -> &ReadWriteSet {
        &self.set
    }

    pub fn into_parts(self) -> (S, ReadWriteSet) {
        (self.inner, self.set)
    }
}

#[async_trait]
impl<S: StateStore> StateStore for RwSetStore<S> {
    async fn get(&mut self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        self.set.mark(key, false);
        self.inner.get(key).await
    }

    async fn get_some(&mut self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        for key in keys {
            self.set.mark(key, false);
        }
        self.inner.get_some(keys).await
    }

    async fn scan_prefix(&mut self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        let rows = self.inner.scan_prefix(table).await?;
        for (key, _) in &rows {
            self.set.mark(key, false);
        }
        Ok(rows)
    }

    async fn put(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError> {
        self.set.mark(&key, true);
        self.inner.put(key, entry).await
    }

    async fn remove(&mut self, key: &StateKey) -> Result<(), ChainError> {
        self.set.mark(key, true);
        self.inner.remove(key).await
    }

    fn front(&self, key: &StateKey) -> EntryState {
        self.inner.front(key)
    }

    fn restore(&mut self, key: StateKey, prior: EntryState) {
        self.inner.restore(key, prior);
    }
}
