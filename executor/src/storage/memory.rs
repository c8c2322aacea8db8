use super::{KvBackend, KvCursor};
use crate::error::ChainError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tessera_common::state::{Entry, StateKey};
use tokio::sync::RwLock;

/// Ordered in-memory backend. Primary use is tests and tooling, but it
/// honors the full durable-map contract minus actual durability.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<StateKey, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn read_one(&self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write_some(&self, entries: Vec<(StateKey, Entry)>) -> Result<(), ChainError> {
        let mut guard = self.entries.write().await;
        for (key, entry) in entries {
            guard.insert(key, entry);
        }
        Ok(())
    }

    async fn remove_some(&self, keys: Vec<StateKey>) -> Result<(), ChainError> {
        let mut guard = self.entries.write().await;
        for key in keys {
            guard.remove(&key);
        }
        Ok(())
    }

    async fn seek(&self, from: &StateKey) -> Result<KvCursor, ChainError> {
        let guard = self.entries.read().await;
        let items = guard
            .range((Bound::Included(from.clone()), Bound::Unbounded))
            .take_while(|(key, _)| key.table() == from.table())
            .map(|(key, entry)| (key.clone(), Some(entry.clone())))
            .collect();
        Ok(KvCursor::from_items(items))
    }
}
