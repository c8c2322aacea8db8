mod memory;
mod rocksdb;

pub use self::rocksdb::{RocksBackend, RocksConfig};
pub use memory::MemoryBackend;

use crate::error::ChainError;
use async_trait::async_trait;
use tessera_common::state::{Entry, StateKey};

/// Durable ordered map of `(table, key) -> entry`.
///
/// Reads may be issued concurrently; writes are serialized by the caller
/// (the block-commit path). A successful `write_some` return implies the
/// batch is crash safe.
#[async_trait]
pub trait KvBackend: Send + Sync + 'static {
    async fn read_one(&self, key: &StateKey) -> Result<Option<Entry>, ChainError>;

    /// Multi-get preserving the input order in the result.
    async fn read_some(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            entries.push(self.read_one(key).await?);
        }
        Ok(entries)
    }

    /// Atomic batched upsert.
    async fn write_some(&self, entries: Vec<(StateKey, Entry)>) -> Result<(), ChainError>;

    /// Atomic batched delete. Removing an absent key is a no-op.
    async fn remove_some(&self, keys: Vec<StateKey>) -> Result<(), ChainError>;

    /// Forward cursor over the remainder of `from`'s table, in key order,
    /// starting at `from` inclusive. Tombstoned records are surfaced as
    /// `None` values.
    async fn seek(&self, from: &StateKey) -> Result<KvCursor, ChainError>;
}

/// Materialized forward cursor. The backend contract only promises a finite
/// in-order sequence, so eager collection is a valid implementation.
pub struct KvCursor {
    items: std::vec::IntoIter<(StateKey, Option<Entry>)>,
}

impl KvCursor {
    pub fn from_items(items: Vec<(StateKey, Option<Entry>)>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }

    pub fn next(&mut self) -> Option<(StateKey, Option<Entry>)> {
        self.items.next()
    }
}

impl Iterator for KvCursor {
    type Item = (StateKey, Option<Entry>);

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

/// Physical key layout: big-endian length-prefixed table name followed by
/// the raw row key. Rows of one table stay contiguous and byte-ordered.
pub(crate) fn compose_key(key: &StateKey) -> Vec<u8> {
    let table = key.table().as_bytes();
    let mut composed = Vec::with_capacity(2 + table.len() + key.key().len());
    composed.extend_from_slice(&(table.len() as u16).to_be_bytes());
    composed.extend_from_slice(table);
    composed.extend_from_slice(key.key());
    composed
}

pub(crate) fn decompose_key(bytes: &[u8]) -> Option<StateKey> {
    if bytes.len() < 2 {
        return None;
    }
    let table_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    if bytes.len() < 2 + table_len {
        return None;
    }
    let table = std::str::from_utf8(&bytes[2..2 + table_len]).ok()?;
    Some(StateKey::new(table, bytes[2 + table_len..].to_vec()))
}

/// All physical keys of `table` start with this prefix.
pub(crate) fn table_prefix(table: &str) -> Vec<u8> {
    let bytes = table.as_bytes();
    let mut prefix = Vec::with_capacity(2 + bytes.len());
    prefix.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    prefix.extend_from_slice(bytes);
    prefix
}
