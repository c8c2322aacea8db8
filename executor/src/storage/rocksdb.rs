use super::{compose_key, decompose_key, table_prefix, KvBackend, KvCursor};
use crate::error::ChainError;
use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompressionType, DBWithThreadMode,
    IteratorMode, MultiThreaded, Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tessera_common::state::{decode_record, encode_record, Entry, StateKey};

const STATE_CF: &str = "state";

type InnerDB = DBWithThreadMode<MultiThreaded>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    None,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for CompressionMode {
    fn default() -> Self {
        Self::Snappy
    }
}

impl CompressionMode {
    fn convert(&self) -> DBCompressionType {
        match self {
            Self::None => DBCompressionType::None,
            Self::Snappy => DBCompressionType::Snappy,
            Self::Lz4 => DBCompressionType::Lz4,
            Self::Zstd => DBCompressionType::Zstd,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksConfig {
    #[serde(default)]
    pub compression: CompressionMode,
    /// Block cache size in bytes.
    pub cache_size: usize,
    pub max_background_jobs: i32,
}

impl Default for RocksConfig {
    fn default() -> Self {
        Self {
            compression: CompressionMode::default(),
            cache_size: 64 * 1024 * 1024,
            max_background_jobs: 4,
        }
    }
}

/// RocksDB-backed durable map. All state lives in one column family keyed
/// by the composed `(table, key)` layout, so iteration order matches the
/// logical key order within each table.
pub struct RocksBackend {
    db: Arc<InnerDB>,
}

impl RocksBackend {
    pub fn open(path: impl AsRef<Path>, config: &RocksConfig) -> Result<Self, ChainError> {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);
        options.set_compression_type(config.compression.convert());
        options.set_max_background_jobs(config.max_background_jobs);

        let mut block_options = BlockBasedOptions::default();
        block_options.set_block_cache(&Cache::new_lru_cache(config.cache_size));
        options.set_block_based_table_factory(&block_options);

        let descriptors = vec![ColumnFamilyDescriptor::new(STATE_CF, options.clone())];
        let db = InnerDB::open_cf_descriptors(&options, path.as_ref(), descriptors)?;

        info!("Opened state database at {}", path.as_ref().display());
        Ok(Self { db: Arc::new(db) })
    }

    fn state_cf(&self) -> Result<Arc<rocksdb::BoundColumnFamily<'_>>, ChainError> {
        self.db
            .cf_handle(STATE_CF)
            .with_context(|| format!("Column {:?} not found", STATE_CF))
            .map_err(ChainError::from)
    }
}

#[async_trait]
impl KvBackend for RocksBackend {
    async fn read_one(&self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        let cf = self.state_cf()?;
        match self.db.get_cf(&cf, compose_key(key))? {
            Some(bytes) => Ok(decode_record(&bytes)?),
            None => Ok(None),
        }
    }

    async fn read_some(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        let cf = self.state_cf()?;
        let composed: Vec<_> = keys.iter().map(|key| (&cf, compose_key(key))).collect();
        let mut entries = Vec::with_capacity(keys.len());
        for result in self.db.multi_get_cf(composed) {
            match result? {
                Some(bytes) => entries.push(decode_record(&bytes)?),
                None => entries.push(None),
            }
        }
        Ok(entries)
    }

    async fn write_some(&self, entries: Vec<(StateKey, Entry)>) -> Result<(), ChainError> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("writing batch of {} entries", entries.len());
        }
        let cf = self.state_cf()?;
        let mut batch = WriteBatch::default();
        for (key, entry) in &entries {
            batch.put_cf(&cf, compose_key(key), encode_record(Some(entry)));
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn remove_some(&self, keys: Vec<StateKey>) -> Result<(), ChainError> {
        if log::log_enabled!(log::Level::Debug) {
            debug!("removing batch of {} keys", keys.len());
        }
        let cf = self.state_cf()?;
        let mut batch = WriteBatch::default();
        for key in &keys {
            batch.delete_cf(&cf, compose_key(key));
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn seek(&self, from: &StateKey) -> Result<KvCursor, ChainError> {
        let cf = self.state_cf()?;
        let prefix = table_prefix(from.table());
        let start = compose_key(from);

        let mut items = Vec::new();
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, rocksdb::Direction::Forward));
        for result in iter {
            let (key, value) = result?;
            if !key.starts_with(&prefix) {
                break;
            }
            let Some(state_key) = decompose_key(&key) else {
                continue;
            };
            items.push((state_key, decode_record(&value)?));
        }
        Ok(KvCursor::from_items(items))
    }
}
