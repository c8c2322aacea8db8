use super::layer::{EntryState, FrozenLayer, MutableLayer};
use super::StateStore;
use crate::{error::ChainError, storage::KvBackend};
use async_trait::async_trait;
use log::{debug, trace};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_common::state::{Entry, StateKey};

/// One read-only rung of the layer stack.
#[derive(Clone)]
enum LayerRef {
    Mutable(Arc<MutableLayer>),
    Frozen(Arc<FrozenLayer>),
}

impl LayerRef {
    fn state(&self, key: &StateKey) -> EntryState {
        match self {
            LayerRef::Mutable(layer) => layer.state(key),
            LayerRef::Frozen(layer) => layer.state(key),
        }
    }

    fn collect_table(&self, table: &str, out: &mut BTreeMap<StateKey, Option<Entry>>) {
        match self {
            LayerRef::Mutable(layer) => layer.collect_table(table, out),
            LayerRef::Frozen(layer) => layer.collect_table(table, out),
        }
    }
}

/// Snapshot of the layer identity list at one instant, top first. Cloning
/// is cheap; the layers themselves are shared. Every chunk of one pipeline
/// round holds the same view, which pins O3: all chunks observe the same
/// base layers.
pub struct StoreView<B> {
    layers: Vec<LayerRef>,
    backend: Arc<B>,
}

impl<B> Clone for StoreView<B> {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.clone(),
            backend: self.backend.clone(),
        }
    }
}

impl<B: KvBackend> StoreView<B> {
    pub async fn read(&self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        for layer in &self.layers {
            if let Some(result) = layer.state(key).resolved() {
                return Ok(result);
            }
        }
        self.backend.read_one(key).await
    }

    /// Overlay every layer's records for `table` over the backend rows.
    pub async fn collect_table(
        &self,
        table: &str,
        out: &mut BTreeMap<StateKey, Option<Entry>>,
    ) -> Result<(), ChainError> {
        for layer in &self.layers {
            layer.collect_table(table, out);
        }
        let mut cursor = self.backend.seek(&StateKey::new(table, bytes::Bytes::new())).await?;
        while let Some((key, record)) = cursor.next() {
            if !out.contains_key(&key) {
                out.insert(key, record);
            }
        }
        Ok(())
    }
}

/// Stack of state layers over a durable backend:
/// `[mutable?, immutable_0 (newest), .., immutable_n, backend]`.
///
/// Reads walk top-down and stop at the first `Stored` or `Deleted`
/// observation. Writes only ever touch the mutable top layer. At most one
/// mutable layer exists at a time.
pub struct MultiLayerStore<B> {
    mutable: Option<Arc<MutableLayer>>,
    /// Newest first.
    immutables: Vec<Arc<FrozenLayer>>,
    backend: Arc<B>,
}

impl<B: KvBackend> MultiLayerStore<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            mutable: None,
            immutables: Vec::new(),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn immutable_count(&self) -> usize {
        self.immutables.len()
    }

    pub fn has_mutable(&self) -> bool {
        self.mutable.is_some()
    }

    /// Add an empty mutable layer on top. Fails if one already exists.
    pub fn push_mutable(&mut self) -> Result<(), ChainError> {
        if self.mutable.is_some() {
            return Err(ChainError::MutableLayerExists);
        }
        trace!("pushing new mutable layer");
        self.mutable = Some(Arc::new(MutableLayer::new()));
        Ok(())
    }

    /// Freeze the mutable layer, push it onto the immutable stack and
    /// return it. The frozen layer is never mutated again.
    pub fn pop_mutable(&mut self) -> Result<Arc<FrozenLayer>, ChainError> {
        let layer = self.mutable.take().ok_or(ChainError::NoMutableLayer)?;
        let layer = Arc::try_unwrap(layer)
            .map_err(|_| ChainError::TaskFailure("mutable layer still shared on freeze".into()))?;
        let frozen = Arc::new(layer.freeze());
        if log::log_enabled!(log::Level::Debug) {
            debug!("froze mutable layer with {} records", frozen.len());
        }
        self.immutables.insert(0, frozen.clone());
        Ok(frozen)
    }

    /// Drop the mutable layer without committing anything (block abort).
    pub fn discard_mutable(&mut self) {
        if self.mutable.take().is_some() {
            debug!("discarded mutable layer");
        }
    }

    pub fn mutable_layer(&self) -> Result<&Arc<MutableLayer>, ChainError> {
        self.mutable.as_ref().ok_or(ChainError::NoMutableLayer)
    }

    /// Capture the current layer identities, top first, mutable included.
    pub fn view(&self) -> StoreView<B> {
        let mut layers = Vec::with_capacity(self.immutables.len() + 1);
        if let Some(mutable) = &self.mutable {
            layers.push(LayerRef::Mutable(mutable.clone()));
        }
        layers.extend(self.immutables.iter().cloned().map(LayerRef::Frozen));
        StoreView {
            layers,
            backend: self.backend.clone(),
        }
    }

    pub async fn read(&self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        if let Some(mutable) = &self.mutable {
            if let Some(result) = mutable.state(key).resolved() {
                return Ok(result);
            }
        }
        for layer in &self.immutables {
            if let Some(result) = layer.state(key).resolved() {
                return Ok(result);
            }
        }
        self.backend.read_one(key).await
    }

    pub async fn read_some(&self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            entries.push(self.read(key).await?);
        }
        Ok(entries)
    }

    pub fn write(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError> {
        self.mutable_layer()?.put(key, entry);
        Ok(())
    }

    pub fn remove(&mut self, key: StateKey) -> Result<(), ChainError> {
        self.mutable_layer()?.delete(key);
        Ok(())
    }

    /// Fold the oldest immutable layer into the backend. Stored records
    /// become an atomic upsert batch, tombstones an atomic delete batch.
    pub async fn merge_down(&mut self) -> Result<(), ChainError> {
        let layer = self.immutables.pop().ok_or(ChainError::NoImmutableLayer)?;

        let mut writes = Vec::new();
        let mut removes = Vec::new();
        for (key, record) in layer.iter() {
            match record {
                Some(entry) => writes.push((key.clone(), entry.clone())),
                None => removes.push(key.clone()),
            }
        }
        if log::log_enabled!(log::Level::Debug) {
            debug!(
                "merging layer down: {} upserts, {} deletes",
                writes.len(),
                removes.len()
            );
        }
        if !writes.is_empty() {
            self.backend.write_some(writes).await?;
        }
        if !removes.is_empty() {
            self.backend.remove_some(removes).await?;
        }
        Ok(())
    }

    pub async fn scan_table(&self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        self.view().scan_table(table).await
    }
}

impl<B: KvBackend> StoreView<B> {
    /// Materialized table scan: live rows only, in key order.
    pub async fn scan_table(&self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        let mut merged = BTreeMap::new();
        self.collect_table(table, &mut merged).await?;
        Ok(merged
            .into_iter()
            .filter_map(|(key, record)| record.map(|entry| (key, entry)))
            .collect())
    }
}

#[async_trait]
impl<B: KvBackend> StateStore for MultiLayerStore<B> {
    async fn get(&mut self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        self.read(key).await
    }

    async fn get_some(&mut self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        self.read_some(keys).await
    }

    async fn scan_prefix(&mut self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        self.scan_table(table).await
    }

    async fn put(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError> {
        self.write(key, entry)
    }

    async fn remove(&mut self, key: &StateKey) -> Result<(), ChainError> {
        MultiLayerStore::remove(self, key.clone())
    }

    fn front(&self, key: &StateKey) -> EntryState {
        match &self.mutable {
            Some(layer) => layer.state(key),
            None => EntryState::Absent,
        }
    }

    fn restore(&mut self, key: StateKey, prior: EntryState) {
        if let Some(layer) = &self.mutable {
            layer.restore(key, prior);
        }
    }
}

/// A chunk's private store: an owned mutable layer over a shared view of
/// the global store. Chunk writes stay invisible to other chunks until the
/// serial merge stage folds them into the global mutable layer.
pub struct ChunkStore<B> {
    mutable: MutableLayer,
    base: StoreView<B>,
}

impl<B: KvBackend> ChunkStore<B> {
    pub fn new(base: StoreView<B>) -> Self {
        Self {
            mutable: MutableLayer::new(),
            base,
        }
    }

    /// Extract the private writes, sorted for a deterministic merge.
    pub fn into_writes(self) -> FrozenLayer {
        self.mutable.freeze()
    }
}

#[async_trait]
impl<B: KvBackend> StateStore for ChunkStore<B> {
    async fn get(&mut self, key: &StateKey) -> Result<Option<Entry>, ChainError> {
        if let Some(result) = self.mutable.state(key).resolved() {
            return Ok(result);
        }
        self.base.read(key).await
    }

    async fn get_some(&mut self, keys: &[StateKey]) -> Result<Vec<Option<Entry>>, ChainError> {
        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            entries.push(self.get(key).await?);
        }
        Ok(entries)
    }

    async fn scan_prefix(&mut self, table: &str) -> Result<Vec<(StateKey, Entry)>, ChainError> {
        let mut merged = BTreeMap::new();
        self.mutable.collect_table(table, &mut merged);
        self.base.collect_table(table, &mut merged).await?;
        Ok(merged
            .into_iter()
            .filter_map(|(key, record)| record.map(|entry| (key, entry)))
            .collect())
    }

    async fn put(&mut self, key: StateKey, entry: Entry) -> Result<(), ChainError> {
        self.mutable.put(key, entry);
        Ok(())
    }

    async fn remove(&mut self, key: &StateKey) -> Result<(), ChainError> {
        self.mutable.delete(key.clone());
        Ok(())
    }

    fn front(&self, key: &StateKey) -> EntryState {
        self.mutable.state(key)
    }

    fn restore(&mut self, key: StateKey, prior: EntryState) {
        self.mutable.restore(key, prior);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn key(k: &str) -> StateKey {
        StateKey::new("t", k.to_string())
    }

    fn store() -> MultiLayerStore<MemoryBackend> {
        MultiLayerStore::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn test_single_mutable_layer_enforced() {
        let mut store = store();
        store.push_mutable().unwrap();
        assert!(matches!(
            store.push_mutable(),
            Err(ChainError::MutableLayerExists)
        ));
    }

    #[tokio::test]
    async fn test_write_requires_mutable_layer() {
        let mut store = store();
        assert!(matches!(
            store.write(key("k"), Entry::from_value("v")),
            Err(ChainError::NoMutableLayer)
        ));
    }

    #[tokio::test]
    async fn test_read_falls_through_layers() {
        let mut store = store();
        store
            .backend()
            .write_some(vec![(key("base"), Entry::from_value("disk"))])
            .await
            .unwrap();

        store.push_mutable().unwrap();
        store.write(key("a"), Entry::from_value("1")).unwrap();
        store.pop_mutable().unwrap();

        store.push_mutable().unwrap();
        store.write(key("a"), Entry::from_value("2")).unwrap();

        // top layer wins
        assert_eq!(
            store.read(&key("a")).await.unwrap(),
            Some(Entry::from_value("2"))
        );
        // falls through to backend
        assert_eq!(
            store.read(&key("base")).await.unwrap(),
            Some(Entry::from_value("disk"))
        );
    }

    #[tokio::test]
    async fn test_tombstone_short_circuits() {
        let mut store = store();
        store.push_mutable().unwrap();
        store.write(key("k"), Entry::from_value("v")).unwrap();
        store.pop_mutable().unwrap();

        store.push_mutable().unwrap();
        store.remove(key("k")).unwrap();
        assert_eq!(store.read(&key("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_merge_down_applies_tombstones() {
        let mut store = store();
        store.push_mutable().unwrap();
        store.write(key("keep"), Entry::from_value("v")).unwrap();
        store.write(key("gone"), Entry::from_value("v")).unwrap();
        store.pop_mutable().unwrap();

        store.push_mutable().unwrap();
        store.remove(key("gone")).unwrap();
        store.pop_mutable().unwrap();

        // oldest first: the layer with both writes, then the tombstone
        store.merge_down().await.unwrap();
        store.merge_down().await.unwrap();
        assert_eq!(store.immutable_count(), 0);

        assert_eq!(
            store.backend().read_one(&key("keep")).await.unwrap(),
            Some(Entry::from_value("v"))
        );
        assert_eq!(store.backend().read_one(&key("gone")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_chunk_store_isolation() {
        let mut store = store();
        store.push_mutable().unwrap();
        store.write(key("shared"), Entry::from_value("global")).unwrap();

        let mut chunk_a = ChunkStore::new(store.view());
        let mut chunk_b = ChunkStore::new(store.view());

        chunk_a.put(key("shared"), Entry::from_value("a")).await.unwrap();
        // B still sees the global value, not A's private write
        assert_eq!(
            chunk_b.get(&key("shared")).await.unwrap(),
            Some(Entry::from_value("global"))
        );
    }

    #[tokio::test]
    async fn test_scan_table_overlay_order() {
        let mut store = store();
        store
            .backend()
            .write_some(vec![
                (key("a"), Entry::from_value("disk-a")),
                (key("c"), Entry::from_value("disk-c")),
            ])
            .await
            .unwrap();

        store.push_mutable().unwrap();
        store.write(key("b"), Entry::from_value("mem-b")).unwrap();
        store.write(key("a"), Entry::from_value("mem-a")).unwrap();
        store.remove(key("c")).unwrap();

        let rows = store.scan_table("t").await.unwrap();
        let values: Vec<_> = rows
            .iter()
            .map(|(k, e)| (k.key_utf8(), e.field_utf8("value")))
            .collect();
        assert_eq!(
            values,
            vec![
                ("a".to_string(), "mem-a".to_string()),
                ("b".to_string(), "mem-b".to_string()),
            ]
        );
    }
}
