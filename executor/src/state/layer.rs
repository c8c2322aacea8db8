use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tessera_common::state::{Entry, StateKey};

/// Observation of one key in a single layer.
/// `Deleted` is a tombstone: the key is gone even if a lower layer still
/// holds a value. `Absent` means this layer knows nothing and the lookup
/// must fall through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState {
    Stored(Entry),
    Deleted,
    Absent,
}

impl EntryState {
    pub fn is_stored(&self) -> bool {
        matches!(self, EntryState::Stored(_))
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, EntryState::Deleted)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, EntryState::Absent)
    }

    /// Stored/Deleted resolve to a final answer, Absent keeps looking.
    pub fn resolved(self) -> Option<Option<Entry>> {
        match self {
            EntryState::Stored(entry) => Some(Some(entry)),
            EntryState::Deleted => Some(None),
            EntryState::Absent => None,
        }
    }

    pub fn stored(self) -> Option<Entry> {
        match self {
            EntryState::Stored(entry) => Some(entry),
            _ => None,
        }
    }

    fn from_record(record: Option<&Option<Entry>>) -> Self {
        match record {
            Some(Some(entry)) => EntryState::Stored(entry.clone()),
            Some(None) => EntryState::Deleted,
            None => EntryState::Absent,
        }
    }
}

/// The single writable layer of a store. Concurrent readers are allowed
/// while the serial merge stage writes, which is exactly the overlap the
/// conflict detector exists to police.
#[derive(Debug, Default)]
pub struct MutableLayer {
    entries: DashMap<StateKey, Option<Entry>>,
    dirty: AtomicBool,
}

impl MutableLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &StateKey) -> EntryState {
        match self.entries.get(key) {
            Some(guard) => match guard.value() {
                Some(entry) => EntryState::Stored(entry.clone()),
                None => EntryState::Deleted,
            },
            None => EntryState::Absent,
        }
    }

    pub fn put(&self, key: StateKey, entry: Entry) {
        self.apply(key, Some(entry));
    }

    /// Write a tombstone.
    pub fn delete(&self, key: StateKey) {
        self.apply(key, None);
    }

    /// Raw record write; `None` is a tombstone.
    pub fn apply(&self, key: StateKey, record: Option<Entry>) {
        self.dirty.store(true, Ordering::Relaxed);
        self.entries.insert(key, record);
    }

    /// Forget the key entirely, so lookups fall through again.
    /// This is the rollback primitive, not a user-visible delete.
    pub fn erase(&self, key: &StateKey) {
        self.entries.remove(key);
    }

    pub fn restore(&self, key: StateKey, prior: EntryState) {
        match prior {
            EntryState::Stored(entry) => self.apply(key, Some(entry)),
            EntryState::Deleted => self.apply(key, None),
            EntryState::Absent => self.erase(&key),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlay this layer's records for `table` into `out`, keeping
    /// whatever a higher layer already put there.
    pub fn collect_table(&self, table: &str, out: &mut BTreeMap<StateKey, Option<Entry>>) {
        for item in self.entries.iter() {
            if item.key().table() == table && !out.contains_key(item.key()) {
                out.insert(item.key().clone(), item.value().clone());
            }
        }
    }

    /// Convert into an immutable snapshot with deterministic (sorted)
    /// iteration order.
    pub fn freeze(self) -> FrozenLayer {
        FrozenLayer {
            entries: self.entries.into_iter().collect(),
        }
    }
}

/// An immutable snapshot produced by freezing a mutable layer.
#[derive(Debug, Default)]
pub struct FrozenLayer {
    entries: BTreeMap<StateKey, Option<Entry>>,
}

impl FrozenLayer {
    pub fn state(&self, key: &StateKey) -> EntryState {
        EntryState::from_record(self.entries.get(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &Option<Entry>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collect_table(&self, table: &str, out: &mut BTreeMap<StateKey, Option<Entry>>) {
        let from = StateKey::new(table, bytes::Bytes::new());
        for (key, record) in self.entries.range(from..) {
            if key.table() != table {
                break;
            }
            if !out.contains_key(key) {
                out.insert(key.clone(), record.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> StateKey {
        StateKey::new("t", k.to_string())
    }

    #[test]
    fn test_put_delete_erase_are_distinct() {
        let layer = MutableLayer::new();
        assert_eq!(layer.state(&key("k")), EntryState::Absent);

        layer.put(key("k"), Entry::from_value("v"));
        assert!(layer.state(&key("k")).is_stored());

        layer.delete(key("k"));
        assert_eq!(layer.state(&key("k")), EntryState::Deleted);

        layer.erase(&key("k"));
        assert_eq!(layer.state(&key("k")), EntryState::Absent);
    }

    #[test]
    fn test_restore_round_trips_every_state() {
        let layer = MutableLayer::new();
        for prior in [
            EntryState::Stored(Entry::from_value("old")),
            EntryState::Deleted,
            EntryState::Absent,
        ] {
            layer.put(key("k"), Entry::from_value("new"));
            layer.restore(key("k"), prior.clone());
            assert_eq!(layer.state(&key("k")), prior);
        }
    }

    #[test]
    fn test_freeze_preserves_observations_and_sorts() {
        let layer = MutableLayer::new();
        layer.put(key("b"), Entry::from_value("2"));
        layer.put(key("a"), Entry::from_value("1"));
        layer.delete(key("c"));

        let frozen = layer.freeze();
        assert!(frozen.state(&key("a")).is_stored());
        assert!(frozen.state(&key("c")).is_deleted());
        assert!(frozen.state(&key("d")).is_absent());

        let keys: Vec<_> = frozen.iter().map(|(k, _)| k.key_utf8()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dirty_flag() {
        let layer = MutableLayer::new();
        assert!(!layer.is_dirty());
        layer.put(key("k"), Entry::from_value("v"));
        assert!(layer.is_dirty());
    }
}
