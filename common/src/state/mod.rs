use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error, Formatter},
};

use crate::crypto::Address;

/// Location of one row: a flat table namespace plus a byte-exact row key.
/// Ordering is table first, then row key, which keeps a table's rows
/// contiguous in any ordered backend.
#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Hash, Debug)]
pub struct StateKey {
    table: String,
    key: Bytes,
}

impl StateKey {
    pub fn new(table: impl Into<String>, key: impl Into<Bytes>) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &Bytes {
        &self.key
    }

    pub fn key_utf8(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}

impl Display for StateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}:{}", self.table, hex::encode(&self.key))
    }
}

impl Serializer for StateKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_string(&self.table);
        writer.write_u32(self.key.len() as u32);
        writer.write_bytes(&self.key);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let table = reader.read_string()?;
        let len = reader.read_u32()? as usize;
        let key = Bytes::from(reader.read_bytes(len)?);
        Ok(Self { table, key })
    }
}

const STATUS_NORMAL: u8 = 0;
const STATUS_DELETED: u8 = 1;

/// One stored row: field name to raw value. Iteration order is always the
/// field-name order, so serialization is position-independent of how the
/// entry was built.
#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct Entry {
    fields: BTreeMap<String, Bytes>,
}

impl Entry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Bytes>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Single unnamed value, for rows that are plain key/value pairs.
    pub fn from_value(value: impl Into<Bytes>) -> Self {
        Self::from_fields([("value", value.into())])
    }

    pub fn field(&self, name: &str) -> Option<&Bytes> {
        self.fields.get(name)
    }

    /// Missing columns read as empty: tables with appended columns keep
    /// their historical rows readable.
    pub fn field_or_empty(&self, name: &str) -> Bytes {
        self.fields.get(name).cloned().unwrap_or_else(Bytes::new)
    }

    pub fn field_utf8(&self, name: &str) -> String {
        String::from_utf8_lossy(&self.field_or_empty(name)).into_owned()
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Bytes>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Bytes)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serializer for Entry {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(STATUS_NORMAL);
        self.fields.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        match reader.read_u8()? {
            STATUS_NORMAL => Ok(Self {
                fields: BTreeMap::read(reader)?,
            }),
            STATUS_DELETED => Err(ReaderError::InvalidValue),
            _ => Err(ReaderError::InvalidValue),
        }
    }
}

/// Serialized form of a stored record, tombstones included. The backend
/// contract surfaces tombstones through `seek`, so the status byte written
/// by `Entry::write` has a deleted counterpart here.
pub fn encode_record(entry: Option<&Entry>) -> Vec<u8> {
    match entry {
        Some(entry) => entry.to_bytes(),
        None => vec![STATUS_DELETED],
    }
}

pub fn decode_record(bytes: &[u8]) -> Result<Option<Entry>, ReaderError> {
    match bytes.first() {
        Some(&STATUS_DELETED) if bytes.len() == 1 => Ok(None),
        Some(_) => Entry::from_bytes(bytes).map(Some),
        None => Err(ReaderError::NotEnoughBytes),
    }
}

/// Table metadata held in the meta table. The schema is append-only: columns
/// may be added, never removed or reordered.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub key_field: String,
    pub value_fields: Vec<String>,
    /// Addresses permitted to mutate the table; empty means unrestricted.
    #[serde(default)]
    pub authorized_writers: Vec<Address>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, key_field: impl Into<String>, value_fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            key_field: key_field.into(),
            value_fields,
            authorized_writers: Vec::new(),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.value_fields.iter().any(|f| f == name)
    }

    pub fn is_writable_by(&self, origin: &Address) -> bool {
        self.authorized_writers.is_empty() || self.authorized_writers.contains(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_round_trip() {
        let entry = Entry::from_fields([("balance", "1000"), ("owner", "alice")]);
        let decoded = Entry::from_bytes(&entry.to_bytes()).unwrap();
        assert_eq!(entry, decoded);
    }

    #[test]
    fn test_record_tombstone_round_trip() {
        let encoded = encode_record(None);
        assert_eq!(decode_record(&encoded).unwrap(), None);

        let entry = Entry::from_value("v");
        let encoded = encode_record(Some(&entry));
        assert_eq!(decode_record(&encoded).unwrap(), Some(entry));
    }

    #[test]
    fn test_missing_column_reads_empty() {
        let entry = Entry::from_fields([("a", "1")]);
        assert!(entry.field("b").is_none());
        assert_eq!(entry.field_or_empty("b"), Bytes::new());
    }

    #[test]
    fn test_state_key_ordering_groups_tables() {
        let a1 = StateKey::new("a", "z");
        let b1 = StateKey::new("b", "a");
        assert!(a1 < b1);
    }
}
