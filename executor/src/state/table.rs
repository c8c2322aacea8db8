//! Table metadata and row access conventions over the flat key/value
//! state. A table is a row in the meta table whose own schema is
//! `key_field,value_fields`; its rows live under the table's namespace.

use super::{sys, StateStore};
use crate::error::ChainError;
use std::str::FromStr;
use tessera_common::{
    crypto::Address,
    state::{Entry, StateKey, TableInfo},
};

pub const FIELD_KEY_FIELD: &str = "key_field";
pub const FIELD_VALUE_FIELDS: &str = "value_fields";
pub const FIELD_ADDRESSES: &str = "addresses";

pub fn meta_key(table: &str) -> StateKey {
    StateKey::new(sys::TABLES, table.as_bytes().to_vec())
}

pub fn access_key(table: &str) -> StateKey {
    StateKey::new(sys::TABLE_ACCESS, table.as_bytes().to_vec())
}

pub fn row_key(table: &str, key: &str) -> StateKey {
    StateKey::new(table, key.as_bytes().to_vec())
}

/// Read a table's metadata, including its authorized-writer set.
pub async fn read_table_info<S: StateStore + ?Sized>(
    state: &mut S,
    name: &str,
) -> Result<Option<TableInfo>, ChainError> {
    let Some(meta) = state.get(&meta_key(name)).await? else {
        return Ok(None);
    };

    let key_field = meta.field_utf8(FIELD_KEY_FIELD);
    let value_fields = split_csv(&meta.field_utf8(FIELD_VALUE_FIELDS));

    let mut info = TableInfo::new(name, key_field, value_fields);
    if let Some(access) = state.get(&access_key(name)).await? {
        info.authorized_writers = split_csv(&access.field_utf8(FIELD_ADDRESSES))
            .iter()
            .filter_map(|addr| Address::from_str(addr).ok())
            .collect();
    }
    Ok(Some(info))
}

/// Write (or rewrite) a table's meta row. Existence checks are the
/// caller's responsibility.
pub async fn write_table_meta<S: StateStore + ?Sized>(
    state: &mut S,
    info: &TableInfo,
) -> Result<(), ChainError> {
    let mut meta = Entry::new();
    meta.set_field(FIELD_KEY_FIELD, info.key_field.clone());
    meta.set_field(FIELD_VALUE_FIELDS, info.value_fields.join(","));
    state.put(meta_key(&info.name), meta).await
}

pub fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Borrow-for-the-call handle over one table's rows.
pub struct Table<'a, S: StateStore + ?Sized> {
    info: TableInfo,
    state: &'a mut S,
}

impl<'a, S: StateStore + ?Sized> Table<'a, S> {
    /// Open an existing table; `None` if it was never created.
    pub async fn open(state: &'a mut S, name: &str) -> Result<Option<Table<'a, S>>, ChainError> {
        match read_table_info(state, name).await? {
            Some(info) => Ok(Some(Self { info, state })),
            None => Ok(None),
        }
    }

    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    pub async fn get_row(&mut self, key: &str) -> Result<Option<Entry>, ChainError> {
        self.state.get(&row_key(&self.info.name, key)).await
    }

    pub async fn set_row(&mut self, key: &str, entry: Entry) -> Result<(), ChainError> {
        self.state.put(row_key(&self.info.name, key), entry).await
    }

    pub async fn remove_row(&mut self, key: &str) -> Result<(), ChainError> {
        self.state.remove(&row_key(&self.info.name, key)).await
    }

    /// All live rows in key order.
    pub async fn rows(&mut self) -> Result<Vec<(String, Entry)>, ChainError> {
        Ok(self
            .state
            .scan_prefix(&self.info.name)
            .await?
            .into_iter()
            .map(|(key, entry)| (key.key_utf8(), entry))
            .collect())
    }
}
