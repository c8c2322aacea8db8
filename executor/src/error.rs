use tessera_common::serializer::ReaderError;
use thiserror::Error;

/// Failure modes of the execution core. Transaction-level reverts are not
/// errors: they roll back and surface as failed receipts. Everything here
/// either aborts the surrounding block or rejects the input outright.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("Corrupted stored record: {0}")]
    Codec(#[from] ReaderError),

    #[error("A mutable layer already exists on this store")]
    MutableLayerExists,

    #[error("No mutable layer to write into")]
    NoMutableLayer,

    #[error("No immutable layer left to merge")]
    NoImmutableLayer,

    #[error("Table {0} does not exist")]
    TableNotFound(String),

    #[error("Invalid precompiled call: {0}")]
    InvalidCall(String),

    #[error("Execution task failed: {0}")]
    TaskFailure(String),
}
