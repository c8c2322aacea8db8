use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_MAX_EXECUTE_TASKS: usize = 16;

/// Lower bound accepted for the `tx_gas_limit` system config value.
pub const TX_GAS_LIMIT_MIN: i64 = 10_000;
/// Lower bound accepted for the `tx_count_limit` system config value.
pub const TX_COUNT_LIMIT_MIN: i64 = 1;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("Invalid version string: {0}")]
    Invalid(String),
}

/// Parse a `major.minor.patch` version string into a comparable number.
pub fn to_version_number(version: &str) -> Result<u32, VersionError> {
    let mut parts = version.trim().splitn(3, '.');
    let mut number = 0u32;
    for shift in [16u32, 8, 0] {
        let part = parts
            .next()
            .ok_or_else(|| VersionError::Invalid(version.to_string()))?;
        let value: u32 = part
            .parse()
            .map_err(|_| VersionError::Invalid(version.to_string()))?;
        if value > 0xFF {
            return Err(VersionError::Invalid(version.to_string()));
        }
        number |= value << shift;
    }
    Ok(number)
}

/// Node-wide execution settings, created once at startup and threaded by
/// value through every constructor that needs it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Lowest ledger compatibility version this build accepts.
    pub min_supported_version: u32,
    /// Highest ledger compatibility version this build accepts.
    pub max_supported_version: u32,
    /// Transactions per speculative chunk.
    pub chunk_size: usize,
    /// Concurrent chunk execute tasks.
    pub max_execute_tasks: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            min_supported_version: to_version_number("3.0.0").expect("static version"),
            max_supported_version: to_version_number("3.2.0").expect("static version"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_execute_tasks: DEFAULT_MAX_EXECUTE_TASKS,
        }
    }
}

impl GlobalConfig {
    pub fn supports_version(&self, version: u32) -> bool {
        version >= self.min_supported_version && version <= self.max_supported_version
    }
}
