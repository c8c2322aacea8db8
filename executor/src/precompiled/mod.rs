//! Built-in contracts at reserved addresses, dispatched by the first four
//! bytes of the call payload (keccak256 of the canonical signature).

pub(crate) mod codec;
mod condition;

mod account;
mod auth;
mod consensus;
mod crypto;
mod kv_table;
mod system_config;
mod table_manager;

pub use condition::{CompOp, Condition};

use crate::error::ChainError;
use crate::executor::CallContext;
use crate::state::VmState;
use bytes::Bytes;
use indexmap::IndexMap;
use tessera_common::{block::BlockHeader, config::GlobalConfig, crypto::Address};

pub const SYS_CONFIG_ADDRESS: Address = Address::reserved(0x1000);
pub const CONSENSUS_ADDRESS: Address = Address::reserved(0x1001);
pub const TABLE_MANAGER_ADDRESS: Address = Address::reserved(0x1002);
pub const TABLE_ADDRESS: Address = Address::reserved(0x1003);
pub const AUTH_MANAGER_ADDRESS: Address = Address::reserved(0x1004);
pub const ACCOUNT_MANAGER_ADDRESS: Address = Address::reserved(0x1005);
pub const CRYPTO_ADDRESS: Address = Address::reserved(0x100a);

/// Domain result codes. Zero is success; failures are negative and carried
/// in the receipt status of the reverted transaction.
pub mod codes {
    pub const SUCCESS: i32 = 0;
    pub const NO_AUTHORIZED: i32 = -50000;
    pub const TABLE_NAME_ALREADY_EXIST: i32 = -50001;
    pub const TABLE_NOT_EXIST: i32 = -50002;
    pub const KEY_ALREADY_EXIST: i32 = -50003;
    pub const KEY_NOT_EXIST: i32 = -50004;
    pub const INVALID_FIELD: i32 = -50005;
    pub const UNDEFINED_FUNCTION: i32 = -50100;
    pub const INVALID_INPUT: i32 = -50101;
    pub const INVALID_NODE_ID: i32 = -51100;
    pub const NODE_NOT_EXIST: i32 = -51101;
    pub const INVALID_WEIGHT: i32 = -51102;
    pub const INVALID_CONFIGURATION_VALUES: i32 = -51300;
}

/// Successful handler return.
#[derive(Debug, Clone)]
pub struct PrecompiledOutput {
    pub output: Bytes,
    pub gas_used: u64,
}

/// Handler failure: a domain revert the executor unwinds to the
/// transaction savepoint, or a fatal fault that aborts the block.
#[derive(Debug)]
pub enum PrecompiledError {
    Revert { code: i32, message: String },
    Fatal(ChainError),
}

impl From<ChainError> for PrecompiledError {
    fn from(err: ChainError) -> Self {
        PrecompiledError::Fatal(err)
    }
}

pub type PrecompiledResult = Result<PrecompiledOutput, PrecompiledError>;

pub(crate) fn revert(code: i32, message: impl Into<String>) -> PrecompiledError {
    PrecompiledError::Revert {
        code,
        message: message.into(),
    }
}

/// The registered built-in contracts. Plain values, owned by the block
/// context; no shared-pointer graph behind the dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemContract {
    SystemConfig,
    ConsensusManager,
    TableManager,
    Table,
    AuthManager,
    AccountManager,
    Crypto,
}

impl SystemContract {
    pub async fn call(
        &self,
        ctx: &CallContext,
        header: &BlockHeader,
        config: &GlobalConfig,
        state: &mut dyn VmState,
    ) -> PrecompiledResult {
        match self {
            SystemContract::SystemConfig => system_config::call(ctx, header, config, state).await,
            SystemContract::ConsensusManager => consensus::call(ctx, header, state).await,
            SystemContract::TableManager => table_manager::call(ctx, state).await,
            SystemContract::Table => kv_table::call(ctx, state).await,
            SystemContract::AuthManager => auth::call(ctx, state).await,
            SystemContract::AccountManager => account::call(ctx, header, state).await,
            SystemContract::Crypto => crypto::call(ctx).await,
        }
    }
}

/// Address to handler mapping for the reserved address space.
pub struct PrecompiledRegistry {
    contracts: IndexMap<Address, SystemContract>,
}

impl Default for PrecompiledRegistry {
    fn default() -> Self {
        let mut contracts = IndexMap::new();
        contracts.insert(SYS_CONFIG_ADDRESS, SystemContract::SystemConfig);
        contracts.insert(CONSENSUS_ADDRESS, SystemContract::ConsensusManager);
        contracts.insert(TABLE_MANAGER_ADDRESS, SystemContract::TableManager);
        contracts.insert(TABLE_ADDRESS, SystemContract::Table);
        contracts.insert(AUTH_MANAGER_ADDRESS, SystemContract::AuthManager);
        contracts.insert(ACCOUNT_MANAGER_ADDRESS, SystemContract::AccountManager);
        contracts.insert(CRYPTO_ADDRESS, SystemContract::Crypto);
        Self { contracts }
    }
}

impl PrecompiledRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, address: &Address) -> Option<SystemContract> {
        self.contracts.get(address).copied()
    }

    pub fn is_precompiled(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.contracts.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_covers_reserved_addresses() {
        let registry = PrecompiledRegistry::new();
        assert_eq!(
            registry.lookup(&SYS_CONFIG_ADDRESS),
            Some(SystemContract::SystemConfig)
        );
        assert_eq!(
            registry.lookup(&CRYPTO_ADDRESS),
            Some(SystemContract::Crypto)
        );
        assert_eq!(registry.lookup(&Address::reserved(0x2000)), None);
        assert_eq!(registry.addresses().count(), 7);
    }
}
