//! Shared test fixtures: a mock VM interpreting a tiny command language
//! over the state interface, and block/transaction builders.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tessera_common::{
    block::BlockHeader,
    crypto::{Address, Hash},
    transaction::Transaction,
};
use tessera_executor::error::ChainError;
use tessera_executor::executor::{CallContext, Vm, VmOutput};
use tessera_executor::state::VmState;
use tessera_executor::storage::MemoryBackend;
use tessera_executor::state::MultiLayerStore;
use tessera_common::serializer::{Reader, ReaderError, Writer};
use tessera_common::state::{Entry, StateKey};

pub const LEDGER_TABLE: &str = "ledger";
pub const SCRATCH_TABLE: &str = "scratch";

const OP_DEPLOY: u8 = 0x00;
const OP_SET: u8 = 0x01;
const OP_GET: u8 = 0x02;
const OP_DEL: u8 = 0x03;
const OP_ISSUE: u8 = 0x10;
const OP_TRANSFER: u8 = 0x11;
const OP_SET_THEN_REVERT: u8 = 0x20;
const OP_NESTED_ROLLBACK: u8 = 0x30;
const OP_READ_THEN_SET: u8 = 0x40;

const MOCK_GAS: u64 = 21_000;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn header(number: u64) -> BlockHeader {
    BlockHeader::new(number, Hash::zero(), 1_700_000_000 + number, 30_000_000, 1)
}

pub fn sender(id: u8) -> Address {
    Address::reserved(0xAA00 + id as u16)
}

pub fn transaction(nonce: u64, to: Option<Address>, input: Vec<u8>) -> Transaction {
    transaction_from(sender((nonce % 7) as u8), nonce, to, input)
}

pub fn transaction_from(
    from: Address,
    nonce: u64,
    to: Option<Address>,
    input: Vec<u8>,
) -> Transaction {
    Transaction::new(from, to, input, nonce, 1_000, "chain0", "group0", 3_000_000)
}

pub fn contract_address() -> Address {
    Address::reserved(0xC0DE)
}

fn scratch_key(key: &str) -> StateKey {
    StateKey::new(SCRATCH_TABLE, key.as_bytes().to_vec())
}

fn ledger_key(account: u8) -> StateKey {
    StateKey::new(LEDGER_TABLE, account.to_string().into_bytes())
}

pub fn new_store() -> MultiLayerStore<MemoryBackend> {
    MultiLayerStore::new(Arc::new(MemoryBackend::new()))
}

// Input builders

pub fn deploy_input() -> Vec<u8> {
    vec![OP_DEPLOY]
}

pub fn set_input(key: &str, value: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_SET);
    writer.write_string(key);
    writer.write_string(value);
    bytes
}

pub fn get_input(key: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_GET);
    writer.write_string(key);
    bytes
}

pub fn del_input(key: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_DEL);
    writer.write_string(key);
    bytes
}

pub fn issue_input(account: u8, amount: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_ISSUE);
    writer.write_u8(account);
    writer.write_u64(amount);
    bytes
}

pub fn transfer_input(from: u8, to: u8, amount: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_TRANSFER);
    writer.write_u8(from);
    writer.write_u8(to);
    writer.write_u64(amount);
    bytes
}

pub fn set_then_revert_input(key: &str, value: &str) -> Vec<u8> {
    let mut bytes = set_input(key, value);
    bytes[0] = OP_SET_THEN_REVERT;
    bytes
}

pub fn nested_rollback_input() -> Vec<u8> {
    vec![OP_NESTED_ROLLBACK]
}

pub fn read_then_set_input(read_key: &str, write_key: &str, value: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut writer = Writer::new(&mut bytes);
    writer.write_u8(OP_READ_THEN_SET);
    writer.write_string(read_key);
    writer.write_string(write_key);
    writer.write_string(value);
    bytes
}

/// Interpreter over the mock command language. Stateless; every effect
/// goes through the provided state view, exactly like the real VM.
pub struct MockVm;

impl MockVm {
    async fn balance_of(
        state: &mut dyn VmState,
        account: u8,
    ) -> Result<u64, ChainError> {
        Ok(match state.get(&ledger_key(account)).await? {
            Some(entry) => entry.field_utf8("balance").parse().unwrap_or(0),
            None => 0,
        })
    }

    async fn set_balance(
        state: &mut dyn VmState,
        account: u8,
        balance: u64,
    ) -> Result<(), ChainError> {
        state
            .put(
                ledger_key(account),
                Entry::from_fields([("balance", balance.to_string())]),
            )
            .await
    }
}

fn malformed(err: ReaderError) -> ChainError {
    ChainError::TaskFailure(format!("malformed mock input: {err}"))
}

#[async_trait]
impl Vm for MockVm {
    async fn execute(
        &self,
        _header: &BlockHeader,
        ctx: &CallContext,
        state: &mut dyn VmState,
    ) -> Result<VmOutput, ChainError> {
        let mut reader = Reader::new(&ctx.input);
        let op = reader.read_u8().map_err(malformed)?;

        match op {
            OP_DEPLOY => Ok(VmOutput::success(MOCK_GAS, Bytes::new())),
            OP_SET => {
                let key = reader.read_string().map_err(malformed)?;
                let value = reader.read_string().map_err(malformed)?;
                state
                    .put(scratch_key(&key), Entry::from_value(value))
                    .await?;
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            OP_GET => {
                let key = reader.read_string().map_err(malformed)?;
                let output = match state.get(&scratch_key(&key)).await? {
                    Some(entry) => entry.field_or_empty("value"),
                    None => Bytes::new(),
                };
                Ok(VmOutput::success(MOCK_GAS, output))
            }
            OP_DEL => {
                let key = reader.read_string().map_err(malformed)?;
                state.remove(&scratch_key(&key)).await?;
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            OP_ISSUE => {
                let account = reader.read_u8().map_err(malformed)?;
                let amount = reader.read_u64().map_err(malformed)?;
                let balance = Self::balance_of(state, account).await?;
                Self::set_balance(state, account, balance + amount).await?;
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            OP_TRANSFER => {
                let from = reader.read_u8().map_err(malformed)?;
                let to = reader.read_u8().map_err(malformed)?;
                let amount = reader.read_u64().map_err(malformed)?;

                let from_balance = Self::balance_of(state, from).await?;
                if from_balance < amount {
                    return Ok(VmOutput::revert(
                        MOCK_GAS,
                        Bytes::from_static(b"insufficient balance"),
                    ));
                }
                let to_balance = Self::balance_of(state, to).await?;
                Self::set_balance(state, from, from_balance - amount).await?;
                Self::set_balance(state, to, to_balance + amount).await?;
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            OP_SET_THEN_REVERT => {
                let key = reader.read_string().map_err(malformed)?;
                let value = reader.read_string().map_err(malformed)?;
                state
                    .put(scratch_key(&key), Entry::from_value(value))
                    .await?;
                Ok(VmOutput::revert(
                    MOCK_GAS,
                    Bytes::from_static(b"deliberate revert"),
                ))
            }
            OP_NESTED_ROLLBACK => {
                // write a=1, inner frame writes a=2 and b=3, inner reverts
                state
                    .put(scratch_key("a"), Entry::from_value("1"))
                    .await?;
                let inner = state.savepoint();
                state
                    .put(scratch_key("a"), Entry::from_value("2"))
                    .await?;
                state
                    .put(scratch_key("b"), Entry::from_value("3"))
                    .await?;
                state.rollback_to(inner);
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            OP_READ_THEN_SET => {
                let read_key = reader.read_string().map_err(malformed)?;
                let write_key = reader.read_string().map_err(malformed)?;
                let value = reader.read_string().map_err(malformed)?;

                let observed = match state.get(&scratch_key(&read_key)).await? {
                    Some(entry) => entry.field_utf8("value"),
                    None => String::new(),
                };
                state
                    .put(
                        scratch_key(&write_key),
                        Entry::from_value(format!("{value}:{observed}")),
                    )
                    .await?;
                Ok(VmOutput::success(MOCK_GAS, Bytes::new()))
            }
            other => Ok(VmOutput {
                status: tessera_common::receipt::status::BAD_CALL,
                gas_used: 0,
                output: Bytes::from(format!("unknown opcode {other:#x}")),
                logs: Vec::new(),
                new_address: None,
            }),
        }
    }
}

/// Read one scratch value straight from a store, layers included.
pub async fn scratch_value(
    store: &MultiLayerStore<MemoryBackend>,
    key: &str,
) -> Option<String> {
    store
        .read(&scratch_key(key))
        .await
        .unwrap()
        .map(|entry| entry.field_utf8("value"))
}

pub async fn ledger_balance(store: &MultiLayerStore<MemoryBackend>, account: u8) -> u64 {
    store
        .read(&ledger_key(account))
        .await
        .unwrap()
        .map(|entry| entry.field_utf8("balance").parse().unwrap_or(0))
        .unwrap_or(0)
}
