use crate::{
    crypto::{Address, Hash, Hashable},
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Receipt status values. Zero is success, small positive values are
/// VM-level failures, negative values carry precompiled domain codes.
pub mod status {
    pub const SUCCESS: i32 = 0;
    pub const REVERT: i32 = 1;
    pub const OUT_OF_GAS: i32 = 2;
    pub const BAD_CALL: i32 = 3;
    pub const INTERNAL_ERROR: i32 = 4;
}

/// One event emitted during execution.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<Hash>,
    pub data: Bytes,
}

impl Serializer for LogEntry {
    fn write(&self, writer: &mut Writer) {
        self.address.write(writer);
        self.topics.write(writer);
        self.data.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            address: Address::read(reader)?,
            topics: Vec::read(reader)?,
            data: Bytes::read(reader)?,
        })
    }
}

/// Deterministic record of one transaction's outcome. The hash covers
/// exactly the serialized tuple, with the same digest as transactions,
/// so receipt roots agree across nodes.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    status: i32,
    gas_used: u64,
    output: Bytes,
    contract_address: Option<Address>,
    logs: Vec<LogEntry>,
}

impl Receipt {
    pub fn new(
        status: i32,
        gas_used: u64,
        output: Bytes,
        contract_address: Option<Address>,
        logs: Vec<LogEntry>,
    ) -> Self {
        Self {
            status,
            gas_used,
            output,
            contract_address,
            logs,
        }
    }

    pub fn success(gas_used: u64, output: Bytes, logs: Vec<LogEntry>) -> Self {
        Self::new(status::SUCCESS, gas_used, output, None, logs)
    }

    pub fn failure(status: i32, gas_used: u64, output: Bytes) -> Self {
        Self::new(status, gas_used, output, None, Vec::new())
    }

    pub fn deployed(gas_used: u64, output: Bytes, address: Address, logs: Vec<LogEntry>) -> Self {
        Self::new(status::SUCCESS, gas_used, output, Some(address), logs)
    }

    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == status::SUCCESS
    }

    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    pub fn output(&self) -> &Bytes {
        &self.output
    }

    pub fn contract_address(&self) -> Option<&Address> {
        self.contract_address.as_ref()
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }
}

impl Serializer for Receipt {
    fn write(&self, writer: &mut Writer) {
        self.status.write(writer);
        writer.write_u64(self.gas_used);
        self.output.write(writer);
        self.contract_address.write(writer);
        self.logs.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            status: i32::read(reader)?,
            gas_used: reader.read_u64()?,
            output: Bytes::read(reader)?,
            contract_address: Option::read(reader)?,
            logs: Vec::read(reader)?,
        })
    }
}

impl Hashable for Receipt {}
