use crate::{
    crypto::{Hash, Hashable},
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use serde::{Deserialize, Serialize};

pub type BlockNumber = u64;

/// The slice of a block header the execution core depends on. Consensus
/// fields (proposer, signatures, tips) stay with the consensus layer.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct BlockHeader {
    number: BlockNumber,
    parent_hash: Hash,
    timestamp: u64,
    gas_limit: u64,
    version: u32,
}

impl BlockHeader {
    pub fn new(
        number: BlockNumber,
        parent_hash: Hash,
        timestamp: u64,
        gas_limit: u64,
        version: u32,
    ) -> Self {
        Self {
            number,
            parent_hash,
            timestamp,
            gas_limit,
            version,
        }
    }

    pub fn number(&self) -> BlockNumber {
        self.number
    }

    pub fn parent_hash(&self) -> &Hash {
        &self.parent_hash
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Serializer for BlockHeader {
    fn write(&self, writer: &mut Writer) {
        writer.write_u64(self.number);
        self.parent_hash.write(writer);
        writer.write_u64(self.timestamp);
        writer.write_u64(self.gas_limit);
        writer.write_u32(self.version);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            number: reader.read_u64()?,
            parent_hash: Hash::read(reader)?,
            timestamp: reader.read_u64()?,
            gas_limit: reader.read_u64()?,
            version: reader.read_u32()?,
        })
    }
}

impl Hashable for BlockHeader {}
