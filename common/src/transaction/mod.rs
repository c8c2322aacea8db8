pub mod eth;

use crate::{
    crypto::{Address, Hashable},
    serializer::{Reader, ReaderError, Serializer, Writer},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Transaction attribute bits.
pub mod attribute {
    /// Input payload is ABI encoded (selector + arguments).
    pub const USES_ABI_CODEC: u32 = 1 << 0;
    /// Eligible for conflict-detected parallel execution.
    pub const DAG_PARALLEL: u32 = 1 << 1;
}

/// Raw secp256k1-style signature, kept opaque: verification lives with the
/// crypto collaborator, execution only carries it.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u64,
}

impl Serializer for Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&self.r);
        writer.write_bytes(&self.s);
        writer.write_u64(self.v);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            r: reader.read_fixed::<32>()?,
            s: reader.read_fixed::<32>()?,
            v: reader.read_u64()?,
        })
    }
}

/// Immutable transaction descriptor as scheduled inside a block.
#[derive(Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    sender: Address,
    /// None for contract deployments.
    to: Option<Address>,
    input: Bytes,
    nonce: u64,
    /// Last block number at which this transaction may still be included.
    block_limit: u64,
    chain_id: String,
    group_id: String,
    gas_limit: u64,
    signature: Option<Signature>,
    attributes: u32,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: Address,
        to: Option<Address>,
        input: impl Into<Bytes>,
        nonce: u64,
        block_limit: u64,
        chain_id: impl Into<String>,
        group_id: impl Into<String>,
        gas_limit: u64,
    ) -> Self {
        Self {
            sender,
            to,
            input: input.into(),
            nonce,
            block_limit,
            chain_id: chain_id.into(),
            group_id: group_id.into(),
            gas_limit,
            signature: None,
            attributes: 0,
        }
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn with_attributes(mut self, attributes: u32) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn sender(&self) -> &Address {
        &self.sender
    }

    pub fn to(&self) -> Option<&Address> {
        self.to.as_ref()
    }

    pub fn is_deployment(&self) -> bool {
        self.to.is_none()
    }

    pub fn input(&self) -> &Bytes {
        &self.input
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn block_limit(&self) -> u64 {
        self.block_limit
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn attributes(&self) -> u32 {
        self.attributes
    }

    pub fn has_attribute(&self, bit: u32) -> bool {
        self.attributes & bit != 0
    }

    /// Address a deployment lands at: low 20 bytes of keccak(sender || nonce).
    pub fn deployment_address(&self) -> Address {
        let mut preimage = Vec::with_capacity(28);
        preimage.extend_from_slice(self.sender.as_bytes());
        preimage.extend_from_slice(&self.nonce.to_be_bytes());
        Address::from_hash(&crate::crypto::keccak256(&preimage))
    }
}

impl Serializer for Transaction {
    fn write(&self, writer: &mut Writer) {
        self.sender.write(writer);
        self.to.write(writer);
        self.input.write(writer);
        writer.write_u64(self.nonce);
        writer.write_u64(self.block_limit);
        writer.write_string(&self.chain_id);
        writer.write_string(&self.group_id);
        writer.write_u64(self.gas_limit);
        self.signature.write(writer);
        writer.write_u32(self.attributes);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(Self {
            sender: Address::read(reader)?,
            to: Option::read(reader)?,
            input: Bytes::read(reader)?,
            nonce: reader.read_u64()?,
            block_limit: reader.read_u64()?,
            chain_id: reader.read_string()?,
            group_id: reader.read_string()?,
            gas_limit: reader.read_u64()?,
            signature: Option::read(reader)?,
            attributes: reader.read_u32()?,
        })
    }
}

impl Hashable for Transaction {}
