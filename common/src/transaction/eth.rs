//! EIP-style wire format accepted by the RPC boundary: legacy (with and
//! without EIP-155 replay protection) plus typed envelopes 0x01/0x02/0x03.
//! Decoding is the exact inverse of encoding so admitted transactions
//! re-serialize bit-identically.

use crate::{
    crypto::{keccak256, Address, Hash},
    transaction::{Signature, Transaction},
};
use bytes::Bytes;
use primitive_types::{H160, H256, U256};
use rlp::{DecoderError, Rlp, RlpStream};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("Input too short")]
    InputTooShort,
    #[error("Unexpected list")]
    UnexpectedList,
    #[error("Unexpected string")]
    UnexpectedString,
    #[error("Invalid V in signature")]
    InvalidVInSignature,
    #[error("Invalid RLP: {0}")]
    InvalidRlp(String),
}

impl From<DecoderError> for CodecError {
    fn from(err: DecoderError) -> Self {
        match err {
            DecoderError::RlpIsTooShort => CodecError::InputTooShort,
            // Expected a list, found a string item
            DecoderError::RlpExpectedToBeList => CodecError::UnexpectedString,
            // Expected a data item, found a nested list
            DecoderError::RlpExpectedToBeData => CodecError::UnexpectedList,
            other => CodecError::InvalidRlp(other.to_string()),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug)]
#[repr(u8)]
pub enum EthTxType {
    Legacy = 0x00,
    AccessList = 0x01,
    DynamicFee = 0x02,
    Blob = 0x03,
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct AccessListEntry {
    pub address: H160,
    pub storage_keys: Vec<H256>,
}

impl rlp::Encodable for AccessListEntry {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(2);
        s.append(&self.address);
        s.append_list(&self.storage_keys);
    }
}

impl rlp::Decodable for AccessListEntry {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        if !rlp.is_list() {
            return Err(DecoderError::RlpExpectedToBeList);
        }
        Ok(Self {
            address: rlp.val_at(0)?,
            storage_keys: rlp.list_at(1)?,
        })
    }
}

/// Decoded wire transaction. `max_priority_fee_per_gas` doubles as the gas
/// price for legacy and access-list transactions, mirroring how the fields
/// overlap on the wire.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct EthTransaction {
    pub tx_type: EthTxType,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: u64,
    pub to: Option<H160>,
    pub value: U256,
    pub data: Bytes,
    pub access_list: Vec<AccessListEntry>,
    pub max_fee_per_blob_gas: U256,
    pub blob_versioned_hashes: Vec<H256>,
    /// Normalized parity bit (0 or 1) once decoded.
    pub signature_y_parity: u64,
    pub signature_r: U256,
    pub signature_s: U256,
}

impl Default for EthTransaction {
    fn default() -> Self {
        Self {
            tx_type: EthTxType::Legacy,
            chain_id: None,
            nonce: 0,
            max_priority_fee_per_gas: U256::zero(),
            max_fee_per_gas: U256::zero(),
            gas_limit: 0,
            to: None,
            value: U256::zero(),
            data: Bytes::new(),
            access_list: Vec::new(),
            max_fee_per_blob_gas: U256::zero(),
            blob_versioned_hashes: Vec::new(),
            signature_y_parity: 0,
            signature_r: U256::zero(),
            signature_s: U256::zero(),
        }
    }
}

fn append_to(s: &mut RlpStream, to: &Option<H160>) {
    match to {
        Some(address) => s.append(address),
        None => s.append_empty_data(),
    };
}

fn decode_to(rlp: &Rlp, index: usize) -> Result<Option<H160>, CodecError> {
    let item = rlp.at(index)?;
    if item.is_list() {
        return Err(CodecError::UnexpectedList);
    }
    let data = item.data()?;
    match data.len() {
        0 => Ok(None),
        20 => Ok(Some(H160::from_slice(data))),
        _ => Err(CodecError::InvalidRlp("invalid recipient length".into())),
    }
}

impl EthTransaction {
    /// Legacy v value as it appears on the wire.
    pub fn signature_v(&self) -> u64 {
        match self.chain_id {
            // https://eips.ethereum.org/EIPS/eip-155
            Some(chain_id) => chain_id * 2 + 35 + self.signature_y_parity,
            None => self.signature_y_parity + 27,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.tx_type {
            EthTxType::Legacy => {
                let mut s = RlpStream::new_list(9);
                s.append(&self.nonce);
                // for legacy transactions this carries the gas price
                s.append(&self.max_priority_fee_per_gas);
                s.append(&self.gas_limit);
                append_to(&mut s, &self.to);
                s.append(&self.value);
                s.append(&self.data.to_vec());
                s.append(&self.signature_v());
                s.append(&self.signature_r);
                s.append(&self.signature_s);
                out.extend_from_slice(s.out().as_ref());
            }
            typed => {
                out.push(typed as u8);
                let item_count = match typed {
                    EthTxType::AccessList => 11,
                    EthTxType::DynamicFee => 12,
                    EthTxType::Blob => 14,
                    EthTxType::Legacy => unreachable!(),
                };
                let mut s = RlpStream::new_list(item_count);
                s.append(&self.chain_id.unwrap_or(0));
                s.append(&self.nonce);
                if typed != EthTxType::AccessList {
                    s.append(&self.max_priority_fee_per_gas);
                }
                // for access-list transactions this carries the gas price
                s.append(&self.max_fee_per_gas);
                s.append(&self.gas_limit);
                append_to(&mut s, &self.to);
                s.append(&self.value);
                s.append(&self.data.to_vec());
                s.append_list(&self.access_list);
                if typed == EthTxType::Blob {
                    s.append(&self.max_fee_per_blob_gas);
                    s.append_list(&self.blob_versioned_hashes);
                }
                s.append(&self.signature_y_parity);
                s.append(&self.signature_r);
                s.append(&self.signature_s);
                out.extend_from_slice(s.out().as_ref());
            }
        }
        out
    }

    pub fn decode(input: &[u8]) -> Result<Self, CodecError> {
        let first = *input.first().ok_or(CodecError::InputTooShort)?;
        if first > 0 && first < 0x80 {
            return Self::decode_typed(first, &input[1..]);
        }
        Self::decode_legacy(input)
    }

    fn decode_legacy(input: &[u8]) -> Result<Self, CodecError> {
        let rlp = Rlp::new(input);
        if !rlp.is_list() {
            return Err(CodecError::UnexpectedString);
        }
        if rlp.item_count()? != 9 {
            return Err(CodecError::InvalidRlp("legacy item count".into()));
        }

        let mut tx = EthTransaction {
            tx_type: EthTxType::Legacy,
            nonce: rlp.val_at(0)?,
            max_priority_fee_per_gas: rlp.val_at(1)?,
            gas_limit: rlp.val_at(2)?,
            to: decode_to(&rlp, 3)?,
            value: rlp.val_at(4)?,
            data: Bytes::from(rlp.val_at::<Vec<u8>>(5)?),
            signature_r: rlp.val_at(7)?,
            signature_s: rlp.val_at(8)?,
            ..EthTransaction::default()
        };
        tx.max_fee_per_gas = tx.max_priority_fee_per_gas;

        let v: u64 = rlp.val_at(6)?;
        if v == 27 || v == 28 {
            // pre EIP-155
            tx.chain_id = None;
            tx.signature_y_parity = v - 27;
        } else if v < 35 {
            return Err(CodecError::InvalidVInSignature);
        } else {
            tx.signature_y_parity = (v - 35) % 2;
            tx.chain_id = Some((v - 35) >> 1);
        }
        Ok(tx)
    }

    fn decode_typed(type_byte: u8, payload: &[u8]) -> Result<Self, CodecError> {
        let tx_type = match type_byte {
            0x01 => EthTxType::AccessList,
            0x02 => EthTxType::DynamicFee,
            0x03 => EthTxType::Blob,
            _ => return Err(CodecError::InvalidRlp("unknown transaction type".into())),
        };
        let rlp = Rlp::new(payload);
        if !rlp.is_list() {
            return Err(CodecError::UnexpectedString);
        }
        let expected = match tx_type {
            EthTxType::AccessList => 11,
            EthTxType::DynamicFee => 12,
            EthTxType::Blob => 14,
            EthTxType::Legacy => unreachable!(),
        };
        if rlp.item_count()? != expected {
            return Err(CodecError::InvalidRlp("typed item count".into()));
        }

        let mut tx = EthTransaction {
            tx_type,
            chain_id: Some(rlp.val_at(0)?),
            nonce: rlp.val_at(1)?,
            ..EthTransaction::default()
        };

        let mut index = 2;
        if tx_type == EthTxType::AccessList {
            tx.max_priority_fee_per_gas = rlp.val_at(index)?;
            tx.max_fee_per_gas = tx.max_priority_fee_per_gas;
            index += 1;
        } else {
            tx.max_priority_fee_per_gas = rlp.val_at(index)?;
            tx.max_fee_per_gas = rlp.val_at(index + 1)?;
            index += 2;
        }

        tx.gas_limit = rlp.val_at(index)?;
        tx.to = decode_to(&rlp, index + 1)?;
        tx.value = rlp.val_at(index + 2)?;
        tx.data = Bytes::from(rlp.val_at::<Vec<u8>>(index + 3)?);
        tx.access_list = rlp.list_at(index + 4)?;
        index += 5;

        if tx_type == EthTxType::Blob {
            tx.max_fee_per_blob_gas = rlp.val_at(index)?;
            tx.blob_versioned_hashes = rlp.list_at(index + 1)?;
            index += 2;
        }

        tx.signature_y_parity = rlp.val_at(index)?;
        tx.signature_r = rlp.val_at(index + 1)?;
        tx.signature_s = rlp.val_at(index + 2)?;
        Ok(tx)
    }

    pub fn hash(&self) -> Hash {
        keccak256(&self.encode())
    }

    /// Lower into the scheduler-side descriptor. Sender recovery is the
    /// signature collaborator's job; until then the sender is zero.
    pub fn to_transaction(&self, group_id: impl Into<String>, block_limit: u64) -> Transaction {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        self.signature_r.to_big_endian(&mut r);
        self.signature_s.to_big_endian(&mut s);

        let chain_id = self
            .chain_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        Transaction::new(
            Address::zero(),
            self.to.map(|to| Address::new(to.0)),
            self.data.clone(),
            self.nonce,
            block_limit,
            chain_id,
            group_id,
            self.gas_limit,
        )
        .with_signature(Signature {
            r,
            s,
            v: self.signature_v(),
        })
    }
}
