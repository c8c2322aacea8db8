//! ABI plumbing shared by the precompiled handlers: selector split,
//! argument decoding and the token conversions the handlers actually use.

use super::{codes, revert, PrecompiledError, PrecompiledOutput};
use bytes::Bytes;
use ethabi::{ParamType, Token, Uint};

const GAS_BASE: u64 = 1_000;
const GAS_PER_OUTPUT_BYTE: u64 = 20;

pub fn selector(name: &str, params: &[ParamType]) -> [u8; 4] {
    ethabi::short_signature(name, params)
}

pub fn split_selector(input: &[u8]) -> Result<([u8; 4], &[u8]), PrecompiledError> {
    if input.len() < 4 {
        return Err(revert(codes::INVALID_INPUT, "truncated call payload"));
    }
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&input[..4]);
    Ok((sel, &input[4..]))
}

pub fn decode_args(params: &[ParamType], data: &[u8]) -> Result<Vec<Token>, PrecompiledError> {
    ethabi::decode(params, data)
        .map_err(|err| revert(codes::INVALID_INPUT, format!("malformed arguments: {err}")))
}

pub fn as_string(token: Token) -> Result<String, PrecompiledError> {
    token
        .into_string()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected string argument"))
}

pub fn as_uint(token: Token) -> Result<u64, PrecompiledError> {
    let value = token
        .into_uint()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected unsigned argument"))?;
    if value > Uint::from(u64::MAX) {
        return Err(revert(codes::INVALID_INPUT, "unsigned argument overflow"));
    }
    Ok(value.as_u64())
}

pub fn as_bytes(token: Token) -> Result<Vec<u8>, PrecompiledError> {
    token
        .into_bytes()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected bytes argument"))
}

pub fn as_string_array(token: Token) -> Result<Vec<String>, PrecompiledError> {
    token
        .into_array()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected array argument"))?
        .into_iter()
        .map(as_string)
        .collect()
}

pub fn uint_token(value: u64) -> Token {
    Token::Uint(Uint::from(value))
}

/// Two's-complement int256 token, for the signed result codes.
pub fn int_token(value: i64) -> Token {
    let raw = if value >= 0 {
        Uint::from(value as u64)
    } else {
        Uint::MAX - Uint::from((-(value + 1)) as u64)
    };
    Token::Int(raw)
}

pub fn as_int(token: Token) -> Result<i64, PrecompiledError> {
    let raw = token
        .into_int()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected signed argument"))?;
    if raw.bit(255) {
        let magnitude = (!raw).low_u64() as i64;
        Ok(-magnitude - 1)
    } else if raw > Uint::from(i64::MAX as u64) {
        Err(revert(codes::INVALID_INPUT, "signed argument overflow"))
    } else {
        Ok(raw.low_u64() as i64)
    }
}

/// Package an encoded return value with the deterministic gas charge.
pub fn output(tokens: &[Token]) -> PrecompiledOutput {
    let encoded = ethabi::encode(tokens);
    let gas_used = GAS_BASE + GAS_PER_OUTPUT_BYTE * encoded.len() as u64;
    PrecompiledOutput {
        output: Bytes::from(encoded),
        gas_used,
    }
}

/// Standard single-code return, `int256(code)`.
pub fn code_output(code: i32) -> PrecompiledOutput {
    output(&[int_token(code as i64)])
}
