use super::codec::{self, as_bytes};
use super::{codes, revert, PrecompiledResult};
use crate::executor::CallContext;
use ethabi::{ParamType, Token};
use lazy_static::lazy_static;
use tessera_common::crypto::{keccak256, sha256};

lazy_static! {
    static ref KECCAK256_HASH: [u8; 4] = codec::selector("keccak256Hash", &[ParamType::Bytes]);
    static ref SHA256_HASH: [u8; 4] = codec::selector("sha256Hash", &[ParamType::Bytes]);
}

pub(super) async fn call(ctx: &CallContext) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *KECCAK256_HASH {
        let mut tokens = codec::decode_args(&[ParamType::Bytes], data)?;
        let input = as_bytes(tokens.pop().expect("one token"))?;
        let digest = keccak256(&input);
        Ok(codec::output(&[Token::FixedBytes(digest.as_bytes().to_vec())]))
    } else if sel == *SHA256_HASH {
        let mut tokens = codec::decode_args(&[ParamType::Bytes], data)?;
        let input = as_bytes(tokens.pop().expect("one token"))?;
        let digest = sha256(&input);
        Ok(codec::output(&[Token::FixedBytes(digest.as_bytes().to_vec())]))
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
