use super::codec::{self, as_string};
use super::{codes, revert, PrecompiledResult};
use crate::executor::CallContext;
use crate::state::{
    sys,
    table::{access_key, read_table_info, split_csv, FIELD_ADDRESSES},
    VmState,
};
use ethabi::{ParamType, Token};
use lazy_static::lazy_static;
use log::info;
use std::str::FromStr;
use tessera_common::{crypto::Address, state::Entry};

lazy_static! {
    static ref INSERT: [u8; 4] =
        codec::selector("insert", &[ParamType::String, ParamType::String]);
    static ref REMOVE: [u8; 4] =
        codec::selector("remove", &[ParamType::String, ParamType::String]);
    static ref QUERY_BY_NAME: [u8; 4] = codec::selector("queryByName", &[ParamType::String]);
}

fn parse_args(
    data: &[u8],
) -> Result<(String, Address), super::PrecompiledError> {
    let mut tokens = codec::decode_args(&[ParamType::String, ParamType::String], data)?;
    let address = as_string(tokens.pop().expect("two tokens"))?;
    let table = as_string(tokens.pop().expect("two tokens"))?;

    let address = Address::from_str(&address)
        .map_err(|_| revert(codes::INVALID_INPUT, format!("invalid address {address:?}")))?;
    Ok((table, address))
}

async fn check_grantable(
    state: &mut dyn VmState,
    table: &str,
) -> Result<(), super::PrecompiledError> {
    if table.starts_with(sys::PREFIX) {
        return Err(revert(
            codes::NO_AUTHORIZED,
            "system tables cannot change authorization",
        ));
    }
    if read_table_info(state, table).await?.is_none() {
        return Err(revert(
            codes::TABLE_NOT_EXIST,
            format!("table {table} does not exist"),
        ));
    }
    Ok(())
}

async fn write_set(
    state: &mut dyn VmState,
    table: &str,
    addresses: Vec<String>,
) -> Result<(), super::PrecompiledError> {
    let key = access_key(table);
    if addresses.is_empty() {
        state.remove(&key).await?;
    } else {
        let mut entry = Entry::new();
        entry.set_field(FIELD_ADDRESSES, addresses.join(","));
        state.put(key, entry).await?;
    }
    Ok(())
}

pub(super) async fn call(ctx: &CallContext, state: &mut dyn VmState) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *INSERT {
        let (table, address) = parse_args(data)?;
        check_grantable(state, &table).await?;

        let mut addresses = match state.get(&access_key(&table)).await? {
            Some(entry) => split_csv(&entry.field_utf8(FIELD_ADDRESSES)),
            None => Vec::new(),
        };
        let hex = address.to_hex();
        if !addresses.contains(&hex) {
            addresses.push(hex);
            addresses.sort();
        }
        write_set(state, &table, addresses).await?;

        info!("[auth] grant {} on {}", address, table);
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *REMOVE {
        let (table, address) = parse_args(data)?;
        check_grantable(state, &table).await?;

        let mut addresses = match state.get(&access_key(&table)).await? {
            Some(entry) => split_csv(&entry.field_utf8(FIELD_ADDRESSES)),
            None => Vec::new(),
        };
        let hex = address.to_hex();
        let before = addresses.len();
        addresses.retain(|a| *a != hex);
        if addresses.len() == before {
            return Err(revert(
                codes::KEY_NOT_EXIST,
                format!("{address} holds no grant on {table}"),
            ));
        }
        write_set(state, &table, addresses).await?;

        info!("[auth] revoke {} on {}", address, table);
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *QUERY_BY_NAME {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let table = as_string(tokens.pop().expect("one token"))?;

        let addresses = match state.get(&access_key(&table)).await? {
            Some(entry) => split_csv(&entry.field_utf8(FIELD_ADDRESSES)),
            None => Vec::new(),
        };
        Ok(codec::output(&[Token::Array(
            addresses.into_iter().map(Token::String).collect(),
        )]))
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
