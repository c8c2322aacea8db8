use super::codec::{self, as_string, as_uint};
use super::{codes, revert, PrecompiledResult, ACCOUNT_MANAGER_ADDRESS};
use crate::executor::CallContext;
use crate::state::{sys, table::row_key, VmState};
use ethabi::ParamType;
use lazy_static::lazy_static;
use log::info;
use std::str::FromStr;
use tessera_common::{block::BlockHeader, crypto::Address, state::Entry};

pub const STATUS_NORMAL: u16 = 0;
pub const STATUS_ABOLISHED: u16 = 2;

const FIELD_STATUS: &str = "status";
const FIELD_LAST_UPDATE: &str = "last_update";

lazy_static! {
    static ref SET_STATUS: [u8; 4] =
        codec::selector("setAccountStatus", &[ParamType::String, ParamType::Uint(16)]);
    static ref GET_STATUS: [u8; 4] = codec::selector("getAccountStatus", &[ParamType::String]);
}

fn parse_account(raw: &str) -> Result<Address, super::PrecompiledError> {
    Address::from_str(raw)
        .map_err(|_| revert(codes::INVALID_INPUT, format!("invalid account {raw:?}")))
}

pub(super) async fn call(
    ctx: &CallContext,
    header: &BlockHeader,
    state: &mut dyn VmState,
) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *SET_STATUS {
        // Status changes are governance actions routed through the
        // account manager; direct callers are rejected unmodified.
        if ctx.sender != ACCOUNT_MANAGER_ADDRESS {
            return Err(revert(
                codes::NO_AUTHORIZED,
                "setAccountStatus must come from the account manager",
            ));
        }

        let mut tokens =
            codec::decode_args(&[ParamType::String, ParamType::Uint(16)], data)?;
        let status = as_uint(tokens.pop().expect("two tokens"))?;
        let account = parse_account(&as_string(tokens.pop().expect("two tokens"))?)?;

        if status > STATUS_ABOLISHED as u64 {
            return Err(revert(
                codes::INVALID_INPUT,
                format!("unknown account status {status}"),
            ));
        }

        let mut entry = Entry::new();
        entry.set_field(FIELD_STATUS, status.to_string());
        entry.set_field(FIELD_LAST_UPDATE, header.number().to_string());
        state
            .put(row_key(sys::ACCOUNTS, &account.to_hex()), entry)
            .await?;

        info!(
            "[account] set status account={} status={} block={}",
            account,
            status,
            header.number()
        );
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *GET_STATUS {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let account = parse_account(&as_string(tokens.pop().expect("one token"))?)?;

        let (status, last_update) = match state
            .get(&row_key(sys::ACCOUNTS, &account.to_hex()))
            .await?
        {
            Some(entry) => (
                entry.field_utf8(FIELD_STATUS).parse::<u64>().unwrap_or(0),
                entry
                    .field_utf8(FIELD_LAST_UPDATE)
                    .parse::<u64>()
                    .unwrap_or(0),
            ),
            // untouched accounts default to normal
            None => (STATUS_NORMAL as u64, 0),
        };
        Ok(codec::output(&[
            codec::uint_token(status),
            codec::uint_token(last_update),
        ]))
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
