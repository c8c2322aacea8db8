use super::codec::{self, as_string, as_uint};
use super::{codes, revert, PrecompiledResult};
use crate::executor::CallContext;
use crate::state::{sys, table::row_key, VmState};
use ethabi::ParamType;
use lazy_static::lazy_static;
use log::info;
use tessera_common::{block::BlockHeader, state::Entry};

pub const NODE_TYPE_SEALER: &str = "consensus_sealer";
pub const NODE_TYPE_OBSERVER: &str = "consensus_observer";

const FIELD_TYPE: &str = "type";
const FIELD_WEIGHT: &str = "weight";
const FIELD_ENABLE_NUMBER: &str = "enable_number";

lazy_static! {
    static ref ADD_SEALER: [u8; 4] =
        codec::selector("addSealer", &[ParamType::String, ParamType::Uint(256)]);
    static ref ADD_OBSERVER: [u8; 4] = codec::selector("addObserver", &[ParamType::String]);
    static ref REMOVE: [u8; 4] = codec::selector("remove", &[ParamType::String]);
    static ref SET_WEIGHT: [u8; 4] =
        codec::selector("setWeight", &[ParamType::String, ParamType::Uint(256)]);
}

fn check_node_id(node_id: &str) -> Result<(), super::PrecompiledError> {
    // 64-byte public key, hex encoded
    if node_id.len() != 128 || !node_id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(revert(
            codes::INVALID_NODE_ID,
            format!("invalid node id {node_id:?}"),
        ));
    }
    Ok(())
}

async fn store_node(
    state: &mut dyn VmState,
    header: &BlockHeader,
    node_id: &str,
    node_type: &str,
    weight: u64,
) -> PrecompiledResult {
    let mut entry = Entry::new();
    entry.set_field(FIELD_TYPE, node_type.to_string());
    entry.set_field(FIELD_WEIGHT, weight.to_string());
    entry.set_field(FIELD_ENABLE_NUMBER, (header.number() + 1).to_string());
    state.put(row_key(sys::CONSENSUS, node_id), entry).await?;

    info!(
        "[consensus] {} node={}.. weight={}",
        node_type,
        &node_id[..8],
        weight
    );
    Ok(codec::code_output(codes::SUCCESS))
}

pub(super) async fn call(
    ctx: &CallContext,
    header: &BlockHeader,
    state: &mut dyn VmState,
) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *ADD_SEALER {
        let mut tokens =
            codec::decode_args(&[ParamType::String, ParamType::Uint(256)], data)?;
        let weight = as_uint(tokens.pop().expect("two tokens"))?;
        let node_id = as_string(tokens.pop().expect("two tokens"))?;

        check_node_id(&node_id)?;
        if weight == 0 {
            return Err(revert(codes::INVALID_WEIGHT, "sealer weight must be positive"));
        }
        store_node(state, header, &node_id, NODE_TYPE_SEALER, weight).await
    } else if sel == *ADD_OBSERVER {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let node_id = as_string(tokens.pop().expect("one token"))?;

        check_node_id(&node_id)?;
        store_node(state, header, &node_id, NODE_TYPE_OBSERVER, 0).await
    } else if sel == *REMOVE {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let node_id = as_string(tokens.pop().expect("one token"))?;

        check_node_id(&node_id)?;
        let key = row_key(sys::CONSENSUS, &node_id);
        if state.get(&key).await?.is_none() {
            return Err(revert(
                codes::NODE_NOT_EXIST,
                format!("node {}.. is not registered", &node_id[..8]),
            ));
        }
        state.remove(&key).await?;
        info!("[consensus] removed node={}..", &node_id[..8]);
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *SET_WEIGHT {
        let mut tokens =
            codec::decode_args(&[ParamType::String, ParamType::Uint(256)], data)?;
        let weight = as_uint(tokens.pop().expect("two tokens"))?;
        let node_id = as_string(tokens.pop().expect("two tokens"))?;

        check_node_id(&node_id)?;
        if weight == 0 {
            return Err(revert(codes::INVALID_WEIGHT, "sealer weight must be positive"));
        }
        let key = row_key(sys::CONSENSUS, &node_id);
        let Some(entry) = state.get(&key).await? else {
            return Err(revert(
                codes::NODE_NOT_EXIST,
                format!("node {}.. is not registered", &node_id[..8]),
            ));
        };
        if entry.field_utf8(FIELD_TYPE) != NODE_TYPE_SEALER {
            return Err(revert(codes::INVALID_WEIGHT, "only sealers carry weight"));
        }
        store_node(state, header, &node_id, NODE_TYPE_SEALER, weight).await
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
