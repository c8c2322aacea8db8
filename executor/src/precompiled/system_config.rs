use super::codec::{self, as_string};
use super::{codes, revert, PrecompiledResult};
use crate::executor::CallContext;
use crate::state::{sys, table::row_key, VmState};
use ethabi::ParamType;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use std::collections::HashMap;
use tessera_common::{
    block::BlockHeader,
    config::{to_version_number, GlobalConfig, TX_COUNT_LIMIT_MIN, TX_GAS_LIMIT_MIN},
    state::Entry,
};

pub const KEY_TX_GAS_LIMIT: &str = "tx_gas_limit";
pub const KEY_TX_COUNT_LIMIT: &str = "tx_count_limit";
pub const KEY_CONSENSUS_LEADER_PERIOD: &str = "consensus_leader_period";
pub const KEY_COMPATIBILITY_VERSION: &str = "compatibility_version";

const FIELD_VALUE: &str = "value";
const FIELD_ENABLE_NUMBER: &str = "enable_number";

lazy_static! {
    static ref SET_SELECTOR: [u8; 4] =
        codec::selector("setValueByKey", &[ParamType::String, ParamType::String]);
    static ref GET_SELECTOR: [u8; 4] = codec::selector("getValueByKey", &[ParamType::String]);
    /// Per-key predicate over the parsed numeric value.
    static ref VALUE_PREDICATES: HashMap<&'static str, fn(i64) -> bool> = {
        let mut map: HashMap<&'static str, fn(i64) -> bool> = HashMap::new();
        map.insert(KEY_TX_GAS_LIMIT, |v| v > TX_GAS_LIMIT_MIN);
        map.insert(KEY_TX_COUNT_LIMIT, |v| v >= TX_COUNT_LIMIT_MIN);
        map.insert(KEY_CONSENSUS_LEADER_PERIOD, |v| v >= 1);
        map
    };
}

fn check_value_valid(config: &GlobalConfig, key: &str, value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    if key == KEY_COMPATIBILITY_VERSION {
        return match to_version_number(value) {
            Ok(version) => {
                let ok = config.supports_version(version);
                if !ok {
                    warn!(
                        "set {} rejected: {} outside supported range",
                        KEY_COMPATIBILITY_VERSION, value
                    );
                }
                ok
            }
            Err(_) => false,
        };
    }
    let Some(predicate) = VALUE_PREDICATES.get(key) else {
        // unknown key
        return false;
    };
    match value.parse::<i64>() {
        Ok(parsed) => predicate(parsed),
        Err(_) => false,
    }
}

pub(super) async fn call(
    ctx: &CallContext,
    header: &BlockHeader,
    config: &GlobalConfig,
    state: &mut dyn VmState,
) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *SET_SELECTOR {
        let mut tokens = codec::decode_args(&[ParamType::String, ParamType::String], data)?;
        let value = as_string(tokens.pop().expect("two tokens decoded"))?;
        let key = as_string(tokens.pop().expect("two tokens decoded"))?.to_lowercase();

        if log::log_enabled!(log::Level::Debug) {
            debug!("[system_config] setValueByKey key={} value={}", key, value);
        }

        if !check_value_valid(config, &key, &value) {
            return Err(revert(
                codes::INVALID_CONFIGURATION_VALUES,
                format!("invalid configuration value for {key}"),
            ));
        }

        // Activates from the next block so every node flips together
        let enable_number = header.number() + 1;
        let mut entry = Entry::new();
        entry.set_field(FIELD_VALUE, value.clone());
        entry.set_field(FIELD_ENABLE_NUMBER, enable_number.to_string());
        state.put(row_key(sys::CONFIG, &key), entry).await?;

        info!(
            "[system_config] set {}={} enable_number={}",
            key, value, enable_number
        );
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *GET_SELECTOR {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let key = as_string(tokens.pop().expect("one token decoded"))?.to_lowercase();

        match state.get(&row_key(sys::CONFIG, &key)).await? {
            Some(entry) => {
                let value = entry.field_utf8(FIELD_VALUE);
                let enable_number = entry
                    .field_utf8(FIELD_ENABLE_NUMBER)
                    .parse::<i64>()
                    .unwrap_or(-1);
                Ok(codec::output(&[
                    ethabi::Token::String(value),
                    codec::int_token(enable_number),
                ]))
            }
            None => {
                debug!("[system_config] {} not found", key);
                Ok(codec::output(&[
                    ethabi::Token::String(String::new()),
                    codec::int_token(-1),
                ]))
            }
        }
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_limit_predicate() {
        let config = GlobalConfig::default();
        assert!(!check_value_valid(&config, KEY_TX_GAS_LIMIT, "1"));
        assert!(!check_value_valid(&config, KEY_TX_GAS_LIMIT, "10000"));
        assert!(check_value_valid(&config, KEY_TX_GAS_LIMIT, "3000000"));
    }

    #[test]
    fn test_unknown_key_and_garbage_rejected() {
        let config = GlobalConfig::default();
        assert!(!check_value_valid(&config, "no_such_key", "1"));
        assert!(!check_value_valid(&config, KEY_TX_COUNT_LIMIT, ""));
        assert!(!check_value_valid(&config, KEY_TX_COUNT_LIMIT, "abc"));
    }

    #[test]
    fn test_compatibility_version_bounds() {
        let config = GlobalConfig::default();
        assert!(check_value_valid(&config, KEY_COMPATIBILITY_VERSION, "3.1.0"));
        assert!(!check_value_valid(&config, KEY_COMPATIBILITY_VERSION, "2.0.0"));
        assert!(!check_value_valid(&config, KEY_COMPATIBILITY_VERSION, "9.9.9"));
        assert!(!check_value_valid(&config, KEY_COMPATIBILITY_VERSION, "not-a-version"));
    }
}
