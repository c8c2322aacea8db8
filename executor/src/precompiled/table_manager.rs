use super::codec::{self, as_string, as_string_array};
use super::{codes, revert, PrecompiledResult};
use crate::executor::CallContext;
use crate::state::{
    sys,
    table::{read_table_info, split_csv, write_table_meta},
    VmState,
};
use ethabi::{ParamType, Token};
use lazy_static::lazy_static;
use log::{debug, info};
use tessera_common::state::TableInfo;

lazy_static! {
    static ref CREATE_TABLE: [u8; 4] = codec::selector(
        "createTable",
        &[
            ParamType::String,
            ParamType::String,
            ParamType::Array(Box::new(ParamType::String)),
        ],
    );
    static ref CREATE_KV_TABLE: [u8; 4] = codec::selector(
        "createKVTable",
        &[ParamType::String, ParamType::String, ParamType::String],
    );
    static ref APPEND_COLUMNS: [u8; 4] = codec::selector(
        "appendColumns",
        &[ParamType::String, ParamType::Array(Box::new(ParamType::String))],
    );
    static ref OPEN_TABLE: [u8; 4] = codec::selector("openTable", &[ParamType::String]);
}

fn check_table_name(name: &str) -> Result<(), super::PrecompiledError> {
    if name.is_empty() || name.len() > 64 {
        return Err(revert(codes::INVALID_INPUT, "invalid table name length"));
    }
    if name.starts_with(sys::PREFIX) {
        return Err(revert(
            codes::INVALID_INPUT,
            "table name collides with the reserved namespace",
        ));
    }
    Ok(())
}

fn check_fields(key_field: &str, value_fields: &[String]) -> Result<(), super::PrecompiledError> {
    if key_field.is_empty() || value_fields.is_empty() {
        return Err(revert(codes::INVALID_FIELD, "empty schema"));
    }
    for field in value_fields {
        if field.is_empty() || field == key_field {
            return Err(revert(
                codes::INVALID_FIELD,
                format!("invalid value field {field:?}"),
            ));
        }
    }
    let mut sorted = value_fields.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != value_fields.len() {
        return Err(revert(codes::INVALID_FIELD, "duplicate value field"));
    }
    Ok(())
}

async fn create(
    state: &mut dyn VmState,
    name: String,
    key_field: String,
    value_fields: Vec<String>,
) -> PrecompiledResult {
    check_table_name(&name)?;
    check_fields(&key_field, &value_fields)?;

    if read_table_info(state, &name).await?.is_some() {
        return Err(revert(
            codes::TABLE_NAME_ALREADY_EXIST,
            format!("table {name} already exists"),
        ));
    }

    info!(
        "[table_manager] create table {} key_field={} value_fields={}",
        name,
        key_field,
        value_fields.join(",")
    );
    write_table_meta(state, &TableInfo::new(name, key_field, value_fields)).await?;
    Ok(codec::code_output(codes::SUCCESS))
}

pub(super) async fn call(ctx: &CallContext, state: &mut dyn VmState) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *CREATE_TABLE {
        let mut tokens = codec::decode_args(
            &[
                ParamType::String,
                ParamType::String,
                ParamType::Array(Box::new(ParamType::String)),
            ],
            data,
        )?;
        let value_fields = as_string_array(tokens.pop().expect("three tokens"))?;
        let key_field = as_string(tokens.pop().expect("three tokens"))?;
        let name = as_string(tokens.pop().expect("three tokens"))?;
        create(state, name, key_field, value_fields).await
    } else if sel == *CREATE_KV_TABLE {
        let mut tokens = codec::decode_args(
            &[ParamType::String, ParamType::String, ParamType::String],
            data,
        )?;
        let value_fields = split_csv(&as_string(tokens.pop().expect("three tokens"))?);
        let key_field = as_string(tokens.pop().expect("three tokens"))?;
        let name = as_string(tokens.pop().expect("three tokens"))?;
        create(state, name, key_field, value_fields).await
    } else if sel == *APPEND_COLUMNS {
        let mut tokens = codec::decode_args(
            &[ParamType::String, ParamType::Array(Box::new(ParamType::String))],
            data,
        )?;
        let new_columns = as_string_array(tokens.pop().expect("two tokens"))?;
        let name = as_string(tokens.pop().expect("two tokens"))?;

        let Some(mut info) = read_table_info(state, &name).await? else {
            return Err(revert(
                codes::TABLE_NOT_EXIST,
                format!("table {name} does not exist"),
            ));
        };
        if new_columns.is_empty() {
            return Err(revert(codes::INVALID_FIELD, "no columns to append"));
        }
        for column in &new_columns {
            if column.is_empty() || *column == info.key_field || info.has_field(column) {
                return Err(revert(
                    codes::INVALID_FIELD,
                    format!("cannot append column {column:?}"),
                ));
            }
        }

        // Schema is append-only: only the meta row is rewritten, existing
        // rows read the new columns as empty values.
        info.value_fields.extend(new_columns);
        debug!(
            "[table_manager] append columns on {}: now {}",
            name,
            info.value_fields.join(",")
        );
        write_table_meta(state, &info).await?;
        Ok(codec::code_output(codes::SUCCESS))
    } else if sel == *OPEN_TABLE {
        let mut tokens = codec::decode_args(&[ParamType::String], data)?;
        let name = as_string(tokens.pop().expect("one token"))?;

        match state.open_table(&name).await? {
            Some(info) => Ok(codec::output(&[
                Token::String(info.key_field),
                Token::Array(info.value_fields.into_iter().map(Token::String).collect()),
            ])),
            None => Err(revert(
                codes::TABLE_NOT_EXIST,
                format!("table {name} does not exist"),
            )),
        }
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
