use super::codec::{self, as_string, as_string_array, as_uint};
use super::condition::{CompOp, Condition};
use super::{codes, revert, PrecompiledError, PrecompiledResult};
use crate::executor::CallContext;
use crate::state::{table::Table, VmState};
use ethabi::{ParamType, Token};
use lazy_static::lazy_static;
use log::debug;
use tessera_common::state::{Entry, TableInfo};

lazy_static! {
    static ref INSERT: [u8; 4] = codec::selector(
        "insert",
        &[
            ParamType::String,
            ParamType::String,
            ParamType::Array(Box::new(ParamType::String)),
        ],
    );
    static ref UPDATE: [u8; 4] = codec::selector(
        "update",
        &[
            ParamType::String,
            ParamType::String,
            ParamType::Array(Box::new(ParamType::String)),
            ParamType::Array(Box::new(ParamType::String)),
        ],
    );
    static ref REMOVE: [u8; 4] =
        codec::selector("remove", &[ParamType::String, ParamType::String]);
    static ref SELECT: [u8; 4] =
        codec::selector("select", &[ParamType::String, ParamType::String]);
    static ref SELECT_BY_CONDITION: [u8; 4] = codec::selector(
        "selectByCondition",
        &[
            ParamType::String,
            condition_array_type(),
            ParamType::Uint(32),
            ParamType::Uint(32),
        ],
    );
}

fn condition_array_type() -> ParamType {
    ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Uint(8),
        ParamType::String,
        ParamType::String,
    ])))
}

async fn open<'a>(
    state: &'a mut (dyn VmState + 'a),
    name: &str,
) -> Result<Table<'a, dyn VmState + 'a>, PrecompiledError> {
    Table::open(state, name).await?.ok_or_else(|| {
        revert(codes::TABLE_NOT_EXIST, format!("table {name} does not exist"))
    })
}

fn check_authority(info: &TableInfo, ctx: &CallContext) -> Result<(), PrecompiledError> {
    if !info.is_writable_by(&ctx.origin) {
        return Err(revert(
            codes::NO_AUTHORIZED,
            format!("{} is not authorized to write {}", ctx.origin, info.name),
        ));
    }
    Ok(())
}

/// Bind positional values to the schema's value fields.
fn bind_values(info: &TableInfo, values: Vec<String>) -> Result<Entry, PrecompiledError> {
    if values.len() != info.value_fields.len() {
        return Err(revert(
            codes::INVALID_FIELD,
            format!(
                "expected {} values, got {}",
                info.value_fields.len(),
                values.len()
            ),
        ));
    }
    let mut entry = Entry::new();
    for (field, value) in info.value_fields.iter().zip(values) {
        entry.set_field(field.clone(), value);
    }
    Ok(entry)
}

fn values_in_schema_order(info: &TableInfo, entry: &Entry) -> Vec<Token> {
    info.value_fields
        .iter()
        .map(|field| Token::String(entry.field_utf8(field)))
        .collect()
}

fn decode_condition(token: Token) -> Result<Condition, PrecompiledError> {
    let mut condition = Condition::new();
    let terms = token
        .into_array()
        .ok_or_else(|| revert(codes::INVALID_INPUT, "expected condition array"))?;
    for term in terms {
        let mut parts = term
            .into_tuple()
            .ok_or_else(|| revert(codes::INVALID_INPUT, "expected condition tuple"))?;
        if parts.len() != 3 {
            return Err(revert(codes::INVALID_INPUT, "expected condition triple"));
        }
        let value = as_string(parts.pop().expect("three parts"))?;
        let field = as_string(parts.pop().expect("three parts"))?;
        let op_raw = as_uint(parts.pop().expect("three parts"))?;
        let op = CompOp::try_from(op_raw as u8)
            .map_err(|raw| revert(codes::INVALID_INPUT, format!("unknown operator {raw}")))?;
        condition.push(field, op, value);
    }
    Ok(condition)
}

pub(super) async fn call(ctx: &CallContext, state: &mut dyn VmState) -> PrecompiledResult {
    let (sel, data) = codec::split_selector(&ctx.input)?;

    if sel == *INSERT {
        let mut tokens = codec::decode_args(
            &[
                ParamType::String,
                ParamType::String,
                ParamType::Array(Box::new(ParamType::String)),
            ],
            data,
        )?;
        let values = as_string_array(tokens.pop().expect("three tokens"))?;
        let key = as_string(tokens.pop().expect("three tokens"))?;
        let name = as_string(tokens.pop().expect("three tokens"))?;

        let mut table = open(state, &name).await?;
        check_authority(table.info(), ctx)?;
        let entry = bind_values(table.info(), values)?;
        if table.get_row(&key).await?.is_some() {
            return Err(revert(
                codes::KEY_ALREADY_EXIST,
                format!("key {key} already exists in {name}"),
            ));
        }

        debug!("[table] insert {}[{}]", name, key);
        table.set_row(&key, entry).await?;
        Ok(codec::output(&[codec::int_token(1)]))
    } else if sel == *UPDATE {
        let mut tokens = codec::decode_args(
            &[
                ParamType::String,
                ParamType::String,
                ParamType::Array(Box::new(ParamType::String)),
                ParamType::Array(Box::new(ParamType::String)),
            ],
            data,
        )?;
        let values = as_string_array(tokens.pop().expect("four tokens"))?;
        let fields = as_string_array(tokens.pop().expect("four tokens"))?;
        let key = as_string(tokens.pop().expect("four tokens"))?;
        let name = as_string(tokens.pop().expect("four tokens"))?;

        if fields.len() != values.len() || fields.is_empty() {
            return Err(revert(codes::INVALID_FIELD, "field/value arity mismatch"));
        }

        let mut table = open(state, &name).await?;
        check_authority(table.info(), ctx)?;
        for field in &fields {
            if !table.info().has_field(field) {
                return Err(revert(
                    codes::INVALID_FIELD,
                    format!("unknown field {field:?} in {name}"),
                ));
            }
        }
        let Some(mut entry) = table.get_row(&key).await? else {
            return Err(revert(
                codes::KEY_NOT_EXIST,
                format!("key {key} does not exist in {name}"),
            ));
        };
        for (field, value) in fields.into_iter().zip(values) {
            entry.set_field(field, value);
        }

        debug!("[table] update {}[{}]", name, key);
        table.set_row(&key, entry).await?;
        Ok(codec::output(&[codec::int_token(1)]))
    } else if sel == *REMOVE {
        let mut tokens =
            codec::decode_args(&[ParamType::String, ParamType::String], data)?;
        let key = as_string(tokens.pop().expect("two tokens"))?;
        let name = as_string(tokens.pop().expect("two tokens"))?;

        let mut table = open(state, &name).await?;
        check_authority(table.info(), ctx)?;
        if table.get_row(&key).await?.is_none() {
            return Err(revert(
                codes::KEY_NOT_EXIST,
                format!("key {key} does not exist in {name}"),
            ));
        }

        debug!("[table] remove {}[{}]", name, key);
        table.remove_row(&key).await?;
        Ok(codec::output(&[codec::int_token(1)]))
    } else if sel == *SELECT {
        let mut tokens =
            codec::decode_args(&[ParamType::String, ParamType::String], data)?;
        let key = as_string(tokens.pop().expect("two tokens"))?;
        let name = as_string(tokens.pop().expect("two tokens"))?;

        let mut table = open(state, &name).await?;
        let values = match table.get_row(&key).await? {
            Some(entry) => values_in_schema_order(table.info(), &entry),
            None => Vec::new(),
        };
        Ok(codec::output(&[Token::Array(values)]))
    } else if sel == *SELECT_BY_CONDITION {
        let mut tokens = codec::decode_args(
            &[
                ParamType::String,
                condition_array_type(),
                ParamType::Uint(32),
                ParamType::Uint(32),
            ],
            data,
        )?;
        let limit = as_uint(tokens.pop().expect("four tokens"))?;
        let offset = as_uint(tokens.pop().expect("four tokens"))?;
        let condition_token = tokens.pop().expect("four tokens");
        let name = as_string(tokens.pop().expect("four tokens"))?;

        let condition =
            decode_condition(condition_token)?.with_window(offset as usize, limit as usize);

        let mut table = open(state, &name).await?;
        let info = table.info().clone();
        let matching: Vec<_> = table
            .rows()
            .await?
            .into_iter()
            .filter(|(key, entry)| condition.matches(&info, key, entry))
            .collect();

        let rows = condition
            .window(matching)
            .into_iter()
            .map(|(key, entry)| {
                Token::Tuple(vec![
                    Token::String(key),
                    Token::Array(values_in_schema_order(&info, &entry)),
                ])
            })
            .collect();
        Ok(codec::output(&[Token::Array(rows)]))
    } else {
        Err(revert(codes::UNDEFINED_FUNCTION, "call undefined function"))
    }
}
