//! Precompiled contracts driven end-to-end through the serial scheduler:
//! ABI-encoded calls in, receipts and state deltas out.

mod common;

use common::*;
use ethabi::{short_signature, ParamType, Token};
use std::sync::Arc;
use tessera_common::{config::GlobalConfig, crypto::Address, receipt::Receipt};
use tessera_executor::precompiled::{
    codes, ACCOUNT_MANAGER_ADDRESS, AUTH_MANAGER_ADDRESS, CRYPTO_ADDRESS, SYS_CONFIG_ADDRESS,
    TABLE_ADDRESS, TABLE_MANAGER_ADDRESS,
};
use tessera_executor::scheduler::SerialScheduler;
use tessera_executor::state::MultiLayerStore;
use tessera_executor::storage::MemoryBackend;

fn abi_call(name: &str, params: &[ParamType], args: &[Token]) -> Vec<u8> {
    let mut input = short_signature(name, params).to_vec();
    input.extend(ethabi::encode(args));
    input
}

struct Fixture {
    scheduler: SerialScheduler<MockVm>,
    store: MultiLayerStore<MemoryBackend>,
    nonce: u64,
}

impl Fixture {
    fn new() -> Self {
        init_logging();
        Self {
            scheduler: SerialScheduler::new(Arc::new(MockVm), GlobalConfig::default()),
            store: new_store(),
            nonce: 0,
        }
    }

    async fn call_from(&mut self, from: Address, to: Address, input: Vec<u8>) -> Receipt {
        self.nonce += 1;
        let tx = transaction_from(from, self.nonce, Some(to), input);
        let (mut receipts, _) = self
            .scheduler
            .execute_block(&mut self.store, &header(self.nonce), &[tx])
            .await
            .unwrap();
        receipts.pop().unwrap()
    }

    async fn call(&mut self, to: Address, input: Vec<u8>) -> Receipt {
        self.call_from(sender(1), to, input).await
    }
}

fn decode_output(receipt: &Receipt, params: &[ParamType]) -> Vec<Token> {
    ethabi::decode(params, receipt.output()).unwrap()
}

fn string_params(n: usize) -> Vec<ParamType> {
    std::iter::repeat(ParamType::String).take(n).collect()
}

#[tokio::test]
async fn test_system_config_rejects_invalid_value() {
    let mut fixture = Fixture::new();

    // tx_gas_limit has a 10,000 floor; setting 1 must fail closed
    let receipt = fixture
        .call(
            SYS_CONFIG_ADDRESS,
            abi_call(
                "setValueByKey",
                &string_params(2),
                &[
                    Token::String("tx_gas_limit".into()),
                    Token::String("1".into()),
                ],
            ),
        )
        .await;
    assert_eq!(receipt.status(), codes::INVALID_CONFIGURATION_VALUES);

    // state unchanged: unknown key sentinel comes back
    let receipt = fixture
        .call(
            SYS_CONFIG_ADDRESS,
            abi_call(
                "getValueByKey",
                &string_params(1),
                &[Token::String("tx_gas_limit".into())],
            ),
        )
        .await;
    assert!(receipt.is_success());
    let tokens = decode_output(&receipt, &[ParamType::String, ParamType::Int(256)]);
    assert_eq!(tokens[0], Token::String(String::new()));
}

#[tokio::test]
async fn test_system_config_set_get_round_trip() {
    let mut fixture = Fixture::new();

    let receipt = fixture
        .call(
            SYS_CONFIG_ADDRESS,
            abi_call(
                "setValueByKey",
                &string_params(2),
                &[
                    Token::String("tx_count_limit".into()),
                    Token::String("5000".into()),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let receipt = fixture
        .call(
            SYS_CONFIG_ADDRESS,
            abi_call(
                "getValueByKey",
                &string_params(1),
                &[Token::String("tx_count_limit".into())],
            ),
        )
        .await;
    let tokens = decode_output(&receipt, &[ParamType::String, ParamType::Int(256)]);
    assert_eq!(tokens[0], Token::String("5000".into()));
    // value activates from the block after the one that set it
    assert_eq!(tokens[1], Token::Int(2u64.into()));
}

#[tokio::test]
async fn test_unknown_selector_reverts() {
    let mut fixture = Fixture::new();
    let receipt = fixture
        .call(
            SYS_CONFIG_ADDRESS,
            abi_call("noSuchFunction", &[], &[]),
        )
        .await;
    assert_eq!(receipt.status(), codes::UNDEFINED_FUNCTION);
    assert_eq!(receipt.output().as_ref(), b"call undefined function");
}

fn create_ledger_input() -> Vec<u8> {
    abi_call(
        "createTable",
        &[
            ParamType::String,
            ParamType::String,
            ParamType::Array(Box::new(ParamType::String)),
        ],
        &[
            Token::String("accounts".into()),
            Token::String("id".into()),
            Token::Array(vec![
                Token::String("balance".into()),
                Token::String("owner".into()),
            ]),
        ],
    )
}

#[tokio::test]
async fn test_table_lifecycle() {
    let mut fixture = Fixture::new();

    let receipt = fixture
        .call(TABLE_MANAGER_ADDRESS, create_ledger_input())
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    // duplicate creation fails
    let receipt = fixture
        .call(TABLE_MANAGER_ADDRESS, create_ledger_input())
        .await;
    assert_eq!(receipt.status(), codes::TABLE_NAME_ALREADY_EXIST);

    // insert a row, read it back in schema order
    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "insert",
                &[
                    ParamType::String,
                    ParamType::String,
                    ParamType::Array(Box::new(ParamType::String)),
                ],
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                    Token::Array(vec![
                        Token::String("100".into()),
                        Token::String("alice-key".into()),
                    ]),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "select",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                ],
            ),
        )
        .await;
    let tokens = decode_output(
        &receipt,
        &[ParamType::Array(Box::new(ParamType::String))],
    );
    assert_eq!(
        tokens[0],
        Token::Array(vec![
            Token::String("100".into()),
            Token::String("alice-key".into())
        ])
    );

    // update one field
    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "update",
                &[
                    ParamType::String,
                    ParamType::String,
                    ParamType::Array(Box::new(ParamType::String)),
                    ParamType::Array(Box::new(ParamType::String)),
                ],
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                    Token::Array(vec![Token::String("balance".into())]),
                    Token::Array(vec![Token::String("250".into())]),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    // updating a missing row fails
    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "update",
                &[
                    ParamType::String,
                    ParamType::String,
                    ParamType::Array(Box::new(ParamType::String)),
                    ParamType::Array(Box::new(ParamType::String)),
                ],
                &[
                    Token::String("accounts".into()),
                    Token::String("nobody".into()),
                    Token::Array(vec![Token::String("balance".into())]),
                    Token::Array(vec![Token::String("1".into())]),
                ],
            ),
        )
        .await;
    assert_eq!(receipt.status(), codes::KEY_NOT_EXIST);

    // append a column: the meta row changes, old rows read empty
    let receipt = fixture
        .call(
            TABLE_MANAGER_ADDRESS,
            abi_call(
                "appendColumns",
                &[
                    ParamType::String,
                    ParamType::Array(Box::new(ParamType::String)),
                ],
                &[
                    Token::String("accounts".into()),
                    Token::Array(vec![Token::String("memo".into())]),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "select",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                ],
            ),
        )
        .await;
    let tokens = decode_output(
        &receipt,
        &[ParamType::Array(Box::new(ParamType::String))],
    );
    assert_eq!(
        tokens[0],
        Token::Array(vec![
            Token::String("250".into()),
            Token::String("alice-key".into()),
            Token::String(String::new()),
        ])
    );

    // remove the row
    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "remove",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "select",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String("alice".into()),
                ],
            ),
        )
        .await;
    let tokens = decode_output(
        &receipt,
        &[ParamType::Array(Box::new(ParamType::String))],
    );
    assert_eq!(tokens[0], Token::Array(Vec::new()));
}

#[tokio::test]
async fn test_select_by_condition() {
    let mut fixture = Fixture::new();
    fixture
        .call(TABLE_MANAGER_ADDRESS, create_ledger_input())
        .await;

    for (id, balance) in [("a", "10"), ("b", "25"), ("c", "9"), ("d", "100")] {
        let receipt = fixture
            .call(
                TABLE_ADDRESS,
                abi_call(
                    "insert",
                    &[
                        ParamType::String,
                        ParamType::String,
                        ParamType::Array(Box::new(ParamType::String)),
                    ],
                    &[
                        Token::String("accounts".into()),
                        Token::String(id.into()),
                        Token::Array(vec![
                            Token::String(balance.into()),
                            Token::String(format!("{id}-key")),
                        ]),
                    ],
                ),
            )
            .await;
        assert!(receipt.is_success());
    }

    // balance >= 10, numeric comparison
    let condition_type = ParamType::Array(Box::new(ParamType::Tuple(vec![
        ParamType::Uint(8),
        ParamType::String,
        ParamType::String,
    ])));
    let receipt = fixture
        .call(
            TABLE_ADDRESS,
            abi_call(
                "selectByCondition",
                &[
                    ParamType::String,
                    condition_type.clone(),
                    ParamType::Uint(32),
                    ParamType::Uint(32),
                ],
                &[
                    Token::String("accounts".into()),
                    Token::Array(vec![Token::Tuple(vec![
                        Token::Uint(3u64.into()), // GE
                        Token::String("balance".into()),
                        Token::String("10".into()),
                    ])]),
                    Token::Uint(0u64.into()),
                    Token::Uint(10u64.into()),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let row_type = ParamType::Tuple(vec![
        ParamType::String,
        ParamType::Array(Box::new(ParamType::String)),
    ]);
    let tokens = decode_output(&receipt, &[ParamType::Array(Box::new(row_type))]);
    let Token::Array(rows) = &tokens[0] else {
        panic!("expected array of rows");
    };
    let keys: Vec<_> = rows
        .iter()
        .map(|row| {
            let Token::Tuple(parts) = row else {
                panic!("expected tuple row");
            };
            let Token::String(key) = &parts[0] else {
                panic!("expected string key");
            };
            key.clone()
        })
        .collect();
    assert_eq!(keys, vec!["a", "b", "d"]);
}

#[tokio::test]
async fn test_auth_gates_table_writes() {
    let mut fixture = Fixture::new();
    fixture
        .call(TABLE_MANAGER_ADDRESS, create_ledger_input())
        .await;

    let alice = sender(1);
    let mallory = sender(2);

    // restrict "accounts" writes to alice
    let receipt = fixture
        .call(
            AUTH_MANAGER_ADDRESS,
            abi_call(
                "insert",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String(alice.to_hex()),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    let insert_row = |key: &str| {
        abi_call(
            "insert",
            &[
                ParamType::String,
                ParamType::String,
                ParamType::Array(Box::new(ParamType::String)),
            ],
            &[
                Token::String("accounts".into()),
                Token::String(key.into()),
                Token::Array(vec![
                    Token::String("1".into()),
                    Token::String("k".into()),
                ]),
            ],
        )
    };

    let receipt = fixture
        .call_from(mallory, TABLE_ADDRESS, insert_row("row1"))
        .await;
    assert_eq!(receipt.status(), codes::NO_AUTHORIZED);

    let receipt = fixture
        .call_from(alice, TABLE_ADDRESS, insert_row("row1"))
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());

    // reads stay open to everyone
    let receipt = fixture
        .call_from(
            mallory,
            TABLE_ADDRESS,
            abi_call(
                "select",
                &string_params(2),
                &[
                    Token::String("accounts".into()),
                    Token::String("row1".into()),
                ],
            ),
        )
        .await;
    assert!(receipt.is_success());

    let receipt = fixture
        .call(
            AUTH_MANAGER_ADDRESS,
            abi_call(
                "queryByName",
                &string_params(1),
                &[Token::String("accounts".into())],
            ),
        )
        .await;
    let tokens = decode_output(
        &receipt,
        &[ParamType::Array(Box::new(ParamType::String))],
    );
    assert_eq!(
        tokens[0],
        Token::Array(vec![Token::String(alice.to_hex())])
    );
}

#[tokio::test]
async fn test_account_status_requires_manager() {
    let mut fixture = Fixture::new();
    let account = sender(3);

    let set_input = abi_call(
        "setAccountStatus",
        &[ParamType::String, ParamType::Uint(16)],
        &[
            Token::String(account.to_hex()),
            Token::Uint(1u64.into()),
        ],
    );

    // direct call: rejected, nothing stored
    let receipt = fixture
        .call_from(sender(2), ACCOUNT_MANAGER_ADDRESS, set_input.clone())
        .await;
    assert_eq!(receipt.status(), codes::NO_AUTHORIZED);

    // routed through the account manager address: accepted
    let receipt = fixture
        .call_from(ACCOUNT_MANAGER_ADDRESS, ACCOUNT_MANAGER_ADDRESS, set_input)
        .await;
    assert!(receipt.is_success(), "status {}", receipt.status());
    let set_block = fixture.nonce;

    let receipt = fixture
        .call(
            ACCOUNT_MANAGER_ADDRESS,
            abi_call(
                "getAccountStatus",
                &string_params(1),
                &[Token::String(account.to_hex())],
            ),
        )
        .await;
    let tokens = decode_output(&receipt, &[ParamType::Uint(16), ParamType::Uint(256)]);
    assert_eq!(tokens[0], Token::Uint(1u64.into()));
    assert_eq!(tokens[1], Token::Uint(set_block.into()));
}

#[tokio::test]
async fn test_crypto_helpers() {
    let mut fixture = Fixture::new();

    let receipt = fixture
        .call(
            CRYPTO_ADDRESS,
            abi_call(
                "keccak256Hash",
                &[ParamType::Bytes],
                &[Token::Bytes(Vec::new())],
            ),
        )
        .await;
    let tokens = decode_output(&receipt, &[ParamType::FixedBytes(32)]);
    assert_eq!(
        tokens[0],
        Token::FixedBytes(
            hex::decode("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
                .unwrap()
        )
    );

    let receipt = fixture
        .call(
            CRYPTO_ADDRESS,
            abi_call(
                "sha256Hash",
                &[ParamType::Bytes],
                &[Token::Bytes(b"abc".to_vec())],
            ),
        )
        .await;
    let tokens = decode_output(&receipt, &[ParamType::FixedBytes(32)]);
    assert_eq!(
        tokens[0],
        Token::FixedBytes(
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap()
        )
    );
}
