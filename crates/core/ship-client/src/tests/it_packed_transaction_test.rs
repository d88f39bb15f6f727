//! Type-directed expansion of packed transactions.

use ship_abi::Value;

use crate::{
    Compression, UnpackError,
    test_utils::{self, encode_transaction, packed_transaction, sample_transaction, zlib},
};

#[test]
fn uncompressed_payload_is_decoded_in_place() {
    //* Given
    let schema = test_utils::schema();
    let transaction = sample_transaction();
    let mut value = packed_transaction(0, encode_transaction(&schema, &transaction));
    let ty = schema.registry().resolve("packed_transaction").unwrap();

    //* When
    schema
        .unpacker()
        .expand(schema.registry(), &ty, &mut value)
        .expect("payload should expand");

    //* Then
    assert_eq!(value.field("packed_trx"), Some(&transaction));
    assert_eq!(value.field("compression"), Some(&Value::UInt(0)));
}

#[test]
fn zlib_payload_is_inflated_then_decoded() {
    //* Given
    let schema = test_utils::schema();
    let transaction = sample_transaction();
    let mut value = packed_transaction(1, zlib(&encode_transaction(&schema, &transaction)));
    let ty = schema.registry().resolve("packed_transaction").unwrap();

    //* When
    schema
        .unpacker()
        .expand(schema.registry(), &ty, &mut value)
        .expect("payload should expand");

    //* Then
    assert_eq!(value.field("packed_trx"), Some(&transaction));
}

#[test]
fn unrecognized_compression_is_an_error() {
    let schema = test_utils::schema();
    let mut value = packed_transaction(7, vec![1, 2, 3]);
    let ty = schema.registry().resolve("packed_transaction").unwrap();

    let err = schema
        .unpacker()
        .expand(schema.registry(), &ty, &mut value)
        .unwrap_err();

    assert!(matches!(err, UnpackError::UnknownCompression(7)));
}

#[test]
fn corrupt_zlib_stream_is_an_error() {
    let schema = test_utils::schema();

    let err = schema
        .unpacker()
        .unpack(schema.registry(), Compression::Zlib, &[0x78, 0x9c, 0xff, 0x00])
        .unwrap_err();

    assert!(matches!(err, UnpackError::Inflate(_)));
}

/// Packed transactions nested in a block (receipt -> `transaction_variant`) are found by type,
/// while a transaction id alternative is left alone.
#[test]
fn packed_transactions_inside_a_block_are_expanded() {
    //* Given
    let schema = test_utils::schema();
    let registry = schema.registry();
    let transaction = sample_transaction();
    let receipt = |trx: Value| {
        Value::record([
            ("status", Value::UInt(0)),
            ("cpu_usage_us", Value::UInt(100)),
            ("net_usage_words", Value::UInt(12)),
            ("trx", trx),
        ])
    };
    let block = Value::record([
        ("timestamp", Value::BlockTimestamp(1)),
        ("producer", Value::Name("eosio".parse().unwrap())),
        ("confirmed", Value::UInt(0)),
        ("previous", Value::Checksum(vec![0; 32])),
        ("transaction_mroot", Value::Checksum(vec![0; 32])),
        ("action_mroot", Value::Checksum(vec![0; 32])),
        ("schedule_version", Value::UInt(0)),
        ("new_producers", Value::Optional(None)),
        ("header_extensions", Value::Array(Vec::new())),
        (
            "producer_signature",
            Value::Signature(ship_abi::Key {
                kind: 0,
                data: vec![0; 65],
            }),
        ),
        (
            "transactions",
            Value::Array(vec![
                receipt(Value::variant(
                    "packed_transaction",
                    packed_transaction(1, zlib(&encode_transaction(&schema, &transaction))),
                )),
                receipt(Value::variant(
                    "transaction_id",
                    Value::Checksum(vec![0xab; 32]),
                )),
            ]),
        ),
        ("block_extensions", Value::Array(Vec::new())),
    ]);
    let bytes = registry.encode_named("signed_block", &block).unwrap();
    let mut decoded = registry.decode_named("signed_block", &bytes).unwrap();
    let ty = registry.resolve("signed_block").unwrap();

    //* When
    schema
        .unpacker()
        .expand(registry, &ty, &mut decoded)
        .expect("block should expand");

    //* Then
    let receipts = decoded.field("transactions").and_then(Value::as_array).unwrap();
    let Some(Value::Variant(name, packed)) = receipts[0].field("trx") else {
        panic!("trx should be a variant");
    };
    assert_eq!(name, "packed_transaction");
    assert_eq!(packed.field("packed_trx"), Some(&transaction));
    assert_eq!(
        receipts[1].field("trx"),
        Some(&Value::variant(
            "transaction_id",
            Value::Checksum(vec![0xab; 32])
        ))
    );
}

/// Generated transactions carry their payload uncompressed, without a compression tag.
#[test]
fn generated_transaction_rows_are_expanded() {
    //* Given
    let schema = test_utils::schema();
    let transaction = sample_transaction();
    let row = Value::record([
        ("sender", Value::Name("alice".parse().unwrap())),
        ("sender_id", Value::UInt128(1)),
        ("payer", Value::Name("alice".parse().unwrap())),
        ("trx_id", Value::Checksum(vec![1; 32])),
        ("packed_trx", Value::Bytes(encode_transaction(&schema, &transaction))),
    ]);
    let mut value = Value::variant("generated_transaction_v0", row);
    let table = schema.table("generated_transaction").unwrap();

    //* When
    schema
        .unpacker()
        .expand(schema.registry(), &table.row_type, &mut value)
        .expect("row should expand");

    //* Then
    let row = value.unwrap_variant();
    assert_eq!(row.field("packed_trx"), Some(&transaction));
}
