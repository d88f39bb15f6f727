//! Reflection of table catalogs into relational table definitions.

use ship_abi::ScalarType;
use ship_client::test_utils;

use super::utils::schema_from;
use crate::schema::{self, SchemaMappingError, SqlType};

const BALANCES_ABI: &str = r#"{
    "version": "eosio::abi/1.1",
    "structs": [
        { "name": "balance_v0", "fields": [
            { "name": "a", "type": "uint64" },
            { "name": "b", "type": "uint8[]" },
            { "name": "c", "type": "name" }
        ] }
    ],
    "variants": [{ "name": "balance", "types": ["balance_v0"] }],
    "tables": [{ "name": "balances", "type": "balance", "key_names": ["c"] }]
}"#;

/// Array fields have no column; the synthetic columns come first.
#[test]
fn composite_fields_are_excluded_and_synthetic_columns_prepended() {
    //* Given
    let schema = schema_from(BALANCES_ABI);

    //* When
    let tables = schema::reflect(&schema).expect("catalog should reflect");

    //* Then
    assert_eq!(tables.len(), 1);
    let balances = &tables[0];
    assert_eq!(balances.column_names(), ["block_index", "present", "a", "c"]);
    let types: Vec<_> = balances.columns.iter().map(|c| c.sql_type).collect();
    assert_eq!(types, [SqlType::Decimal, SqlType::Varchar(Some(13))]);
    assert_eq!(balances.key_names, ["c"]);
}

/// The insert template has one placeholder per column, with casts for decimal columns.
#[test]
fn insert_template_has_one_placeholder_per_column() {
    //* Given
    let schema = schema_from(BALANCES_ABI);
    let tables = schema::reflect(&schema).expect("catalog should reflect");

    //* When
    let insert = tables[0].insert_sql("chain");
    let create = tables[0].create_sql("chain");

    //* Then
    assert!(insert.ends_with("VALUES ($1, $2, $3::numeric, $4)"), "{insert}");
    assert!(create.contains("block_index bigint NOT NULL"), "{create}");
    assert!(create.contains("present boolean NOT NULL"), "{create}");
    assert!(create.contains(" decimal"), "{create}");
    assert!(create.contains(" varchar(13)"), "{create}");
    assert!(create.ends_with("PRIMARY KEY (block_index, c))"), "{create}");
}

/// Nested structs, optionals and variants are composite too.
#[test]
fn struct_optional_and_variant_fields_are_excluded() {
    //* Given
    let schema = schema_from(
        r#"{
            "structs": [
                { "name": "inner", "fields": [{ "name": "x", "type": "uint8" }] },
                { "name": "row_v0", "fields": [
                    { "name": "id", "type": "uint32" },
                    { "name": "nested", "type": "inner" },
                    { "name": "maybe", "type": "uint8?" },
                    { "name": "either", "type": "choice" },
                    { "name": "late", "type": "bool$" }
                ] }
            ],
            "variants": [
                { "name": "choice", "types": ["uint8", "name"] },
                { "name": "row", "types": ["row_v0"] }
            ],
            "tables": [{ "name": "rows", "type": "row", "key_names": ["id"] }]
        }"#,
    );

    //* When
    let tables = schema::reflect(&schema).expect("catalog should reflect");

    //* Then
    assert_eq!(tables[0].column_names(), ["block_index", "present", "id"]);
}

/// An unmapped scalar fails reflection instead of being dropped.
#[test]
fn unmapped_scalar_is_rejected() {
    //* Given
    let schema = schema_from(
        r#"{
            "structs": [{ "name": "memo", "fields": [
                { "name": "id", "type": "uint64" },
                { "name": "text", "type": "string" }
            ] }],
            "tables": [{ "name": "memos", "type": "memo", "key_names": ["id"] }]
        }"#,
    );

    //* When
    let err = schema::reflect(&schema).unwrap_err();

    //* Then
    assert!(matches!(
        err,
        SchemaMappingError::UnmappedScalar { ref table, ref field, scalar: ScalarType::String }
            if table == "memos" && field == "text"
    ));
}

/// Keys must name reflected columns.
#[test]
fn key_on_excluded_field_is_rejected() {
    //* Given
    let schema = schema_from(
        r#"{
            "structs": [{ "name": "holder", "fields": [
                { "name": "id", "type": "uint64" },
                { "name": "tags", "type": "name[]" }
            ] }],
            "tables": [{ "name": "holders", "type": "holder", "key_names": ["tags"] }]
        }"#,
    );

    //* When
    let err = schema::reflect(&schema).unwrap_err();

    //* Then
    assert!(matches!(err, SchemaMappingError::UnknownKey { ref key, .. } if key == "tags"));
}

/// A row type that is not a struct cannot be reflected.
#[test]
fn scalar_row_type_is_rejected() {
    //* Given
    let schema = schema_from(r#"{ "tables": [{ "name": "counters", "type": "uint64" }] }"#);

    //* When
    let err = schema::reflect(&schema).unwrap_err();

    //* Then
    assert!(matches!(err, SchemaMappingError::RowType { ref table, .. } if table == "counters"));
}

/// The protocol's own catalog reflects completely.
#[test]
fn fixture_catalog_reflects_every_table() {
    //* Given
    let schema = test_utils::schema();

    //* When
    let tables = schema::reflect(&schema).expect("fixture catalog should reflect");

    //* Then
    let names: Vec<_> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["account", "contract_row", "generated_transaction"]);
    assert_eq!(
        tables[1].column_names(),
        [
            "block_index",
            "present",
            "code",
            "scope",
            "table",
            "primary_key",
            "payer",
            "value"
        ]
    );
    let generated = &tables[2];
    let sender_id = generated
        .columns
        .iter()
        .find(|c| c.name == "sender_id")
        .expect("sender_id column");
    assert_eq!(sender_id.sql_type, SqlType::Decimal);
    let trx_id = generated
        .columns
        .iter()
        .find(|c| c.name == "trx_id")
        .expect("trx_id column");
    assert_eq!(trx_id.sql_type, SqlType::Varchar(Some(64)));
}
