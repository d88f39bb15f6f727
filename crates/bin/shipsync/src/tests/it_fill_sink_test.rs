//! Schema recreation and per-block persistence of the relational sink.

use ship_abi::{Name, Value};
use ship_client::{
    Connection, ConnectionConfig, DeltaRow, TableDelta,
    test_utils::{self, memory_transport, serve_blocks},
};

use super::utils::{RecordingStore, received, schema_from};
use crate::{
    schema::SqlValue,
    sink::{FillSink, SinkError},
    sql,
    store::StoreError,
};

const ACCOUNT_ABI: &str = r#"{
    "version": "eosio::abi/1.1",
    "structs": [{ "name": "account_v0", "fields": [
        { "name": "name", "type": "name" },
        { "name": "abi", "type": "uint8[]" }
    ] }],
    "variants": [{ "name": "account", "types": ["account_v0"] }],
    "tables": [{ "name": "account", "type": "account", "key_names": ["name"] }]
}"#;

fn name(text: &str) -> Value {
    Value::Name(text.parse::<Name>().expect("valid name"))
}

fn contract_row(payer: &str, primary_key: u64) -> Value {
    Value::record([
        ("code", name("eosio.token")),
        ("scope", name("alice")),
        ("table", name("accounts")),
        ("primary_key", Value::UInt(primary_key)),
        ("payer", name(payer)),
        ("value", Value::Bytes(vec![0x01, 0x02])),
    ])
}

fn contract_rows(rows: &[(&str, u64)]) -> TableDelta {
    let schema = test_utils::schema();
    TableDelta {
        name: "contract_row".into(),
        rows: rows
            .iter()
            .map(|(payer, key)| DeltaRow {
                present: true,
                data: test_utils::encode_row(&schema, "contract_row", contract_row(payer, *key)),
            })
            .collect(),
    }
}

/// One present account row lands as exactly one row: block number, presence, and the
/// scalar `name` column; the `abi` array has no column.
#[tokio::test]
async fn account_row_is_persisted_with_block_and_presence() {
    //* Given
    let schema = schema_from(ACCOUNT_ABI);
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");
    let delta = TableDelta {
        name: "account".into(),
        rows: vec![DeltaRow {
            present: true,
            data: test_utils::encode_row(
                &schema,
                "account",
                Value::record([("name", name("alice")), ("abi", Value::Array(vec![]))]),
            ),
        }],
    };

    //* When
    sink.persist(&schema, &received(12_345, vec![delta]))
        .await
        .expect("block should persist");

    //* Then
    let log = store.log();
    assert_eq!(log.inserted.len(), 1);
    let (statement, values) = &log.inserted[0];
    assert_eq!(
        values,
        &vec![
            SqlValue::Int8(12_345),
            SqlValue::Bool(true),
            SqlValue::Text("alice".into())
        ]
    );
    assert!(statement.contains(&sql::qualified_table("chain", "account")));
    assert!(statement.contains("VALUES ($1, $2, $3)"), "{statement}");
    assert_eq!(log.begun, 1);
    assert_eq!(log.committed, 1);
}

/// The schema is dropped and recreated before any table is created.
#[tokio::test]
async fn schema_ready_recreates_schema_then_tables() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");

    //* When
    sink.create_schema(&schema).await.expect("schema should be created");

    //* Then
    let log = store.log();
    assert_eq!(log.executed.len(), 5);
    assert_eq!(log.executed[0], sql::drop_schema("chain"));
    assert_eq!(log.executed[1], sql::create_schema("chain"));
    for (statement, table) in log.executed[2..]
        .iter()
        .zip(["account", "contract_row", "generated_transaction"])
    {
        assert!(
            statement.starts_with(&format!("CREATE TABLE {} (", sql::qualified_table("chain", table))),
            "{statement}"
        );
    }
}

/// A schema name that is not a plain identifier is refused before anything runs.
#[tokio::test]
async fn invalid_schema_name_is_refused() {
    //* Given
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain; DROP SCHEMA public");

    //* When
    let err = sink
        .create_schema(&test_utils::schema())
        .await
        .unwrap_err();

    //* Then
    assert!(matches!(err, SinkError::InvalidSchemaName { .. }));
    assert!(store.log().executed.is_empty());
}

/// A rejected insert is skipped; later inserts of the same block still run and the
/// transaction commits.
#[tokio::test]
async fn failed_insert_does_not_stop_the_block() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::rejecting(SqlValue::Text("mallory".into()));
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");
    let delta = contract_rows(&[("alice", 1), ("mallory", 2), ("bob", 3)]);

    //* When
    sink.persist(&schema, &received(7, vec![delta]))
        .await
        .expect("block should persist despite the failed insert");

    //* Then
    let log = store.log();
    assert_eq!(log.rejected.len(), 1);
    let payers: Vec<_> = log.inserted.iter().map(|(_, values)| values[6].clone()).collect();
    assert_eq!(
        payers,
        [SqlValue::Text("alice".into()), SqlValue::Text("bob".into())]
    );
    assert_eq!(log.committed, 1);
}

/// A row that does not decode is skipped; its neighbours are persisted.
#[tokio::test]
async fn undecodable_row_is_skipped() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");
    let mut delta = contract_rows(&[("alice", 1), ("bob", 2)]);
    delta.rows.insert(
        1,
        DeltaRow {
            present: true,
            data: vec![0xff, 0x00],
        },
    );

    //* When
    sink.persist(&schema, &received(8, vec![delta]))
        .await
        .expect("block should persist");

    //* Then
    let log = store.log();
    assert_eq!(log.inserted.len(), 2);
    assert_eq!(log.committed, 1);
}

/// Decimal and bytes columns are bound as text for the casting placeholders.
#[tokio::test]
async fn decimal_and_bytes_columns_bind_text() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");

    //* When
    sink.persist(&schema, &received(9, vec![contract_rows(&[("alice", u64::MAX)])]))
        .await
        .expect("block should persist");

    //* Then
    let log = store.log();
    let (statement, values) = &log.inserted[0];
    assert!(
        statement.ends_with("VALUES ($1, $2, $3, $4, $5, $6::numeric, $7, decode($8, 'hex'))"),
        "{statement}"
    );
    assert_eq!(values[5], SqlValue::Text(u64::MAX.to_string()));
    assert_eq!(values[7], SqlValue::Text("0102".into()));
}

/// Results without `this_block` carry nothing to persist and open no transaction.
#[tokio::test]
async fn block_without_position_is_skipped() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");
    let mut block = received(10, vec![contract_rows(&[("alice", 1)])]);
    block.result.this_block = None;

    //* When
    sink.persist(&schema, &block).await.expect("block should be skipped");

    //* Then
    let log = store.log();
    assert_eq!(log.begun, 0);
    assert!(log.inserted.is_empty());
}

/// A delta for a table outside the catalog is skipped; the block still commits.
#[tokio::test]
async fn delta_for_unknown_table_is_skipped() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");
    let unknown = TableDelta {
        name: "resource_usage".into(),
        rows: vec![DeltaRow {
            present: true,
            data: vec![0x00],
        }],
    };

    //* When
    sink.persist(&schema, &received(11, vec![unknown, contract_rows(&[("bob", 4)])]))
        .await
        .expect("block should persist");

    //* Then
    let log = store.log();
    assert_eq!(log.inserted.len(), 1);
    assert_eq!(log.committed, 1);
}

/// A failed commit leaves the database in an unknown state and stops the sink.
#[tokio::test]
async fn failed_commit_is_fatal() {
    //* Given
    let schema = test_utils::schema();
    let store = RecordingStore::failing_commit();
    let mut sink = FillSink::new(store.clone(), "chain");
    sink.create_schema(&schema).await.expect("schema should be created");

    //* When
    let err = sink
        .persist(&schema, &received(12, vec![contract_rows(&[("alice", 1)])]))
        .await
        .unwrap_err();

    //* Then
    assert!(matches!(
        err,
        SinkError::Transaction {
            block_num: 12,
            source: StoreError::Transaction(_)
        }
    ));
}

/// Driven by a connection, the sink creates its schema at handshake and persists every
/// streamed block in order.
#[tokio::test]
async fn sink_fills_from_a_stream() {
    //* Given
    let schema = test_utils::schema();
    let blocks = (1..=4)
        .map(|block_num| {
            let deltas = test_utils::encode_deltas(
                &schema,
                &[contract_rows(&[("alice", u64::from(block_num))])],
            );
            test_utils::blocks_result(&schema, block_num, Some(deltas))
        })
        .collect();
    let (frame_sink, frame_stream, end) = memory_transport();
    let connection = Connection::new(ConnectionConfig::default().with_window(2));
    let store = RecordingStore::default();
    let mut sink = FillSink::new(store.clone(), "chain");

    //* When
    let (report, outcome) = tokio::join!(
        serve_blocks(end, blocks),
        connection.run(frame_sink, frame_stream, &mut sink),
    );

    //* Then
    outcome.expect("connection should end cleanly");
    assert_eq!(report.acked, 4);
    let log = store.log();
    assert_eq!(log.executed.len(), 5);
    let block_indexes: Vec<_> = log.inserted.iter().map(|(_, values)| values[0].clone()).collect();
    assert_eq!(
        block_indexes,
        (1..=4).map(SqlValue::Int8).collect::<Vec<_>>()
    );
    assert_eq!(log.committed, 4);
}
