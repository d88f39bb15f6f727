//! Fixtures for exercising a connection without a producer node.
//!
//! - [`SHIP_ABI`]: a schema document covering the protocol messages, blocks, traces and three
//!   tables (`account`, `contract_row`, `generated_transaction`)
//! - encoders for results, deltas and rows
//! - [`memory_transport`] and [`serve_blocks`], a producer that honours the blocks request
//!   window

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use bytes::Bytes;
use futures::{StreamExt as _, channel::mpsc, sink};
use ship_abi::{TypeKind, TypeRef, TypeRegistry, Value};

use crate::{
    connection::DELTAS_TYPE,
    delta::TableDelta,
    protocol::{BlockPosition, REQUEST_TYPE, RESULT_TYPE},
    schema::ShipSchema,
    transport::{Frame, FrameSink, FrameStream, TransportError},
};

pub const SHIP_ABI: &str = include_str!("../fixtures/ship.abi.json");

pub fn schema() -> ShipSchema {
    ShipSchema::from_document(SHIP_ABI.as_bytes()).expect("fixture schema should load")
}

/// Position whose id starts with the big-endian block number, as ledger block ids do.
pub fn position(block_num: u32) -> BlockPosition {
    let mut block_id = [0u8; 32];
    block_id[..4].copy_from_slice(&block_num.to_be_bytes());
    block_id[31] = 0xee;
    BlockPosition {
        block_num,
        block_id,
    }
}

pub fn status_result(schema: &ShipSchema, head: u32) -> Vec<u8> {
    let value = Value::variant(
        "get_status_result_v0",
        Value::record([
            ("head", position(head).to_value()),
            ("last_irreversible", position(head.saturating_sub(1)).to_value()),
            ("trace_begin_block", Value::UInt(1)),
            ("trace_end_block", Value::UInt(head.into())),
            ("chain_state_begin_block", Value::UInt(1)),
            ("chain_state_end_block", Value::UInt(head.into())),
        ]),
    );
    schema
        .registry()
        .encode_named(RESULT_TYPE, &value)
        .expect("status result should encode")
}

/// Encodes a `get_blocks_result_v0` for `block_num` carrying only `deltas`.
pub fn blocks_result(schema: &ShipSchema, block_num: u32, deltas: Option<Vec<u8>>) -> Vec<u8> {
    blocks_result_with(schema, Some(block_num), None, None, deltas)
}

pub fn blocks_result_with(
    schema: &ShipSchema,
    this_block: Option<u32>,
    block: Option<Vec<u8>>,
    traces: Option<Vec<u8>>,
    deltas: Option<Vec<u8>>,
) -> Vec<u8> {
    let head = this_block.unwrap_or(1);
    let optional_position = |block_num: Option<u32>| match block_num {
        Some(block_num) => Value::some(position(block_num).to_value()),
        None => Value::Optional(None),
    };
    let optional_bytes = |bytes: Option<Vec<u8>>| match bytes {
        Some(bytes) => Value::some(Value::Bytes(bytes)),
        None => Value::Optional(None),
    };
    let value = Value::variant(
        "get_blocks_result_v0",
        Value::record([
            ("head", position(head).to_value()),
            ("last_irreversible", position(head.saturating_sub(1)).to_value()),
            ("this_block", optional_position(this_block)),
            (
                "prev_block",
                optional_position(this_block.map(|n| n.saturating_sub(1))),
            ),
            ("block", optional_bytes(block)),
            ("traces", optional_bytes(traces)),
            ("deltas", optional_bytes(deltas)),
        ]),
    );
    schema
        .registry()
        .encode_named(RESULT_TYPE, &value)
        .expect("blocks result should encode")
}

/// Encodes a row struct as `table`'s row type, wrapping it in the first alternative when the
/// row type is a variant.
pub fn encode_row(schema: &ShipSchema, table: &str, row: Value) -> Vec<u8> {
    let table = schema.table(table).expect("table should be declared");
    let registry = schema.registry();
    let value = match first_alternative(registry, &table.row_type) {
        Some(name) => Value::variant(name, row),
        None => row,
    };
    registry
        .encode(&table.row_type, &value)
        .expect("row should encode")
}

fn first_alternative(registry: &TypeRegistry, ty: &TypeRef) -> Option<String> {
    let TypeRef::Defined(id) = ty else {
        return None;
    };
    match &registry.descriptor(*id).kind {
        TypeKind::Variant(alternatives) => alternatives.first().map(|(name, _)| name.clone()),
        _ => None,
    }
}

/// Encodes deltas as `table_delta[]`.
pub fn encode_deltas(schema: &ShipSchema, deltas: &[TableDelta]) -> Vec<u8> {
    let value = Value::Array(
        deltas
            .iter()
            .map(|delta| {
                Value::variant(
                    "table_delta_v0",
                    Value::record([
                        ("name", Value::String(delta.name.clone())),
                        (
                            "rows",
                            Value::Array(
                                delta
                                    .rows
                                    .iter()
                                    .map(|row| {
                                        Value::record([
                                            ("present", Value::Bool(row.present)),
                                            ("data", Value::Bytes(row.data.clone())),
                                        ])
                                    })
                                    .collect(),
                            ),
                        ),
                    ]),
                )
            })
            .collect(),
    );
    schema
        .registry()
        .encode_named(DELTAS_TYPE, &value)
        .expect("deltas should encode")
}

/// Producer side of an in-memory transport.
pub struct ProducerEnd {
    /// Requests written by the connection.
    pub requests: mpsc::UnboundedReceiver<Bytes>,
    /// Frames delivered to the connection; dropping it closes the connection's stream.
    pub frames: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    /// Number of requests the connection has finished sending.
    pub sent: Arc<AtomicUsize>,
}

impl ProducerEnd {
    /// Delivers a frame; `false` once the connection has stopped listening.
    pub fn send(&self, frame: Frame) -> bool {
        self.frames.unbounded_send(Ok(frame)).is_ok()
    }

    /// Next request as `(alternative, fields)`, or `None` once the connection is gone.
    pub async fn next_request(&mut self, registry: &TypeRegistry) -> Option<(String, Value)> {
        let bytes = self.requests.next().await?;
        match registry
            .decode_named(REQUEST_TYPE, &bytes)
            .expect("request should decode")
        {
            Value::Variant(name, inner) => Some((name, *inner)),
            other => panic!("request is not a variant: {other:?}"),
        }
    }
}

/// Connects a connection's transport halves to a [`ProducerEnd`].
pub fn memory_transport() -> (FrameSink, FrameStream, ProducerEnd) {
    let (request_tx, requests) = mpsc::unbounded();
    let (frames, frame_rx) = mpsc::unbounded();
    let sent = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&sent);
    let sink = sink::unfold(request_tx, move |tx, bytes: Bytes| {
        let counter = Arc::clone(&counter);
        async move {
            tx.unbounded_send(bytes)
                .map_err(|_| TransportError::Disconnected)?;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, TransportError>(tx)
        }
    });
    (
        Box::pin(sink),
        Box::pin(frame_rx),
        ProducerEnd {
            requests,
            frames,
            sent,
        },
    )
}

/// What [`serve_blocks`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    /// `max_messages_in_flight` of the blocks request.
    pub window: u32,
    pub blocks_sent: usize,
    pub acked: u64,
    /// Highest number of unacknowledged blocks at any time.
    pub max_in_flight: u32,
}

/// Plays the producer: sends the fixture schema, answers the status request, then streams
/// `blocks` (encoded results) never exceeding the requested window, and closes the channel
/// once everything is acknowledged.
pub async fn serve_blocks(mut end: ProducerEnd, blocks: Vec<Vec<u8>>) -> ProducerReport {
    let schema = schema();
    let registry = schema.registry();

    end.send(Frame::Text(SHIP_ABI.to_string()));

    let (name, _) = end
        .next_request(registry)
        .await
        .expect("connection should request status");
    assert_eq!(name, "get_status_request_v0");
    end.send(Frame::Binary(status_result(&schema, 1_000).into()));

    let (name, request) = end
        .next_request(registry)
        .await
        .expect("connection should request blocks");
    assert_eq!(name, "get_blocks_request_v0");
    let window = request
        .field("max_messages_in_flight")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .expect("window should be a uint32");

    let mut report = ProducerReport {
        window,
        blocks_sent: 0,
        acked: 0,
        max_in_flight: 0,
    };
    let mut in_flight = 0u32;
    let mut pending = blocks.into_iter();
    loop {
        if in_flight < window {
            if let Some(block) = pending.next() {
                if !end.send(Frame::Binary(block.into())) {
                    break;
                }
                report.blocks_sent += 1;
                in_flight += 1;
                report.max_in_flight = report.max_in_flight.max(in_flight);
                continue;
            }
            if in_flight == 0 {
                break;
            }
        }
        match end.next_request(registry).await {
            Some((name, ack)) if name == "get_blocks_ack_request_v0" => {
                let acked = ack
                    .field("num_messages")
                    .and_then(Value::as_u64)
                    .expect("ack should carry num_messages");
                report.acked += acked;
                in_flight = in_flight.saturating_sub(acked as u32);
            }
            Some((name, _)) => panic!("unexpected request while streaming: {name}"),
            None => break,
        }
    }
    report
}

/// An `eosio.token::transfer` transaction signed by `alice@active`.
pub fn sample_transaction() -> Value {
    let name = |text: &str| Value::Name(text.parse().expect("fixture name should parse"));
    Value::record([
        ("expiration", Value::TimePointSec(1_600_000_000)),
        ("ref_block_num", Value::UInt(7)),
        ("ref_block_prefix", Value::UInt(123_456)),
        ("max_net_usage_words", Value::UInt(0)),
        ("max_cpu_usage_ms", Value::UInt(0)),
        ("delay_sec", Value::UInt(0)),
        ("context_free_actions", Value::Array(Vec::new())),
        (
            "actions",
            Value::Array(vec![Value::record([
                ("account", name("eosio.token")),
                ("name", name("transfer")),
                (
                    "authorization",
                    Value::Array(vec![Value::record([
                        ("actor", name("alice")),
                        ("permission", name("active")),
                    ])]),
                ),
                ("data", Value::Bytes(vec![1, 2, 3])),
            ])]),
        ),
        ("transaction_extensions", Value::Array(Vec::new())),
    ])
}

pub fn encode_transaction(schema: &ShipSchema, transaction: &Value) -> Vec<u8> {
    schema
        .registry()
        .encode_named("transaction", transaction)
        .expect("transaction should encode")
}

/// A `packed_transaction` value with the given compression tag and payload.
pub fn packed_transaction(compression: u8, packed_trx: Vec<u8>) -> Value {
    Value::record([
        ("signatures", Value::Array(Vec::new())),
        ("compression", Value::UInt(compression.into())),
        ("packed_context_free_data", Value::Bytes(Vec::new())),
        ("packed_trx", Value::Bytes(packed_trx)),
    ])
}

pub fn zlib(bytes: &[u8]) -> Vec<u8> {
    use std::io::Write as _;

    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).expect("in-memory write should succeed");
    encoder.finish().expect("in-memory write should succeed")
}
