//! Typed request and result messages.
//!
//! Messages travel as alternatives of the schema's `request` and `result` variants; these types
//! convert to and from the registry's dynamic [`Value`]s.

use bytes::Bytes;
use ship_abi::{TypeRegistry, Value};

use crate::error::ProtocolError;

pub const REQUEST_TYPE: &str = "request";
pub const RESULT_TYPE: &str = "result";

/// Highest block number; an `end_block_num` of this value streams forever.
pub const END_OF_CHAIN: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPosition {
    pub block_num: u32,
    pub block_id: [u8; 32],
}

impl BlockPosition {
    pub fn to_value(&self) -> Value {
        Value::record([
            ("block_num", Value::UInt(self.block_num.into())),
            ("block_id", Value::Checksum(self.block_id.to_vec())),
        ])
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut fields = Fields::new("block_position", value)?;
        Ok(BlockPosition {
            block_num: fields.u32("block_num")?,
            block_id: fields
                .bytes("block_id")?
                .try_into()
                .map_err(|_| fields.malformed("block_id"))?,
        })
    }
}

/// Parameters of `get_blocks_request_v0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlocksRequest {
    pub start_block_num: u32,
    pub end_block_num: u32,
    pub max_messages_in_flight: u32,
    pub have_positions: Vec<BlockPosition>,
    pub irreversible_only: bool,
    pub fetch_block: bool,
    /// Only encoded when the producer's schema declares it.
    pub fetch_block_state: bool,
    pub fetch_traces: bool,
    pub fetch_deltas: bool,
}

impl Default for GetBlocksRequest {
    fn default() -> Self {
        GetBlocksRequest {
            start_block_num: 0,
            end_block_num: END_OF_CHAIN,
            max_messages_in_flight: 5,
            have_positions: Vec::new(),
            irreversible_only: false,
            fetch_block: false,
            fetch_block_state: false,
            fetch_traces: false,
            fetch_deltas: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Status,
    Blocks(GetBlocksRequest),
    /// Acknowledges that many `get_blocks_result_v0` messages.
    Ack(u32),
}

impl Request {
    pub fn to_value(&self) -> Value {
        match self {
            Request::Status => {
                Value::variant("get_status_request_v0", Value::record::<_, String>([]))
            }
            Request::Blocks(request) => Value::variant(
                "get_blocks_request_v0",
                Value::record([
                    ("start_block_num", Value::UInt(request.start_block_num.into())),
                    ("end_block_num", Value::UInt(request.end_block_num.into())),
                    (
                        "max_messages_in_flight",
                        Value::UInt(request.max_messages_in_flight.into()),
                    ),
                    (
                        "have_positions",
                        Value::Array(
                            request
                                .have_positions
                                .iter()
                                .map(BlockPosition::to_value)
                                .collect(),
                        ),
                    ),
                    ("irreversible_only", Value::Bool(request.irreversible_only)),
                    ("fetch_block", Value::Bool(request.fetch_block)),
                    ("fetch_block_state", Value::Bool(request.fetch_block_state)),
                    ("fetch_traces", Value::Bool(request.fetch_traces)),
                    ("fetch_deltas", Value::Bool(request.fetch_deltas)),
                ]),
            ),
            Request::Ack(num_messages) => Value::variant(
                "get_blocks_ack_request_v0",
                Value::record([("num_messages", Value::UInt((*num_messages).into()))]),
            ),
        }
    }

    /// Encodes the request as the schema's `request` variant.
    pub fn encode(&self, registry: &TypeRegistry) -> Result<Bytes, ProtocolError> {
        registry
            .encode_named(REQUEST_TYPE, &self.to_value())
            .map(Bytes::from)
            .map_err(ProtocolError::Encode)
    }
}

/// Contents of `get_status_result_v0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResult {
    pub head: BlockPosition,
    pub last_irreversible: BlockPosition,
    pub trace_begin_block: u32,
    pub trace_end_block: u32,
    pub chain_state_begin_block: u32,
    pub chain_state_end_block: u32,
}

/// Contents of `get_blocks_result_v0`.
///
/// The payloads stay encoded; the connection decodes them after acknowledging the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocksResult {
    pub head: BlockPosition,
    pub last_irreversible: BlockPosition,
    pub this_block: Option<BlockPosition>,
    pub prev_block: Option<BlockPosition>,
    pub block: Option<Vec<u8>>,
    pub traces: Option<Vec<u8>>,
    pub deltas: Option<Vec<u8>>,
}

impl BlocksResult {
    /// Block number of `this_block`, or 0 when the producer sent none.
    pub fn block_num(&self) -> u32 {
        self.this_block.map(|position| position.block_num).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShipResult {
    Status(StatusResult),
    Blocks(BlocksResult),
}

impl ShipResult {
    /// Decodes one binary message as the schema's `result` variant.
    pub fn decode(registry: &TypeRegistry, bytes: &[u8]) -> Result<Self, ProtocolError> {
        let value = registry
            .decode_named(RESULT_TYPE, bytes)
            .map_err(ProtocolError::Decode)?;
        let Value::Variant(name, inner) = value else {
            return Err(ProtocolError::Malformed {
                ty: RESULT_TYPE,
                field: "variant",
            });
        };
        match name.as_str() {
            "get_status_result_v0" => {
                let mut fields = Fields::new("get_status_result_v0", *inner)?;
                Ok(ShipResult::Status(StatusResult {
                    head: fields.position("head")?,
                    last_irreversible: fields.position("last_irreversible")?,
                    trace_begin_block: fields.u32("trace_begin_block")?,
                    trace_end_block: fields.u32("trace_end_block")?,
                    chain_state_begin_block: fields.u32("chain_state_begin_block")?,
                    chain_state_end_block: fields.u32("chain_state_end_block")?,
                }))
            }
            "get_blocks_result_v0" => {
                let mut fields = Fields::new("get_blocks_result_v0", *inner)?;
                Ok(ShipResult::Blocks(BlocksResult {
                    head: fields.position("head")?,
                    last_irreversible: fields.position("last_irreversible")?,
                    this_block: fields
                        .optional("this_block")?
                        .map(BlockPosition::from_value)
                        .transpose()?,
                    prev_block: fields
                        .optional("prev_block")?
                        .map(BlockPosition::from_value)
                        .transpose()?,
                    block: fields.optional_bytes("block")?,
                    traces: fields.optional_bytes("traces")?,
                    deltas: fields.optional_bytes("deltas")?,
                }))
            }
            _ => Err(ProtocolError::UnknownResult(name)),
        }
    }
}

/// Owned struct fields of a decoded message, taken out one by one.
pub(crate) struct Fields {
    ty: &'static str,
    fields: Vec<(String, Value)>,
}

impl Fields {
    pub(crate) fn new(ty: &'static str, value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Struct(fields) => Ok(Fields { ty, fields }),
            _ => Err(ProtocolError::Malformed { ty, field: "*" }),
        }
    }

    pub(crate) fn malformed(&self, field: &'static str) -> ProtocolError {
        ProtocolError::Malformed { ty: self.ty, field }
    }

    pub(crate) fn take(&mut self, field: &'static str) -> Result<Value, ProtocolError> {
        let index = self
            .fields
            .iter()
            .position(|(name, _)| name == field)
            .ok_or_else(|| self.malformed(field))?;
        Ok(self.fields.swap_remove(index).1)
    }

    pub(crate) fn u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.take(field)?
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| self.malformed(field))
    }

    pub(crate) fn bool(&mut self, field: &'static str) -> Result<bool, ProtocolError> {
        self.take(field)?
            .as_bool()
            .ok_or_else(|| self.malformed(field))
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String, ProtocolError> {
        match self.take(field)? {
            Value::String(text) => Ok(text),
            _ => Err(self.malformed(field)),
        }
    }

    pub(crate) fn bytes(&mut self, field: &'static str) -> Result<Vec<u8>, ProtocolError> {
        match self.take(field)? {
            Value::Bytes(bytes) | Value::Checksum(bytes) => Ok(bytes),
            _ => Err(self.malformed(field)),
        }
    }

    pub(crate) fn array(&mut self, field: &'static str) -> Result<Vec<Value>, ProtocolError> {
        match self.take(field)? {
            Value::Array(items) => Ok(items),
            _ => Err(self.malformed(field)),
        }
    }

    fn position(&mut self, field: &'static str) -> Result<BlockPosition, ProtocolError> {
        BlockPosition::from_value(self.take(field)?)
    }

    fn optional(&mut self, field: &'static str) -> Result<Option<Value>, ProtocolError> {
        match self.take(field)? {
            Value::Optional(inner) => Ok(inner.map(|value| *value)),
            _ => Err(self.malformed(field)),
        }
    }

    fn optional_bytes(&mut self, field: &'static str) -> Result<Option<Vec<u8>>, ProtocolError> {
        match self.optional(field)? {
            None => Ok(None),
            Some(Value::Bytes(bytes)) => Ok(Some(bytes)),
            Some(_) => Err(self.malformed(field)),
        }
    }
}
