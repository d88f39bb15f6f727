//! Error types for the stream connection.

use ship_abi::{AbiError, DecodeError, EncodeError};

use crate::transport::TransportError;

/// Boxed error returned by [`BlockHandler`](crate::BlockHandler) callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal errors of a stream connection.
///
/// Every variant ends the connection: there is no partial-message recovery and no reconnect.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The transport failed to connect, send or receive
    #[error("transport error")]
    Transport(#[source] TransportError),

    /// The producer closed the channel before the connection reached the streaming state
    #[error("channel closed while {state}")]
    Closed { state: &'static str },

    /// A frame arrived that is not valid in the current state
    #[error("unexpected {frame} while {state}")]
    UnexpectedFrame {
        state: &'static str,
        frame: &'static str,
    },

    /// The handshake schema document could not be turned into a registry
    #[error("invalid schema document")]
    Schema(#[source] SchemaError),

    /// A request could not be encoded or a result could not be decoded
    #[error("protocol error")]
    Protocol(#[source] ProtocolError),

    /// A block, trace or delta payload of a blocks result failed to decode
    #[error("failed to decode {payload} payload of block {block_num}")]
    Payload {
        payload: &'static str,
        block_num: u32,
        #[source]
        source: PayloadError,
    },

    /// The block handler returned an error
    #[error("block handler failed")]
    Handler(#[source] BoxError),
}

/// Errors building a [`ShipSchema`](crate::ShipSchema) from the handshake document.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The document is not a valid schema
    #[error(transparent)]
    Abi(#[from] AbiError),

    /// A table's row type does not resolve
    #[error("row type '{ty}' of table '{table}' is not defined")]
    UnknownRowType {
        table: String,
        ty: String,
        #[source]
        source: DecodeError,
    },

    /// A table's row type (or the first alternative of its variant) is not a struct
    #[error("row type '{ty}' of table '{table}' is not a struct")]
    RowNotStruct { table: String, ty: String },

    /// Two tables share a name
    #[error("table '{0}' is declared more than once")]
    DuplicateTable(String),
}

/// Errors converting between protocol messages and their encoded form.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A request value does not match the schema's `request` type
    #[error("failed to encode request")]
    Encode(#[source] EncodeError),

    /// A message does not decode as the schema's `result` type
    #[error("failed to decode result")]
    Decode(#[source] DecodeError),

    /// A `result` alternative this client does not handle
    #[error("unknown result type '{0}'")]
    UnknownResult(String),

    /// A decoded message lacks a field or has one of the wrong shape
    #[error("malformed '{ty}': field '{field}' is missing or has the wrong type")]
    Malformed {
        ty: &'static str,
        field: &'static str,
    },
}

/// Errors decoding the payloads carried by a blocks result.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors decoding a single delta row.
///
/// Row iteration logs these and moves on to the next row.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    /// The delta names a table the schema does not declare
    #[error("unknown table '{0}'")]
    UnknownTable(String),

    /// The row payload does not decode as the table's row type
    #[error("failed to decode row {index} of table '{table}'")]
    Decode {
        table: String,
        index: usize,
        #[source]
        source: DecodeError,
    },
}

/// Errors expanding a packed transaction.
#[derive(Debug, thiserror::Error)]
pub enum UnpackError {
    /// The compression tag is neither `none` (0) nor `zlib` (1)
    #[error("unrecognized compression {0}")]
    UnknownCompression(u64),

    /// The zlib stream is corrupt
    #[error("failed to inflate packed transaction")]
    Inflate(#[source] std::io::Error),

    /// The (inflated) payload does not decode as a transaction
    #[error("failed to decode packed transaction")]
    Decode(#[source] DecodeError),

    /// The schema declares no `transaction` type
    #[error("schema does not declare a 'transaction' type")]
    MissingTransactionType,

    /// A packed transaction value lacks the named field
    #[error("packed transaction has no usable '{0}' field")]
    Malformed(&'static str),
}
