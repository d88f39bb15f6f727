//! Client for the ledger state-history stream.
//!
//! A [`Connection`] loads the producer's schema document, exchanges status, then streams
//! blocks to a [`BlockHandler`] one at a time, acknowledging each message as it is taken off
//! the local queue.
//!
//! ```rust,ignore
//! use ship_client::{Connection, ConnectionConfig};
//!
//! let config = ConnectionConfig::default().with_start_block(1);
//! Connection::new(config)
//!     .connect("ws://localhost:8080/", &mut handler)
//!     .await?;
//! ```

mod connection;
mod delta;
pub mod error;
mod packed;
pub mod protocol;
mod schema;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use self::{
    connection::{
        BlockHandler, Connection, ConnectionConfig, DELTAS_TYPE, QueueBound, ReceivedBlock,
        SIGNED_BLOCK_TYPE, TRACES_TYPE,
    },
    delta::{DecodedRow, DeltaRow, Rows, TableDelta},
    error::{BoxError, ConnectionError, ProtocolError, RowError, SchemaError, UnpackError},
    packed::{Compression, TransactionUnpacker},
    protocol::{BlockPosition, BlocksResult, GetBlocksRequest, StatusResult},
    schema::{ShipSchema, TableDescriptor},
};
