//! The stream connection: handshake, status exchange and the acknowledged block stream.
//!
//! ```text
//! Handshaking --schema--> AwaitingStatus --status result--> Streaming
//! ```
//!
//! In the streaming state a reader moves every `get_blocks_result_v0` into the block queue,
//! and a single drain loop takes them out one at a time: it acknowledges the message, decodes
//! its payloads and awaits the [`BlockHandler`] before taking the next one. The producer never
//! has more than `max_messages_in_flight` unacknowledged messages outstanding, and the handler
//! sees blocks in arrival order without overlapping calls.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt as _, StreamExt as _};
use ship_abi::Value;
use tokio::sync::mpsc;

use crate::{
    delta::TableDelta,
    error::{BoxError, ConnectionError, PayloadError},
    protocol::{BlockPosition, BlocksResult, GetBlocksRequest, Request, ShipResult},
    schema::ShipSchema,
    transport::{self, Frame, FrameSink, FrameStream},
};

pub const SIGNED_BLOCK_TYPE: &str = "signed_block";
pub const TRACES_TYPE: &str = "transaction_trace[]";
pub const DELTAS_TYPE: &str = "table_delta[]";

/// Growth policy of the local block queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueBound {
    /// The reader never waits; a slow handler lets the queue grow without limit. The producer
    /// window still bounds what is unacknowledged at the transport.
    #[default]
    Unbounded,
    /// The reader stops taking frames off the transport while this many blocks are queued.
    Bounded(NonZeroUsize),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Parameters of the blocks request, including the window size `max_messages_in_flight`.
    pub request: GetBlocksRequest,
    pub queue: QueueBound,
}

impl ConnectionConfig {
    pub fn with_start_block(mut self, start_block_num: u32) -> Self {
        self.request.start_block_num = start_block_num;
        self
    }

    pub fn with_end_block(mut self, end_block_num: u32) -> Self {
        self.request.end_block_num = end_block_num;
        self
    }

    pub fn with_window(mut self, max_messages_in_flight: u32) -> Self {
        self.request.max_messages_in_flight = max_messages_in_flight;
        self
    }

    pub fn with_have_positions(mut self, have_positions: Vec<BlockPosition>) -> Self {
        self.request.have_positions = have_positions;
        self
    }

    pub fn with_queue(mut self, queue: QueueBound) -> Self {
        self.queue = queue;
        self
    }
}

/// A blocks result with its present, non-empty payloads decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedBlock {
    pub result: BlocksResult,
    /// Decoded `signed_block`.
    pub block: Option<Value>,
    /// Elements of `transaction_trace[]`.
    pub traces: Vec<Value>,
    pub deltas: Vec<TableDelta>,
}

/// Consumer of a connection.
///
/// Calls take `&mut self` and are awaited one at a time. An error from either callback ends
/// the connection.
#[async_trait]
pub trait BlockHandler: Send {
    /// Called once the schema document has been loaded, before the status request is sent.
    async fn schema_ready(&mut self, _schema: &ShipSchema) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called for every blocks result, after it has been acknowledged.
    async fn block(&mut self, schema: &ShipSchema, block: ReceivedBlock) -> Result<(), BoxError>;
}

#[derive(Debug, Clone)]
pub struct Connection {
    config: ConnectionConfig,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        Connection { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens a WebSocket to `url` and runs the connection over it.
    pub async fn connect<H: BlockHandler>(
        &self,
        url: &str,
        handler: &mut H,
    ) -> Result<(), ConnectionError> {
        let (sink, stream) = transport::connect(url)
            .await
            .map_err(ConnectionError::Transport)?;
        self.run(sink, stream, handler).await
    }

    /// Runs the connection until the producer closes the channel or an error occurs.
    ///
    /// Blocks still queued when the channel closes are delivered before returning.
    pub async fn run<H: BlockHandler>(
        &self,
        mut sink: FrameSink,
        mut stream: FrameStream,
        handler: &mut H,
    ) -> Result<(), ConnectionError> {
        // Handshaking
        let document = next_frame(&mut stream, "handshaking")
            .await?
            .ok_or(ConnectionError::Closed {
                state: "handshaking",
            })?;
        let schema =
            ShipSchema::from_document(document.as_bytes()).map_err(ConnectionError::Schema)?;
        tracing::info!(tables = schema.tables().len(), "schema_received");

        handler
            .schema_ready(&schema)
            .await
            .map_err(ConnectionError::Handler)?;

        let registry = schema.registry();
        let encode = |request: &Request| {
            request
                .encode(registry)
                .map_err(ConnectionError::Protocol)
        };
        let ack = encode(&Request::Ack(1))?;
        let blocks_request = encode(&Request::Blocks(self.config.request.clone()))?;

        // AwaitingStatus
        send(&mut sink, encode(&Request::Status)?).await?;
        loop {
            let frame = next_frame(&mut stream, "awaiting status")
                .await?
                .ok_or(ConnectionError::Closed {
                    state: "awaiting status",
                })?;
            match decode_result(&schema, &frame, "awaiting status")? {
                ShipResult::Status(status) => {
                    tracing::info!(
                        head = status.head.block_num,
                        last_irreversible = status.last_irreversible.block_num,
                        start_block = self.config.request.start_block_num,
                        end_block = self.config.request.end_block_num,
                        max_messages_in_flight = self.config.request.max_messages_in_flight,
                        "status_received"
                    );
                    break;
                }
                ShipResult::Blocks(_) => {
                    return Err(ConnectionError::UnexpectedFrame {
                        state: "awaiting status",
                        frame: "blocks result",
                    });
                }
            }
        }

        // Streaming
        send(&mut sink, blocks_request).await?;
        let (queue_tx, mut queue_rx) = block_queue(self.config.queue);

        let reader = async {
            let queue_tx = queue_tx;
            while let Some(frame) = next_frame(&mut stream, "streaming").await? {
                match decode_result(&schema, &frame, "streaming")? {
                    ShipResult::Blocks(result) => {
                        tracing::trace!(block_num = result.block_num(), "block_queued");
                        if !queue_tx.push(result).await {
                            break;
                        }
                    }
                    ShipResult::Status(status) => {
                        tracing::debug!(head = status.head.block_num, "status_ignored");
                    }
                }
            }
            tracing::info!("stream_closed");
            Ok::<_, ConnectionError>(())
        };

        let drain = async {
            while let Some(result) = queue_rx.pop().await {
                send(&mut sink, ack.clone()).await?;
                let block = decode_payloads(&schema, result)?;
                handler
                    .block(&schema, block)
                    .await
                    .map_err(ConnectionError::Handler)?;
            }
            Ok::<_, ConnectionError>(())
        };

        tokio::try_join!(reader, drain)?;
        Ok(())
    }
}

async fn next_frame(
    stream: &mut FrameStream,
    state: &'static str,
) -> Result<Option<Frame>, ConnectionError> {
    match stream.next().await {
        Some(Ok(frame)) => Ok(Some(frame)),
        Some(Err(err)) => {
            tracing::error!(
                state,
                error = %err,
                error_source = monitoring::logging::error_source(&err),
                "transport_receive_failed"
            );
            Err(ConnectionError::Transport(err))
        }
        None => Ok(None),
    }
}

async fn send(sink: &mut FrameSink, bytes: Bytes) -> Result<(), ConnectionError> {
    sink.send(bytes).await.map_err(ConnectionError::Transport)
}

fn decode_result(
    schema: &ShipSchema,
    frame: &Frame,
    state: &'static str,
) -> Result<ShipResult, ConnectionError> {
    let Frame::Binary(bytes) = frame else {
        return Err(ConnectionError::UnexpectedFrame {
            state,
            frame: frame.kind(),
        });
    };
    ShipResult::decode(schema.registry(), bytes).map_err(ConnectionError::Protocol)
}

fn decode_payloads(
    schema: &ShipSchema,
    result: BlocksResult,
) -> Result<ReceivedBlock, ConnectionError> {
    let block_num = result.block_num();
    let registry = schema.registry();
    let payload_error = |payload: &'static str| {
        move |source: PayloadError| ConnectionError::Payload {
            payload,
            block_num,
            source,
        }
    };

    let block = match non_empty(&result.block) {
        Some(bytes) => Some(
            registry
                .decode_named(SIGNED_BLOCK_TYPE, bytes)
                .map_err(|err| payload_error("block")(err.into()))?,
        ),
        None => None,
    };

    let traces = match non_empty(&result.traces) {
        Some(bytes) => match registry
            .decode_named(TRACES_TYPE, bytes)
            .map_err(|err| payload_error("traces")(err.into()))?
        {
            Value::Array(traces) => traces,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    let deltas = match non_empty(&result.deltas) {
        Some(bytes) => match registry
            .decode_named(DELTAS_TYPE, bytes)
            .map_err(|err| payload_error("deltas")(err.into()))?
        {
            Value::Array(deltas) => deltas
                .into_iter()
                .map(TableDelta::from_value)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| payload_error("deltas")(err.into()))?,
            _ => Vec::new(),
        },
        None => Vec::new(),
    };

    Ok(ReceivedBlock {
        result,
        block,
        traces,
        deltas,
    })
}

fn non_empty(payload: &Option<Vec<u8>>) -> Option<&[u8]> {
    payload.as_deref().filter(|bytes| !bytes.is_empty())
}

fn block_queue(bound: QueueBound) -> (QueueSender, QueueReceiver) {
    match bound {
        QueueBound::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (QueueSender::Unbounded(tx), QueueReceiver::Unbounded(rx))
        }
        QueueBound::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.get());
            (QueueSender::Bounded(tx), QueueReceiver::Bounded(rx))
        }
    }
}

enum QueueSender {
    Unbounded(mpsc::UnboundedSender<BlocksResult>),
    Bounded(mpsc::Sender<BlocksResult>),
}

impl QueueSender {
    /// Returns `false` once the drain loop has gone away.
    async fn push(&self, result: BlocksResult) -> bool {
        match self {
            QueueSender::Unbounded(tx) => tx.send(result).is_ok(),
            QueueSender::Bounded(tx) => tx.send(result).await.is_ok(),
        }
    }
}

enum QueueReceiver {
    Unbounded(mpsc::UnboundedReceiver<BlocksResult>),
    Bounded(mpsc::Receiver<BlocksResult>),
}

impl QueueReceiver {
    async fn pop(&mut self) -> Option<BlocksResult> {
        match self {
            QueueReceiver::Unbounded(rx) => rx.recv().await,
            QueueReceiver::Bounded(rx) => rx.recv().await,
        }
    }
}
