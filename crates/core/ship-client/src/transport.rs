//! Duplex message channel to the producer.
//!
//! The connection only sees boxed [`FrameSink`]/[`FrameStream`] halves, so tests can drive it
//! over in-memory channels. [`connect`] provides the WebSocket implementation.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Sink, SinkExt as _, Stream, StreamExt as _, future, stream};
use tokio_tungstenite::tungstenite::{self, Message};

/// One whole inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text frame",
            Frame::Binary(_) => "binary frame",
        }
    }
}

/// Outbound half: accepts encoded requests, sent as binary messages.
pub type FrameSink = Pin<Box<dyn Sink<Bytes, Error = TransportError> + Send>>;

/// Inbound half: ends when the producer closes the channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The WebSocket handshake failed
    #[error("failed to connect to {url}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    /// Writing a message failed
    #[error("failed to send message")]
    Send(#[source] tungstenite::Error),

    /// Reading a message failed
    #[error("failed to receive message")]
    Receive(#[source] tungstenite::Error),

    /// The other side of an in-memory channel went away
    #[error("channel disconnected")]
    Disconnected,
}

/// Opens a WebSocket to `url` (no per-message compression).
///
/// Ping and pong frames are handled by the socket and never surface; a close frame ends the
/// stream.
pub async fn connect(url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
    let (socket, _response) =
        tokio_tungstenite::connect_async(url)
            .await
            .map_err(|source| TransportError::Connect {
                url: url.to_string(),
                source,
            })?;
    tracing::info!(url, "websocket_connected");

    let (write, read) = socket.split();

    let sink = write
        .with(|bytes: Bytes| future::ready(Ok::<_, tungstenite::Error>(Message::Binary(bytes))))
        .sink_map_err(TransportError::Send);

    let stream = stream::unfold(read, |mut read| async move {
        loop {
            match read.next().await? {
                Ok(Message::Binary(bytes)) => return Some((Ok(Frame::Binary(bytes)), read)),
                Ok(Message::Text(text)) => {
                    return Some((Ok(Frame::Text(text.as_str().to_owned())), read));
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "websocket_closed");
                    return None;
                }
                Ok(_) => continue,
                Err(err) => return Some((Err(TransportError::Receive(err)), read)),
            }
        }
    });

    Ok((Box::pin(sink), Box::pin(stream)))
}
