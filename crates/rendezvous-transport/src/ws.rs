//! WebSocket transport implementation.
//!
//! Adapts an upgraded axum [`WebSocket`] into the reader/writer halves the
//! relay works with. Envelopes go out as text frames; text and binary
//! frames are both accepted inbound.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use rendezvous_protocol::{Envelope, EnvelopeCodec};
use tracing::{debug, warn};

use crate::traits::{SignalReader, SignalWriter, TransportError};

/// Split an upgraded socket into its reader and writer halves.
#[must_use]
pub fn split(
    socket: WebSocket,
    codec: EnvelopeCodec,
    remote_addr: Option<String>,
) -> (WebSocketReader, WebSocketWriter) {
    let (sink, stream) = socket.split();
    (
        WebSocketReader {
            stream,
            codec,
            remote_addr,
        },
        WebSocketWriter {
            sink,
            codec,
            is_open: true,
        },
    )
}

/// Inbound half of a WebSocket session.
pub struct WebSocketReader {
    stream: SplitStream<WebSocket>,
    codec: EnvelopeCodec,
    remote_addr: Option<String>,
}

#[async_trait]
impl SignalReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Envelope>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return self
                        .codec
                        .decode(text.as_bytes())
                        .map(Some)
                        .map_err(TransportError::Protocol);
                }
                Some(Ok(Message::Binary(data))) => {
                    return self
                        .codec
                        .decode(&data)
                        .map(Some)
                        .map_err(TransportError::Protocol);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    // Pongs are answered by the socket itself
                }
                Some(Ok(Message::Close(_))) => {
                    debug!("Received close frame");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!("WebSocket error: {}", e);
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
            }
        }
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }
}

/// Outbound half of a WebSocket session.
pub struct WebSocketWriter {
    sink: SplitSink<WebSocket, Message>,
    codec: EnvelopeCodec,
    is_open: bool,
}

#[async_trait]
impl SignalWriter for WebSocketWriter {
    async fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let text = self.codec.encode(&envelope)?;
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !self.is_open {
            return Ok(()); // Already closed
        }
        self.is_open = false;

        self.sink
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
