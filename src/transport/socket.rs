//! WebSocket connection and frame pump

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::{ChatError, Result};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Work queued for the socket writer.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Why a session stopped pumping frames.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// Close was requested locally.
    Shutdown,
    /// The server closed the connection.
    Closed,
    Error(String),
}

pub struct ChatSocket {
    stream: WsStream,
}

impl ChatSocket {
    /// Open the chat endpoint.
    pub async fn connect(url: &str) -> Result<Self> {
        tracing::info!("Connecting WebSocket to {}", url);

        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| ChatError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("WebSocket connected (status={})", response.status());

        Ok(Self { stream })
    }

    /// Pump frames until either side closes.
    ///
    /// Queued outbound frames are written in order. Every inbound text frame
    /// is handed to `on_text` in arrival order; pings are answered here.
    pub async fn run<F>(
        self,
        mut outbound: mpsc::UnboundedReceiver<Outbound>,
        mut on_text: F,
    ) -> SessionEnd
    where
        F: FnMut(&str),
    {
        let (mut sink, mut stream) = self.stream.split();

        loop {
            tokio::select! {
                out = outbound.recv() => {
                    match out {
                        Some(Outbound::Text(text)) => {
                            tracing::debug!("WS send: {}", text);
                            if let Err(e) = sink.send(Message::Text(text)).await {
                                return SessionEnd::Error(format!("send failed: {}", e));
                            }
                        }
                        Some(Outbound::Close) | None => {
                            if let Err(e) = sink.send(Message::Close(None)).await {
                                tracing::debug!("Failed to send close frame: {}", e);
                            }
                            return SessionEnd::Shutdown;
                        }
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            tracing::debug!("WS recv: {}", text);
                            on_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = sink.send(Message::Pong(data)).await {
                                return SessionEnd::Error(format!("pong failed: {}", e));
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!("WebSocket closed: {:?}", frame);
                            return SessionEnd::Closed;
                        }
                        Some(Ok(other)) => {
                            tracing::debug!("WS frame (ignored): {:?}", other);
                        }
                        Some(Err(e)) => {
                            return SessionEnd::Error(format!("receive failed: {}", e));
                        }
                        None => return SessionEnd::Closed,
                    }
                }
            }
        }
    }
}
