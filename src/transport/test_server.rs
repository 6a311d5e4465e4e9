//! In-process chat server for tests.
//!
//! Accepts one client connection at a time, records every frame the client
//! sends, and lets the test push frames back or drop the connection.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

enum ServerCmd {
    Push(String),
    Drop,
}

pub struct TestServer {
    url: String,
    received: mpsc::UnboundedReceiver<serde_json::Value>,
    commands: mpsc::UnboundedSender<ServerCmd>,
    accept: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_on(0).await
    }

    /// Listen on a specific local port, `0` for any.
    pub async fn start_on(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let command_rx = Arc::new(Mutex::new(command_rx));

        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                let received_tx = received_tx.clone();
                let command_rx = Arc::clone(&command_rx);
                tokio::spawn(async move {
                    // Commands always go to the newest live connection.
                    let mut commands = command_rx.lock().await;
                    let (mut sink, mut stream) = ws.split();
                    loop {
                        tokio::select! {
                            frame = stream.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    if let Ok(v) = serde_json::from_str(&text) {
                                        let _ = received_tx.send(v);
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                                Some(Ok(_)) => {}
                            },
                            cmd = commands.recv() => match cmd {
                                Some(ServerCmd::Push(text)) => {
                                    if sink.send(Message::Text(text)).await.is_err() {
                                        break;
                                    }
                                }
                                Some(ServerCmd::Drop) | None => {
                                    let _ = sink.send(Message::Close(None)).await;
                                    break;
                                }
                            },
                        }
                    }
                });
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}", port),
            received,
            commands,
            accept,
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    /// Next frame the client sent, as JSON.
    pub async fn next_frame(&mut self) -> serde_json::Value {
        timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("server stopped")
    }

    pub fn push(&self, frame: serde_json::Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.commands.send(ServerCmd::Push(text.to_string()));
    }

    pub fn drop_connection(&self) {
        let _ = self.commands.send(ServerCmd::Drop);
    }

    /// Stop listening, then drop the live connection. Later connects are refused.
    pub async fn shut_down(&mut self) {
        self.accept.abort();
        let _ = (&mut self.accept).await;
        self.drop_connection();
    }

    /// An admin-to-member `message` frame as the server emits it.
    pub fn message_frame(
        id: i64,
        sender_id: &str,
        text: &str,
        timestamp: &str,
    ) -> serde_json::Value {
        serde_json::json!({
            "type": "message",
            "id": id,
            "senderType": "ADMIN",
            "senderId": sender_id,
            "senderName": "Alice",
            "receiverType": "MEMBER",
            "receiverId": "M1",
            "receiverName": "Bob",
            "message": text,
            "timestamp": timestamp,
            "isRead": false,
        })
    }

    /// Echo a client `message` frame back with a server id and timestamp.
    pub fn echo(&self, sent: &serde_json::Value, id: i64, timestamp: &str) {
        let mut frame = sent.clone();
        frame["id"] = serde_json::json!(id);
        frame["timestamp"] = serde_json::json!(timestamp);
        frame["isRead"] = serde_json::json!(false);
        self.push(frame);
    }
}

/// A local port nothing is listening on.
pub async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A `ws://` URL on which nothing is listening.
pub async fn refused_url() -> String {
    format!("ws://127.0.0.1:{}", free_port().await)
}
