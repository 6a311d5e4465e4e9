//! Real-time chat channel
//!
//! One [`Transport`] owns one persistent WebSocket to the chat server on
//! behalf of a single identity. It registers that identity on every open,
//! decodes inbound frames into [`ChatMessage`]s for its listeners, and
//! reconnects with exponential backoff (see [`ReconnectPolicy`]) after
//! unexpected closes until the retry budget is spent.

mod backoff;
pub mod frame;
mod socket;

#[cfg(test)]
pub(crate) mod test_server;

pub use backoff::ReconnectPolicy;

use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, UserType};
use frame::Frame;
use socket::{ChatSocket, Outbound, SessionEnd};

type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle to a persistent chat channel.
pub struct Transport {
    shared: Arc<Shared>,
}

/// Returned by the `on_*` registrations; removes just that listener.
pub struct Subscription {
    shared: Weak<Shared>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove_handler(self.id);
        }
    }
}

struct Shared {
    url: String,
    policy: ReconnectPolicy,
    max_frame_bytes: usize,
    handlers: Mutex<Handlers>,
    link: Mutex<Link>,
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    message: Vec<(u64, MessageHandler)>,
    connection: Vec<(u64, ConnectionHandler)>,
}

#[derive(Default)]
struct Link {
    identity: Option<(String, UserType)>,
    /// Present exactly while a session is open.
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    /// Consecutive failed opens since the last successful one.
    failures: u32,
    /// Bumped per opened session so a stale session cannot tear down a newer one.
    session: u64,
    reconnect: Option<JoinHandle<()>>,
    disposed: bool,
}

impl Transport {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, max_frame_bytes: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                policy,
                max_frame_bytes,
                handlers: Mutex::new(Handlers::default()),
                link: Mutex::new(Link::default()),
            }),
        }
    }

    /// Open the channel and register as `user_id`/`user_type`.
    ///
    /// Resolves once the socket is open and the `register` frame is queued;
    /// the server's `registered` acknowledgement is only logged. If the open
    /// fails the error is returned and a background retry is still scheduled
    /// per the reconnect policy.
    pub async fn connect(&self, user_id: &str, user_type: UserType) -> Result<()> {
        {
            let mut link = self.shared.link();
            if link.disposed {
                return Err(ChatError::Disposed);
            }
            if let Some(task) = link.reconnect.take() {
                task.abort();
            }
            link.identity = Some((user_id.to_string(), user_type));
        }
        self.shared.open().await
    }

    /// Manually reopen after the retry budget ran out.
    ///
    /// Resets the failure counter and reconnects with the last identity.
    pub async fn reconnect(&self) -> Result<()> {
        {
            let mut link = self.shared.link();
            if link.disposed {
                return Err(ChatError::Disposed);
            }
            if link.outbound.is_some() {
                return Ok(());
            }
            if link.identity.is_none() {
                return Err(ChatError::NotConnected);
            }
            if let Some(task) = link.reconnect.take() {
                task.abort();
            }
            link.failures = 0;
        }
        self.shared.open().await
    }

    /// Queue `message` as a `message` frame.
    ///
    /// Fails immediately with [`ChatError::NotConnected`] when no channel is
    /// open; nothing is queued for later. Delivery is confirmed only by the
    /// server's echo.
    pub fn send_message(&self, message: &ChatMessage) -> Result<()> {
        let link = self.shared.link();
        let tx = link.outbound.as_ref().ok_or(ChatError::NotConnected)?;

        let text = Frame::Message(message.clone()).encode()?;
        if text.len() > self.shared.max_frame_bytes {
            return Err(ChatError::MessageTooLarge {
                size: text.len(),
                limit: self.shared.max_frame_bytes,
            });
        }

        tx.send(Outbound::Text(text))
            .map_err(|_| ChatError::NotConnected)
    }

    /// Listen for inbound messages. Listeners run in registration order.
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        let mut handlers = self.shared.handlers();
        let id = handlers.allocate_id();
        handlers.message.push((id, Arc::new(handler)));
        self.subscription(id)
    }

    /// Listen for open (`true`) / close or failed open (`false`) transitions.
    pub fn on_connection_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut handlers = self.shared.handlers();
        let id = handlers.allocate_id();
        handlers.connection.push((id, Arc::new(handler)));
        self.subscription(id)
    }

    /// Close the channel and cancel any pending reconnect.
    ///
    /// Idempotent and terminal: no listener is invoked once this returns and
    /// `connect`/`reconnect` return [`ChatError::Disposed`]. A listener that
    /// is already running on another thread is not interrupted.
    pub fn disconnect(&self) {
        let mut link = self.shared.link();
        if link.disposed {
            return;
        }
        link.disposed = true;
        if let Some(task) = link.reconnect.take() {
            task.abort();
        }
        if let Some(tx) = link.outbound.take() {
            let _ = tx.send(Outbound::Close);
        }
        tracing::info!("Chat channel disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.link().outbound.is_some()
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    fn subscription(&self, id: u64) -> Subscription {
        Subscription {
            shared: Arc::downgrade(&self.shared),
            id,
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Handlers {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handlers(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove_handler(&self, id: u64) {
        let mut handlers = self.handlers();
        handlers.message.retain(|(h, _)| *h != id);
        handlers.connection.retain(|(h, _)| *h != id);
    }

    /// One open attempt. On success the session is pumped by a spawned task.
    async fn open(self: &Arc<Self>) -> Result<()> {
        let (user_id, user_type) = self
            .link()
            .identity
            .clone()
            .ok_or(ChatError::NotConnected)?;

        let socket = match ChatSocket::connect(&self.url).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!("{}", e);
                self.record_failure();
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Text(Frame::register(&user_id, user_type).encode()?))
            .map_err(|_| ChatError::NotConnected)?;

        let session = {
            let mut link = self.link();
            if link.disposed {
                return Err(ChatError::Disposed);
            }
            link.failures = 0;
            link.session += 1;
            link.outbound = Some(tx);
            link.session
        };

        self.notify_connection(true);

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let pump = Arc::clone(&shared);
            let end = socket.run(rx, move |text| pump.dispatch(text)).await;
            shared.session_ended(session, end);
        });

        Ok(())
    }

    fn dispatch(&self, text: &str) {
        match Frame::decode(text, self.max_frame_bytes) {
            Ok(Frame::Message(message)) => self.notify_message(&message),
            Ok(Frame::Registered { status }) => {
                tracing::info!(
                    "Registered with chat server ({})",
                    status.as_deref().unwrap_or("ok")
                );
            }
            Ok(other) => tracing::debug!("Ignoring unexpected frame: {:?}", other),
            Err(e) => tracing::warn!("Dropping malformed frame: {}", e),
        }
    }

    fn session_ended(self: &Arc<Self>, session: u64, end: SessionEnd) {
        let failures = {
            let mut link = self.link();
            if link.session != session || link.disposed {
                return;
            }
            link.outbound = None;
            link.failures
        };
        match end {
            SessionEnd::Error(reason) => tracing::warn!("Chat channel dropped: {}", reason),
            SessionEnd::Closed | SessionEnd::Shutdown => tracing::info!("Chat channel closed"),
        }

        // A drop is not a failed attempt; the full budget is available.
        self.notify_connection(false);
        self.retry_or_give_up(failures);
    }

    /// Count a failed open and announce the disconnected state.
    fn record_failure(self: &Arc<Self>) {
        let failures = {
            let mut link = self.link();
            if link.disposed {
                return;
            }
            link.outbound = None;
            link.failures += 1;
            link.failures
        };

        self.notify_connection(false);
        self.retry_or_give_up(failures);
    }

    /// Schedule the next open after `failures` consecutive failed ones, if
    /// the budget allows.
    fn retry_or_give_up(self: &Arc<Self>, failures: u32) {
        if !self.policy.should_retry(failures) {
            tracing::warn!(
                "Giving up on chat channel after {} failed attempts; call reconnect to retry",
                failures
            );
            return;
        }

        let delay = self.policy.delay(failures);
        tracing::info!(
            "Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            failures + 1
        );

        let mut link = self.link();
        if link.disposed {
            return;
        }
        let shared = Arc::clone(self);
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = shared.open().await {
                tracing::debug!("Reconnect attempt failed: {}", e);
            }
        }));
    }

    fn disposed(&self) -> bool {
        self.link().disposed
    }

    // Re-checked per listener so one that disposes the transport silences
    // the rest.
    fn notify_message(&self, message: &ChatMessage) {
        let listeners: Vec<MessageHandler> = self
            .handlers()
            .message
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for listener in listeners {
            if self.disposed() {
                return;
            }
            listener(message);
        }
    }

    fn notify_connection(&self, connected: bool) {
        let listeners: Vec<ConnectionHandler> = self
            .handlers()
            .connection
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for listener in listeners {
            if self.disposed() {
                return;
            }
            listener(connected);
        }
    }
}
