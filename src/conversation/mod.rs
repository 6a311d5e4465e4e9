//! Per-user conversation state
//!
//! A [`ConversationController`] owns one [`Transport`] for the signed-in
//! identity and keeps the message list for the selected counterpart:
//! history replaces it on selection, live frames are merged into it with
//! deduplication, and read receipts go out for anything the counterpart
//! sends us while we are looking.
//!
//! Admins only show their own messages once the server echoes them;
//! members show them immediately and reconcile with the echo later.

pub mod attachments;
pub mod grouping;
pub mod log;

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::broadcast;

use crate::api::{ApiClient, ChatHistoryApi, FileApi, FileClient, HistoryClient};
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::models::{format_timestamp, ChatFile, ChatMessage, Participant, UserType};
use crate::transport::{Subscription, Transport};
use self::attachments::{
    file_message_text, match_legacy_file, parse_file_marker, Disposition, FileInfoCache, Lookup,
};
use self::grouping::{group_by_day, DayGroup};
use self::log::{Merge, MessageLog};

/// How our own outbound messages reach the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// Wait for the server echo.
    EchoOnly,
    /// Append a local copy at once; the echo is reconciled with it.
    Optimistic,
}

impl SendMode {
    pub fn for_role(user_type: UserType) -> Self {
        match user_type {
            UserType::Admin => SendMode::EchoOnly,
            UserType::Member => SendMode::Optimistic,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Uninitialized,
    Connecting,
    Connected,
    Disconnected,
    Disposed,
}

/// Change notifications for front ends.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Appended(ChatMessage),
    /// A local copy was replaced by its server echo.
    Reconciled(ChatMessage),
    HistoryLoaded {
        counterpart: Participant,
        count: usize,
    },
    Connection(bool),
}

/// Result of [`ConversationController::select_counterpart`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryLoad {
    Loaded(usize),
    /// Another counterpart was selected while this history was in flight.
    Stale,
}

/// An attachment's bytes plus how to present them.
#[derive(Debug, Clone)]
pub struct OpenedFile {
    pub file: ChatFile,
    pub bytes: Vec<u8>,
    pub disposition: Disposition,
}

/// Cheap to clone; all clones drive the same conversation.
#[derive(Clone)]
pub struct ConversationController {
    inner: Arc<Inner>,
}

struct Inner {
    me: Participant,
    send_mode: SendMode,
    transport: Transport,
    history: Arc<dyn ChatHistoryApi>,
    files: Arc<dyn FileApi>,
    events: broadcast::Sender<ConversationEvent>,
    state: Mutex<State>,
}

struct State {
    view: ViewState,
    counterpart: Option<Participant>,
    /// Bumped per selection; history for an older one is discarded.
    selection: u64,
    loading: bool,
    log: MessageLog,
    file_cache: FileInfoCache,
    subscriptions: Vec<Subscription>,
}

impl ConversationController {
    pub fn new(
        me: Participant,
        transport: Transport,
        history: Arc<dyn ChatHistoryApi>,
        files: Arc<dyn FileApi>,
        dedup_window: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                send_mode: SendMode::for_role(me.user_type),
                me,
                transport,
                history,
                files,
                events,
                state: Mutex::new(State {
                    view: ViewState::Uninitialized,
                    counterpart: None,
                    selection: 0,
                    loading: false,
                    log: MessageLog::new(dedup_window),
                    file_cache: FileInfoCache::default(),
                    subscriptions: Vec::new(),
                }),
            }),
        }
    }

    /// Controller backed by the configured HTTP and WebSocket endpoints.
    pub fn from_config(config: &Config, me: Participant) -> Self {
        let api = ApiClient::from_config(config);
        let transport = Transport::new(
            config.server.ws_url.clone(),
            config.reconnect_policy(),
            config.chat.max_message_bytes,
        );
        Self::new(
            me,
            transport,
            Arc::new(HistoryClient::new(api.clone())),
            Arc::new(FileClient::new(api, config.chat.max_upload_bytes)),
            config.dedup_window(),
        )
    }

    /// Attach listeners and open the channel. Calling it again is a no-op.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.inner.state();
            match state.view {
                ViewState::Disposed => return Err(ChatError::Disposed),
                ViewState::Uninitialized => state.view = ViewState::Connecting,
                _ => return Ok(()),
            }

            let weak = Arc::downgrade(&self.inner);
            let on_message = self.inner.transport.on_message(move |msg| {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.receive(msg.clone());
                }
            });
            let weak = Arc::downgrade(&self.inner);
            let on_connection = self.inner.transport.on_connection_change(move |up| {
                if let Some(inner) = Weak::upgrade(&weak) {
                    inner.connection_changed(up);
                }
            });
            state.subscriptions.push(on_message);
            state.subscriptions.push(on_connection);
        }

        tracing::info!(
            "Connecting {} {} to {}",
            self.inner.me.user_type,
            self.inner.me.id,
            self.inner.transport.url()
        );
        let me = &self.inner.me;
        self.inner.transport.connect(&me.id, me.user_type).await
    }

    /// Show the conversation with `counterpart`.
    ///
    /// Loads history into the list, then marks the counterpart's messages
    /// as read. A failed history load leaves the list empty.
    pub async fn select_counterpart(&self, counterpart: Participant) -> Result<HistoryLoad> {
        let ticket = {
            let mut state = self.inner.state();
            if state.view == ViewState::Disposed {
                return Err(ChatError::Disposed);
            }
            state.counterpart = Some(counterpart.clone());
            state.selection += 1;
            state.loading = true;
            state.selection
        };

        let me = &self.inner.me;
        let fetched = self
            .inner
            .history
            .get_chat_history(&me.id, me.user_type, &counterpart.id, counterpart.user_type)
            .await;

        let count = {
            let mut state = self.inner.state();
            if state.selection != ticket || state.view == ViewState::Disposed {
                tracing::debug!("Discarding stale history for {}", counterpart.id);
                return Ok(HistoryLoad::Stale);
            }
            state.loading = false;

            let live: Vec<ChatMessage> = state
                .log
                .entries()
                .iter()
                .filter(|m| m.involves(&counterpart))
                .cloned()
                .collect();

            match fetched {
                Ok(history) => {
                    state.log.replace(history);
                    // Frames that arrived while the history was in flight.
                    for msg in live {
                        state.log.merge(msg);
                    }
                    state.log.len()
                }
                Err(e) => {
                    state.log.clear();
                    tracing::warn!("Failed to load history with {}: {}", counterpart.id, e);
                    return Err(e);
                }
            }
        };

        self.inner.emit(ConversationEvent::HistoryLoaded {
            counterpart: counterpart.clone(),
            count,
        });
        self.inner.mark_read(&counterpart).await;
        Ok(HistoryLoad::Loaded(count))
    }

    /// Send `text` to the selected counterpart. Blank input is ignored.
    pub fn send_text(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let counterpart = self.inner.counterpart()?;
        self.inner
            .dispatch(ChatMessage::text(&self.inner.me, &counterpart, text))
    }

    /// Upload `data` and send a file message referencing it.
    ///
    /// Nothing is sent unless the upload succeeds.
    pub async fn send_file(
        &self,
        file_name: &str,
        data: &[u8],
        description: Option<&str>,
    ) -> Result<ChatMessage> {
        let counterpart = self.inner.counterpart()?;
        if !self.inner.transport.is_connected() {
            return Err(ChatError::NotConnected);
        }

        let me = &self.inner.me;
        let uploaded = self
            .inner
            .files
            .upload_file(file_name, data, &me.id, me.user_type, description)
            .await?;
        let file_id = uploaded
            .file_id
            .ok_or_else(|| ChatError::Upload("Upload response carried no file id".to_string()))?;
        let size = uploaded.file_size.unwrap_or(data.len() as u64);

        let msg = ChatMessage::file(
            me,
            &counterpart,
            file_message_text(file_name, size),
            file_id,
        );
        self.inner.dispatch(msg.clone())?;
        Ok(msg)
    }

    /// Metadata for `file_id`, fetched at most once per session.
    ///
    /// A failed fetch is remembered and reported as `None`.
    pub async fn file_info(&self, file_id: i64) -> Option<ChatFile> {
        match self.inner.state().file_cache.lookup(file_id) {
            Lookup::Ready(file) => return Some(file.clone()),
            Lookup::Unavailable => return None,
            Lookup::Missing => {}
        }

        let fetched = match self.inner.files.get_file_info(file_id).await {
            Ok(file) => Some(file),
            Err(e) => {
                tracing::warn!("File {} unavailable: {}", file_id, e);
                None
            }
        };
        self.inner
            .state()
            .file_cache
            .insert(file_id, fetched.clone());
        fetched
    }

    /// The file a message refers to, by `fileId` or, for older messages,
    /// by the file name in its text.
    pub async fn resolve_attachment(&self, msg: &ChatMessage) -> Option<ChatFile> {
        if let Some(id) = msg.file_id {
            return self.file_info(id).await;
        }

        let marker = parse_file_marker(&msg.message)?;
        let files = match self.inner.files.list_files(None).await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!("Could not list files to resolve {}: {}", marker.file_name, e);
                return None;
            }
        };
        let file = match_legacy_file(&marker.file_name, &files)?.clone();
        self.inner
            .state()
            .file_cache
            .insert(file.id, Some(file.clone()));
        Some(file)
    }

    /// Download an attachment for preview or saving.
    pub async fn open_file(&self, file: &ChatFile) -> Result<OpenedFile> {
        let bytes = self.inner.files.download_file(file.id).await?;
        Ok(OpenedFile {
            file: file.clone(),
            bytes,
            disposition: Disposition::for_file(file),
        })
    }

    /// Manually reopen the channel after the retry budget ran out.
    pub async fn reconnect(&self) -> Result<()> {
        {
            let mut state = self.inner.state();
            if state.view == ViewState::Disposed {
                return Err(ChatError::Disposed);
            }
            if state.view != ViewState::Connected {
                state.view = ViewState::Connecting;
            }
        }
        self.inner.transport.reconnect().await
    }

    /// Detach listeners and close the channel. Terminal.
    pub fn dispose(&self) {
        let subscriptions = {
            let mut state = self.inner.state();
            if state.view == ViewState::Disposed {
                return;
            }
            state.view = ViewState::Disposed;
            std::mem::take(&mut state.subscriptions)
        };
        for sub in subscriptions {
            sub.unsubscribe();
        }
        self.inner.transport.disconnect();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.inner.events.subscribe()
    }

    /// Messages with the selected counterpart, or everything if none is
    /// selected.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let state = self.inner.state();
        match state.counterpart {
            Some(ref cp) => state
                .log
                .entries()
                .iter()
                .filter(|m| m.involves(cp))
                .cloned()
                .collect(),
            None => state.log.entries().to_vec(),
        }
    }

    pub fn grouped_messages(&self, today: NaiveDate) -> Vec<DayGroup> {
        group_by_day(&self.messages(), today)
    }

    pub fn me(&self) -> &Participant {
        &self.inner.me
    }

    pub fn send_mode(&self) -> SendMode {
        self.inner.send_mode
    }

    pub fn counterpart(&self) -> Option<Participant> {
        self.inner.state().counterpart.clone()
    }

    pub fn view_state(&self) -> ViewState {
        self.inner.state().view
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state().loading
    }

    pub fn is_connected(&self) -> bool {
        self.inner.transport.is_connected()
    }

    pub fn cached_file_count(&self) -> usize {
        self.inner.state().file_cache.len()
    }

    #[cfg(test)]
    fn is_file_cached(&self, file_id: i64) -> bool {
        self.inner.state().file_cache.contains(file_id)
    }

    #[cfg(test)]
    fn handle_inbound(&self, msg: ChatMessage) {
        self.inner.receive(msg);
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: ConversationEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn counterpart(&self) -> Result<Participant> {
        let state = self.state();
        if state.view == ViewState::Disposed {
            return Err(ChatError::Disposed);
        }
        state.counterpart.clone().ok_or(ChatError::NoCounterpart)
    }

    /// Hand `msg` to the transport and, for optimistic senders, append a
    /// timestamped local copy.
    fn dispatch(&self, mut msg: ChatMessage) -> Result<()> {
        self.transport.send_message(&msg)?;

        if self.send_mode == SendMode::Optimistic {
            msg.timestamp = Some(format_timestamp(Utc::now()));
            let outcome = self.state().log.merge(msg.clone());
            if outcome == Merge::Appended {
                self.emit(ConversationEvent::Appended(msg));
            }
        }
        Ok(())
    }

    fn receive(self: &Arc<Self>, msg: ChatMessage) {
        let (outcome, read_from) = {
            let mut state = self.state();
            if state.view == ViewState::Disposed {
                return;
            }
            let read_from = state
                .counterpart
                .clone()
                .filter(|cp| cp.is(&msg.sender_id, msg.sender_type))
                .filter(|_| self.me.is(&msg.receiver_id, msg.receiver_type));
            (state.log.merge(msg.clone()), read_from)
        };

        match outcome {
            Merge::Appended => self.emit(ConversationEvent::Appended(msg)),
            Merge::Reconciled => self.emit(ConversationEvent::Reconciled(msg)),
            Merge::Duplicate => return,
        }

        if let Some(counterpart) = read_from {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                inner.mark_read(&counterpart).await;
            });
        }
    }

    fn connection_changed(&self, up: bool) {
        {
            let mut state = self.state();
            if state.view == ViewState::Disposed {
                return;
            }
            state.view = if up {
                ViewState::Connected
            } else {
                ViewState::Disconnected
            };
        }
        self.emit(ConversationEvent::Connection(up));
    }

    /// Best effort; failures are only logged.
    async fn mark_read(&self, sender: &Participant) {
        if let Err(e) = self
            .history
            .mark_as_read(&self.me.id, self.me.user_type, &sender.id, sender.user_type)
            .await
        {
            tracing::warn!("Failed to mark messages from {} as read: {}", sender.id, e);
        }
    }
}
