//! Ordered, deduplicated message list

use std::time::Duration;

use crate::models::ChatMessage;

/// What [`MessageLog::merge`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Appended,
    /// Replaced a local copy that had no id yet with its server echo.
    Reconciled,
    Duplicate,
}

/// Messages in arrival order, at most one copy of each.
///
/// Two messages are the same if they share an id, or if they have equal
/// text and sender and their timestamps are less than `window` apart. The
/// second rule pairs a locally composed copy with its server echo.
#[derive(Debug, Clone)]
pub struct MessageLog {
    entries: Vec<ChatMessage>,
    window: Duration,
}

impl MessageLog {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: Vec::new(),
            window,
        }
    }

    pub fn merge(&mut self, incoming: ChatMessage) -> Merge {
        let Some(pos) = self
            .entries
            .iter()
            .position(|existing| self.same_message(existing, &incoming))
        else {
            self.entries.push(incoming);
            return Merge::Appended;
        };

        let existing = &mut self.entries[pos];
        if existing.id.is_none() && incoming.id.is_some() {
            *existing = incoming;
            Merge::Reconciled
        } else {
            Merge::Duplicate
        }
    }

    /// Replace the whole list, e.g. with freshly loaded history.
    pub fn replace(&mut self, messages: Vec<ChatMessage>) {
        self.entries.clear();
        for msg in messages {
            self.merge(msg);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn same_message(&self, a: &ChatMessage, b: &ChatMessage) -> bool {
        if let (Some(x), Some(y)) = (a.id, b.id) {
            if x == y {
                return true;
            }
        }
        if a.message != b.message || a.sender_id != b.sender_id {
            return false;
        }
        match (a.sent_at(), b.sent_at()) {
            (Some(ta), Some(tb)) => {
                u128::from((ta - tb).num_milliseconds().unsigned_abs()) < self.window.as_millis()
            }
            _ => false,
        }
    }
}
