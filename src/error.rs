//! Error taxonomy shared by the transport, the HTTP clients and the
//! conversation controller.

use thiserror::Error;

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// `send_message` was called with no open channel. Nothing is queued.
    #[error("chat channel is not connected")]
    NotConnected,

    /// The transport or controller was torn down.
    #[error("chat session has been disposed")]
    Disposed,

    /// The channel could not be opened.
    #[error("failed to open chat channel to {url}: {reason}")]
    Connection { url: String, reason: String },

    #[error("message is {size} bytes, limit is {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// Transport failure or non-success status from the REST backend.
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("{0} not found")]
    NotFound(String),

    /// Upload rejected; carries the server's message when it sent one.
    #[error("{0}")]
    Upload(String),

    #[error("no counterpart selected")]
    NoCounterpart,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    pub(crate) fn network(url: &str, reason: impl ToString) -> Self {
        Self::Network {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}
