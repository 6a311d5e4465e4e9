//! Chat channel wire frames
//!
//! Every frame is a JSON object tagged by `type`:
//! - client → server: `register`, `message`
//! - server → client: `registered`, `message`

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};
use crate::models::{ChatMessage, UserType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Binds this channel to an identity so the server can route to it.
    #[serde(rename_all = "camelCase")]
    Register { user_id: String, user_type: UserType },
    /// Registration acknowledgement.
    Registered {
        #[serde(default)]
        status: Option<String>,
    },
    Message(ChatMessage),
}

impl Frame {
    pub fn register(user_id: &str, user_type: UserType) -> Self {
        Frame::Register {
            user_id: user_id.to_string(),
            user_type,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode an inbound text frame, rejecting anything over `max_len` bytes.
    pub fn decode(text: &str, max_len: usize) -> Result<Self> {
        if text.len() > max_len {
            return Err(ChatError::MessageTooLarge {
                size: text.len(),
                limit: max_len,
            });
        }
        Ok(serde_json::from_str(text)?)
    }
}
