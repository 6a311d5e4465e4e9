//! Chat participant models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of the library a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserType {
    Admin,
    Member,
}

impl UserType {
    pub fn as_str(self) -> &'static str {
        match self {
            UserType::Admin => "ADMIN",
            UserType::Member => "MEMBER",
        }
    }

    /// Conversations are always admin <-> member.
    pub fn opposite(self) -> Self {
        match self {
            UserType::Admin => UserType::Member,
            UserType::Member => UserType::Admin,
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ADMIN" => Ok(UserType::Admin),
            "MEMBER" => Ok(UserType::Member),
            other => Err(format!("unknown user type '{}' (expected admin or member)", other)),
        }
    }
}

/// One end of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub user_type: UserType,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, user_type: UserType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            user_type,
        }
    }

    #[cfg(test)]
    pub fn admin(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, UserType::Admin)
    }

    #[cfg(test)]
    pub fn member(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(id, name, UserType::Member)
    }

    /// Whether `id`/`user_type` name this participant.
    pub fn is(&self, id: &str, user_type: UserType) -> bool {
        self.id == id && self.user_type == user_type
    }
}
