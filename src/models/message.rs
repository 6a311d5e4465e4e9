//! Chat message models

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{Participant, UserType};

/// Message payload kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    #[default]
    Text,
    File,
}

/// A directed message between an admin and a member.
///
/// `id` and `timestamp` are assigned by the server; a locally composed
/// message has neither until its echo arrives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub sender_type: UserType,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub receiver_type: UserType,
    pub receiver_id: String,
    #[serde(default)]
    pub receiver_name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(default, alias = "read", skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl ChatMessage {
    /// Compose an unsent text message.
    pub fn text(from: &Participant, to: &Participant, text: impl Into<String>) -> Self {
        Self {
            id: None,
            sender_type: from.user_type,
            sender_id: from.id.clone(),
            sender_name: from.name.clone(),
            receiver_type: to.user_type,
            receiver_id: to.id.clone(),
            receiver_name: to.name.clone(),
            message: text.into(),
            file_id: None,
            message_type: MessageType::Text,
            timestamp: None,
            is_read: None,
        }
    }

    /// Compose an unsent attachment message referencing an uploaded file.
    pub fn file(
        from: &Participant,
        to: &Participant,
        text: impl Into<String>,
        file_id: i64,
    ) -> Self {
        Self {
            file_id: Some(file_id),
            message_type: MessageType::File,
            ..Self::text(from, to, text)
        }
    }

    /// Parsed `timestamp`, if present and well formed.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }

    pub fn is_from(&self, id: &str, user_type: UserType) -> bool {
        self.sender_id == id && self.sender_type == user_type
    }

    pub fn is_to(&self, id: &str, user_type: UserType) -> bool {
        self.receiver_id == id && self.receiver_type == user_type
    }

    /// Whether either end of this message is `p`.
    pub fn involves(&self, p: &Participant) -> bool {
        self.is_from(&p.id, p.user_type) || self.is_to(&p.id, p.user_type)
    }
}

/// Parse a server timestamp.
///
/// Accepts RFC 3339 and the offset-less `YYYY-MM-DDTHH:MM:SS[.fff]` form the
/// backend emits, which is local time.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp the way outbound optimistic copies carry it.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Accepts either an ISO string or the `[y, m, d, h, min, s, nanos]` array
/// Jackson writes for `LocalDateTime` when date-as-timestamp is enabled.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Parts(Vec<u32>),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => None,
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Parts(p)) if p.len() >= 5 => {
            let second = p.get(5).copied().unwrap_or(0);
            let millis = p.get(6).copied().unwrap_or(0) / 1_000_000;
            Some(format!(
                "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}",
                p[0], p[1], p[2], p[3], p[4], second, millis
            ))
        }
        Some(Raw::Parts(_)) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_inbound_message_defaults_to_text() {
        let json = r#"{
            "id": 7,
            "senderType": "ADMIN",
            "senderId": "42",
            "senderName": "Alice",
            "receiverType": "MEMBER",
            "receiverId": "M1",
            "receiverName": "Bob",
            "message": "Hello",
            "timestamp": "2025-03-01T10:00:00.000Z",
            "isRead": false
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.id, Some(7));
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.is_read, Some(false));
        assert!(msg.is_from("42", UserType::Admin));
        assert!(msg.is_to("M1", UserType::Member));
    }

    #[test]
    fn test_history_row_accepts_jackson_shapes() {
        let json = r#"{
            "id": 3,
            "senderType": "MEMBER",
            "senderId": "M1",
            "senderName": "Bob",
            "receiverType": "ADMIN",
            "receiverId": "42",
            "receiverName": "Alice",
            "message": "Hi",
            "timestamp": [2025, 3, 1, 9, 5, 7, 250000000],
            "read": true
        }"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.timestamp.as_deref(), Some("2025-03-01T09:05:07.250"));
        assert_eq!(msg.is_read, Some(true));
        assert!(msg.sent_at().is_some());
    }

    #[test]
    fn test_unsent_message_omits_server_fields() {
        let me = Participant::member("M1", "Bob");
        let admin = Participant::admin("42", "Alice");
        let v = serde_json::to_value(ChatMessage::text(&me, &admin, "Hi")).unwrap();
        assert!(v.get("id").is_none());
        assert!(v.get("timestamp").is_none());
        assert!(v.get("fileId").is_none());
        assert_eq!(v["messageType"], "TEXT");
        assert_eq!(v["receiverType"], "ADMIN");
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let utc = parse_timestamp("2025-03-01T10:00:00.500Z").unwrap();
        assert_eq!(utc.hour(), 10);
        assert_eq!(utc.timestamp_subsec_millis(), 500);

        let naive = parse_timestamp("2025-03-01T10:00:00").unwrap();
        assert_eq!(naive.with_timezone(&Local).day(), 1);

        assert!(parse_timestamp("yesterday").is_none());
    }
}
