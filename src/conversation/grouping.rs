//! Day separators for rendering a conversation

use chrono::{Datelike, Local, NaiveDate};

use crate::models::ChatMessage;

/// Messages that fall on the same local calendar day.
#[derive(Debug, Clone)]
pub struct DayGroup {
    /// `None` for messages without a usable timestamp.
    pub day: Option<NaiveDate>,
    pub label: String,
    pub messages: Vec<ChatMessage>,
}

/// Partition `messages` by local day. Groups appear in order of their first
/// message and keep arrival order inside.
pub fn group_by_day(messages: &[ChatMessage], today: NaiveDate) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();

    for msg in messages {
        let day = msg
            .sent_at()
            .map(|ts| ts.with_timezone(&Local).date_naive());

        match groups.iter_mut().find(|g| g.day == day) {
            Some(group) => group.messages.push(msg.clone()),
            None => groups.push(DayGroup {
                day,
                label: day_label(day, today),
                messages: vec![msg.clone()],
            }),
        }
    }

    groups
}

/// "Today", "Yesterday", "Mar 1", or "Mar 1, 2024" outside the current year.
pub fn day_label(day: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(day) = day else {
        return "Unknown date".to_string();
    };

    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else if day.year() == today.year() {
        day.format("%b %-d").to_string()
    } else {
        day.format("%b %-d, %Y").to_string()
    }
}

/// One display line per message: `[HH:MM] Sender: text`.
pub fn message_line(msg: &ChatMessage) -> String {
    let time = msg
        .sent_at()
        .map(|ts| ts.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let sender = if msg.sender_name.is_empty() {
        &msg.sender_id
    } else {
        &msg.sender_name
    };
    format!("[{}] {}: {}", time, sender, msg.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{format_timestamp, Participant};
    use chrono::{TimeZone, Utc};

    fn at_local(y: i32, m: u32, d: u32, h: u32, text: &str) -> ChatMessage {
        let local = Local.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap();
        let mut msg = ChatMessage::text(
            &Participant::member("M1", "Bob"),
            &Participant::admin("42", "Alice"),
            text,
        );
        msg.timestamp = Some(format_timestamp(local.with_timezone(&Utc)));
        msg
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_labels() {
        let today = date(2025, 3, 10);
        assert_eq!(day_label(Some(today), today), "Today");
        assert_eq!(day_label(Some(date(2025, 3, 9)), today), "Yesterday");
        assert_eq!(day_label(Some(date(2025, 3, 1)), today), "Mar 1");
        assert_eq!(day_label(Some(date(2024, 12, 31)), today), "Dec 31, 2024");
        assert_eq!(day_label(None, today), "Unknown date");
    }

    #[test]
    fn test_yesterday_across_year_boundary() {
        assert_eq!(
            day_label(Some(date(2024, 12, 31)), date(2025, 1, 1)),
            "Yesterday"
        );
    }

    #[test]
    fn test_groups_preserve_arrival_order() {
        let messages = vec![
            at_local(2025, 3, 9, 9, "a"),
            at_local(2025, 3, 9, 17, "b"),
            at_local(2025, 3, 10, 8, "c"),
            at_local(2025, 3, 10, 11, "d"),
        ];

        let groups = group_by_day(&messages, date(2025, 3, 10));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].label, "Yesterday");
        assert_eq!(groups[1].label, "Today");

        let texts: Vec<_> = groups[1].messages.iter().map(|m| m.message.as_str()).collect();
        assert_eq!(texts, vec!["c", "d"]);
    }

    #[test]
    fn test_untimed_messages_get_their_own_group() {
        let mut untimed = at_local(2025, 3, 10, 8, "pending");
        untimed.timestamp = None;
        let messages = vec![at_local(2025, 3, 10, 8, "a"), untimed];

        let groups = group_by_day(&messages, date(2025, 3, 10));
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].day, None);
        assert_eq!(groups[1].messages[0].message, "pending");
    }

    #[test]
    fn test_message_line() {
        let msg = at_local(2025, 3, 10, 9, "Hello");
        assert_eq!(message_line(&msg), "[09:00] Bob: Hello");

        let mut untimed = at_local(2025, 3, 10, 9, "Hi");
        untimed.timestamp = None;
        untimed.sender_name.clear();
        assert_eq!(message_line(&untimed), "[--:--] M1: Hi");
    }
}
