use tracing::warn;
use uuid::Uuid;

use voltnet_db::models::{MessageRow, UserRow};
use voltnet_types::models::{Message, Profile};

pub fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

pub fn parse_timestamp(raw: &str, what: &str) -> chrono::DateTime<chrono::Utc> {
    raw.parse::<chrono::DateTime<chrono::Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') default stores "YYYY-MM-DD HH:MM:SS"
            // without timezone. Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}': {}", what, raw, e);
            chrono::DateTime::default()
        })
}

pub fn profile_from_user(row: &UserRow) -> Profile {
    Profile {
        id: parse_uuid(&row.id, "user id"),
        display_name: row.display_name.clone(),
        avatar_url: row.avatar_url.clone(),
    }
}

pub fn message_from_row(row: &MessageRow) -> Message {
    Message {
        id: parse_uuid(&row.id, "message id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation_id"),
        sender_id: parse_uuid(&row.sender_id, "sender_id"),
        body: row.body.clone(),
        is_read: row.is_read,
        read_at: row.read_at.as_deref().map(|t| parse_timestamp(t, "read_at")),
        created_at: parse_timestamp(&row.created_at, "message created_at"),
    }
}
