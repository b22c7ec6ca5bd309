use rusqlite::Connection;

use crate::models::MessageRow;
use crate::{Database, OptionalExt, StoreError, StoreResult, now_rfc3339};

impl Database {
    /// Append a message. The store assigns `created_at` at insertion, making
    /// it the ordering authority: two clients submitting within the same poll
    /// window are ordered by arrival here, not by their local clocks.
    pub fn send_message(
        &self,
        id: &str,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> StoreResult<MessageRow> {
        let body = body.trim();
        if body.is_empty() {
            return Err(StoreError::Validation("message body is empty".into()));
        }

        let conversation = self.get_conversation(conversation_id, sender_id)?;
        let created_at = now_rfc3339();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, conversation_id, sender_id, body, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                rusqlite::params![id, conversation.id, sender_id, body, created_at],
            )?;
            Ok(())
        })?;

        Ok(MessageRow {
            id: id.to_string(),
            conversation_id: conversation.id,
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            is_read: false,
            read_at: None,
            created_at,
        })
    }

    /// Messages in ascending creation order. With `limit`, the most recent
    /// `limit` rows — still ascending after truncation from the tail, which
    /// is how the conversation list derives its preview cheaply.
    pub fn list_messages(
        &self,
        conversation_id: &str,
        requester_id: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<MessageRow>> {
        self.get_conversation(conversation_id, requester_id)?;

        self.with_conn(|conn| match limit {
            Some(n) => {
                let mut rows = query_messages(
                    conn,
                    "SELECT id, conversation_id, sender_id, body, is_read, read_at, created_at
                     FROM messages WHERE conversation_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                    rusqlite::params![conversation_id, n],
                )?;
                rows.reverse();
                Ok(rows)
            }
            None => query_messages(
                conn,
                "SELECT id, conversation_id, sender_id, body, is_read, read_at, created_at
                 FROM messages WHERE conversation_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                rusqlite::params![conversation_id],
            ),
        })
    }

    /// Monotonic unread -> read transition. Only the counterpart may mark a
    /// message read; repeating the call is a no-op success and leaves the
    /// original `read_at` untouched.
    pub fn mark_message_read(&self, message_id: &str, reader_id: &str) -> StoreResult<MessageRow> {
        let message = self
            .with_conn(|conn| query_message_by_id(conn, message_id))?
            .ok_or(StoreError::NotFound)?;

        if message.sender_id == reader_id {
            return Err(StoreError::NotAuthorized);
        }

        self.get_conversation(&message.conversation_id, reader_id)?;

        self.with_conn_mut(|conn| {
            // The is_read guard makes the transition at-most-once: a
            // concurrent duplicate call simply updates zero rows.
            conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?2 WHERE id = ?1 AND is_read = 0",
                rusqlite::params![message_id, now_rfc3339()],
            )?;
            Ok(())
        })?;

        let updated = self
            .with_conn(|conn| query_message_by_id(conn, message_id))?
            .ok_or(StoreError::NotFound)?;
        Ok(updated)
    }

    /// Unread messages addressed to `user_id` across all their conversations.
    /// Recomputed from the rows on every call — there is no stored counter to
    /// drift out of sync.
    pub fn unread_message_count(&self, user_id: &str) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*)
                 FROM messages m
                 JOIN conversations c ON m.conversation_id = c.id
                 WHERE (c.participant_a = ?1 OR c.participant_b = ?1)
                   AND m.sender_id != ?1
                   AND m.is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Per-conversation unread count for the viewer, used by the
    /// conversation list view.
    pub fn unread_count_in_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE conversation_id = ?1 AND sender_id != ?2 AND is_read = 0",
                [conversation_id, user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn query_message_by_id(conn: &Connection, id: &str) -> StoreResult<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, sender_id, body, is_read, read_at, created_at
         FROM messages WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                body: row.get(3)?,
                is_read: row.get::<_, i64>(4)? != 0,
                read_at: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> StoreResult<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                sender_id: row.get(2)?,
                body: row.get(3)?,
                is_read: row.get::<_, i64>(4)? != 0,
                read_at: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use crate::{Database, StoreError};

    fn setup() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "alice", "hash", "Alice").unwrap();
        db.create_user("bob", "bob", "hash", "Bob").unwrap();
        db.create_user("carol", "carol", "hash", "Carol").unwrap();
        let (conv, _) = db.create_conversation("c1", "alice", "bob").unwrap();
        (db, conv.id)
    }

    #[test]
    fn rejects_blank_bodies() {
        let (db, conv) = setup();
        for body in ["", "   ", "\n\t "] {
            let err = db.send_message("m1", &conv, "alice", body).unwrap_err();
            assert!(matches!(err, StoreError::Validation(_)));
        }
    }

    #[test]
    fn rejects_non_participant_sender() {
        let (db, conv) = setup();
        let err = db.send_message("m1", &conv, "carol", "hi").unwrap_err();
        assert!(matches!(err, StoreError::NotAuthorized));
    }

    #[test]
    fn lists_ascending_and_truncates_from_the_tail() {
        let (db, conv) = setup();
        for i in 0..5 {
            db.send_message(&format!("m{}", i), &conv, "alice", &format!("msg {}", i))
                .unwrap();
        }

        let all = db.list_messages(&conv, "bob", None).unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.first().unwrap().id, "m0");
        assert_eq!(all.last().unwrap().id, "m4");

        // Limited fetch keeps the most recent rows but stays ascending.
        let tail = db.list_messages(&conv, "bob", Some(2)).unwrap();
        assert_eq!(
            tail.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m3", "m4"]
        );
    }

    #[test]
    fn sender_cannot_read_own_message() {
        let (db, conv) = setup();
        let msg = db.send_message("m1", &conv, "alice", "hi").unwrap();
        assert!(matches!(
            db.mark_message_read(&msg.id, "alice"),
            Err(StoreError::NotAuthorized)
        ));
    }

    #[test]
    fn outsider_cannot_read() {
        let (db, conv) = setup();
        let msg = db.send_message("m1", &conv, "alice", "hi").unwrap();
        assert!(matches!(
            db.mark_message_read(&msg.id, "carol"),
            Err(StoreError::NotAuthorized)
        ));
    }

    #[test]
    fn mark_read_is_idempotent() {
        let (db, conv) = setup();
        let msg = db.send_message("m1", &conv, "alice", "hi").unwrap();

        let first = db.mark_message_read(&msg.id, "bob").unwrap();
        assert!(first.is_read);
        let read_at = first.read_at.clone().unwrap();
        assert!(read_at >= first.created_at);

        // Second call is a no-op success with the original read_at.
        let second = db.mark_message_read(&msg.id, "bob").unwrap();
        assert_eq!(second.read_at.as_deref(), Some(read_at.as_str()));
    }

    #[test]
    fn unread_count_tracks_inserts_and_reads() {
        let (db, conv) = setup();
        assert_eq!(db.unread_message_count("bob").unwrap(), 0);

        let m1 = db.send_message("m1", &conv, "alice", "hi").unwrap();
        db.send_message("m2", &conv, "alice", "still there?").unwrap();
        assert_eq!(db.unread_message_count("bob").unwrap(), 2);
        // Sender's own unread view is unaffected.
        assert_eq!(db.unread_message_count("alice").unwrap(), 0);

        db.mark_message_read(&m1.id, "bob").unwrap();
        assert_eq!(db.unread_message_count("bob").unwrap(), 1);
        assert_eq!(db.unread_count_in_conversation(&conv, "bob").unwrap(), 1);
    }

    #[test]
    fn alice_and_bob_walkthrough() {
        let (db, conv) = setup();

        let m1 = db.send_message("m1", &conv, "alice", "hi").unwrap();
        assert!(!m1.is_read);
        assert_eq!(db.unread_message_count("bob").unwrap(), 1);

        let m1 = db.mark_message_read(&m1.id, "bob").unwrap();
        assert!(m1.is_read);
        assert_eq!(db.unread_message_count("bob").unwrap(), 0);

        assert!(matches!(
            db.mark_message_read(&m1.id, "alice"),
            Err(StoreError::NotAuthorized)
        ));
    }
}
