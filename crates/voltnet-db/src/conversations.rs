use rusqlite::Connection;

use crate::models::ConversationRow;
use crate::{Database, OptionalExt, StoreError, StoreResult, now_rfc3339};

/// Canonical ordering for the unordered participant pair: lexicographic on
/// the UUID strings, matching the UNIQUE(participant_a, participant_b) index.
fn canonical_pair<'a>(x: &'a str, y: &'a str) -> (&'a str, &'a str) {
    if x < y { (x, y) } else { (y, x) }
}

impl Database {
    /// Idempotent create: the first caller inserts, every later caller for
    /// the same unordered pair gets the existing row back. `INSERT OR IGNORE`
    /// against the unique pair index makes the check-and-insert atomic, so
    /// concurrent (a,b) and (b,a) creates observe the same id.
    ///
    /// Returns `(row, created)` — `created` is false when the pair already
    /// had a conversation.
    pub fn create_conversation(
        &self,
        id: &str,
        requester_id: &str,
        participant_id: &str,
    ) -> StoreResult<(ConversationRow, bool)> {
        if requester_id == participant_id {
            return Err(StoreError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        self.get_user_by_id(participant_id)?
            .ok_or(StoreError::NotFound)?;

        let (a, b) = canonical_pair(requester_id, participant_id);

        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversations (id, participant_a, participant_b, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, a, b, now_rfc3339()],
            )?;

            let row = query_conversation_by_pair(conn, a, b)?
                .ok_or_else(|| StoreError::Transient("conversation vanished after insert".into()))?;

            Ok((row, inserted == 1))
        })
    }

    /// All conversations `user_id` participates in, newest activity first
    /// (last message timestamp, falling back to the conversation's own
    /// creation time).
    pub fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.participant_a, c.participant_b, c.created_at
                 FROM conversations c
                 WHERE c.participant_a = ?1 OR c.participant_b = ?1
                 ORDER BY COALESCE(
                     (SELECT MAX(m.created_at) FROM messages m WHERE m.conversation_id = c.id),
                     c.created_at
                 ) DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        participant_a: row.get(1)?,
                        participant_b: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn get_conversation(
        &self,
        id: &str,
        requester_id: &str,
    ) -> StoreResult<ConversationRow> {
        let row = self
            .with_conn(|conn| query_conversation_by_id(conn, id))?
            .ok_or(StoreError::NotFound)?;

        if !row.has_participant(requester_id) {
            return Err(StoreError::NotAuthorized);
        }

        Ok(row)
    }
}

fn query_conversation_by_id(conn: &Connection, id: &str) -> StoreResult<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, created_at FROM conversations WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation_by_pair(
    conn: &Connection,
    a: &str,
    b: &str,
) -> StoreResult<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, participant_a, participant_b, created_at
         FROM conversations WHERE participant_a = ?1 AND participant_b = ?2",
    )?;

    let row = stmt
        .query_row([a, b], |row| {
            Ok(ConversationRow {
                id: row.get(0)?,
                participant_a: row.get(1)?,
                participant_b: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}
