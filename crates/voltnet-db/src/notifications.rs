use rusqlite::Connection;

use crate::models::NotificationRow;
use crate::{Database, OptionalExt, StoreError, StoreResult, now_rfc3339};

impl Database {
    /// Entry point for event producers (post/like/comment surfaces). The call
    /// is fire-and-forget from the producer's perspective; the recipient sees
    /// the row on their next notification poll.
    pub fn emit_notification(
        &self,
        id: &str,
        recipient_id: &str,
        kind: &str,
        actor_id: Option<&str>,
        target_type: Option<&str>,
        target_id: Option<&str>,
    ) -> StoreResult<NotificationRow> {
        let created_at = now_rfc3339();

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, recipient_id, kind, actor_id, target_type, target_id, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![id, recipient_id, kind, actor_id, target_type, target_id, created_at],
            )?;
            Ok(())
        })?;

        Ok(NotificationRow {
            id: id.to_string(),
            recipient_id: recipient_id.to_string(),
            kind: kind.to_string(),
            actor_id: actor_id.map(str::to_string),
            target_type: target_type.map(str::to_string),
            target_id: target_id.map(str::to_string),
            is_read: false,
            read_at: None,
            created_at,
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: &str) -> StoreResult<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, actor_id, target_type, target_id,
                        is_read, read_at, created_at
                 FROM notifications WHERE recipient_id = ?1
                 ORDER BY created_at DESC, rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Idempotent per-row read transition, same shape as message reads.
    pub fn mark_notification_read(
        &self,
        notification_id: &str,
        user_id: &str,
    ) -> StoreResult<NotificationRow> {
        let row = self
            .with_conn(|conn| query_notification_by_id(conn, notification_id))?
            .ok_or(StoreError::NotFound)?;

        if row.recipient_id != user_id {
            return Err(StoreError::NotAuthorized);
        }

        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?2
                 WHERE id = ?1 AND is_read = 0",
                rusqlite::params![notification_id, now_rfc3339()],
            )?;
            Ok(())
        })?;

        let updated = self
            .with_conn(|conn| query_notification_by_id(conn, notification_id))?
            .ok_or(StoreError::NotFound)?;
        Ok(updated)
    }

    /// Bulk read. Each row's transition is atomic and idempotent, so a retry
    /// after partial progress cannot double-apply. Returns the number of rows
    /// that actually transitioned.
    pub fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<u64> {
        self.with_conn_mut(|conn| {
            let marked = conn.execute(
                "UPDATE notifications SET is_read = 1, read_at = ?2
                 WHERE recipient_id = ?1 AND is_read = 0",
                rusqlite::params![user_id, now_rfc3339()],
            )?;
            Ok(marked as u64)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn notification_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        actor_id: row.get(3)?,
        target_type: row.get(4)?,
        target_id: row.get(5)?,
        is_read: row.get::<_, i64>(6)? != 0,
        read_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn query_notification_by_id(conn: &Connection, id: &str) -> StoreResult<Option<NotificationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_id, kind, actor_id, target_type, target_id,
                is_read, read_at, created_at
         FROM notifications WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], notification_from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::{Database, StoreError};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "alice", "hash", "Alice").unwrap();
        db.create_user("bob", "bob", "hash", "Bob").unwrap();
        db
    }

    #[test]
    fn emit_then_list_newest_first() {
        let db = setup();
        db.emit_notification("n1", "bob", "NEW_POST", Some("alice"), Some("post"), Some("p1"))
            .unwrap();
        db.emit_notification("n2", "bob", "POST_LIKED", Some("alice"), Some("post"), Some("p2"))
            .unwrap();

        let listed = db.list_notifications("bob").unwrap();
        assert_eq!(
            listed.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["n2", "n1"]
        );
        assert!(listed.iter().all(|n| !n.is_read));
    }

    #[test]
    fn mark_read_requires_ownership_and_is_idempotent() {
        let db = setup();
        db.emit_notification("n1", "bob", "NEW_POST", Some("alice"), None, None)
            .unwrap();

        assert!(matches!(
            db.mark_notification_read("n1", "alice"),
            Err(StoreError::NotAuthorized)
        ));
        assert!(matches!(
            db.mark_notification_read("missing", "bob"),
            Err(StoreError::NotFound)
        ));

        let first = db.mark_notification_read("n1", "bob").unwrap();
        assert!(first.is_read);
        let second = db.mark_notification_read("n1", "bob").unwrap();
        assert_eq!(second.read_at, first.read_at);
    }

    #[test]
    fn mark_all_clears_every_unread_and_reports_progress() {
        let db = setup();
        for i in 0..4 {
            db.emit_notification(&format!("n{}", i), "bob", "POST_COMMENTED", Some("alice"), None, None)
                .unwrap();
        }
        db.mark_notification_read("n0", "bob").unwrap();

        assert_eq!(db.unread_notification_count("bob").unwrap(), 3);
        assert_eq!(db.mark_all_notifications_read("bob").unwrap(), 3);
        assert_eq!(db.unread_notification_count("bob").unwrap(), 0);
        assert!(db.list_notifications("bob").unwrap().iter().all(|n| n.is_read));

        // Retry after the fact marks nothing twice.
        assert_eq!(db.mark_all_notifications_read("bob").unwrap(), 0);
    }
}
