use anyhow::Result;
use rusqlite::{Connection, Row};

use crate::Database;
use crate::models::NotificationRow;

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, actor_id, kind, message, reference_id, is_read, created_at";

impl Database {
    pub fn create_notification(
        &self,
        user_id: i64,
        actor_id: Option<i64>,
        kind: &str,
        message: &str,
        reference_id: Option<i64>,
    ) -> Result<NotificationRow> {
        self.with_conn_mut(|conn| {
            insert_notification(conn, user_id, actor_id, kind, message, reference_id)
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, user_id: i64, limit: u32) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM notifications WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                NOTIFICATION_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Returns false if the notification does not exist or belongs to someone else.
    pub fn mark_notification_read(&self, id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                [id, user_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// Returns how many notifications changed.
    pub fn mark_all_notifications_read(&self, user_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?)
        })
    }
}

/// Insert on an open connection or transaction and read the row back.
pub(crate) fn insert_notification(
    conn: &Connection,
    user_id: i64,
    actor_id: Option<i64>,
    kind: &str,
    message: &str,
    reference_id: Option<i64>,
) -> Result<NotificationRow> {
    conn.execute(
        "INSERT INTO notifications (user_id, actor_id, kind, message, reference_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![user_id, actor_id, kind, message, reference_id],
    )?;
    let id = conn.last_insert_rowid();
    Ok(conn.query_row(
        &format!("SELECT {} FROM notifications WHERE id = ?1", NOTIFICATION_COLUMNS),
        [id],
        notification_from_row,
    )?)
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        kind: row.get(3)?,
        message: row.get(4)?,
        reference_id: row.get(5)?,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn read_state_is_per_owner() {
        let db = db();
        let alice = user(&db, "alice", 0);
        let bob = user(&db, "bob", 0);

        let n = db.create_notification(alice, Some(bob), "like", "bob liked your post", Some(1)).unwrap();
        db.create_notification(alice, Some(bob), "follow", "bob followed you", None).unwrap();
        assert_eq!(db.unread_notification_count(alice).unwrap(), 2);

        assert!(!db.mark_notification_read(n.id, bob).unwrap());
        assert!(db.mark_notification_read(n.id, alice).unwrap());
        assert_eq!(db.unread_notification_count(alice).unwrap(), 1);

        assert_eq!(db.mark_all_notifications_read(alice).unwrap(), 1);
        assert_eq!(db.unread_notification_count(alice).unwrap(), 0);

        let listed = db.list_notifications(alice, 50).unwrap();
        assert_eq!(listed[0].kind, "follow");
    }
}
