use anyhow::Result;
use rusqlite::{Connection, Row};

use super::notifications::insert_notification;
use super::{AUTHOR_COLUMNS, OptionalExt, author_at};
use crate::Database;
use crate::models::{AuthorRow, ConversationRow, MessageRow, NotificationRow};

fn message_select() -> String {
    format!(
        "SELECT m.id, m.conversation_id, {}, m.content, m.created_at
         FROM messages m JOIN users u ON u.id = m.sender_id",
        AUTHOR_COLUMNS
    )
}

impl Database {
    /// Find a conversation whose participants are exactly `a` and `b`.
    pub fn find_direct_conversation(&self, a: i64, b: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT cp.conversation_id
                 FROM conversation_participants cp
                 GROUP BY cp.conversation_id
                 HAVING COUNT(*) = 2
                    AND SUM(cp.user_id = ?1) = 1
                    AND SUM(cp.user_id = ?2) = 1
                 LIMIT 1",
                [a, b],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Create a conversation with the given (deduplicated) participants.
    pub fn create_conversation(&self, participant_ids: &[i64]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO conversations DEFAULT VALUES", [])?;
            let id = tx.last_insert_rowid();
            {
                let mut stmt = tx.prepare(
                    "INSERT OR IGNORE INTO conversation_participants (conversation_id, user_id)
                     VALUES (?1, ?2)",
                )?;
                for user_id in participant_ids {
                    stmt.execute([id, *user_id])?;
                }
            }
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn is_participant(&self, conversation_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM conversation_participants
                               WHERE conversation_id = ?1 AND user_id = ?2)",
                [conversation_id, user_id],
                |row| row.get(0),
            )?)
        })
    }

    pub fn get_conversation(&self, conversation_id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let updated_at: Option<String> = conn
                .query_row(
                    "SELECT updated_at FROM conversations WHERE id = ?1",
                    [conversation_id],
                    |row| row.get(0),
                )
                .optional()?;
            match updated_at {
                Some(updated_at) => Ok(Some(load_conversation(conn, conversation_id, updated_at)?)),
                None => Ok(None),
            }
        })
    }

    /// Conversations the user takes part in, most recently active first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.updated_at FROM conversations c
                 JOIN conversation_participants cp ON cp.conversation_id = c.id
                 WHERE cp.user_id = ?1
                 ORDER BY c.updated_at DESC, c.id DESC",
            )?;
            let heads = stmt
                .query_map([user_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            heads
                .into_iter()
                .map(|(id, updated_at)| load_conversation(conn, id, updated_at))
                .collect()
        })
    }

    /// Oldest first.
    pub fn list_messages(&self, conversation_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.id DESC LIMIT ?2",
                message_select()
            ))?;
            let mut rows = stmt
                .query_map(rusqlite::params![conversation_id, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Store a message, bump the conversation, and store a notification for
    /// every other participant. Returns the message and those notifications.
    pub fn insert_message(
        &self,
        conversation_id: i64,
        sender_id: i64,
        content: &str,
    ) -> Result<(MessageRow, Vec<NotificationRow>)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (conversation_id, sender_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![conversation_id, sender_id, content],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "UPDATE conversations SET updated_at = datetime('now') WHERE id = ?1",
                [conversation_id],
            )?;

            let message = tx.query_row(
                &format!("{} WHERE m.id = ?1", message_select()),
                [id],
                message_from_row,
            )?;

            let recipients: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT user_id FROM conversation_participants
                     WHERE conversation_id = ?1 AND user_id != ?2",
                )?;
                let ids = stmt
                    .query_map([conversation_id, sender_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };

            let text = format!("{} sent you a message", message.sender.username);
            let mut notifications = Vec::with_capacity(recipients.len());
            for recipient in recipients {
                notifications.push(insert_notification(
                    &tx,
                    recipient,
                    Some(sender_id),
                    "message",
                    &text,
                    Some(conversation_id),
                )?);
            }

            tx.commit()?;
            Ok((message, notifications))
        })
    }
}

fn load_conversation(conn: &Connection, id: i64, updated_at: String) -> Result<ConversationRow> {
    let participants = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM conversation_participants cp JOIN users u ON u.id = cp.user_id
             WHERE cp.conversation_id = ?1 ORDER BY u.id",
            AUTHOR_COLUMNS
        ))?;
        let rows = stmt
            .query_map([id], |row| author_at(row, 0))?
            .collect::<std::result::Result<Vec<AuthorRow>, _>>()?;
        rows
    };

    let last_message = conn
        .query_row(
            &format!(
                "{} WHERE m.conversation_id = ?1 ORDER BY m.id DESC LIMIT 1",
                message_select()
            ),
            [id],
            message_from_row,
        )
        .optional()?;

    Ok(ConversationRow {
        id,
        participants,
        last_message,
        updated_at,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        sender: author_at(row, 2)?,
        content: row.get(7)?,
        created_at: row.get(8)?,
    })
}
