use anyhow::Result;
use rusqlite::Row;

use super::{AUTHOR_COLUMNS, OptionalExt, author_at};
use crate::Database;
use crate::models::EventRow;

/// `?1` is the viewer id.
fn event_select() -> String {
    format!(
        "SELECT e.id, {}, e.title, e.description, e.location, e.starts_at,
                (SELECT COUNT(*) FROM event_attendees a WHERE a.event_id = e.id),
                EXISTS(SELECT 1 FROM event_attendees a WHERE a.event_id = e.id AND a.user_id = ?1),
                e.created_at
         FROM events e JOIN users u ON u.id = e.creator_id",
        AUTHOR_COLUMNS
    )
}

impl Database {
    pub fn create_event(
        &self,
        creator_id: i64,
        title: &str,
        description: Option<&str>,
        location: Option<&str>,
        starts_at: Option<&str>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO events (creator_id, title, description, location, starts_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![creator_id, title, description, location, starts_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_event(&self, id: i64, viewer_id: i64) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE e.id = ?2", event_select()),
                [viewer_id, id],
                event_from_row,
            )
            .optional()
        })
    }

    /// Soonest first; events without a start time sort last.
    pub fn list_events(&self, viewer_id: i64) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY e.starts_at IS NULL, e.starts_at ASC, e.id DESC",
                event_select()
            ))?;
            let rows = stmt
                .query_map([viewer_id], event_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns true when the user is now attending.
    pub fn toggle_attendance(&self, event_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM event_attendees WHERE event_id = ?1 AND user_id = ?2",
                [event_id, user_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO event_attendees (event_id, user_id) VALUES (?1, ?2)",
                [event_id, user_id],
            )?;
            Ok(true)
        })
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<EventRow> {
    Ok(EventRow {
        id: row.get(0)?,
        creator: author_at(row, 1)?,
        title: row.get(6)?,
        description: row.get(7)?,
        location: row.get(8)?,
        starts_at: row.get(9)?,
        attendees_count: row.get(10)?,
        attending: row.get(11)?,
        created_at: row.get(12)?,
    })
}
