use anyhow::Result;

use super::OptionalExt;
use crate::Database;
use crate::models::HighlightRow;

impl Database {
    pub fn create_highlight(&self, user_id: i64, title: &str, cover_url: Option<&str>) -> Result<HighlightRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO highlights (user_id, title, cover_url) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, title, cover_url],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                "SELECT id, user_id, title, cover_url, created_at FROM highlights WHERE id = ?1",
                [id],
                |row| {
                    Ok(HighlightRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        cover_url: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )?)
        })
    }

    pub fn list_highlights(&self, user_id: i64) -> Result<Vec<HighlightRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, title, cover_url, created_at FROM highlights
                 WHERE user_id = ?1 ORDER BY id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(HighlightRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        title: row.get(2)?,
                        cover_url: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_highlight_owner(&self, id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT user_id FROM highlights WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    pub fn delete_highlight(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM highlights WHERE id = ?1", [id])? > 0))
    }
}
