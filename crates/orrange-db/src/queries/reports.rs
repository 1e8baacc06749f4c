use anyhow::Result;

use crate::Database;

impl Database {
    /// Returns the report id.
    pub fn create_report(&self, reporter_id: i64, target_type: &str, target_id: i64, reason: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO reports (reporter_id, target_type, target_id, reason) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![reporter_id, target_type, target_id, reason],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}
