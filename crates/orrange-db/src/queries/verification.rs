use anyhow::Result;

use super::OptionalExt;
use crate::Database;

impl Database {
    /// Returns false if the user already filed a request.
    pub fn create_verification_request(&self, user_id: i64, reason: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO verification_requests (user_id, reason) VALUES (?1, ?2)",
                rusqlite::params![user_id, reason],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn verification_status(&self, user_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT status FROM verification_requests WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn one_request_per_user() {
        let db = db();
        let alice = user(&db, "alice", 0);

        assert_eq!(db.verification_status(alice).unwrap(), None);
        assert!(db.create_verification_request(alice, "public figure").unwrap());
        assert!(!db.create_verification_request(alice, "again").unwrap());
        assert_eq!(db.verification_status(alice).unwrap().as_deref(), Some("pending"));
    }
}
