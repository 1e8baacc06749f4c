pub mod conversations;
pub mod events;
pub mod highlights;
pub mod marketplace;
pub mod nfts;
pub mod notifications;
pub mod posts;
pub mod reports;
pub mod stories;
pub mod subscriptions;
pub mod users;
pub mod verification;

use anyhow::Result;
use rusqlite::Row;

use crate::models::AuthorRow;

/// Columns for an embedded author, in the order `author_at` reads them.
/// Callers alias the users table as `u`.
pub(crate) const AUTHOR_COLUMNS: &str = "u.id, u.username, u.display_name, u.avatar_url, u.is_verified";

/// Read the five `AUTHOR_COLUMNS` starting at `offset`.
pub(crate) fn author_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<AuthorRow> {
    Ok(AuthorRow {
        id: row.get(offset)?,
        username: row.get(offset + 1)?,
        display_name: row.get(offset + 2)?,
        avatar_url: row.get(offset + 3)?,
        is_verified: row.get(offset + 4)?,
    })
}

/// `?N, ?N+1, ...` placeholders for an IN list whose first parameter is `?start`.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::Database;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, name: &str, coins: i64) -> i64 {
        db.create_user(name, None, "hash", coins).unwrap()
    }
}
