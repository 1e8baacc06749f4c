use anyhow::Result;
use rusqlite::{Connection, Row};

use super::{AUTHOR_COLUMNS, OptionalExt, author_at};
use crate::Database;
use crate::models::{AuthorRow, ProfileRow, UserRow};

const USER_COLUMNS: &str =
    "id, username, password, display_name, bio, avatar_url, coins, is_verified, created_at";

impl Database {
    /// Returns the new user's id.
    pub fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
        coins: i64,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password, coins) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, email, password_hash, coins],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                [username],
                user_from_row,
            )
            .optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Profile of `id` as seen by `viewer_id`.
    pub fn get_profile(&self, id: i64, viewer_id: i64) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            let Some(user) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };

            let (followers_count, following_count, posts_count, is_following) = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM followers WHERE following_id = ?1),
                    (SELECT COUNT(*) FROM followers WHERE follower_id = ?1),
                    (SELECT COUNT(*) FROM posts WHERE user_id = ?1),
                    EXISTS(SELECT 1 FROM followers WHERE follower_id = ?2 AND following_id = ?1)",
                rusqlite::params![id, viewer_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            Ok(Some(ProfileRow {
                user,
                followers_count,
                following_count,
                posts_count,
                is_following,
            }))
        })
    }

    /// Fields left as `None` keep their current value.
    pub fn update_profile(
        &self,
        id: i64,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET
                    display_name = COALESCE(?2, display_name),
                    bio = COALESCE(?3, bio),
                    avatar_url = COALESCE(?4, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id, display_name, bio, avatar_url],
            )?;
            Ok(())
        })
    }

    /// Toggle a follow: removes if it exists, inserts if not.
    /// Returns true when the caller now follows the target.
    pub fn toggle_follow(&self, follower_id: i64, following_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM followers WHERE follower_id = ?1 AND following_id = ?2",
                [follower_id, following_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT INTO followers (follower_id, following_id) VALUES (?1, ?2)",
                [follower_id, following_id],
            )?;
            Ok(true)
        })
    }

    pub fn list_followers(&self, user_id: i64) -> Result<Vec<AuthorRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM followers f JOIN users u ON u.id = f.follower_id
                 WHERE f.following_id = ?1 ORDER BY f.created_at DESC",
                AUTHOR_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], |row| author_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_following(&self, user_id: i64) -> Result<Vec<AuthorRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM followers f JOIN users u ON u.id = f.following_id
                 WHERE f.follower_id = ?1 ORDER BY f.created_at DESC",
                AUTHOR_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], |row| author_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_coins(&self, user_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT coins FROM users WHERE id = ?1", [user_id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn get_author(&self, user_id: i64) -> Result<Option<AuthorRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM users u WHERE u.id = ?1", AUTHOR_COLUMNS),
                [user_id],
                |row| author_at(row, 0),
            )
            .optional()
        })
    }

    /// Case-insensitive substring match on username or display name.
    pub fn search_users(&self, term: &str, limit: u32) -> Result<Vec<AuthorRow>> {
        let pattern = like_pattern(term);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users u
                 WHERE u.username LIKE ?1 ESCAPE '\\' OR u.display_name LIKE ?1 ESCAPE '\\'
                 ORDER BY u.username LIMIT ?2",
                AUTHOR_COLUMNS
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![pattern, limit], |row| author_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        [id],
        user_from_row,
    )
    .optional()
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        coins: row.get(6)?,
        is_verified: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::like_pattern;
    use crate::is_constraint_violation;
    use crate::queries::test_support::{db, user};

    #[test]
    fn duplicate_username_or_email_is_a_constraint_violation() {
        let db = db();
        db.create_user("alice", Some("a@example.com"), "hash", 0).unwrap();

        let err = db.create_user("alice", None, "hash", 0).unwrap_err();
        assert!(is_constraint_violation(&err));
        let err = db.create_user("alicia", Some("a@example.com"), "hash", 0).unwrap_err();
        assert!(is_constraint_violation(&err));

        assert!(!is_constraint_violation(&anyhow::anyhow!("disk full")));
    }

    #[test]
    fn follow_toggles_and_counts() {
        let db = db();
        let alice = user(&db, "alice", 100);
        let bob = user(&db, "bob", 100);

        assert!(db.toggle_follow(alice, bob).unwrap());
        let profile = db.get_profile(bob, alice).unwrap().unwrap();
        assert_eq!(profile.followers_count, 1);
        assert!(profile.is_following);

        assert!(!db.toggle_follow(alice, bob).unwrap());
        let profile = db.get_profile(bob, alice).unwrap().unwrap();
        assert_eq!(profile.followers_count, 0);
        assert!(!profile.is_following);
    }

    #[test]
    fn update_profile_keeps_unset_fields() {
        let db = db();
        let alice = user(&db, "alice", 0);

        db.update_profile(alice, Some("Alice"), Some("hi"), None).unwrap();
        db.update_profile(alice, None, Some("hello"), None).unwrap();

        let row = db.get_user_by_id(alice).unwrap().unwrap();
        assert_eq!(row.display_name.as_deref(), Some("Alice"));
        assert_eq!(row.bio.as_deref(), Some("hello"));
    }

    #[test]
    fn search_escapes_wildcards() {
        let db = db();
        user(&db, "al_ice", 0);
        user(&db, "alxice", 0);

        let hits = db.search_users("l_i", 20).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].username, "al_ice");
        assert_eq!(like_pattern("50%"), "%50\\%%");
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let db = db();
        user(&db, "alice", 0);
        assert!(db.create_user("alice", None, "hash", 0).is_err());
    }
}
