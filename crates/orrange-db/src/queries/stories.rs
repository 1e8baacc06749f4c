use anyhow::Result;
use rusqlite::Row;

use super::{AUTHOR_COLUMNS, OptionalExt, author_at};
use crate::Database;
use crate::models::StoryRow;

/// `?1` is the viewer id.
fn story_select() -> String {
    format!(
        "SELECT s.id, {}, s.media_url, s.caption,
                (SELECT COUNT(*) FROM story_reactions r WHERE r.story_id = s.id),
                (SELECT r.emoji FROM story_reactions r WHERE r.story_id = s.id AND r.user_id = ?1),
                s.created_at, s.expires_at
         FROM stories s JOIN users u ON u.id = s.user_id",
        AUTHOR_COLUMNS
    )
}

impl Database {
    pub fn create_story(&self, user_id: i64, media_url: &str, caption: Option<&str>) -> Result<StoryRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO stories (user_id, media_url, caption) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, media_url, caption],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("{} WHERE s.id = ?2", story_select()),
                [user_id, id],
                story_from_row,
            )?)
        })
    }

    /// Unexpired stories by the viewer and the accounts they follow, newest first.
    pub fn active_stories(&self, viewer_id: i64) -> Result<Vec<StoryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE s.expires_at > datetime('now')
                   AND (s.user_id = ?1 OR s.user_id IN
                        (SELECT following_id FROM followers WHERE follower_id = ?1))
                 ORDER BY s.id DESC",
                story_select()
            ))?;
            let rows = stmt
                .query_map([viewer_id], story_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn story_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM stories WHERE id = ?1 AND expires_at > datetime('now')",
                    [id],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
                .is_some())
        })
    }

    /// One reaction per user per story; a new emoji replaces the old one.
    pub fn react_to_story(&self, story_id: i64, user_id: i64, emoji: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO story_reactions (story_id, user_id, emoji) VALUES (?1, ?2, ?3)
                 ON CONFLICT(story_id, user_id) DO UPDATE SET emoji = excluded.emoji",
                rusqlite::params![story_id, user_id, emoji],
            )?;
            Ok(())
        })
    }
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<StoryRow> {
    Ok(StoryRow {
        id: row.get(0)?,
        author: author_at(row, 1)?,
        media_url: row.get(6)?,
        caption: row.get(7)?,
        reactions_count: row.get(8)?,
        my_reaction: row.get(9)?,
        created_at: row.get(10)?,
        expires_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn stories_follow_graph_and_reactions() {
        let db = db();
        let alice = user(&db, "alice", 0);
        let bob = user(&db, "bob", 0);
        let carol = user(&db, "carol", 0);

        let story = db.create_story(bob, "https://img/1.jpg", Some("beach")).unwrap();
        db.create_story(carol, "https://img/2.jpg", None).unwrap();
        db.toggle_follow(alice, bob).unwrap();

        let visible = db.active_stories(alice).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, story.id);

        db.react_to_story(story.id, alice, "🔥").unwrap();
        db.react_to_story(story.id, alice, "😍").unwrap();
        let visible = db.active_stories(alice).unwrap();
        assert_eq!(visible[0].reactions_count, 1);
        assert_eq!(visible[0].my_reaction.as_deref(), Some("😍"));
    }

    #[test]
    fn expired_stories_are_hidden() {
        let db = db();
        let alice = user(&db, "alice", 0);
        let story = db.create_story(alice, "https://img/1.jpg", None).unwrap();
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE stories SET expires_at = datetime('now', '-1 hour') WHERE id = ?1",
                [story.id],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.active_stories(alice).unwrap().is_empty());
        assert!(!db.story_exists(story.id).unwrap());
    }
}
