use std::collections::HashMap;

use anyhow::Result;
use rusqlite::{Connection, Row};

use super::users::like_pattern;
use super::{AUTHOR_COLUMNS, OptionalExt, author_at, placeholders};
use crate::Database;
use crate::models::{CommentRow, PostRow};

/// Post columns plus counts and viewer flags. `?1` is always the viewer id.
fn post_select() -> String {
    format!(
        "SELECT p.id, {},
                p.content, p.image_url, p.media_type, p.moderation_status,
                (SELECT COUNT(*) FROM post_likes l WHERE l.post_id = p.id),
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                EXISTS(SELECT 1 FROM post_likes l WHERE l.post_id = p.id AND l.user_id = ?1),
                EXISTS(SELECT 1 FROM bookmarks b WHERE b.post_id = p.id AND b.user_id = ?1),
                p.created_at
         FROM posts p
         JOIN users u ON u.id = p.user_id",
        AUTHOR_COLUMNS
    )
}

/// Upper bound on ids bound into one `IN (...)` lookup.
const MAX_ID_BATCH: usize = 500;

/// Posts visible to the viewer: approved ones, plus their own under review.
const VISIBLE: &str = "(p.moderation_status = 'approved' OR p.user_id = ?1)";

impl Database {
    pub fn create_post(
        &self,
        user_id: i64,
        content: &str,
        image_url: Option<&str>,
        media_type: &str,
        moderation_status: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (user_id, content, image_url, media_type, moderation_status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user_id, content, image_url, media_type, moderation_status],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64, viewer_id: i64) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{} WHERE p.id = ?2 AND {}", post_select(), VISIBLE),
                [viewer_id, id],
                post_from_row,
            )
            .optional()
        })
    }

    pub fn get_post_owner(&self, id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT user_id FROM posts WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()
        })
    }

    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM posts WHERE id = ?1", [id])? > 0))
    }

    /// Newest first.
    pub fn chronological_feed(&self, viewer_id: i64, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{} WHERE {} ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
                    post_select(),
                    VISIBLE
                ),
                rusqlite::params![viewer_id, limit, offset],
            )
        })
    }

    /// Fetch posts by id, returned in the order of `ids`. Unknown ids are
    /// skipped. Only the first `MAX_ID_BATCH` ids are looked up.
    pub fn posts_by_ids(&self, viewer_id: i64, ids: &[i64]) -> Result<Vec<PostRow>> {
        let ids = &ids[..ids.len().min(MAX_ID_BATCH)];
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut rows = self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE p.id IN ({}) AND {}",
                post_select(),
                placeholders(2, ids.len()),
                VISIBLE
            );
            let mut params: Vec<&dyn rusqlite::types::ToSql> = Vec::with_capacity(ids.len() + 1);
            params.push(&viewer_id);
            params.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));
            query_posts(conn, &sql, params.as_slice())
        })?;

        let rank: HashMap<i64, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        rows.sort_by_key(|row| rank.get(&row.id).copied().unwrap_or(usize::MAX));
        Ok(rows)
    }

    pub fn user_posts(&self, user_id: i64, viewer_id: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{} WHERE p.user_id = ?2 AND {} ORDER BY p.created_at DESC, p.id DESC",
                    post_select(),
                    VISIBLE
                ),
                [viewer_id, user_id],
            )
        })
    }

    pub fn reels(&self, viewer_id: i64, limit: u32, offset: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{} WHERE p.media_type = 'video' AND p.moderation_status = 'approved'
                     ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
                    post_select()
                ),
                rusqlite::params![viewer_id, limit, offset],
            )
        })
    }

    pub fn search_posts(&self, term: &str, viewer_id: i64, limit: u32) -> Result<Vec<PostRow>> {
        let pattern = like_pattern(term);
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{} WHERE p.content LIKE ?2 ESCAPE '\\' AND p.moderation_status = 'approved'
                     ORDER BY p.created_at DESC, p.id DESC LIMIT ?3",
                    post_select()
                ),
                rusqlite::params![viewer_id, pattern, limit],
            )
        })
    }

    // -- Likes --

    /// Toggle a like: removes if it exists, inserts if not.
    /// Returns (liked, likes_count) after the change.
    pub fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                [post_id, user_id],
            )?;
            if removed == 0 {
                tx.execute(
                    "INSERT INTO post_likes (post_id, user_id) VALUES (?1, ?2)",
                    [post_id, user_id],
                )?;
            }
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM post_likes WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((removed == 0, count))
        })
    }

    // -- Bookmarks --

    /// Returns true when the post is now bookmarked.
    pub fn toggle_bookmark(&self, post_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM bookmarks WHERE post_id = ?1 AND user_id = ?2",
                [post_id, user_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO bookmarks (post_id, user_id) VALUES (?1, ?2)",
                [post_id, user_id],
            )?;
            Ok(true)
        })
    }

    /// Most recently bookmarked first.
    pub fn list_bookmarks(&self, user_id: i64) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            query_posts(
                conn,
                &format!(
                    "{} JOIN bookmarks bm ON bm.post_id = p.id AND bm.user_id = ?1
                     WHERE {} ORDER BY bm.created_at DESC, p.id DESC",
                    post_select(),
                    VISIBLE
                ),
                [user_id],
            )
        })
    }

    // -- Comments --

    /// Oldest first.
    pub fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT c.id, c.post_id, {}, c.content, c.created_at
                 FROM comments c JOIN users u ON u.id = c.user_id
                 WHERE c.post_id = ?1 ORDER BY c.id ASC",
                AUTHOR_COLUMNS
            ))?;
            let rows = stmt
                .query_map([post_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the stored comment and the post's new comment count.
    pub fn create_comment(&self, post_id: i64, user_id: i64, content: &str) -> Result<(CommentRow, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO comments (post_id, user_id, content) VALUES (?1, ?2, ?3)",
                rusqlite::params![post_id, user_id, content],
            )?;
            let id = tx.last_insert_rowid();
            let comment = tx.query_row(
                &format!(
                    "SELECT c.id, c.post_id, {}, c.content, c.created_at
                     FROM comments c JOIN users u ON u.id = c.user_id WHERE c.id = ?1",
                    AUTHOR_COLUMNS
                ),
                [id],
                comment_from_row,
            )?;
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((comment, count))
        })
    }
}

fn query_posts<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<PostRow>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, post_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author: author_at(row, 1)?,
        content: row.get(6)?,
        image_url: row.get(7)?,
        media_type: row.get(8)?,
        moderation_status: row.get(9)?,
        likes_count: row.get(10)?,
        comments_count: row.get(11)?,
        liked: row.get(12)?,
        bookmarked: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author: author_at(row, 2)?,
        content: row.get(7)?,
        created_at: row.get(8)?,
    })
}
