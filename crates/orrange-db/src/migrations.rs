use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                username      TEXT NOT NULL UNIQUE,
                email         TEXT UNIQUE,
                password      TEXT NOT NULL,
                display_name  TEXT,
                bio           TEXT,
                avatar_url    TEXT,
                coins         INTEGER NOT NULL DEFAULT 0,
                is_verified   INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE followers (
                follower_id   INTEGER NOT NULL REFERENCES users(id),
                following_id  INTEGER NOT NULL REFERENCES users(id),
                created_at    TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (follower_id, following_id)
            );

            CREATE TABLE posts (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id            INTEGER NOT NULL REFERENCES users(id),
                content            TEXT NOT NULL,
                image_url          TEXT,
                media_type         TEXT NOT NULL DEFAULT 'text',
                moderation_status  TEXT NOT NULL DEFAULT 'approved',
                created_at         TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_posts_created ON posts(created_at);
            CREATE INDEX idx_posts_user ON posts(user_id, created_at);

            CREATE TABLE post_likes (
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(post_id, user_id)
            );

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE bookmarks (
                user_id     INTEGER NOT NULL REFERENCES users(id),
                post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(user_id, post_id)
            );

            CREATE TABLE conversations (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE conversation_participants (
                conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
                user_id          INTEGER NOT NULL REFERENCES users(id),
                PRIMARY KEY (conversation_id, user_id)
            );

            CREATE TABLE messages (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id  INTEGER NOT NULL REFERENCES conversations(id),
                sender_id        INTEGER NOT NULL REFERENCES users(id),
                content          TEXT NOT NULL,
                created_at       TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_messages_conversation ON messages(conversation_id, id);

            CREATE TABLE marketplace_listings (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                seller_id    INTEGER NOT NULL REFERENCES users(id),
                title        TEXT NOT NULL,
                description  TEXT,
                price        INTEGER NOT NULL CHECK (price > 0),
                image_url    TEXT,
                is_sold      INTEGER NOT NULL DEFAULT 0,
                buyer_id     INTEGER REFERENCES users(id),
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                sold_at      TEXT
            );

            CREATE TABLE nfts (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id     INTEGER NOT NULL REFERENCES users(id),
                creator_id   INTEGER NOT NULL REFERENCES users(id),
                name         TEXT NOT NULL,
                description  TEXT,
                image_url    TEXT,
                token_hash   TEXT NOT NULL,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE notifications (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id       INTEGER NOT NULL REFERENCES users(id),
                actor_id      INTEGER REFERENCES users(id),
                kind          TEXT NOT NULL,
                message       TEXT NOT NULL,
                reference_id  INTEGER,
                is_read       INTEGER NOT NULL DEFAULT 0,
                created_at    TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, id);

            CREATE TABLE events (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                creator_id   INTEGER NOT NULL REFERENCES users(id),
                title        TEXT NOT NULL,
                description  TEXT,
                location     TEXT,
                starts_at    TEXT,
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE event_attendees (
                event_id  INTEGER NOT NULL REFERENCES events(id),
                user_id   INTEGER NOT NULL REFERENCES users(id),
                PRIMARY KEY (event_id, user_id)
            );

            CREATE TABLE highlights (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                cover_url   TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE stories (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id),
                media_url   TEXT NOT NULL,
                caption     TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at  TEXT NOT NULL DEFAULT (datetime('now', '+1 day'))
            );

            CREATE TABLE story_reactions (
                story_id    INTEGER NOT NULL REFERENCES stories(id),
                user_id     INTEGER NOT NULL REFERENCES users(id),
                emoji       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (story_id, user_id)
            );

            CREATE TABLE reports (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                reporter_id  INTEGER NOT NULL REFERENCES users(id),
                target_type  TEXT NOT NULL,
                target_id    INTEGER NOT NULL,
                reason       TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'open',
                created_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE subscriptions (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                subscriber_id  INTEGER NOT NULL REFERENCES users(id),
                creator_id     INTEGER NOT NULL REFERENCES users(id),
                price          INTEGER NOT NULL,
                created_at     TEXT NOT NULL DEFAULT (datetime('now')),
                expires_at     TEXT NOT NULL DEFAULT (datetime('now', '+30 days'))
            );

            CREATE TABLE verification_requests (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL UNIQUE REFERENCES users(id),
                reason      TEXT NOT NULL,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
