use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            name        TEXT NOT NULL,
            avatar_ref  TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS boxes (
            id          TEXT PRIMARY KEY,
            author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- seq keeps enrollment order
        CREATE TABLE IF NOT EXISTS enrollments (
            seq         INTEGER PRIMARY KEY AUTOINCREMENT,
            box_id      TEXT NOT NULL REFERENCES boxes(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(box_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS posts (
            box_id      TEXT NOT NULL REFERENCES boxes(id) ON DELETE CASCADE,
            key         TEXT NOT NULL,
            uid         TEXT NOT NULL,
            name        TEXT NOT NULL,
            content_ref TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (box_id, key)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            box_id      TEXT NOT NULL,
            post_key    TEXT NOT NULL,
            user_id     TEXT NOT NULL,
            kind        TEXT NOT NULL CHECK (kind IN ('love', 'meh', 'sad')),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (box_id, post_key, user_id, kind),
            FOREIGN KEY (box_id, post_key) REFERENCES posts(box_id, key) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_post
            ON reactions(box_id, post_key);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
