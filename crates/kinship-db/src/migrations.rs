use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        -- Symmetric: one row per direction
        CREATE TABLE IF NOT EXISTS friendships (
            user_id     TEXT NOT NULL REFERENCES users(id),
            friend_id   TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, friend_id)
        );

        -- direct_key is the sorted participant pair; NULL for groups.
        CREATE TABLE IF NOT EXISTS chats (
            id          TEXT PRIMARY KEY,
            direct_key  TEXT UNIQUE,
            group_name  TEXT,
            room_id     TEXT,
            created_by  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL,
            CHECK (group_name IS NULL OR room_id IS NOT NULL),
            CHECK ((group_name IS NULL) <> (direct_key IS NULL))
        );

        CREATE TABLE IF NOT EXISTS chat_participants (
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            position    INTEGER NOT NULL,
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_user
            ON chat_participants(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id),
            seq         INTEGER NOT NULL,
            content     TEXT NOT NULL,
            created_by  TEXT NOT NULL REFERENCES users(id),
            seen        INTEGER NOT NULL DEFAULT 0,
            seen_at     TEXT,
            created_at  TEXT NOT NULL,
            UNIQUE (chat_id, seq)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
