use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            description TEXT,
            topic       TEXT,
            kind        TEXT NOT NULL CHECK (kind IN ('public', 'private')),
            created_by  TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        -- Names are unique among active channels only; deactivation frees
        -- the name for reuse.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_active_name
            ON channels(name) WHERE active = 1;

        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            user_id     TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'member',
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            user_a      TEXT NOT NULL,
            user_b      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL,
            UNIQUE (user_a, user_b)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            container_kind  TEXT NOT NULL CHECK (container_kind IN ('channel', 'direct')),
            container_id    TEXT NOT NULL,
            author_id       TEXT NOT NULL,
            content         TEXT NOT NULL,
            reply_to_id     TEXT REFERENCES messages(id),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_container
            ON messages(container_kind, container_id, created_at);

        CREATE TABLE IF NOT EXISTS attachments (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id),
            url         TEXT NOT NULL,
            kind        TEXT NOT NULL,
            name        TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_message
            ON attachments(message_id);

        CREATE TABLE IF NOT EXISTS message_mentions (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        -- A reaction is the existence of the (message, user, emoji) triple.
        CREATE TABLE IF NOT EXISTS reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id),
            user_id     TEXT NOT NULL,
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id, emoji)
        );

        CREATE TABLE IF NOT EXISTS pinned_messages (
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            message_id  TEXT NOT NULL REFERENCES messages(id),
            pinned_by   TEXT NOT NULL,
            pinned_at   TEXT NOT NULL,
            PRIMARY KEY (channel_id, message_id)
        );

        -- Per-viewer read watermark. Unread counts are derived from this,
        -- never materialized.
        CREATE TABLE IF NOT EXISTS read_state (
            container_kind  TEXT NOT NULL,
            container_id    TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            last_read_at    TEXT NOT NULL,
            PRIMARY KEY (container_kind, container_id, user_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
