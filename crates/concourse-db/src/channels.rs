use anyhow::Result;
use concourse_types::models::{ChannelKind, MemberRole};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::{ChannelListRow, ChannelRow};
use crate::Database;

const CHANNEL_COLUMNS: &str =
    "id, name, description, topic, kind, created_by, active, created_at, updated_at";

impl Database {
    /// Insert a channel and its creator's owner membership atomically.
    ///
    /// Returns false when an active channel already holds the name: the
    /// partial unique index decides, so two creators racing on the same
    /// name get exactly one channel and one clean rejection.
    pub fn create_channel(
        &self,
        id: Uuid,
        name: &str,
        description: Option<&str>,
        topic: Option<&str>,
        kind: ChannelKind,
        created_by: Uuid,
        now: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO channels (id, name, description, topic, kind, created_by, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)",
                rusqlite::params![
                    id.to_string(),
                    name,
                    description,
                    topic,
                    kind.as_str(),
                    created_by.to_string(),
                    now
                ],
            );
            match inserted {
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    return Ok(false);
                }
                other => other?,
            };
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.to_string(),
                    created_by.to_string(),
                    MemberRole::Owner.as_str(),
                    now
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn find_active_channel_by_name(&self, name: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            query_channel(
                conn,
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE name = ?1 AND active = 1"),
                rusqlite::params![name],
            )
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            query_channel(
                conn,
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                rusqlite::params![id.to_string()],
            )
        })
    }

    /// All active channels with viewer-relative membership info, one query.
    pub fn list_active_channels(&self, viewer: Uuid) -> Result<Vec<ChannelListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.description, c.topic, c.kind, c.created_by,
                        c.active, c.created_at, c.updated_at,
                        EXISTS(SELECT 1 FROM channel_members m
                               WHERE m.channel_id = c.id AND m.user_id = ?1),
                        (SELECT COUNT(*) FROM channel_members m WHERE m.channel_id = c.id)
                 FROM channels c
                 WHERE c.active = 1
                 ORDER BY c.name",
            )?;

            let rows = stmt
                .query_map(rusqlite::params![viewer.to_string()], |row| {
                    Ok(ChannelListRow {
                        channel: channel_from_row(row)?,
                        is_member: row.get(9)?,
                        member_count: row.get::<_, i64>(10)? as u64,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Idempotent join. Returns true only when a membership row was
    /// actually inserted, so callers can suppress events for no-ops.
    pub fn join_channel(&self, channel_id: Uuid, user_id: Uuid, now: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id, role, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    channel_id.to_string(),
                    user_id.to_string(),
                    MemberRole::Member.as_str(),
                    now
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Idempotent leave. Returns true only when a row was removed.
    pub fn leave_channel(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                rusqlite::params![channel_id.to_string(), user_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self.member_role(channel_id, user_id)?.is_some())
    }

    pub fn member_role(&self, channel_id: Uuid, user_id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let role = conn
                .query_row(
                    "SELECT role FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    rusqlite::params![channel_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(role)
        })
    }

    pub fn member_count(&self, channel_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM channel_members WHERE channel_id = ?1",
                rusqlite::params![channel_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Soft delete. The row and its messages stay; the name becomes free
    /// for new channels.
    pub fn deactivate_channel(&self, channel_id: Uuid, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE channels SET active = 0, updated_at = ?2 WHERE id = ?1",
                rusqlite::params![channel_id.to_string(), now],
            )?;
            Ok(())
        })
    }

    // -- Pins --

    pub fn pin_message(
        &self,
        channel_id: Uuid,
        message_id: Uuid,
        pinned_by: Uuid,
        now: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pinned_messages (channel_id, message_id, pinned_by, pinned_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    channel_id.to_string(),
                    message_id.to_string(),
                    pinned_by.to_string(),
                    now
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn unpin_message(&self, channel_id: Uuid, message_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM pinned_messages WHERE channel_id = ?1 AND message_id = ?2",
                rusqlite::params![channel_id.to_string(), message_id.to_string()],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn pinned_message_ids(&self, channel_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id FROM pinned_messages WHERE channel_id = ?1 ORDER BY pinned_at",
            )?;
            let ids = stmt
                .query_map(rusqlite::params![channel_id.to_string()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

fn query_channel(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Option<ChannelRow>> {
    let mut stmt = conn.prepare(sql)?;
    let row = stmt.query_row(params, channel_from_row).optional()?;
    Ok(row)
}

fn channel_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<ChannelRow, rusqlite::Error> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        topic: row.get(3)?,
        kind: row.get(4)?,
        created_by: row.get(5)?,
        active: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
