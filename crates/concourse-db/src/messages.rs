use anyhow::Result;
use concourse_types::models::ContainerRef;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::models::{AttachmentRow, MessageRow, NewMessage};
use crate::Database;

const MESSAGE_COLUMNS: &str =
    "id, container_kind, container_id, author_id, content, reply_to_id, created_at, updated_at";

impl Database {
    /// Persist a message with its attachments and resolved mentions, and
    /// touch the container's updated_at, all in one transaction.
    pub fn insert_message(&self, new: &NewMessage) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let message_id = new.id.to_string();

            tx.execute(
                "INSERT INTO messages (id, container_kind, container_id, author_id, content, reply_to_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    message_id,
                    new.container.kind(),
                    new.container.id().to_string(),
                    new.author_id.to_string(),
                    new.content,
                    new.reply_to_id.map(|id| id.to_string()),
                    new.created_at,
                ],
            )?;

            for attachment in &new.attachments {
                tx.execute(
                    "INSERT INTO attachments (id, message_id, url, kind, name)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        attachment.id.to_string(),
                        message_id,
                        attachment.url,
                        attachment.kind,
                        attachment.name
                    ],
                )?;
            }

            for mention in &new.mentions {
                tx.execute(
                    "INSERT OR IGNORE INTO message_mentions (message_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![message_id, mention.to_string()],
                )?;
            }

            // New activity bumps the container for chat-list recency.
            match new.container {
                ContainerRef::Channel(id) => tx.execute(
                    "UPDATE channels SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), new.created_at],
                )?,
                ContainerRef::Direct(id) => tx.execute(
                    "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![id.to_string(), new.created_at],
                )?,
            };

            tx.commit()?;
            Ok(())
        })
    }

    pub fn find_message(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    rusqlite::params![id.to_string()],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Messages in a container, ascending by creation timestamp. The
    /// optional `before` cursor selects the window of `limit` messages
    /// immediately older than it, still returned in ascending order.
    pub fn list_messages(
        &self,
        container: ContainerRef,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE container_kind = ?1 AND container_id = ?2
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(
                    rusqlite::params![
                        container.kind(),
                        container.id().to_string(),
                        before,
                        limit
                    ],
                    message_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.reverse();
            Ok(rows)
        })
    }

    pub fn latest_message(&self, container: ContainerRef) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {MESSAGE_COLUMNS} FROM messages
                         WHERE container_kind = ?1 AND container_id = ?2
                         ORDER BY created_at DESC, id DESC
                         LIMIT 1"
                    ),
                    rusqlite::params![container.kind(), container.id().to_string()],
                    message_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Messages newer than the viewer's read watermark, excluding their
    /// own. This is the unread count; it is derived on demand, never
    /// stored.
    pub fn unread_count(
        &self,
        container: ContainerRef,
        viewer: Uuid,
        last_read_at: Option<&str>,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE container_kind = ?1 AND container_id = ?2
                   AND author_id != ?3
                   AND (?4 IS NULL OR created_at > ?4)",
                rusqlite::params![
                    container.kind(),
                    container.id().to_string(),
                    viewer.to_string(),
                    last_read_at
                ],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }

    /// Batch-fetch attachments for a set of message ids.
    pub fn attachments_for_messages(&self, message_ids: &[String]) -> Result<Vec<AttachmentRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, url, kind, name FROM attachments WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(AttachmentRow {
                        id: row.get(0)?,
                        message_id: row.get(1)?,
                        url: row.get(2)?,
                        kind: row.get(3)?,
                        name: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Batch-fetch resolved mentions as (message_id, user_id) pairs.
    pub fn mentions_for_messages(&self, message_ids: &[String]) -> Result<Vec<(String, String)>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id FROM message_mentions WHERE message_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn message_from_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        container_kind: row.get(1)?,
        container_id: row.get(2)?,
        author_id: row.get(3)?,
        content: row.get(4)?,
        reply_to_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_util::{seed_channel, seed_message_at, test_db};
    use crate::{format_ts, now_ts};
    use chrono::{Duration, Utc};
    use concourse_types::models::ContainerRef;
    use uuid::Uuid;

    #[test]
    fn listing_is_ascending_regardless_of_insert_order() {
        let db = test_db();
        let owner = Uuid::new_v4();
        let container = ContainerRef::Channel(seed_channel(&db, "ops", owner));

        let base = Utc::now();
        // Inserted newest-first on purpose.
        let late = seed_message_at(&db, container, owner, "late", &format_ts(base + Duration::seconds(2)));
        let early = seed_message_at(&db, container, owner, "early", &format_ts(base));
        let middle = seed_message_at(&db, container, owner, "middle", &format_ts(base + Duration::seconds(1)));

        let rows = db.list_messages(container, 50, None).unwrap();
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        assert_eq!(
            ids,
            vec![early.to_string(), middle.to_string(), late.to_string()]
        );
    }

    #[test]
    fn before_cursor_selects_the_older_window() {
        let db = test_db();
        let owner = Uuid::new_v4();
        let container = ContainerRef::Channel(seed_channel(&db, "ops", owner));

        let base = Utc::now();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(seed_message_at(
                &db,
                container,
                owner,
                &format!("m{i}"),
                &format_ts(base + Duration::seconds(i)),
            ));
        }

        let cursor = format_ts(base + Duration::seconds(3));
        let rows = db.list_messages(container, 2, Some(&cursor)).unwrap();
        let got: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        assert_eq!(got, vec![ids[1].to_string(), ids[2].to_string()]);
    }

    #[test]
    fn containers_do_not_leak_into_each_other() {
        let db = test_db();
        let owner = Uuid::new_v4();
        let ops = ContainerRef::Channel(seed_channel(&db, "ops", owner));
        let lobby = ContainerRef::Channel(seed_channel(&db, "lobby", owner));

        seed_message_at(&db, ops, owner, "in ops", &now_ts());
        assert!(db.list_messages(lobby, 50, None).unwrap().is_empty());
        assert_eq!(db.list_messages(ops, 50, None).unwrap().len(), 1);
    }

    #[test]
    fn sending_touches_container_recency() {
        let db = test_db();
        let owner = Uuid::new_v4();
        let channel_id = seed_channel(&db, "ops", owner);
        let container = ContainerRef::Channel(channel_id);

        let sent_at = format_ts(Utc::now() + Duration::seconds(30));
        seed_message_at(&db, container, owner, "bump", &sent_at);

        let row = db.get_channel(channel_id).unwrap().unwrap();
        assert_eq!(row.updated_at, sent_at);
    }

    #[test]
    fn unread_count_excludes_own_messages_and_respects_watermark() {
        let db = test_db();
        let author = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let container = ContainerRef::Channel(seed_channel(&db, "ops", author));

        let base = Utc::now();
        for i in 0..3 {
            seed_message_at(&db, container, author, &format!("m{i}"), &format_ts(base + Duration::seconds(i)));
        }
        seed_message_at(&db, container, viewer, "mine", &format_ts(base + Duration::seconds(3)));

        // Never read: all three foreign messages count, own message does not.
        assert_eq!(db.unread_count(container, viewer, None).unwrap(), 3);

        // Watermark after the second message leaves one unread.
        let mark = format_ts(base + Duration::seconds(1));
        assert_eq!(db.unread_count(container, viewer, Some(&mark)).unwrap(), 1);
    }

    #[test]
    fn latest_message_wins_by_timestamp() {
        let db = test_db();
        let owner = Uuid::new_v4();
        let container = ContainerRef::Channel(seed_channel(&db, "ops", owner));

        let base = Utc::now();
        seed_message_at(&db, container, owner, "old", &format_ts(base));
        let newest = seed_message_at(&db, container, owner, "new", &format_ts(base + Duration::seconds(5)));

        let row = db.latest_message(container).unwrap().unwrap();
        assert_eq!(row.id, newest.to_string());
    }
}
