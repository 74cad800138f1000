use anyhow::Result;
use concourse_types::models::ContainerRef;
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::Database;

impl Database {
    /// Move the viewer's read watermark for a container to `now`. Single-row
    /// upsert; the unread count is derived from this at projection time.
    pub fn mark_read(&self, container: ContainerRef, user_id: Uuid, now: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO read_state (container_kind, container_id, user_id, last_read_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (container_kind, container_id, user_id)
                 DO UPDATE SET last_read_at = excluded.last_read_at",
                rusqlite::params![
                    container.kind(),
                    container.id().to_string(),
                    user_id.to_string(),
                    now
                ],
            )?;
            Ok(())
        })
    }

    pub fn last_read_at(&self, container: ContainerRef, user_id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let ts = conn
                .query_row(
                    "SELECT last_read_at FROM read_state
                     WHERE container_kind = ?1 AND container_id = ?2 AND user_id = ?3",
                    rusqlite::params![
                        container.kind(),
                        container.id().to_string(),
                        user_id.to_string()
                    ],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(ts)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::test_util::{seed_channel, seed_message_at, test_db};
    use crate::{format_ts, now_ts};
    use chrono::{Duration, Utc};
    use concourse_types::models::ContainerRef;
    use uuid::Uuid;

    #[test]
    fn marking_read_zeroes_the_derived_count_until_new_activity() {
        let db = test_db();
        let author = Uuid::new_v4();
        let viewer = Uuid::new_v4();
        let container = ContainerRef::Channel(seed_channel(&db, "ops", author));

        let base = Utc::now();
        for i in 0..3 {
            seed_message_at(&db, container, author, &format!("m{i}"), &format_ts(base + Duration::seconds(i)));
        }

        let last_read = db.last_read_at(container, viewer).unwrap();
        assert_eq!(
            db.unread_count(container, viewer, last_read.as_deref()).unwrap(),
            3
        );

        // Opening the container marks it read.
        db.mark_read(container, viewer, &format_ts(base + Duration::seconds(10)))
            .unwrap();
        let last_read = db.last_read_at(container, viewer).unwrap();
        assert_eq!(
            db.unread_count(container, viewer, last_read.as_deref()).unwrap(),
            0
        );

        // A foreign message arriving afterwards counts again.
        seed_message_at(&db, container, author, "new", &format_ts(base + Duration::seconds(20)));
        assert_eq!(
            db.unread_count(container, viewer, last_read.as_deref()).unwrap(),
            1
        );
    }

    #[test]
    fn watermark_upsert_overwrites() {
        let db = test_db();
        let viewer = Uuid::new_v4();
        let container = ContainerRef::Direct(Uuid::new_v4());

        db.mark_read(container, viewer, "2026-01-01T00:00:00.000000+00:00")
            .unwrap();
        db.mark_read(container, viewer, &now_ts()).unwrap();

        let ts = db.last_read_at(container, viewer).unwrap().unwrap();
        assert_ne!(ts, "2026-01-01T00:00:00.000000+00:00");
    }
}
