use anyhow::{anyhow, Result};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::models::ConversationRow;
use crate::Database;

impl Database {
    /// Atomic find-or-insert for the conversation of an unordered user
    /// pair. The pair is normalized to (min, max) so (A,B) and (B,A) hit
    /// the same UNIQUE(user_a, user_b) row; concurrent first calls converge
    /// on one conversation, and the loser's candidate id is simply unused.
    ///
    /// Returns the row plus whether this call created it.
    pub fn get_or_create_conversation(
        &self,
        candidate_id: Uuid,
        x: Uuid,
        y: Uuid,
        now: &str,
    ) -> Result<(ConversationRow, bool)> {
        let (a, b) = if x <= y { (x, y) } else { (y, x) };

        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO conversations (id, user_a, user_b, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![
                    candidate_id.to_string(),
                    a.to_string(),
                    b.to_string(),
                    now
                ],
            )?;

            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, created_at, updated_at
                     FROM conversations WHERE user_a = ?1 AND user_b = ?2",
                    rusqlite::params![a.to_string(), b.to_string()],
                    conversation_from_row,
                )
                .optional()?
                .ok_or_else(|| anyhow!("conversation vanished after upsert"))?;

            Ok((row, inserted > 0))
        })
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, created_at, updated_at
                     FROM conversations WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                    conversation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM conversations
                     WHERE id = ?1 AND (user_a = ?2 OR user_b = ?2)",
                    rusqlite::params![conversation_id.to_string(), user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn conversations_for(&self, user_id: Uuid) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_a, user_b, created_at, updated_at
                 FROM conversations WHERE user_a = ?1 OR user_b = ?1",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![user_id.to_string()], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn conversation_from_row(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<ConversationRow, rusqlite::Error> {
    Ok(ConversationRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::now_ts;
    use crate::test_util::test_db;
    use uuid::Uuid;

    #[test]
    fn resolution_is_commutative() {
        let db = test_db();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (first, created) = db
            .get_or_create_conversation(Uuid::new_v4(), alice, bob, &now_ts())
            .unwrap();
        assert!(created);

        let (second, created_again) = db
            .get_or_create_conversation(Uuid::new_v4(), bob, alice, &now_ts())
            .unwrap();
        assert!(!created_again);
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn racing_first_calls_converge_on_one_row() {
        // Both sides resolve "for the first time" with their own candidate
        // ids; the UNIQUE pair constraint lets exactly one insert win.
        let db = test_db();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let candidate_a = Uuid::new_v4();
        let candidate_b = Uuid::new_v4();

        let (row_a, created_a) = db
            .get_or_create_conversation(candidate_a, alice, bob, &now_ts())
            .unwrap();
        let (row_b, created_b) = db
            .get_or_create_conversation(candidate_b, bob, alice, &now_ts())
            .unwrap();

        assert!(created_a);
        assert!(!created_b);
        assert_eq!(row_a.id, row_b.id);
        assert_eq!(row_a.id, candidate_a.to_string());
    }

    #[test]
    fn participants_are_stored_normalized() {
        let db = test_db();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (row, _) = db
            .get_or_create_conversation(Uuid::new_v4(), alice, bob, &now_ts())
            .unwrap();
        assert!(row.user_a <= row.user_b);
    }

    #[test]
    fn participant_checks() {
        let db = test_db();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let outsider = Uuid::new_v4();

        let (row, _) = db
            .get_or_create_conversation(Uuid::new_v4(), alice, bob, &now_ts())
            .unwrap();
        let id: Uuid = row.id.parse().unwrap();

        assert!(db.is_participant(id, alice).unwrap());
        assert!(db.is_participant(id, bob).unwrap());
        assert!(!db.is_participant(id, outsider).unwrap());

        assert_eq!(db.conversations_for(alice).unwrap().len(), 1);
        assert!(db.conversations_for(outsider).unwrap().is_empty());
    }
}
