use anyhow::Result;
use uuid::Uuid;

use crate::models::ReactionRow;
use crate::Database;

impl Database {
    /// Toggle one (message, user, emoji) triple: remove it if present,
    /// insert it otherwise. The whole toggle runs under the connection
    /// lock, so two users reacting at once each flip their own triple and
    /// neither overwrites the other's.
    ///
    /// Returns true when the reaction was added, false when removed.
    pub fn toggle_reaction(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        emoji: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                rusqlite::params![message_id.to_string(), user_id.to_string(), emoji],
            )?;

            if removed > 0 {
                return Ok(false);
            }

            conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![message_id.to_string(), user_id.to_string(), emoji, now],
            )?;
            Ok(true)
        })
    }

    /// Batch-fetch reactions for a set of message ids.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id, emoji, created_at
                 FROM reactions WHERE message_id IN ({})
                 ORDER BY created_at",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReactionRow {
                        message_id: row.get(0)?,
                        user_id: row.get(1)?,
                        emoji: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}
