//! SQLite persistence for memory buffers and emotion history.

use crate::buffer::MemoryBuffer;
use crate::types::Persona;
use companion_common::{ChatTurn, EmotionLabel, EmotionRecord, MessageKind, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Relational store behind the memory and emotion history.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `database_url` and migrate it.
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!(database_url = %database_url, "Opening memory store");

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every in-memory connection is its own database, so keep exactly one alive
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL UNIQUE,
                chat_history TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS emotion_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                emotion TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memory_archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_name TEXT NOT NULL,
                kind TEXT NOT NULL,
                content TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_emotion_history_user_time \
             ON emotion_history(user_name, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Memory store schema ready");
        Ok(())
    }

    /// Load a user's buffer, seeded with the preamble.
    ///
    /// A missing or unreadable record yields a fresh buffer.
    #[instrument(skip(self, persona))]
    pub async fn load_memory(&self, user_name: &str, persona: &Persona) -> Result<MemoryBuffer> {
        let record: Option<(String,)> =
            sqlx::query_as("SELECT chat_history FROM memory WHERE user_name = ?")
                .bind(user_name)
                .fetch_optional(&self.pool)
                .await?;

        let buffer = match record {
            Some((json,)) => MemoryBuffer::decode(&json, persona),
            None => {
                debug!("No stored memory, seeding a fresh buffer");
                MemoryBuffer::seeded(persona)
            }
        };
        Ok(buffer)
    }

    /// Replace the user's stored buffer.
    #[instrument(skip(self, buffer), fields(turns = buffer.len()))]
    pub async fn save_memory(&self, user_name: &str, buffer: &MemoryBuffer) -> Result<()> {
        let json = buffer.encode()?;
        sqlx::query(
            "INSERT INTO memory (user_name, chat_history) VALUES (?, ?) \
             ON CONFLICT(user_name) DO UPDATE SET chat_history = excluded.chat_history",
        )
        .bind(user_name)
        .bind(json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Keep turns pruned out of a user's buffer so they stay retrievable.
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn archive_turns(&self, user_name: &str, turns: &[ChatTurn]) -> Result<()> {
        if turns.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for turn in turns {
            sqlx::query("INSERT INTO memory_archive (user_name, kind, content) VALUES (?, ?, ?)")
                .bind(user_name)
                .bind(turn.kind.tag())
                .bind(&turn.content)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Archived turns in the order they were pruned, for one user or for
    /// everyone. `limit` keeps the newest; 0 means no limit.
    pub async fn archived_turns(
        &self,
        user_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<(String, ChatTurn)>> {
        // SQLite treats a negative LIMIT as unbounded
        let limit = if limit == 0 { -1 } else { limit as i64 };
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT user_name, kind, content FROM memory_archive \
             WHERE ? IS NULL OR user_name = ? ORDER BY id DESC LIMIT ?",
        )
        .bind(user_name)
        .bind(user_name)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns: Vec<(String, ChatTurn)> = rows
            .into_iter()
            .filter_map(|(user, kind, content)| match MessageKind::from_tag(&kind) {
                Some(kind) => Some((user, ChatTurn { kind, content })),
                None => {
                    warn!(kind = %kind, "Skipping archived turn with unknown kind");
                    None
                }
            })
            .collect();
        turns.reverse();
        Ok(turns)
    }

    /// Delete the user's stored buffer and archive. Returns whether anything
    /// was stored.
    pub async fn delete_memory(&self, user_name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let buffer = sqlx::query("DELETE FROM memory WHERE user_name = ?")
            .bind(user_name)
            .execute(&mut *tx)
            .await?;
        let archive = sqlx::query("DELETE FROM memory_archive WHERE user_name = ?")
            .bind(user_name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(buffer.rows_affected() + archive.rows_affected() > 0)
    }

    /// Every stored buffer, in insertion order.
    pub async fn all_memories(&self, persona: &Persona) -> Result<Vec<(String, MemoryBuffer)>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT user_name, chat_history FROM memory ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(user, json)| {
                let buffer = MemoryBuffer::decode(&json, persona);
                (user, buffer)
            })
            .collect())
    }

    /// Append an emotion record stamped with the current UTC time.
    #[instrument(skip(self))]
    pub async fn save_emotion(
        &self,
        user_name: &str,
        emotion: EmotionLabel,
    ) -> Result<EmotionRecord> {
        let timestamp = chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string();

        sqlx::query("INSERT INTO emotion_history (user_name, emotion, timestamp) VALUES (?, ?, ?)")
            .bind(user_name)
            .bind(emotion.as_str())
            .bind(&timestamp)
            .execute(&self.pool)
            .await?;

        Ok(EmotionRecord { emotion, timestamp })
    }

    /// The user's latest emotion records, newest first.
    pub async fn recent_emotions(
        &self,
        user_name: &str,
        limit: usize,
    ) -> Result<Vec<EmotionRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT emotion, timestamp FROM emotion_history \
             WHERE user_name = ? ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(user_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(emotion, timestamp)| match EmotionLabel::parse(&emotion) {
                Some(emotion) => Some(EmotionRecord { emotion, timestamp }),
                None => {
                    warn!(emotion = %emotion, "Skipping emotion record with unknown label");
                    None
                }
            })
            .collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_common::ChatTurn;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn missing_user_gets_seeded_buffer() {
        let store = memory_store().await;
        let persona = Persona::default();

        let buffer = store.load_memory("yeonji", &persona).await.unwrap();
        assert_eq!(buffer, MemoryBuffer::seeded(&persona));
    }

    #[tokio::test]
    async fn save_replaces_previous_record() {
        let store = memory_store().await;
        let persona = Persona::default();

        let mut buffer = MemoryBuffer::seeded(&persona);
        buffer.push_human("first");
        store.save_memory("yeonji", &buffer).await.unwrap();

        buffer.push_ai("reply");
        store.save_memory("yeonji", &buffer).await.unwrap();

        let all = store.all_memories(&persona).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1.last_ai(), Some(&ChatTurn::ai("reply")));
    }

    #[tokio::test]
    async fn corrupt_record_recovers_to_preamble() {
        let store = memory_store().await;
        let persona = Persona::default();

        sqlx::query("INSERT INTO memory (user_name, chat_history) VALUES (?, ?)")
            .bind("broken")
            .bind("not json at all")
            .execute(&store.pool)
            .await
            .unwrap();

        let buffer = store.load_memory("broken", &persona).await.unwrap();
        assert_eq!(buffer, MemoryBuffer::seeded(&persona));
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = memory_store().await;
        let persona = Persona::default();

        store
            .save_memory("yeonji", &MemoryBuffer::seeded(&persona))
            .await
            .unwrap();
        assert!(store.delete_memory("yeonji").await.unwrap());
        assert!(!store.delete_memory("yeonji").await.unwrap());
    }

    #[tokio::test]
    async fn archive_keeps_pruned_turns_in_order() {
        let store = memory_store().await;

        store
            .archive_turns("yeonji", &[ChatTurn::human("q0"), ChatTurn::ai("a0")])
            .await
            .unwrap();
        store
            .archive_turns("minho", &[ChatTurn::human("pizza?")])
            .await
            .unwrap();
        store
            .archive_turns("yeonji", &[ChatTurn::human("q1")])
            .await
            .unwrap();

        let mine = store.archived_turns(Some("yeonji"), 0).await.unwrap();
        let contents: Vec<&str> = mine.iter().map(|(_, t)| t.content.as_str()).collect();
        assert_eq!(contents, vec!["q0", "a0", "q1"]);
        assert_eq!(mine[1].1, ChatTurn::ai("a0"));

        let newest = store.archived_turns(None, 2).await.unwrap();
        assert_eq!(newest[0], ("minho".to_string(), ChatTurn::human("pizza?")));
        assert_eq!(newest[1], ("yeonji".to_string(), ChatTurn::human("q1")));
    }

    #[tokio::test]
    async fn delete_clears_archive_too() {
        let store = memory_store().await;

        store
            .archive_turns("yeonji", &[ChatTurn::human("old")])
            .await
            .unwrap();
        assert!(store.delete_memory("yeonji").await.unwrap());
        assert!(store.archived_turns(Some("yeonji"), 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recent_emotions_are_newest_first_and_limited() {
        let store = memory_store().await;

        let labels = [
            EmotionLabel::Positive,
            EmotionLabel::Neutral,
            EmotionLabel::Negative,
            EmotionLabel::SuperNegative,
        ];
        for label in labels {
            store.save_emotion("yeonji", label).await.unwrap();
        }
        store
            .save_emotion("someone-else", EmotionLabel::SuperPositive)
            .await
            .unwrap();

        let recent = store.recent_emotions("yeonji", 3).await.unwrap();
        let emotions: Vec<EmotionLabel> = recent.iter().map(|r| r.emotion).collect();
        assert_eq!(
            emotions,
            vec![
                EmotionLabel::SuperNegative,
                EmotionLabel::Negative,
                EmotionLabel::Neutral
            ]
        );
    }

    #[tokio::test]
    async fn saved_emotion_has_formatted_timestamp() {
        let store = memory_store().await;
        let record = store
            .save_emotion("yeonji", EmotionLabel::Neutral)
            .await
            .unwrap();

        assert!(chrono::NaiveDateTime::parse_from_str(&record.timestamp, TIMESTAMP_FORMAT).is_ok());
    }
}
