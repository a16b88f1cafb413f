//! Append-only conversation log.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::types::ChatTurn;

/// Repository for the append-only `chat_turns` log.
///
/// Writes are idempotent: the `request_id` column carries a UNIQUE index and
/// inserts use `INSERT OR IGNORE`, so replaying a turn after a partial
/// failure cannot duplicate history.
#[derive(Clone)]
pub struct TurnRepository {
    pool: SqlitePool,
}

impl TurnRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a turn. A second insert with the same `request_id` is a no-op.
    #[instrument(skip(self, turn), fields(user_id = %turn.user_id, request_id = %turn.request_id))]
    pub async fn save(&self, turn: &ChatTurn) -> Result<(), anyhow::Error> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO chat_turns (
                id, user_id, session_id, request_id, user_message,
                bot_response, intent, timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(turn.id.to_string())
        .bind(&turn.user_id)
        .bind(&turn.session_id)
        .bind(turn.request_id.to_string())
        .bind(&turn.user_message)
        .bind(&turn.bot_response)
        .bind(&turn.intent)
        .bind(turn.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("turn already logged, skipping");
        }

        Ok(())
    }

    /// Returns the most recent `limit` turns for a user, oldest first.
    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<ChatTurn>, anyhow::Error> {
        let rows = sqlx::query(
            "SELECT * FROM chat_turns WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut turns = Vec::new();
        for row in rows {
            turns.push(Self::row_to_turn(&row)?);
        }
        turns.reverse();

        Ok(turns)
    }

    /// Returns the number of logged turns for a user.
    pub async fn count(&self, user_id: &str) -> Result<i64, anyhow::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chat_turns WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n)
    }

    /// Returns the intent label of the user's most recent turn, if any.
    /// Consent-gate turns carry no label and yield `None`.
    pub async fn last_intent(&self, user_id: &str) -> Result<Option<String>, anyhow::Error> {
        let row = sqlx::query(
            "SELECT intent FROM chat_turns WHERE user_id = ?1 ORDER BY timestamp DESC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.try_get("intent")?),
            None => Ok(None),
        }
    }

    /// Converts a row to a ChatTurn.
    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<ChatTurn, anyhow::Error> {
        let id: String = row.try_get("id")?;
        let user_id: String = row.try_get("user_id")?;
        let session_id: String = row.try_get("session_id")?;
        let request_id: String = row.try_get("request_id")?;
        let user_message: String = row.try_get("user_message")?;
        let bot_response: String = row.try_get("bot_response")?;
        let intent: Option<String> = row.try_get("intent")?;
        let timestamp_str: String = row.try_get("timestamp")?;

        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp_str)?.with_timezone(&Utc);

        Ok(ChatTurn {
            id: Uuid::from_str(&id)?,
            user_id,
            session_id,
            request_id: Uuid::from_str(&request_id)?,
            user_message,
            bot_response,
            intent,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::create_test_database;

    fn turn(user_id: &str, request_id: Uuid, msg: &str, intent: Option<&str>) -> ChatTurn {
        ChatTurn::new(
            user_id,
            "session-1",
            request_id,
            msg,
            "reply",
            intent.map(String::from),
        )
    }

    #[tokio::test]
    async fn test_save_and_history() {
        let db = create_test_database().await;
        let repo = TurnRepository::new(db.pool().clone());

        repo.save(&turn("u1", Uuid::new_v4(), "first", Some("MEDICAL")))
            .await
            .unwrap();
        repo.save(&turn("u1", Uuid::new_v4(), "second", Some("GENERAL_CHAT")))
            .await
            .unwrap();

        let history = repo.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].user_message, "first");
        assert_eq!(history[1].user_message, "second");
    }

    #[tokio::test]
    async fn test_save_is_idempotent_per_request() {
        let db = create_test_database().await;
        let repo = TurnRepository::new(db.pool().clone());

        let request_id = Uuid::new_v4();
        let t = turn("u1", request_id, "hello", None);
        repo.save(&t).await.unwrap();
        repo.save(&t).await.unwrap();

        assert_eq!(repo.count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_last_intent() {
        let db = create_test_database().await;
        let repo = TurnRepository::new(db.pool().clone());

        assert_eq!(repo.last_intent("u1").await.unwrap(), None);

        repo.save(&turn("u1", Uuid::new_v4(), "q", Some("AMBIGUOUS")))
            .await
            .unwrap();

        assert_eq!(
            repo.last_intent("u1").await.unwrap(),
            Some("AMBIGUOUS".to_string())
        );
    }

    #[tokio::test]
    async fn test_history_is_per_user() {
        let db = create_test_database().await;
        let repo = TurnRepository::new(db.pool().clone());

        repo.save(&turn("u1", Uuid::new_v4(), "mine", None))
            .await
            .unwrap();
        repo.save(&turn("u2", Uuid::new_v4(), "theirs", None))
            .await
            .unwrap();

        let history = repo.history("u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].user_message, "mine");
    }
}
