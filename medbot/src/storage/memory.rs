//! Persistence for the two memory projections: the rolling summary (subject
//! to cache expiry) and the recent-message batch (its own non-expiring row).

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::instrument;

/// Persisted summary row: text plus its last-write timestamp. A row with no
/// timestamp is possible (malformed writes) and is treated as absent by the
/// memory load logic.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub summary: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Repository for `user_summaries` and `user_batches`.
#[derive(Clone)]
pub struct MemoryRepository {
    pool: SqlitePool,
}

impl MemoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ---------- Summary ----------

    /// Returns the summary row for a user, if one exists. A stored timestamp
    /// that fails to parse is returned as `None` (equivalent to absent).
    pub async fn load_summary(&self, user_id: &str) -> Result<Option<SummaryRow>, anyhow::Error> {
        let row = sqlx::query("SELECT summary, updated_at FROM user_summaries WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let summary: String = r.try_get("summary")?;
                let updated_at: Option<String> = r.try_get("updated_at")?;
                let updated_at = updated_at.and_then(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                });
                Ok(Some(SummaryRow {
                    summary,
                    updated_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Writes the summary row with an explicit timestamp (the memory passes
    /// `Utc::now()`; tests pass aged timestamps to drive expiry).
    #[instrument(skip(self, summary), fields(summary_len = summary.len()))]
    pub async fn upsert_summary(
        &self,
        user_id: &str,
        summary: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_summaries (user_id, summary, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET summary = ?2, updated_at = ?3
            "#,
        )
        .bind(user_id)
        .bind(summary)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the summary row entirely (cache expiry is deletion, not marking).
    pub async fn delete_summary(&self, user_id: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM user_summaries WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---------- Recent batch ----------

    /// Returns the raw JSON batch for a user, if a row exists.
    pub async fn load_batch(&self, user_id: &str) -> Result<Option<String>, anyhow::Error> {
        let row = sqlx::query("SELECT recent_messages FROM user_batches WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("recent_messages")?)),
            None => Ok(None),
        }
    }

    /// Writes the batch row (JSON array of messages).
    pub async fn save_batch(&self, user_id: &str, batch_json: &str) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_batches (user_id, recent_messages, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET recent_messages = ?2, updated_at = ?3
            "#,
        )
        .bind(user_id)
        .bind(batch_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes the batch row (only used when batch expiry is coupled to
    /// summary expiry via config).
    pub async fn delete_batch(&self, user_id: &str) -> Result<(), anyhow::Error> {
        sqlx::query("DELETE FROM user_batches WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
