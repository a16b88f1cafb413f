//! Consent records.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use tracing::{info, instrument};

use crate::types::ConsentRecord;

/// Repository for per-user consent state.
#[derive(Clone)]
pub struct ConsentRepository {
    pool: SqlitePool,
}

impl ConsentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the consent record for a user, if one exists.
    pub async fn get(&self, user_id: &str) -> Result<Option<ConsentRecord>, anyhow::Error> {
        let row = sqlx::query("SELECT * FROM consents WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let accepted: i64 = r.try_get("accepted")?;
                let accepted_at: Option<String> = r.try_get("accepted_at")?;
                let accepted_at = match accepted_at {
                    Some(s) => Some(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc)),
                    None => None,
                };
                Ok(Some(ConsentRecord {
                    user_id: user_id.to_string(),
                    accepted: accepted != 0,
                    accepted_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// True when the user has an accepted consent record.
    pub async fn has_active_consent(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        Ok(self
            .get(user_id)
            .await?
            .map(|c| c.accepted)
            .unwrap_or(false))
    }

    /// Records consent for a user. Idempotent: re-recording refreshes `accepted_at`.
    #[instrument(skip(self))]
    pub async fn record_accept(&self, user_id: &str) -> Result<(), anyhow::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO consents (user_id, accepted, accepted_at)
            VALUES (?1, 1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET accepted = 1, accepted_at = ?2
            "#,
        )
        .bind(user_id)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!(user_id, "consent recorded");
        Ok(())
    }
}
