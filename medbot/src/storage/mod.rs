//! # Persistence
//!
//! SQLite-backed storage for the assistant: the conversation log, consent
//! records, and the two memory projections (summary + recent batch).
//!
//! One [`Database`] owns the connection pool and creates the schema; the
//! repositories are thin per-table accessors sharing that pool. Each call is
//! transactional on its own; there is no cross-table transaction. All writes
//! are keyed upserts or idempotent inserts, so partial progress across the
//! turn log and memory tables is tolerable.
//!
//! ## Schema
//!
//! ```sql
//! chat_turns(id, user_id, session_id, request_id UNIQUE, user_message,
//!            bot_response, intent, timestamp)
//! user_summaries(user_id PRIMARY KEY, summary, updated_at)
//! user_batches(user_id PRIMARY KEY, recent_messages, updated_at)
//! consents(user_id PRIMARY KEY, accepted, accepted_at)
//! documents(id, content, metadata, embedding BLOB)
//! ```
//!
//! Timestamps are RFC 3339 text; embeddings are little-endian f32 BLOBs;
//! the recent-message batch is a JSON array.

use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};

mod consent;
mod memory;
mod turns;

pub use consent::ConsentRepository;
pub use memory::MemoryRepository;
pub use turns::TurnRepository;

/// Shared SQLite database handle. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database file and initializes the schema.
    pub async fn connect(database_url: &str) -> Result<Self, anyhow::Error> {
        let options = SqliteConnectOptions::new()
            .create_if_missing(true)
            .filename(database_url);

        let pool = SqlitePool::connect_with(options).await?;

        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Initializes the database schema.
    async fn init_schema(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_turns (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                request_id TEXT NOT NULL UNIQUE,
                user_message TEXT NOT NULL,
                bot_response TEXT NOT NULL,
                intent TEXT,
                timestamp TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_user_id ON chat_turns(user_id);
            CREATE INDEX IF NOT EXISTS idx_turns_session_id ON chat_turns(session_id);
            CREATE INDEX IF NOT EXISTS idx_turns_timestamp ON chat_turns(timestamp);

            CREATE TABLE IF NOT EXISTS user_summaries (
                user_id TEXT PRIMARY KEY,
                summary TEXT NOT NULL,
                updated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS user_batches (
                user_id TEXT PRIMARY KEY,
                recent_messages TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS consents (
                user_id TEXT PRIMARY KEY,
                accepted INTEGER NOT NULL DEFAULT 0,
                accepted_at TEXT
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                metadata TEXT,
                embedding BLOB NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the underlying pool for repositories and the document store.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
pub(crate) async fn create_test_database() -> Database {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let path = db_path.to_str().unwrap().to_string();

    let db = Database::connect(&path).await.unwrap();

    std::mem::forget(temp_dir);

    db
}
