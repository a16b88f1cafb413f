//! Assistant configuration: trait and env-based implementation.

use anyhow::Result;
use std::env;

use crate::templates::Language;

/// Assistant configuration interface.
pub trait AssistantConfig: Send + Sync {
    /// Summarization window in message pairs; the memory normalizes this to
    /// `2 * batch_size` individual messages.
    fn batch_size(&self) -> u32;
    /// Summary expiry in minutes.
    fn cache_minutes(&self) -> i64;
    /// Documents retrieved per medical query.
    fn top_k(&self) -> usize;
    /// Default response language.
    fn language(&self) -> Language;
    /// SQLite database path.
    fn database_url(&self) -> &str;
    /// When true, the persisted recent-message batch is cleared together with
    /// an expired summary instead of surviving it.
    fn expire_batch_with_summary(&self) -> bool;
}

/// Assistant config loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EnvAssistantConfig {
    pub batch_size: u32,
    pub cache_minutes: i64,
    pub top_k: usize,
    pub language: Language,
    pub database_url: String,
    pub expire_batch_with_summary: bool,
}

impl AssistantConfig for EnvAssistantConfig {
    fn batch_size(&self) -> u32 {
        self.batch_size
    }
    fn cache_minutes(&self) -> i64 {
        self.cache_minutes
    }
    fn top_k(&self) -> usize {
        self.top_k
    }
    fn language(&self) -> Language {
        self.language
    }
    fn database_url(&self) -> &str {
        &self.database_url
    }
    fn expire_batch_with_summary(&self) -> bool {
        self.expire_batch_with_summary
    }
}

impl EnvAssistantConfig {
    /// Load from environment variables.
    pub fn from_env() -> Result<Self> {
        let batch_size = env::var("BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4);
        let cache_minutes = env::var("CACHE_MINUTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);
        let top_k = env::var("TOP_K")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);
        let language = env::var("LANGUAGE")
            .ok()
            .map(|s| Language::parse(&s))
            .unwrap_or(Language::En);
        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "medbot.db".to_string());
        let expire_batch_with_summary = env::var("EXPIRE_BATCH_WITH_SUMMARY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);
        Ok(Self {
            batch_size,
            cache_minutes,
            top_k,
            language,
            database_url,
            expire_batch_with_summary,
        })
    }

    /// Validate config values.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be at least 1 pair");
        }
        if self.cache_minutes <= 0 {
            anyhow::bail!("CACHE_MINUTES must be positive");
        }
        if self.top_k == 0 {
            anyhow::bail!("TOP_K must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = EnvAssistantConfig {
            batch_size: 0,
            cache_minutes: 2,
            top_k: 3,
            language: Language::En,
            database_url: "test.db".to_string(),
            expire_batch_with_summary: false,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = EnvAssistantConfig {
            batch_size: 4,
            cache_minutes: 2,
            top_k: 3,
            language: Language::En,
            database_url: "test.db".to_string(),
            expire_batch_with_summary: false,
        };
        assert!(config.validate().is_ok());
    }
}
