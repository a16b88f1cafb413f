//! # Conversation Memory
//!
//! The state machine at the center of the assistant. Per user it maintains:
//!
//! - a bounded window of recent messages (`recent_messages`), persisted on
//!   every turn in its own non-expiring row, and
//! - a rolling natural-language summary of everything older, persisted with a
//!   timestamp and expired (deleted wholesale) once it outlives the cache
//!   window.
//!
//! Summary states: EMPTY → ACTIVE (fresh) → ACTIVE (stale, pending expiry
//! check) → EMPTY (after expiry). The transition is evaluated once per
//! [`ConversationMemory::load`].
//!
//! When the window reaches `batch_size` messages it is collapsed: one model
//! call condenses the whole batch, a second merges it into any prior summary
//! (replacing, not concatenating, so growth stays bounded), and the window is
//! cleared. Summarizing in discrete batches bounds the number of model calls
//! to O(turns / batch_size) while keeping the context handed to the model
//! bounded regardless of conversation length.
//!
//! Failure posture: persistence errors fall back to an empty in-memory state
//! for the turn, summarization errors fall back to a placeholder string;
//! neither aborts the request.

use chrono::{DateTime, Duration, Utc};
use llm_client::LlmClient;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::storage::MemoryRepository;
use crate::types::{ChatMessage, MemoryStats};

/// Section header for the summarized portion of the context.
pub const SECTION_SUMMARY: &str = "[Summary of earlier conversation]";
/// Section header for the recent window.
pub const SECTION_RECENT: &str = "[Recent conversation]";

fn summarize_prompt(conversation: &str) -> String {
    format!(
        "Summarize this medical conversation in 5-10 sentences.\n\
         Keep only clinically relevant information.\n\n\
         Conversation:\n{conversation}\n\nSummary:"
    )
}

fn merge_prompt(old: &str, new: &str) -> String {
    format!(
        "Merge these two medical conversation summaries into one concise summary (5-10 sentences max).\n\
         Keep clinically relevant information.\n\n\
         Older summary:\n{old}\n\n\
         Recent summary:\n{new}\n\nMerged summary:"
    )
}

/// Batch-summarizing conversation memory for one user.
pub struct ConversationMemory {
    repo: MemoryRepository,
    llm: Arc<dyn LlmClient>,
    user_id: String,
    /// Window bound in individual messages; a configured N pairs is 2N here.
    batch_size: usize,
    cache_minutes: i64,
    expire_batch_with_summary: bool,

    recent_messages: Vec<ChatMessage>,
    summary: String,
    summary_updated_at: Option<DateTime<Utc>>,
}

impl ConversationMemory {
    /// Creates an unloaded memory. `batch_pairs` is the configured window in
    /// message pairs and is even-normalized to `2 * batch_pairs` messages.
    pub fn new(
        repo: MemoryRepository,
        llm: Arc<dyn LlmClient>,
        user_id: &str,
        batch_pairs: u32,
        cache_minutes: i64,
        expire_batch_with_summary: bool,
    ) -> Self {
        Self {
            repo,
            llm,
            user_id: user_id.to_string(),
            batch_size: batch_pairs as usize * 2,
            cache_minutes,
            expire_batch_with_summary,
            recent_messages: Vec::new(),
            summary: String::new(),
            summary_updated_at: None,
        }
    }

    // ---------- Accessors ----------

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn recent_messages(&self) -> &[ChatMessage] {
        &self.recent_messages
    }

    // ---------- Load / expiry ----------

    /// Loads persisted state, evaluating the summary expiry transition.
    /// Never fails: a persistence error leaves an empty in-memory state.
    #[instrument(skip(self), fields(user_id = %self.user_id))]
    pub async fn load(&mut self) {
        if let Err(e) = self.load_summary().await {
            for (i, cause) in e.chain().enumerate() {
                if i == 0 {
                    warn!(cause = %cause, "Memory load failed, starting empty");
                } else {
                    warn!(cause = %cause, "Caused by");
                }
            }
            self.summary.clear();
            self.summary_updated_at = None;
        }

        // The batch row is loaded independently of summary expiry.
        self.load_batch().await;
    }

    async fn load_summary(&mut self) -> Result<(), anyhow::Error> {
        self.summary.clear();
        self.summary_updated_at = None;

        let row = match self.repo.load_summary(&self.user_id).await? {
            Some(row) => row,
            None => {
                debug!("no summary in database, starting fresh");
                return Ok(());
            }
        };

        let updated_at = match row.updated_at {
            Some(t) => t,
            None => {
                // Malformed row: equivalent to absent.
                warn!("summary has no timestamp, treating as absent");
                return Ok(());
            }
        };

        let age = Utc::now() - updated_at;
        if age > Duration::minutes(self.cache_minutes) {
            info!(
                age_minutes = age.num_minutes(),
                cache_minutes = self.cache_minutes,
                "summary expired, deleting"
            );
            self.repo.delete_summary(&self.user_id).await?;
            if self.expire_batch_with_summary {
                self.repo.delete_batch(&self.user_id).await?;
            }
        } else {
            debug!(
                age_minutes = age.num_minutes(),
                cache_minutes = self.cache_minutes,
                "summary still fresh, keeping"
            );
            self.summary = row.summary;
            self.summary_updated_at = Some(updated_at);
        }

        Ok(())
    }

    async fn load_batch(&mut self) {
        self.recent_messages = match self.repo.load_batch(&self.user_id).await {
            Ok(Some(json)) => match serde_json::from_str::<Vec<ChatMessage>>(&json) {
                Ok(messages) => {
                    debug!(count = messages.len(), "loaded batch from database");
                    messages
                }
                Err(e) => {
                    // Corrupt JSON is equivalent to an absent batch.
                    warn!(error = %e, "failed to parse batch JSON, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to load batch, starting empty");
                Vec::new()
            }
        };
    }

    // ---------- Turn recording / batch collapse ----------

    /// Appends a user/assistant message pair, persists the window, and
    /// collapses it into the summary once it reaches `batch_size`.
    #[instrument(skip(self, user_message, bot_response), fields(user_id = %self.user_id))]
    pub async fn add_message(&mut self, user_message: &str, bot_response: &str) {
        self.recent_messages.push(ChatMessage::user(user_message));
        self.recent_messages.push(ChatMessage::assistant(bot_response));

        debug!(
            count = self.recent_messages.len(),
            batch_size = self.batch_size,
            "message pair added to memory"
        );

        // Persist immediately so a crash loses at most the in-flight turn.
        self.save_batch().await;

        if self.recent_messages.len() >= self.batch_size {
            self.collapse_batch().await;
        }
    }

    /// Collapses the full window into the rolling summary and clears it.
    async fn collapse_batch(&mut self) {
        info!(
            count = self.recent_messages.len(),
            "batch collapse triggered"
        );

        let batch_summary = self.summarize_batch().await;

        self.summary = if self.summary.is_empty() {
            batch_summary
        } else {
            self.merge_summaries(&batch_summary).await
        };

        self.recent_messages.clear();

        self.save_summary().await;
        self.save_batch().await;

        info!(summary_len = self.summary.len(), "batch collapse complete");
    }

    /// Condenses the current window via one model call. The prompt always
    /// carries the full batch text so no turn can be silently dropped.
    async fn summarize_batch(&self) -> String {
        let mut conversation = String::new();
        for msg in &self.recent_messages {
            conversation.push_str(msg.role.label());
            conversation.push_str(": ");
            conversation.push_str(&msg.content);
            conversation.push('\n');
        }

        match self.llm.complete(&summarize_prompt(&conversation)).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "batch summarization failed, using placeholder");
                format!("Discussed {} messages", self.recent_messages.len())
            }
        }
    }

    /// Merges the existing summary with the fresh batch summary into one
    /// concise replacement. Falls back to concatenation on model failure.
    async fn merge_summaries(&self, batch_summary: &str) -> String {
        match self
            .llm
            .complete(&merge_prompt(&self.summary, batch_summary))
            .await
        {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "summary merge failed, concatenating");
                format!("{} {}", self.summary, batch_summary)
            }
        }
    }

    // ---------- Persistence ----------

    async fn save_batch(&self) {
        let json = match serde_json::to_string(&self.recent_messages) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize batch");
                return;
            }
        };

        if let Err(e) = self.repo.save_batch(&self.user_id, &json).await {
            warn!(error = %e, "failed to save batch");
        }
    }

    async fn save_summary(&mut self) {
        if self.summary.is_empty() {
            debug!("no summary to save");
            return;
        }

        let now = Utc::now();
        match self.repo.upsert_summary(&self.user_id, &self.summary, now).await {
            Ok(()) => {
                self.summary_updated_at = Some(now);
                debug!(
                    cache_minutes = self.cache_minutes,
                    "summary saved, cache window restarted"
                );
            }
            Err(e) => {
                warn!(error = %e, "failed to save summary");
            }
        }
    }

    // ---------- Context / stats ----------

    /// Serializes the memory for inclusion in a model prompt: the labeled
    /// summary block (when non-empty) followed by the labeled recent window.
    /// Formatting is stable; it is asserted in tests.
    pub fn memory_context(&self) -> String {
        let mut context = String::new();

        if !self.summary.is_empty() {
            context.push_str(SECTION_SUMMARY);
            context.push('\n');
            context.push_str(&self.summary);
            context.push_str("\n\n");
        }

        if !self.recent_messages.is_empty() {
            context.push_str(SECTION_RECENT);
            context.push('\n');
            for msg in &self.recent_messages {
                context.push_str(msg.role.label());
                context.push_str(": ");
                context.push_str(&msg.content);
                context.push('\n');
            }
        }

        context.trim().to_string()
    }

    /// Diagnostic statistics for the current in-memory state.
    pub fn stats(&self) -> MemoryStats {
        let total_context_chars = self.summary.len()
            + self
                .recent_messages
                .iter()
                .map(|m| m.content.len())
                .sum::<usize>();

        let summary_age_minutes = self
            .summary_updated_at
            .map(|t| (Utc::now() - t).num_minutes());

        MemoryStats {
            summary_length: self.summary.len(),
            recent_messages: self.recent_messages.len(),
            total_context_chars,
            summary_age_minutes,
            cache_limit_minutes: self.cache_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{create_test_database, Database};
    use crate::testutil::StubLlm;

    const CACHE_MINUTES: i64 = 2;

    async fn create_memory(
        db: &Database,
        llm: Arc<StubLlm>,
        batch_pairs: u32,
    ) -> ConversationMemory {
        ConversationMemory::new(
            MemoryRepository::new(db.pool().clone()),
            llm,
            "u1",
            batch_pairs,
            CACHE_MINUTES,
            false,
        )
    }

    #[tokio::test]
    async fn test_window_stays_below_batch_size() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new("condensed summary"));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        for i in 0..10 {
            memory
                .add_message(&format!("question {i}"), &format!("answer {i}"))
                .await;
            assert!(memory.recent_messages().len() < 4);
        }
    }

    #[tokio::test]
    async fn test_collapse_at_threshold() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new("patient asked about headaches and sleep"));
        let mut memory = create_memory(&db, llm.clone(), 2).await;
        memory.load().await;

        memory.add_message("I have headaches", "Tell me more").await;
        assert_eq!(memory.recent_messages().len(), 2);
        assert!(memory.summary().is_empty());
        assert_eq!(llm.calls(), 0);

        memory.add_message("They start at night", "Noted").await;
        assert_eq!(memory.recent_messages().len(), 0);
        assert_eq!(memory.summary(), "patient asked about headaches and sleep");
        assert_eq!(llm.calls(), 1);

        // Collapsed state is persisted: a fresh load sees it.
        let mut reloaded = create_memory(&db, llm, 2).await;
        reloaded.load().await;
        assert_eq!(reloaded.summary(), "patient asked about headaches and sleep");
        assert!(reloaded.recent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_collapse_prompt_contains_full_batch() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new("summary"));
        let mut memory = create_memory(&db, llm.clone(), 1).await;
        memory.load().await;

        memory
            .add_message("chest discomfort after exercise", "please see a doctor promptly")
            .await;

        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("User: chest discomfort after exercise"));
        assert!(prompts[0].contains("Assistant: please see a doctor promptly"));
    }

    #[tokio::test]
    async fn test_merge_replaces_not_concatenates() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm.clone(), 1).await;
        memory.load().await;

        llm.push_reply("first summary");
        memory.add_message("q1", "a1").await;
        assert_eq!(memory.summary(), "first summary");

        llm.push_reply("second summary");
        llm.push_reply("merged replacement");
        memory.add_message("q2", "a2").await;

        assert_eq!(memory.summary(), "merged replacement");
        // Merge prompt carried both the old summary and the new batch summary.
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("first summary"));
        assert!(prompts[2].contains("second summary"));
    }

    #[tokio::test]
    async fn test_summarizer_failure_uses_placeholder() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new("unused"));
        llm.set_fail(true);
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        memory.add_message("q1", "a1").await;
        memory.add_message("q2", "a2").await;

        assert_eq!(memory.summary(), "Discussed 4 messages");
        assert!(memory.recent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_merge_failure_concatenates() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm.clone(), 1).await;
        memory.load().await;

        llm.push_reply("old part");
        memory.add_message("q1", "a1").await;

        llm.push_reply("new part");
        llm.fail_after(2); // summarize succeeds, merge fails
        memory.add_message("q2", "a2").await;

        assert_eq!(memory.summary(), "old part new part");
    }

    #[tokio::test]
    async fn test_expired_summary_is_deleted_on_load() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        let aged = Utc::now() - Duration::minutes(CACHE_MINUTES + 1);
        repo.upsert_summary("u1", "stale content", aged).await.unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert!(memory.summary().is_empty());
        // Deletion, not just staleness: the persisted row is gone.
        assert!(repo.load_summary("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fresh_summary_is_preserved_verbatim() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        let recent = Utc::now() - Duration::minutes(CACHE_MINUTES - 1);
        repo.upsert_summary("u1", "fresh content", recent).await.unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert_eq!(memory.summary(), "fresh content");
    }

    #[tokio::test]
    async fn test_summary_without_timestamp_is_absent() {
        let db = create_test_database().await;
        sqlx::query(
            "INSERT INTO user_summaries (user_id, summary, updated_at) VALUES ('u1', 'orphan', NULL)",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert!(memory.summary().is_empty());
    }

    #[tokio::test]
    async fn test_batch_survives_summary_expiry() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        let aged = Utc::now() - Duration::minutes(CACHE_MINUTES + 1);
        repo.upsert_summary("u1", "stale", aged).await.unwrap();
        repo.save_batch("u1", r#"[{"role":"user","content":"still here"}]"#)
            .await
            .unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert!(memory.summary().is_empty());
        assert_eq!(memory.recent_messages().len(), 1);
        assert_eq!(memory.recent_messages()[0].content, "still here");
    }

    #[tokio::test]
    async fn test_coupled_batch_expiry_when_configured() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        let aged = Utc::now() - Duration::minutes(CACHE_MINUTES + 1);
        repo.upsert_summary("u1", "stale", aged).await.unwrap();
        repo.save_batch("u1", r#"[{"role":"user","content":"gone too"}]"#)
            .await
            .unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = ConversationMemory::new(
            MemoryRepository::new(db.pool().clone()),
            llm,
            "u1",
            2,
            CACHE_MINUTES,
            true,
        );
        memory.load().await;

        assert!(memory.summary().is_empty());
        assert!(memory.recent_messages().is_empty());
        assert!(repo.load_batch("u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_batch_json_is_absent() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        repo.save_batch("u1", "not valid json {{{").await.unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert!(memory.recent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_memory_context_format() {
        let db = create_test_database().await;
        let repo = MemoryRepository::new(db.pool().clone());
        repo.upsert_summary("u1", "earlier we discussed migraines", Utc::now())
            .await
            .unwrap();

        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 4).await;
        memory.load().await;
        memory.add_message("any update?", "drink water").await;

        let context = memory.memory_context();
        assert_eq!(
            context,
            "[Summary of earlier conversation]\nearlier we discussed migraines\n\n\
             [Recent conversation]\nUser: any update?\nAssistant: drink water"
        );
    }

    #[tokio::test]
    async fn test_memory_context_empty() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 2).await;
        memory.load().await;

        assert_eq!(memory.memory_context(), "");
    }

    #[tokio::test]
    async fn test_stats() {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new(""));
        let mut memory = create_memory(&db, llm, 4).await;
        memory.load().await;
        memory.add_message("hi", "hello").await;

        let stats = memory.stats();
        assert_eq!(stats.summary_length, 0);
        assert_eq!(stats.recent_messages, 2);
        assert_eq!(stats.total_context_chars, 7);
        assert_eq!(stats.cache_limit_minutes, CACHE_MINUTES);
        assert!(stats.summary_age_minutes.is_none());
    }
}
