//! # Core Types
//!
//! This module defines the core types shared across the assistant.
//!
//! ## ChatRole
//!
//! Represents the role of a message in a conversation.
//!
//! ## ChatMessage
//!
//! A single message in the in-memory recent window; serialized to JSON when
//! the window is persisted.
//!
//! ## ChatTurn
//!
//! One persisted request/response cycle in the append-only conversation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Display label used in memory context and summarization prompts.
    pub fn label(&self) -> &'static str {
        match self {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        }
    }
}

/// A single chat message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// One request/response cycle in the append-only conversation log.
/// Created once per request; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Unique identifier.
    pub id: Uuid,
    pub user_id: String,
    pub session_id: String,
    /// Request-scoped idempotency token; inserting the same turn twice is a no-op.
    pub request_id: Uuid,
    pub user_message: String,
    pub bot_response: String,
    /// Classified intent label, absent for consent-gate turns.
    pub intent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Creates a new turn with generated id and timestamp.
    pub fn new(
        user_id: &str,
        session_id: &str,
        request_id: Uuid,
        user_message: &str,
        bot_response: &str,
        intent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            request_id,
            user_message: user_message.to_string(),
            bot_response: bot_response.to_string(),
            intent,
            timestamp: Utc::now(),
        }
    }
}

/// Consent state for a user. Gates all non-consent message handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub user_id: String,
    pub accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Diagnostic view of a user's memory state.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub summary_length: usize,
    pub recent_messages: usize,
    pub total_context_chars: usize,
    pub summary_age_minutes: Option<i64>,
    pub cache_limit_minutes: i64,
}
