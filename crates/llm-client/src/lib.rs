//! # LLM client abstraction
//!
//! Defines the [`LlmClient`] trait and an OpenAI-compatible implementation.
//! Transport-agnostic; used by the assistant's classifier, memory, and responder.

use anyhow::Result;
use async_trait::async_trait;

mod config;
mod openai_llm;

pub use config::{EnvLlmConfig, LlmConfig};
pub use openai_llm::OpenAILlmClient;

/// LLM client interface: request a single-turn completion for a prompt.
///
/// Implementations prepend their own system message and apply model and
/// temperature settings.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the model reply text for the given prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Masks an API key/token for safe logging: shows first 7 chars + "***" + last 4 chars.
/// If length <= 11, returns "***" to avoid leaking any part of the key.
pub fn mask_token(token: &str) -> String {
    let len = token.len();
    if len <= 11 {
        "***".to_string()
    } else {
        let head = &token[..7];
        let tail = &token[len - 4..];
        format!("{}***{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::mask_token;

    #[test]
    fn test_mask_token_short() {
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("elevenchars"), "***");
    }

    #[test]
    fn test_mask_token_long() {
        assert_eq!(mask_token("gsk_abcdefghijklmnop"), "gsk_abc***mnop");
    }
}
