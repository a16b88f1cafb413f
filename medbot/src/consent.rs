//! # Consent Gate
//!
//! Small state machine gating all substantive processing until the user
//! affirms data-use consent. Evaluated before intent classification on every
//! turn; a user with no accepted record only ever sees the consent prompt or
//! the confirmation, never an answer.

use tracing::{info, instrument};

use crate::storage::ConsentRepository;

/// Outcome of evaluating a message against the consent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentOutcome {
    /// Consent already on record; caller proceeds to intent classification.
    Granted,
    /// No consent and the message is not affirmative; caller sends the
    /// consent-request text and must not classify.
    Prompt,
    /// The message affirmed consent; it is now persisted. Caller sends the
    /// confirmation text and still does not answer this turn.
    Confirmed,
}

/// Affirmative keywords, matched case-insensitively as substrings.
/// English plus Hindi equivalents (romanized and Devanagari).
const CONSENT_KEYWORDS: &[&str] = &[
    "agree", "consent", "accept", "yes", "ok", "haan", "theek hai", "सहमत", "सहमति", "स्वीकार",
    "हाँ", "हां",
];

/// The consent gate. Holds the consent repository; gate logic itself cannot
/// fail, only persistence can, and that propagates to the caller.
#[derive(Clone)]
pub struct ConsentGate {
    repo: ConsentRepository,
}

impl ConsentGate {
    pub fn new(repo: ConsentRepository) -> Self {
        Self { repo }
    }

    /// Returns true when the message contains an affirmative keyword.
    pub fn is_affirmative(message: &str) -> bool {
        let lower = message.to_lowercase();
        CONSENT_KEYWORDS.iter().any(|k| lower.contains(k))
    }

    /// True when the user already has consent on record.
    pub async fn has_consent(&self, user_id: &str) -> Result<bool, anyhow::Error> {
        self.repo.has_active_consent(user_id).await
    }

    /// Evaluates a message against the user's consent state.
    #[instrument(skip(self, message))]
    pub async fn evaluate(
        &self,
        user_id: &str,
        message: &str,
    ) -> Result<ConsentOutcome, anyhow::Error> {
        if self.repo.has_active_consent(user_id).await? {
            return Ok(ConsentOutcome::Granted);
        }

        if Self::is_affirmative(message) {
            self.repo.record_accept(user_id).await?;
            info!(user_id, "consent confirmed");
            Ok(ConsentOutcome::Confirmed)
        } else {
            info!(user_id, "consent not yet given, prompting");
            Ok(ConsentOutcome::Prompt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::create_test_database;

    async fn create_gate() -> ConsentGate {
        let db = create_test_database().await;
        ConsentGate::new(ConsentRepository::new(db.pool().clone()))
    }

    #[test]
    fn test_affirmative_detection() {
        assert!(ConsentGate::is_affirmative("I agree"));
        assert!(ConsentGate::is_affirmative("YES"));
        assert!(ConsentGate::is_affirmative("ok then"));
        assert!(ConsentGate::is_affirmative("हाँ"));
        assert!(!ConsentGate::is_affirmative("hello"));
        assert!(!ConsentGate::is_affirmative("what is blood pressure"));
    }

    #[tokio::test]
    async fn test_new_user_prompted() {
        let gate = create_gate().await;
        let outcome = gate.evaluate("u1", "hello").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Prompt);

        // Still not consented afterwards.
        let outcome = gate.evaluate("u1", "tell me something").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Prompt);
    }

    #[tokio::test]
    async fn test_confirm_once_then_granted() {
        let gate = create_gate().await;

        let outcome = gate.evaluate("u1", "I agree").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Confirmed);

        // Every subsequent message goes straight through.
        let outcome = gate.evaluate("u1", "What is diabetes?").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Granted);
        let outcome = gate.evaluate("u1", "yes").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Granted);
    }

    #[tokio::test]
    async fn test_hindi_affirmation() {
        let gate = create_gate().await;
        let outcome = gate.evaluate("u1", "हाँ, सहमत हूं").await.unwrap();
        assert_eq!(outcome, ConsentOutcome::Confirmed);
    }
}
