//! # Intent Classification
//!
//! Maps a raw user message to one of four categories that select the
//! downstream response strategy. Runs as an explicit pipeline with documented
//! precedence:
//!
//! 1. Acknowledgement pre-filter ("ok", "thanks", ...) → GeneralChat.
//! 2. Clarification-digit pre-filter: a bare 1–3 right after an Ambiguous
//!    turn → Medical (1) or Other (2, 3).
//! 3. Medical follow-up pre-filter: short continuation phrases right after a
//!    Medical turn → Medical.
//! 4. One model call with the fixed category prompt; first category keyword
//!    found in the reply wins.
//! 5. Anything unparseable, and any model failure, defaults to GeneralChat.
//!
//! The pre-filters exist because the model classifier is unreliable on short,
//! context-dependent replies; they repair context, they are not shortcuts.

use llm_client::LlmClient;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// The classified purpose of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Medical,
    GeneralChat,
    Ambiguous,
    Other,
}

impl Intent {
    /// Stable label persisted on chat turns.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Medical => "MEDICAL",
            Intent::GeneralChat => "GENERAL_CHAT",
            Intent::Ambiguous => "AMBIGUOUS",
            Intent::Other => "OTHER",
        }
    }

    /// Parses a persisted label.
    pub fn from_label(label: &str) -> Option<Intent> {
        match label {
            "MEDICAL" => Some(Intent::Medical),
            "GENERAL_CHAT" => Some(Intent::GeneralChat),
            "AMBIGUOUS" => Some(Intent::Ambiguous),
            "OTHER" => Some(Intent::Other),
            _ => None,
        }
    }
}

/// Context cue for the pre-filters: the previous stored turn's intent.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyCue {
    pub last_intent: Option<Intent>,
}

/// Short acknowledgement phrases mapped straight to GeneralChat.
const ACKNOWLEDGEMENTS: &[&str] = &[
    "ok", "okay", "thanks", "thank you", "yes", "no", "got it", "sure", "alright", "fine",
];

/// Continuation phrases that keep a just-completed medical exchange medical.
const MEDICAL_FOLLOW_UPS: &[&str] = &["what to do", "same", "above", "that one", "and then"];

const DEFAULT_CLARIFICATION: &str = "Could you clarify what you're asking about?";

fn classify_prompt(query: &str) -> String {
    format!(
        r#"You are an intent classifier for a medical chatbot.

Classify the following user message into ONE category:

MEDICAL: Questions about health, symptoms, diseases, treatments, medications, medical conditions, hospital
GENERAL_CHAT: Friendly casual conversation related to health/wellness (e.g., "how are you", "tell me about yourself")
AMBIGUOUS: Message is unclear or could be medical but not clear enough - need clarification
OTHER: Anything else (booking, shopping, entertainment, jobs, etc.)

User Message: "{query}"

Respond with ONLY the category name. Examples:
- "What is diabetes?" -> MEDICAL
- "Hi, how are you?" -> GENERAL_CHAT
- "Tell me something" -> AMBIGUOUS
- "Book me a taxi" -> OTHER
- "I have a headache" -> MEDICAL
- "What can you do?" -> GENERAL_CHAT

Category:"#
    )
}

fn clarification_prompt(query: &str) -> String {
    format!(
        r#"User said: "{query}"

Generate ONE short clarification question to understand if they're asking about:
1. Medical/health topic
2. General information about you
3. Something else

Question should be natural and helpful. Keep it under 15 words."#
    )
}

/// Intent classifier: pre-filters, then one model call, then keyword parse.
#[derive(Clone)]
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Applies the deterministic pre-filters. `None` means "ask the model".
    fn pre_filter(message: &str, cue: ClassifyCue) -> Option<Intent> {
        let lower = message.to_lowercase();
        let lower = lower.trim();

        if ACKNOWLEDGEMENTS.contains(&lower) {
            return Some(Intent::GeneralChat);
        }

        if cue.last_intent == Some(Intent::Ambiguous) {
            if let Ok(choice) = lower.parse::<u32>() {
                match choice {
                    1 => return Some(Intent::Medical),
                    2 | 3 => return Some(Intent::Other),
                    _ => {}
                }
            }
        }

        if cue.last_intent == Some(Intent::Medical)
            && MEDICAL_FOLLOW_UPS.iter().any(|p| lower.contains(p))
        {
            return Some(Intent::Medical);
        }

        None
    }

    /// Parses the first category keyword out of the model reply.
    /// Checked in declaration order; anything else is unparseable.
    fn parse_category(reply: &str) -> Option<Intent> {
        let upper = reply.to_uppercase();
        if upper.contains("MEDICAL") {
            Some(Intent::Medical)
        } else if upper.contains("GENERAL_CHAT") {
            Some(Intent::GeneralChat)
        } else if upper.contains("AMBIGUOUS") {
            Some(Intent::Ambiguous)
        } else if upper.contains("OTHER") {
            Some(Intent::Other)
        } else {
            None
        }
    }

    /// Classifies a message. Never fails: model errors and unparseable
    /// replies default to GeneralChat, the least disruptive path.
    #[instrument(skip(self, message), fields(message_len = message.len()))]
    pub async fn classify(&self, message: &str, cue: ClassifyCue) -> Intent {
        if message.trim().len() < 2 {
            return Intent::GeneralChat;
        }

        if let Some(intent) = Self::pre_filter(message, cue) {
            info!(intent = intent.label(), "intent resolved by pre-filter");
            return intent;
        }

        match self.llm.complete(&classify_prompt(message)).await {
            Ok(reply) => match Self::parse_category(&reply) {
                Some(intent) => {
                    info!(intent = intent.label(), "intent classified by model");
                    intent
                }
                None => {
                    warn!(reply = %reply, "unparseable classifier reply, defaulting to GENERAL_CHAT");
                    Intent::GeneralChat
                }
            },
            Err(e) => {
                warn!(error = %e, "intent classification failed, defaulting to GENERAL_CHAT");
                Intent::GeneralChat
            }
        }
    }

    /// Produces a short follow-up question for an ambiguous message.
    /// Falls back to a generic clarification on model failure.
    #[instrument(skip(self, message))]
    pub async fn clarification_question(&self, message: &str) -> String {
        match self.llm.complete(&clarification_prompt(message)).await {
            Ok(reply) => reply.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "clarification generation failed, using default");
                DEFAULT_CLARIFICATION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::StubLlm;

    fn classifier(stub: Arc<StubLlm>) -> IntentClassifier {
        IntentClassifier::new(stub)
    }

    #[tokio::test]
    async fn test_acknowledgement_skips_model() {
        let stub = Arc::new(StubLlm::new("MEDICAL"));
        let c = classifier(stub.clone());

        let intent = c.classify("ok", ClassifyCue::default()).await;
        assert_eq!(intent, Intent::GeneralChat);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_digit_after_ambiguous() {
        let stub = Arc::new(StubLlm::new("MEDICAL"));
        let c = classifier(stub.clone());
        let cue = ClassifyCue {
            last_intent: Some(Intent::Ambiguous),
        };

        assert_eq!(c.classify("1", cue).await, Intent::Medical);
        assert_eq!(c.classify("2", cue).await, Intent::Other);
        assert_eq!(c.classify("3", cue).await, Intent::Other);
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_digit_without_ambiguous_cue_goes_to_model() {
        let stub = Arc::new(StubLlm::new("OTHER"));
        let c = classifier(stub.clone());

        let intent = c.classify("42", ClassifyCue::default()).await;
        assert_eq!(intent, Intent::Other);
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_medical_follow_up() {
        let stub = Arc::new(StubLlm::new("OTHER"));
        let c = classifier(stub.clone());
        let cue = ClassifyCue {
            last_intent: Some(Intent::Medical),
        };

        assert_eq!(c.classify("what to do now?", cue).await, Intent::Medical);
        assert_eq!(stub.calls(), 0);

        // Without the medical cue the same phrase goes to the model.
        assert_eq!(
            c.classify("what to do now?", ClassifyCue::default()).await,
            Intent::Other
        );
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_model_classification_parse_order() {
        let stub = Arc::new(StubLlm::new(""));
        let c = classifier(stub.clone());

        stub.push_reply("MEDICAL");
        assert_eq!(
            c.classify("What is diabetes?", ClassifyCue::default()).await,
            Intent::Medical
        );

        stub.push_reply("The category is AMBIGUOUS.");
        assert_eq!(
            c.classify("Tell me something", ClassifyCue::default()).await,
            Intent::Ambiguous
        );
    }

    #[tokio::test]
    async fn test_unparseable_reply_defaults_to_general_chat() {
        let stub = Arc::new(StubLlm::new("no idea"));
        let c = classifier(stub.clone());

        assert_eq!(
            c.classify("something odd", ClassifyCue::default()).await,
            Intent::GeneralChat
        );
    }

    #[tokio::test]
    async fn test_model_failure_defaults_to_general_chat() {
        let stub = Arc::new(StubLlm::new("MEDICAL"));
        stub.set_fail(true);
        let c = classifier(stub.clone());

        assert_eq!(
            c.classify("What is diabetes?", ClassifyCue::default()).await,
            Intent::GeneralChat
        );
    }

    #[tokio::test]
    async fn test_clarification_fallback() {
        let stub = Arc::new(StubLlm::new("Do you mean a symptom?"));
        let c = classifier(stub.clone());

        assert_eq!(
            c.clarification_question("tell me").await,
            "Do you mean a symptom?"
        );

        stub.set_fail(true);
        assert_eq!(
            c.clarification_question("tell me").await,
            DEFAULT_CLARIFICATION
        );
    }

    #[test]
    fn test_label_roundtrip() {
        for intent in [
            Intent::Medical,
            Intent::GeneralChat,
            Intent::Ambiguous,
            Intent::Other,
        ] {
            assert_eq!(Intent::from_label(intent.label()), Some(intent));
        }
        assert_eq!(Intent::from_label("GREETING"), None);
    }
}
