//! # Retrieval-Augmented Responder
//!
//! Executes the per-intent response strategies once the consent gate has
//! granted and the intent is classified:
//!
//! - Medical: retrieve documents, build the grounded prompt, one model call.
//!   Zero retrieved documents is a documented fallback, not an error: the
//!   model is called with memory context only under a stricter
//!   no-unsupported-facts instruction.
//! - GeneralChat: short friendly prompt from memory context only.
//! - Ambiguous: generated clarification question inside the localized
//!   template; no extra model call for the main response.
//! - Other: fixed localized deflection.
//!
//! Every branch records the exchange into memory. Collaborator failures
//! (retrieval, model) degrade to safe fallback text instead of erroring the
//! request.

use std::sync::Arc;

use llm_client::LlmClient;
use tracing::{info, instrument, warn};

use crate::docstore::{DocumentStore, RetrievedChunk};
use crate::intent::{Intent, IntentClassifier};
use crate::memory::ConversationMemory;
use crate::templates::Language;

const NO_PREVIOUS_CONVERSATION: &str = "No previous conversation.";

fn context_or_placeholder(memory_context: &str) -> String {
    if memory_context.is_empty() {
        NO_PREVIOUS_CONVERSATION.to_string()
    } else {
        memory_context.to_string()
    }
}

fn format_documents(docs: &[RetrievedChunk]) -> String {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}: {}", i + 1, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn medical_prompt(
    language: Language,
    memory_context: &str,
    docs: &[RetrievedChunk],
    question: &str,
) -> String {
    let context = context_or_placeholder(memory_context);
    let documents = format_documents(docs);

    match language {
        Language::Hi => format!(
            "आप एक सहायक चिकित्सा सहायक हैं।\n\n\
             **महत्वपूर्ण निर्देश:**\n\
             - केवल नीचे दिए गए चिकित्सा संदर्भ की जानकारी का उपयोग करें\n\
             - यदि संदर्भ में उत्तर नहीं है, तो कहें \"मुझे इस बारे में जानकारी नहीं है\"\n\
             - कोई भी जानकारी न बनाएं\n\
             - उपयोगकर्ता की पहचान या रिकॉर्ड के बारे में कभी दावा न करें जब तक स्पष्ट रूप से न दिया गया हो\n\n\
             पिछली बातचीत:\n{context}\n\n\
             चिकित्सा संदर्भ:\n{documents}\n\n\
             प्रश्न: {question}\n\n\
             केवल ऊपर दिए गए चिकित्सा संदर्भ के आधार पर उत्तर दें:"
        ),
        Language::En => format!(
            "You are a helpful medical assistant.\n\n\
             **CRITICAL INSTRUCTIONS:**\n\
             - Answer ONLY using information from the Medical context below\n\
             - If the answer is not in the context, say \"I don't have information about that in my database\"\n\
             - DO NOT make up or invent any information\n\
             - Never claim knowledge of the user's identity, records, or personal facts unless explicitly provided\n\
             - Quote values exactly as they appear in the context\n\n\
             Previous conversation:\n{context}\n\n\
             Medical context:\n{documents}\n\n\
             Question: {question}\n\n\
             Answer based ONLY on the Medical context above:"
        ),
    }
}

/// Stricter general-knowledge prompt for the zero-documents fallback.
fn medical_fallback_prompt(language: Language, memory_context: &str, question: &str) -> String {
    let context = context_or_placeholder(memory_context);

    match language {
        Language::Hi => format!(
            "आप एक सहायक चिकित्सा सहायक हैं।\n\n\
             **महत्वपूर्ण निर्देश:**\n\
             - इस प्रश्न के लिए कोई संदर्भ दस्तावेज़ नहीं मिला\n\
             - केवल सामान्य चिकित्सा जानकारी दें; असमर्थित तथ्यों का दावा न करें\n\
             - उपयोगकर्ता की पहचान या रिकॉर्ड के बारे में कभी दावा न करें जब तक स्पष्ट रूप से न दिया गया हो\n\
             - गंभीर समस्याओं के लिए डॉक्टर से परामर्श की सलाह दें\n\n\
             पिछली बातचीत:\n{context}\n\n\
             प्रश्न: {question}\n\n\
             उत्तर:"
        ),
        Language::En => format!(
            "You are a helpful medical assistant.\n\n\
             **CRITICAL INSTRUCTIONS:**\n\
             - No reference documents were found for this question\n\
             - Give general medical information only; do not claim unsupported facts\n\
             - Never claim knowledge of the user's identity, records, or personal facts unless explicitly provided\n\
             - Recommend consulting a healthcare professional for anything serious\n\n\
             Previous conversation:\n{context}\n\n\
             Question: {question}\n\n\
             Answer:"
        ),
    }
}

fn general_chat_prompt(language: Language, memory_context: &str, question: &str) -> String {
    let context = context_or_placeholder(memory_context);

    match language {
        Language::Hi => format!(
            "आप एक चिकित्सा सहायक हैं।\n\n\
             पिछली बातचीत:\n{context}\n\n\
             प्रश्न: {question}\n\n\
             मैत्रीपूर्ण तरीके से जवाब दें। कृपया पिछली बातचीत का संदर्भ दें यदि प्रासंगिक हो।"
        ),
        Language::En => format!(
            "You are a helpful medical assistant.\n\n\
             Previous conversation:\n{context}\n\n\
             Question: {question}\n\n\
             Respond in a friendly way. If they ask about previous conversations, \
             refer to the context above. Keep response short (2-3 sentences). \
             Always remind them you provide information, not diagnosis."
        ),
    }
}

/// Per-intent response execution.
#[derive(Clone)]
pub struct Responder {
    llm: Arc<dyn LlmClient>,
    docstore: Arc<dyn DocumentStore>,
    classifier: IntentClassifier,
    top_k: usize,
}

impl Responder {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        docstore: Arc<dyn DocumentStore>,
        classifier: IntentClassifier,
        top_k: usize,
    ) -> Self {
        Self {
            llm,
            docstore,
            classifier,
            top_k,
        }
    }

    /// Executes the branch for a classified intent against loaded memory.
    /// Returns the response text; the exchange is recorded into memory before
    /// returning. Model failures yield the localized generic-error text as
    /// the response rather than an error.
    #[instrument(skip(self, memory, message), fields(intent = intent.label()))]
    pub async fn respond(
        &self,
        intent: Intent,
        memory: &mut ConversationMemory,
        message: &str,
        language: Language,
    ) -> String {
        let templates = language.templates();

        let response = match intent {
            Intent::Medical => self.respond_medical(memory, message, language).await,
            Intent::GeneralChat => {
                let prompt = general_chat_prompt(language, &memory.memory_context(), message);
                self.complete_or_fallback(&prompt, templates.generic_error)
                    .await
            }
            Intent::Ambiguous => {
                let question = self.classifier.clarification_question(message).await;
                templates.clarification_with(&question)
            }
            Intent::Other => templates.not_medical.to_string(),
        };

        memory.add_message(message, &response).await;

        response
    }

    async fn respond_medical(
        &self,
        memory: &mut ConversationMemory,
        message: &str,
        language: Language,
    ) -> String {
        let templates = language.templates();

        // Retrieval failure degrades to the zero-documents path.
        let docs = match self.docstore.search(message, self.top_k).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(error = %e, "document retrieval failed, answering without documents");
                Vec::new()
            }
        };

        let memory_context = memory.memory_context();
        let prompt = if docs.is_empty() {
            info!("no documents retrieved, using general-knowledge fallback");
            medical_fallback_prompt(language, &memory_context, message)
        } else {
            info!(retrieved = docs.len(), "building retrieval-augmented prompt");
            medical_prompt(language, &memory_context, &docs, message)
        };

        self.complete_or_fallback(&prompt, templates.generic_error)
            .await
    }

    async fn complete_or_fallback(&self, prompt: &str, fallback: &str) -> String {
        match self.llm.complete(prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "model call failed, using fallback response");
                fallback.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docstore::SqliteDocumentStore;
    use crate::storage::{create_test_database, Database, MemoryRepository};
    use crate::testutil::{StubEmbedding, StubLlm};

    struct Fixture {
        db: Database,
        llm: Arc<StubLlm>,
        docstore: Arc<SqliteDocumentStore>,
        responder: Responder,
    }

    async fn fixture() -> Fixture {
        let db = create_test_database().await;
        let llm = Arc::new(StubLlm::new("model answer"));
        let embedder = Arc::new(
            StubEmbedding::new()
                .with("hypertension reference", vec![1.0, 0.0, 0.0])
                .with("blood pressure question", vec![0.9, 0.1, 0.0]),
        );
        let docstore = Arc::new(SqliteDocumentStore::new(db.pool().clone(), embedder));
        let classifier = IntentClassifier::new(llm.clone());
        let responder = Responder::new(llm.clone(), docstore.clone(), classifier, 3);
        Fixture {
            db,
            llm,
            docstore,
            responder,
        }
    }

    async fn memory(db: &Database, llm: Arc<StubLlm>) -> ConversationMemory {
        let mut m = ConversationMemory::new(
            MemoryRepository::new(db.pool().clone()),
            llm,
            "u1",
            4,
            2,
            false,
        );
        m.load().await;
        m
    }

    #[tokio::test]
    async fn test_medical_prompt_carries_documents_and_context() {
        let f = fixture().await;
        f.docstore
            .add("hypertension reference", serde_json::Value::Null)
            .await
            .unwrap();

        let mut mem = memory(&f.db, f.llm.clone()).await;
        mem.add_message("hi", "hello").await;

        let response = f
            .responder
            .respond(
                Intent::Medical,
                &mut mem,
                "blood pressure question",
                Language::En,
            )
            .await;

        assert_eq!(response, "model answer");
        let prompts = f.llm.prompts();
        let prompt = prompts.last().unwrap();
        assert!(prompt.contains("Document 1: hypertension reference"));
        assert!(prompt.contains("[Recent conversation]"));
        assert!(prompt.contains("Answer based ONLY on the Medical context above"));
    }

    #[tokio::test]
    async fn test_medical_zero_documents_still_answers() {
        let f = fixture().await;
        let mut mem = memory(&f.db, f.llm.clone()).await;

        let response = f
            .responder
            .respond(
                Intent::Medical,
                &mut mem,
                "blood pressure question",
                Language::En,
            )
            .await;

        assert!(!response.is_empty());
        let prompts = f.llm.prompts();
        let prompt = prompts.last().unwrap();
        assert!(prompt.contains("No reference documents were found"));
        assert!(prompt.contains("do not claim unsupported facts"));
        // The exchange was still recorded.
        assert_eq!(mem.recent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_medical_model_failure_returns_generic_error() {
        let f = fixture().await;
        f.llm.set_fail(true);
        let mut mem = memory(&f.db, f.llm.clone()).await;

        let response = f
            .responder
            .respond(Intent::Medical, &mut mem, "blood pressure question", Language::En)
            .await;

        assert_eq!(response, Language::En.templates().generic_error);
    }

    #[tokio::test]
    async fn test_ambiguous_uses_clarification_template() {
        let f = fixture().await;
        f.llm.push_reply("Are you asking about a symptom?");
        let mut mem = memory(&f.db, f.llm.clone()).await;

        let response = f
            .responder
            .respond(Intent::Ambiguous, &mut mem, "tell me", Language::En)
            .await;

        assert!(response.contains("Are you asking about a symptom?"));
        assert!(response.contains("I need clarification"));
        // Only the clarification call: no extra main-response model call.
        assert_eq!(f.llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_other_is_fixed_deflection() {
        let f = fixture().await;
        let mut mem = memory(&f.db, f.llm.clone()).await;

        let response = f
            .responder
            .respond(Intent::Other, &mut mem, "book me a taxi", Language::En)
            .await;

        assert_eq!(response, Language::En.templates().not_medical);
        assert_eq!(f.llm.calls(), 0);
        assert_eq!(mem.recent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_general_chat_hindi_prompt() {
        let f = fixture().await;
        let mut mem = memory(&f.db, f.llm.clone()).await;

        f.responder
            .respond(Intent::GeneralChat, &mut mem, "नमस्ते", Language::Hi)
            .await;

        let prompts = f.llm.prompts();
        assert!(prompts.last().unwrap().contains("पिछली बातचीत"));
    }
}
