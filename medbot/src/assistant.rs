//! # Assistant service
//!
//! Explicitly constructed service object wiring the consent gate, intent
//! classifier, conversation memory, and responder over shared storage. No
//! module-level singletons: everything is injected, so tests run against
//! trait doubles and nothing couples requests behind the scenes.
//!
//! Concurrency: requests for different users run freely in parallel; requests
//! for the same user serialize on a per-user async mutex around the
//! classify → memory load-mutate-save → log cycle, which removes the
//! lost-update race on MemoryState.
//!
//! Error posture: `chat` is the request boundary. Anything that escapes the
//! inner pipeline is logged and surfaced as the localized generic apology;
//! state persisted before the failure stays persisted. Both the turn-log and
//! memory writes are idempotent, so history readers tolerate either one
//! landing alone.

use std::sync::Arc;

use dashmap::DashMap;
use llm_client::LlmClient;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::AssistantConfig;
use crate::consent::{ConsentGate, ConsentOutcome};
use crate::docstore::{DocumentStore, SqliteDocumentStore};
use crate::error::{MedbotError, Result};
use crate::intent::{ClassifyCue, Intent, IntentClassifier};
use crate::memory::ConversationMemory;
use crate::responder::Responder;
use crate::storage::{ConsentRepository, Database, MemoryRepository, TurnRepository};
use crate::templates::Language;
use crate::types::{ChatTurn, MemoryStats};

/// Memory/retrieval settings the service carries per request.
#[derive(Debug, Clone)]
struct Settings {
    batch_pairs: u32,
    cache_minutes: i64,
    expire_batch_with_summary: bool,
}

/// The assembled assistant. Cheap to share behind an `Arc`.
pub struct Assistant {
    db: Database,
    turns: TurnRepository,
    memory_repo: MemoryRepository,
    gate: ConsentGate,
    classifier: IntentClassifier,
    responder: Responder,
    llm: Arc<dyn LlmClient>,
    docstore: Arc<dyn DocumentStore>,
    settings: Settings,
    user_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl Assistant {
    /// Wires the service from config and the two model collaborators.
    pub async fn new(
        config: &dyn AssistantConfig,
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn embedding::EmbeddingService>,
    ) -> anyhow::Result<Self> {
        let db = Database::connect(config.database_url()).await?;

        let turns = TurnRepository::new(db.pool().clone());
        let memory_repo = MemoryRepository::new(db.pool().clone());
        let gate = ConsentGate::new(ConsentRepository::new(db.pool().clone()));
        let classifier = IntentClassifier::new(llm.clone());
        let docstore: Arc<dyn DocumentStore> =
            Arc::new(SqliteDocumentStore::new(db.pool().clone(), embedder));
        let responder = Responder::new(
            llm.clone(),
            docstore.clone(),
            classifier.clone(),
            config.top_k(),
        );

        Ok(Self {
            db,
            turns,
            memory_repo,
            gate,
            classifier,
            responder,
            llm,
            docstore,
            settings: Settings {
                batch_pairs: config.batch_size(),
                cache_minutes: config.cache_minutes(),
                expire_batch_with_summary: config.expire_batch_with_summary(),
            },
            user_locks: DashMap::new(),
        })
    }

    /// Shuts down the storage pool.
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// The document store, for ingestion and seeding.
    pub fn docstore(&self) -> Arc<dyn DocumentStore> {
        self.docstore.clone()
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn new_memory(&self, user_id: &str) -> ConversationMemory {
        ConversationMemory::new(
            self.memory_repo.clone(),
            self.llm.clone(),
            user_id,
            self.settings.batch_pairs,
            self.settings.cache_minutes,
            self.settings.expire_batch_with_summary,
        )
    }

    // ---------- Request boundary ----------

    /// Handles one inbound message and returns the response text.
    ///
    /// Never fails: unhandled errors are logged and answered with the
    /// localized generic apology.
    #[instrument(skip(self, message))]
    pub async fn chat(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        language: Language,
    ) -> String {
        match self.chat_inner(user_id, session_id, message, language).await {
            Ok(response) => response,
            Err(e) => {
                error!(user_id, error = %e, "Chat request failed");
                language.templates().generic_error.to_string()
            }
        }
    }

    async fn chat_inner(
        &self,
        user_id: &str,
        session_id: &str,
        message: &str,
        language: Language,
    ) -> Result<String> {
        let request_id = Uuid::new_v4();
        let templates = language.templates();

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        // Consent gate: unconsented users never reach classification.
        let outcome = self
            .gate
            .evaluate(user_id, message)
            .await
            .map_err(|e| MedbotError::Database(e.to_string()))?;
        match outcome {
            ConsentOutcome::Prompt => {
                let response = templates.consent_prompt;
                self.log_turn(user_id, session_id, request_id, message, response, None)
                    .await?;
                return Ok(response.to_string());
            }
            ConsentOutcome::Confirmed => {
                let response = templates.consent_confirmed;
                self.log_turn(user_id, session_id, request_id, message, response, None)
                    .await?;
                return Ok(response.to_string());
            }
            ConsentOutcome::Granted => {}
        }

        let cue = ClassifyCue {
            last_intent: self
                .turns
                .last_intent(user_id)
                .await
                .map_err(|e| MedbotError::Database(e.to_string()))?
                .as_deref()
                .and_then(Intent::from_label),
        };
        let intent = self.classifier.classify(message, cue).await;

        info!(
            user_id,
            intent = intent.label(),
            "message classified, building response"
        );

        let mut memory = self.new_memory(user_id);
        memory.load().await;

        let response = self
            .responder
            .respond(intent, &mut memory, message, language)
            .await;

        self.log_turn(
            user_id,
            session_id,
            request_id,
            message,
            &response,
            Some(intent),
        )
        .await?;

        Ok(response)
    }

    async fn log_turn(
        &self,
        user_id: &str,
        session_id: &str,
        request_id: Uuid,
        user_message: &str,
        bot_response: &str,
        intent: Option<Intent>,
    ) -> Result<()> {
        let turn = ChatTurn::new(
            user_id,
            session_id,
            request_id,
            user_message,
            bot_response,
            intent.map(|i| i.label().to_string()),
        );
        self.turns
            .save(&turn)
            .await
            .map_err(|e| MedbotError::Database(e.to_string()))
    }

    // ---------- Auxiliary operations ----------

    /// Greeting shown when a conversation view opens: welcome + consent
    /// prompt for a brand-new user, bare consent prompt when consent is still
    /// missing, nothing for a consented user.
    pub async fn initial_message(
        &self,
        user_id: &str,
        language: Language,
    ) -> Result<Option<String>> {
        let templates = language.templates();
        let total = self
            .turns
            .count(user_id)
            .await
            .map_err(|e| MedbotError::Database(e.to_string()))?;

        if total == 0 {
            return Ok(Some(format!(
                "{}\n\n{}",
                templates.welcome, templates.consent_prompt
            )));
        }

        let consented = self
            .gate
            .has_consent(user_id)
            .await
            .map_err(|e| MedbotError::Database(e.to_string()))?;

        if consented {
            Ok(None)
        } else {
            Ok(Some(templates.consent_prompt.to_string()))
        }
    }

    /// The append-only conversation log for a user, oldest first.
    pub async fn history(&self, user_id: &str, limit: i64) -> Result<Vec<ChatTurn>> {
        self.turns
            .history(user_id, limit)
            .await
            .map_err(|e| MedbotError::Database(e.to_string()))
    }

    /// Diagnostic view of the user's memory state after a fresh load.
    pub async fn memory_stats(&self, user_id: &str) -> MemoryStats {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut memory = self.new_memory(user_id);
        memory.load().await;
        memory.stats()
    }
}
