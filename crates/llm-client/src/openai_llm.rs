//! OpenAI-compatible [`LlmClient`]: wraps async-openai, prepends a system message.

use anyhow::Result;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{mask_token, LlmClient};

/// Default system prompt when none is configured.
pub const DEFAULT_SYSTEM_CONTENT: &str = "You are a helpful medical assistant.";

/// Timeout for a single completion request (connect + request + response).
const COMPLETE_TIMEOUT: Duration = Duration::from_secs(30);

/// LlmClient implementation over any OpenAI-compatible chat completion API
/// (OpenAI, Groq, proxies).
#[derive(Clone)]
pub struct OpenAILlmClient {
    client: Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    /// Stored only for masked logging.
    api_key_for_logging: String,
}

impl OpenAILlmClient {
    pub fn new(api_key: String) -> Self {
        let config = async_openai::config::OpenAIConfig::new().with_api_key(api_key.clone());
        Self {
            client: Client::with_config(config),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.2,
            system_prompt: None,
            api_key_for_logging: api_key,
        }
    }

    /// Builds a client with a custom base URL (e.g. Groq or other compatible endpoints).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_key(api_key.clone())
            .with_api_base(base_url);
        Self {
            client: Client::with_config(config),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.2,
            system_prompt: None,
            api_key_for_logging: api_key,
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_system_prompt_opt(mut self, prompt: Option<String>) -> Self {
        self.system_prompt = prompt;
        self
    }

    fn system_content(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(DEFAULT_SYSTEM_CONTENT)
    }
}

#[async_trait]
impl LlmClient for OpenAILlmClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.system_content().to_string())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()?
                .into(),
        ];

        info!(
            model = %self.model,
            api_key = %mask_token(&self.api_key_for_logging),
            "chat completion request"
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(messages)
            .build()?;

        if let Ok(json) = serde_json::to_string_pretty(&request) {
            tracing::debug!(request_json = %json, "chat completion request JSON");
        }

        let chat = self.client.chat();
        let create_future = chat.create(request);
        let response = match tokio::time::timeout(COMPLETE_TIMEOUT, create_future).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(error = %e, "chat completion request failed");
                return Err(e.into());
            }
            Err(_) => {
                warn!(
                    timeout_secs = COMPLETE_TIMEOUT.as_secs(),
                    "chat completion request timed out"
                );
                return Err(anyhow::anyhow!(
                    "chat completion timed out after {} seconds",
                    COMPLETE_TIMEOUT.as_secs()
                ));
            }
        };

        if let Some(ref u) = response.usage {
            info!(
                prompt_tokens = u.prompt_tokens,
                completion_tokens = u.completion_tokens,
                "chat completion usage"
            );
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| anyhow::anyhow!("No content in chat completion response"))?;

        Ok(content)
    }
}
