//! Shared test doubles for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use embedding::EmbeddingService;
use llm_client::LlmClient;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Embedding stub: fixed vector per known text, default vector otherwise.
pub struct StubEmbedding {
    vectors: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
}

impl StubEmbedding {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            default: vec![0.0, 0.0, 1.0],
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingService for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for t in texts {
            out.push(self.embed(t).await?);
        }
        Ok(out)
    }
}

/// LLM stub: pops scripted replies in order, falling back to a default reply;
/// records prompts; can be switched to fail.
pub struct StubLlm {
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    fail: AtomicBool,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new(default_reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            fail: AtomicBool::new(false),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(reply.to_string());
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("stub LLM failure");
        }
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default_reply.clone()))
    }
}
