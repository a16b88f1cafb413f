//! Test doubles for the LLM and embedding collaborators.
//!
//! Hand-rolled stubs: scripted replies, recorded prompts, call counters, and
//! a fail switch for exercising degraded paths.

use anyhow::Result;
use async_trait::async_trait;
use embedding::EmbeddingService;
use llm_client::LlmClient;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedding stub: returns a fixed vector per known text, a default vector
/// otherwise.
pub struct StubEmbedding {
    vectors: HashMap<String, Vec<f32>>,
    default: Vec<f32>,
    calls: AtomicUsize,
}

impl StubEmbedding {
    pub fn new() -> Self {
        Self {
            vectors: HashMap::new(),
            default: vec![0.0, 0.0, 1.0],
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingService for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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
/// records every prompt; can be switched to fail every call.
pub struct StubLlm {
    replies: Mutex<VecDeque<String>>,
    default_reply: String,
    fail: AtomicBool,
    fail_after: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubLlm {
    pub fn new(default_reply: &str) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            default_reply: default_reply.to_string(),
            fail: AtomicBool::new(false),
            fail_after: AtomicUsize::new(usize::MAX),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queues a reply returned by the next unanswered call.
    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(reply.to_string());
    }

    /// Makes every subsequent call return an error.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Makes calls fail once `n` calls have completed (the first `n` succeed).
    pub fn fail_after(&self, n: usize) {
        self.fail_after.store(n, Ordering::SeqCst);
    }

    /// Number of completed (or failed) calls.
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// All prompts seen, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let completed = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len() - 1
        };
        if self.fail.load(Ordering::SeqCst) || completed >= self.fail_after.load(Ordering::SeqCst) {
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
