//! Shared fixtures: an in-process backend and a temp-dir configuration.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use wallo::assistant::Assistant;
use wallo::config::{parse_config, Config};
use wallo::router::ServiceRouter;
use wallo_core::models::{BackendKind, Service};
use wallo_core::service::{
    Backend, ChatRequest, EmbeddingRequest, Role, SynthesisRequest, TranscriptionRequest,
};

/// Deterministic backend: letter-frequency embeddings, echoing chat replies.
#[derive(Default)]
pub struct MockBackend {
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    pub embed_calls: AtomicUsize,
    pub fail_chat: AtomicBool,
    pub fail_embed: AtomicBool,
    /// Chat requests whose last user message contains a key wait for its gate.
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    pub fence_replies: AtomicBool,
    /// Reject embedding requests with more inputs than this (0 = no cap).
    pub max_batch: AtomicUsize,
    /// Fail every embedding call from this call number on (0-based).
    pub fail_embed_from: Mutex<Option<usize>>,
    pub embed_sizes: Mutex<Vec<usize>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hold chat requests mentioning `marker` until [`release`](Self::release).
    pub fn gate(&self, marker: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(marker.to_string(), Arc::new(Notify::new()));
    }

    pub fn release(&self, marker: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(marker) {
            gate.notify_one();
        }
    }

    pub fn last_user_message(&self) -> String {
        let requests = self.chat_requests.lock().unwrap();
        let request = requests.last().expect("no chat request recorded");
        last_user(request)
    }

    pub fn chat_count(&self) -> usize {
        self.chat_requests.lock().unwrap().len()
    }
}

fn last_user(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// 26-dimensional letter histogram.
pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn chat(&self, _service: &Service, request: &ChatRequest) -> Result<String> {
        self.chat_requests.lock().unwrap().push(request.clone());
        let user = last_user(request);

        let gate = self
            .gates
            .lock()
            .unwrap()
            .iter()
            .find(|(marker, _)| user.contains(marker.as_str()))
            .map(|(_, gate)| Arc::clone(gate));
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_chat.load(Ordering::SeqCst) {
            bail!("HTTP 500: upstream exploded");
        }
        let first_line = user.lines().next().unwrap_or_default().to_string();
        if self.fence_replies.load(Ordering::SeqCst) {
            return Ok(format!("```html\nreply to [{}]\n```", first_line));
        }
        Ok(format!("reply to [{}]", first_line))
    }

    async fn embed(&self, _service: &Service, request: &EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
        let call = self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.embed_sizes.lock().unwrap().push(request.texts.len());
        if self.fail_embed.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        if matches!(*self.fail_embed_from.lock().unwrap(), Some(from) if call >= from) {
            bail!("connection reset");
        }
        let cap = self.max_batch.load(Ordering::SeqCst);
        if cap > 0 && request.texts.len() > cap {
            bail!("HTTP 400: at most {} requests can be in one batch", cap);
        }
        Ok(request.texts.iter().map(|t| letter_vector(t)).collect())
    }

    async fn transcribe(&self, _service: &Service, request: &TranscriptionRequest) -> Result<String> {
        Ok(format!("heard {} bytes of {}", request.audio.len(), request.format))
    }

    async fn synthesize(&self, _service: &Service, request: &SynthesisRequest) -> Result<Vec<u8>> {
        Ok(request.text.as_bytes().to_vec())
    }
}

/// Configuration with mock-backed chat, embedding, transcription and
/// synthesis services and the index stored under `dir`.
pub fn test_config(dir: &Path) -> Config {
    test_config_with(dir, "")
}

/// [`test_config`] plus extra top-level TOML (must come before any table).
pub fn test_config_with(dir: &Path, preamble: &str) -> Config {
    let toml = format!(
        r#"{preamble}
prompt_footer = "\n-- end"

[rag]
path = "{index}"
chunk_size = 100
chunk_overlap = 20
top_k = 3

[[prompts]]
name = "polish"
description = "Make it professional"
user_prompt = "Polish this:"
attachment = "selection"

[[prompts]]
name = "brief"
user_prompt = "Summarize in |length| for |audience|:"
attachment = "inquiry"

[[prompts]]
name = "summarize_doc"
user_prompt = "Summarize the document:"
attachment = "pdf"

[services.mock-chat]
kind = "chat"
model = "mock-1"
default = true

[services.other-chat]
kind = "chat"
model = "mock-2"

[services.mock-embed]
kind = "embedding"
model = "letters"
default = true

[services.mock-stt]
kind = "transcription"
model = "ears"
default = true

[services.mock-tts]
kind = "synthesis"
model = "voice"
default = true
"#,
        preamble = preamble,
        index = dir.join("index.json").display().to_string().replace('\\', "/"),
    );
    parse_config(&toml).unwrap()
}

pub fn router(config: Arc<Config>, backend: Arc<MockBackend>) -> Arc<ServiceRouter> {
    Arc::new(ServiceRouter::empty(config).with_backend(BackendKind::Openai, backend))
}

pub async fn assistant(config: Config, backend: Arc<MockBackend>) -> Assistant {
    let config = Arc::new(config);
    let router = router(Arc::clone(&config), backend);
    Assistant::new(config, router).await.unwrap()
}
