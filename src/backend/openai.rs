//! OpenAI-compatible REST client.
//!
//! Routes, relative to the service URL (default `https://api.openai.com/v1`):
//! - chat → `POST /chat/completions`
//! - embedding → `POST /embeddings`
//! - transcription → `POST /audio/transcriptions` (multipart)
//! - synthesis → `POST /audio/speech`

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use wallo_core::models::Service;
use wallo_core::service::{
    render_attachment, Backend, ChatRequest, EmbeddingRequest, SynthesisRequest,
    TranscriptionRequest,
};

use super::{api_key, base_url, send, send_json};

const DEFAULT_URL: &str = "https://api.openai.com/v1";
const DEFAULT_VOICE: &str = "alloy";

pub struct OpenAiBackend {
    client: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn post(&self, service: &Service, route: &str) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{}", base_url(service, DEFAULT_URL), route);
        debug!(service = %service.name, %url, "openai request");
        let mut request = self.client.post(url);
        if let Some(key) = api_key(service)? {
            request = request.bearer_auth(key);
        }
        Ok(request)
    }
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, service: &Service, request: &ChatRequest) -> Result<String> {
        let body = chat_body(service, request);
        let json = send_json(self.post(service, "/chat/completions")?.json(&body), "OpenAI").await?;
        parse_chat_response(&json)
    }

    async fn embed(&self, service: &Service, request: &EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": service.model,
            "input": request.texts,
        });
        let json = send_json(self.post(service, "/embeddings")?.json(&body), "OpenAI").await?;
        parse_embedding_response(&json)
    }

    async fn transcribe(&self, service: &Service, request: &TranscriptionRequest) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(request.audio.clone())
            .file_name(format!("audio.{}", request.format))
            .mime_str(&format!("audio/{}", request.format))?;
        let form = reqwest::multipart::Form::new()
            .text("model", service.model.clone())
            .part("file", file);
        let json = send_json(
            self.post(service, "/audio/transcriptions")?.multipart(form),
            "OpenAI",
        )
        .await?;
        json.get("text")
            .and_then(|t| t.as_str())
            .map(String::from)
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing text"))
    }

    async fn synthesize(&self, service: &Service, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let body = json!({
            "model": service.model,
            "input": request.text,
            "voice": service.voice.as_deref().unwrap_or(DEFAULT_VOICE),
        });
        let response = send(self.post(service, "/audio/speech")?.json(&body), "OpenAI").await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Build the `/chat/completions` body. Attachments become additional text
/// parts of the last user message.
fn chat_body(service: &Service, request: &ChatRequest) -> Value {
    let last_user = request
        .messages
        .iter()
        .rposition(|m| m.role == wallo_core::service::Role::User);

    let messages: Vec<Value> = request
        .messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            if Some(i) == last_user && !request.attachments.is_empty() {
                let mut parts = vec![json!({"type": "text", "text": m.content})];
                parts.extend(
                    request
                        .attachments
                        .iter()
                        .map(|a| json!({"type": "text", "text": render_attachment(a)})),
                );
                json!({"role": m.role.as_str(), "content": parts})
            } else {
                json!({"role": m.role.as_str(), "content": m.content})
            }
        })
        .collect();

    json!({
        "model": request.model.as_deref().unwrap_or(&service.model),
        "messages": messages,
    })
}

fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
