//! Google Generative Language API client.
//!
//! Chat and transcription go through `models/{model}:generateContent`;
//! embeddings through `models/{model}:batchEmbedContents`. Synthesis keeps
//! the trait's unsupported default.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use tracing::debug;

use wallo_core::models::Service;
use wallo_core::service::{
    render_attachment, Backend, ChatRequest, EmbeddingRequest, Role, TranscriptionRequest,
};

use super::{api_key, base_url, send_json};

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TRANSCRIBE_INSTRUCTION: &str = "Generate a transcript of the speech.";

pub struct GeminiBackend {
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn call(&self, service: &Service, model: &str, method: &str, body: &Value) -> Result<Value> {
        let url = format!(
            "{}/models/{}:{}",
            base_url(service, DEFAULT_URL),
            model,
            method
        );
        debug!(service = %service.name, %url, "gemini request");
        let mut request = self.client.post(url).json(body);
        if let Some(key) = api_key(service)? {
            request = request.header("x-goog-api-key", key);
        }
        send_json(request, "Gemini").await
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn chat(&self, service: &Service, request: &ChatRequest) -> Result<String> {
        let model = request.model.as_deref().unwrap_or(&service.model);
        let json = self
            .call(service, model, "generateContent", &chat_body(request))
            .await?;
        parse_generate_response(&json)
    }

    async fn embed(&self, service: &Service, request: &EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
        let requests: Vec<Value> = request
            .texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", service.model),
                    "content": {"parts": [{"text": text}]},
                })
            })
            .collect();
        let body = json!({ "requests": requests });
        let json = self
            .call(service, &service.model, "batchEmbedContents", &body)
            .await?;
        parse_embedding_response(&json)
    }

    async fn transcribe(&self, service: &Service, request: &TranscriptionRequest) -> Result<String> {
        let audio = base64::engine::general_purpose::STANDARD.encode(&request.audio);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": TRANSCRIBE_INSTRUCTION},
                    {"inline_data": {"mime_type": format!("audio/{}", request.format), "data": audio}},
                ],
            }],
        });
        let json = self
            .call(service, &service.model, "generateContent", &body)
            .await?;
        parse_generate_response(&json)
    }
}

/// System messages become `systemInstruction`; assistant turns use role `model`.
fn chat_body(request: &ChatRequest) -> Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut contents: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| {
            let role = if m.role == Role::Assistant { "model" } else { "user" };
            json!({"role": role, "parts": [{"text": m.content}]})
        })
        .collect();

    if !request.attachments.is_empty() {
        let parts: Vec<Value> = request
            .attachments
            .iter()
            .map(|a| json!({"text": render_attachment(a)}))
            .collect();
        match contents.last_mut().and_then(|c| c.get_mut("parts")).and_then(|p| p.as_array_mut()) {
            Some(existing) => existing.extend(parts),
            None => contents.push(json!({"role": "user", "parts": parts})),
        }
    }

    let mut body = json!({ "contents": contents });
    if !system.is_empty() {
        body["systemInstruction"] = json!({"parts": [{"text": system.join("\n")}]});
    }
    body
}

fn parse_generate_response(json: &Value) -> Result<String> {
    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

fn parse_embedding_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;
    embeddings
        .iter()
        .map(|e| {
            e.get("values")
                .and_then(|v| v.as_array())
                .map(|values| {
                    values
                        .iter()
                        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                        .collect()
                })
                .ok_or_else(|| anyhow!("Invalid Gemini response: missing embedding values"))
        })
        .collect()
}
