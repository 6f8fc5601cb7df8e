//! Backend-independent request/response shapes and the [`Backend`] trait.
//!
//! Every backend (OpenAI-compatible, Gemini, test doubles) receives the same
//! normalized requests. Backends report failures as `anyhow::Error`; the
//! application's service router converts those into
//! [`Error::ServiceCallFailed`](crate::error::Error::ServiceCallFailed).

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Attachment, AttachmentKind, Service, ServiceKind};

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat completion request.
///
/// `attachments` are extra context parts sent alongside the final user
/// message; text already folded into `messages` is not repeated here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Overrides the service's configured model.
    pub model: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    /// Container format of `audio`, e.g. `"wav"` or `"mp3"`.
    pub format: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
}

/// A normalized request of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceRequest {
    Chat(ChatRequest),
    Embedding(EmbeddingRequest),
    Transcription(TranscriptionRequest),
    Synthesis(SynthesisRequest),
}

impl ServiceRequest {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceRequest::Chat(_) => ServiceKind::Chat,
            ServiceRequest::Embedding(_) => ServiceKind::Embedding,
            ServiceRequest::Transcription(_) => ServiceKind::Transcription,
            ServiceRequest::Synthesis(_) => ServiceKind::Synthesis,
        }
    }
}

/// A normalized response of any kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceResponse {
    /// Chat reply or transcript.
    Text(String),
    /// One vector per input text, in input order.
    Embeddings(Vec<Vec<f32>>),
    /// Encoded audio from a synthesis call.
    Audio(Vec<u8>),
}

/// Heading used when an attachment is sent as a separate content part.
pub fn attachment_heading(kind: AttachmentKind) -> &'static str {
    match kind {
        AttachmentKind::SelectionText => "Selected text",
        AttachmentKind::PdfText => "Attached document",
        AttachmentKind::InquiryAnswers => "Answers",
        AttachmentKind::RagChunks => "Reference material",
    }
}

/// Render an attachment as a standalone text part.
pub fn render_attachment(attachment: &Attachment) -> String {
    format!(
        "{}:\n{}",
        attachment_heading(attachment.kind),
        attachment.payload
    )
}

/// A concrete client for one wire protocol.
///
/// Each method receives the resolved [`Service`] (endpoint, model, key
/// reference). Kinds a backend cannot serve keep the default
/// implementation, which fails with a descriptive error.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short protocol identifier, e.g. `"openai"`.
    fn name(&self) -> &str;

    async fn chat(&self, service: &Service, request: &ChatRequest) -> Result<String> {
        let _ = (service, request);
        bail!("chat is not supported by backend '{}'", self.name())
    }

    async fn embed(&self, service: &Service, request: &EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
        let _ = (service, request);
        bail!("embedding is not supported by backend '{}'", self.name())
    }

    async fn transcribe(&self, service: &Service, request: &TranscriptionRequest) -> Result<String> {
        let _ = (service, request);
        bail!(
            "transcription is not supported by backend '{}'",
            self.name()
        )
    }

    async fn synthesize(&self, service: &Service, request: &SynthesisRequest) -> Result<Vec<u8>> {
        let _ = (service, request);
        bail!("synthesis is not supported by backend '{}'", self.name())
    }
}
