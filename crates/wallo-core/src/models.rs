//! Core data models used throughout wallo.
//!
//! These types describe the conversation turns, configured prompts and
//! services, and indexed document chunks that flow between prompt assembly,
//! the service router, and the retrieval index.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The capability a configured service provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Chat,
    Embedding,
    Transcription,
    Synthesis,
}

impl ServiceKind {
    pub const ALL: [ServiceKind; 4] = [
        ServiceKind::Chat,
        ServiceKind::Embedding,
        ServiceKind::Transcription,
        ServiceKind::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Chat => "chat",
            ServiceKind::Embedding => "embedding",
            ServiceKind::Transcription => "transcription",
            ServiceKind::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol spoken by a service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// OpenAI's API, or any server exposing the same routes.
    #[default]
    Openai,
    /// Google's Generative Language API.
    Gemini,
}

/// A configured backend endpoint of a given kind.
///
/// Services are keyed by name in the configuration table; `name` is filled
/// in from that key when the configuration is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    #[serde(skip)]
    pub name: String,
    pub kind: ServiceKind,
    #[serde(default)]
    pub backend: BackendKind,
    /// Base URL. Empty means the backend's public default.
    #[serde(default, alias = "url")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(alias = "model_id")]
    pub model: String,
    #[serde(default)]
    pub default: bool,
    /// Voice used by synthesis services.
    #[serde(default)]
    pub voice: Option<String>,
}

/// Which live context a prompt pulls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentMode {
    #[default]
    Selection,
    Pdf,
    Inquiry,
    None,
}

/// A user-selectable instruction template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(alias = "user-prompt")]
    pub user_prompt: String,
    #[serde(default, alias = "attachment_mode")]
    pub attachment: AttachmentMode,
    #[serde(default)]
    pub inquiry_fields: Option<Vec<String>>,
    /// Chat service to use instead of the default one.
    #[serde(default)]
    pub service: Option<String>,
}

impl Prompt {
    /// Fields the user must answer before an inquiry prompt can run.
    ///
    /// Explicit `inquiry_fields` win; otherwise every `|field|` placeholder
    /// in the template is a declared field, in order of appearance.
    pub fn declared_inquiry_fields(&self) -> Vec<String> {
        if let Some(fields) = &self.inquiry_fields {
            return fields.clone();
        }
        let mut fields: Vec<String> = Vec::new();
        let mut parts = self.user_prompt.split('|');
        // Segments at odd positions sit between a pair of pipes.
        parts.next();
        while let (Some(inner), Some(_)) = (parts.next(), parts.next()) {
            let field = inner.trim();
            if !field.is_empty() && !fields.iter().any(|f| f == field) {
                fields.push(field.to_string());
            }
        }
        fields
    }
}

/// Lifecycle of an exchange's most recent task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ExchangeStatus {
    #[default]
    Idle,
    Running,
    Done,
    Failed { detail: String },
}

impl ExchangeStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ExchangeStatus::Running)
    }
}

/// What an attachment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    SelectionText,
    PdfText,
    InquiryAnswers,
    RagChunks,
}

/// Contextual payload appended to a prompt, built fresh per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub payload: String,
}

/// One user turn: editable task text plus the model's editable reply.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub id: String,
    pub task_text: String,
    pub reply_text: String,
    /// Attachments used by the last completed request.
    pub attachments: Vec<Attachment>,
    pub rag_enabled: bool,
    pub status: ExchangeStatus,
    /// Display-only label for the current step of a running task.
    pub stage: Option<String>,
    /// Non-fatal problems met by the last task, e.g. a corrupted index.
    pub warnings: Vec<String>,
    /// Document offered as context to `pdf` prompts.
    pub attached_file: Option<PathBuf>,
    /// Audio produced by the last synthesis task.
    #[serde(skip)]
    pub synthesized_audio: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(task_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            task_text: task_text.into(),
            reply_text: String::new(),
            attachments: Vec::new(),
            rag_enabled: false,
            status: ExchangeStatus::Idle,
            stage: None,
            warnings: Vec::new(),
            attached_file: None,
            synthesized_audio: None,
            created_at: Utc::now(),
        }
    }
}

/// A contiguous, embedded segment of a source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub source_path: String,
    /// Byte range of `text` within the extracted source text.
    pub offset_range: Range<usize>,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// A chunk paired with its cosine similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(template: &str, fields: Option<Vec<&str>>) -> Prompt {
        Prompt {
            name: "p".to_string(),
            description: String::new(),
            user_prompt: template.to_string(),
            attachment: AttachmentMode::Inquiry,
            inquiry_fields: fields.map(|f| f.into_iter().map(String::from).collect()),
            service: None,
        }
    }

    #[test]
    fn test_inquiry_fields_from_placeholders() {
        let p = prompt(
            "Summarize the paper in |k words| for |audience|, keep |k words| strict:",
            None,
        );
        assert_eq!(p.declared_inquiry_fields(), vec!["k words", "audience"]);
    }

    #[test]
    fn test_inquiry_fields_explicit_wins() {
        let p = prompt("Translate into |language|", Some(vec!["language", "tone"]));
        assert_eq!(p.declared_inquiry_fields(), vec!["language", "tone"]);
    }

    #[test]
    fn test_unmatched_pipe_is_not_a_field() {
        let p = prompt("a | b", None);
        assert!(p.declared_inquiry_fields().is_empty());
    }

    #[test]
    fn test_service_kind_serde() {
        let kind: ServiceKind = serde_json::from_str("\"transcription\"").unwrap();
        assert_eq!(kind, ServiceKind::Transcription);
        assert_eq!(kind.to_string(), "transcription");
    }

    #[test]
    fn test_new_exchange_is_idle() {
        let ex = Exchange::new("draft");
        assert_eq!(ex.status, ExchangeStatus::Idle);
        assert!(!ex.rag_enabled);
        assert_eq!(ex.id.len(), 32);
    }
}
