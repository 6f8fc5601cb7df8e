//! Error kinds for wallo.
//!
//! One closed enumeration covers every failure the writing assistant can
//! report. Each variant renders a human-readable message through `Display`;
//! that message is what a failed Exchange shows inline. None of these kinds
//! is retried anywhere in the crate.

use thiserror::Error;

use crate::models::ServiceKind;

/// Main error type for wallo operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The document type discriminator is not one DocumentLoader understands.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The parser could not produce text (corrupt file, encrypted PDF, no text layer).
    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    /// Bad caller input, e.g. `k <= 0` or `overlap >= target_size`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding service could not be reached or returned an error.
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),

    /// Persisted index state could not be deserialized.
    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    /// The persisted index could not be written.
    #[error("failed to persist index: {0}")]
    IndexPersistFailed(String),

    /// Neither an explicit service nor a default of the required kind exists.
    #[error("no {kind} service configured{}", name.as_ref().map(|n| format!(" (requested '{}')", n)).unwrap_or_default())]
    NoServiceConfigured {
        kind: ServiceKind,
        name: Option<String>,
    },

    /// A backend call failed. `detail` carries the normalized backend message.
    #[error("{kind} call to service '{service_name}' failed: {detail}")]
    ServiceCallFailed {
        kind: ServiceKind,
        service_name: String,
        detail: String,
    },

    /// An inquiry prompt was invoked without an answer for a declared field.
    #[error("prompt '{prompt}' is missing an answer for '{field}'")]
    MissingInquiryAnswer { prompt: String, field: String },

    /// No prompt with this name exists in the configuration.
    #[error("unknown prompt: {0}")]
    UnknownPrompt(String),

    /// No exchange with this id exists in the store.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// The exchange already has a task in flight.
    #[error("exchange {0} already has a running task")]
    ExchangeRunning(String),
}

/// Result type alias for wallo operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_call_failed_display() {
        let err = Error::ServiceCallFailed {
            kind: ServiceKind::Chat,
            service_name: "openAI".to_string(),
            detail: "HTTP 401: invalid api key".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "chat call to service 'openAI' failed: HTTP 401: invalid api key"
        );
    }

    #[test]
    fn test_no_service_configured_display() {
        let err = Error::NoServiceConfigured {
            kind: ServiceKind::Synthesis,
            name: None,
        };
        assert_eq!(err.to_string(), "no synthesis service configured");

        let err = Error::NoServiceConfigured {
            kind: ServiceKind::Embedding,
            name: Some("local".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "no embedding service configured (requested 'local')"
        );
    }

    #[test]
    fn test_missing_inquiry_answer_display() {
        let err = Error::MissingInquiryAnswer {
            prompt: "summarize".to_string(),
            field: "k words".to_string(),
        };
        assert!(err.to_string().contains("k words"));
    }
}
