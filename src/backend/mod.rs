//! Concrete service clients.
//!
//! Each client implements [`wallo_core::service::Backend`] for one wire
//! protocol:
//! - **[`OpenAiBackend`]**: OpenAI's REST API or any compatible server
//!   (chat, embedding, transcription, synthesis).
//! - **[`GeminiBackend`]**: Google's Generative Language API (chat,
//!   embedding, transcription).
//!
//! Failures are plain `anyhow` errors; the [`ServiceRouter`](crate::router::ServiceRouter)
//! normalizes them. No request is ever retried.

mod gemini;
mod openai;

pub use gemini::GeminiBackend;
pub use openai::OpenAiBackend;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use wallo_core::models::{BackendKind, Service};
use wallo_core::service::Backend;

/// Resolve a service's API key from the environment variable it names.
///
/// Services without `api_key_env` (local servers) are called without a key.
pub fn api_key(service: &Service) -> Result<Option<String>> {
    match &service.api_key_env {
        None => Ok(None),
        Some(var) => std::env::var(var)
            .map(Some)
            .map_err(|_| anyhow!("{} environment variable not set", var)),
    }
}

/// Base URL for `service`, falling back to `default` and dropping a trailing `/`.
pub(crate) fn base_url<'a>(service: &'a Service, default: &'a str) -> &'a str {
    let url = if service.endpoint.trim().is_empty() {
        default
    } else {
        service.endpoint.trim()
    };
    url.trim_end_matches('/')
}

/// Send a request, failing on a non-2xx status with the response body as detail.
pub(crate) async fn send(request: reqwest::RequestBuilder, api: &str) -> Result<reqwest::Response> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", api, status, body_text);
    }
    Ok(response)
}

pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    api: &str,
) -> Result<serde_json::Value> {
    Ok(send(request, api).await?.json().await?)
}

/// One client per wire protocol, sharing a connection pool.
pub fn default_backends() -> Result<HashMap<BackendKind, Arc<dyn Backend>>> {
    let client = reqwest::Client::builder().build()?;
    let mut backends: HashMap<BackendKind, Arc<dyn Backend>> = HashMap::new();
    backends.insert(
        BackendKind::Openai,
        Arc::new(OpenAiBackend::new(client.clone())),
    );
    backends.insert(BackendKind::Gemini, Arc::new(GeminiBackend::new(client)));
    Ok(backends)
}
