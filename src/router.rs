//! Service resolution and error normalization.
//!
//! [`ServiceRouter`] picks the configured [`Service`] for a request
//! (explicit name first, then the default of the required kind) and hands
//! it to the [`Backend`] registered for the service's protocol. Whatever
//! the backend reports is folded into [`Error::ServiceCallFailed`]; nothing
//! is retried.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use wallo_core::error::{Error, Result};
use wallo_core::models::{BackendKind, Service, ServiceKind};
use wallo_core::service::{
    Backend, ChatRequest, EmbeddingRequest, ServiceRequest, ServiceResponse, SynthesisRequest,
    TranscriptionRequest,
};

use crate::backend;
use crate::config::Config;

pub struct ServiceRouter {
    config: Arc<Config>,
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
}

impl ServiceRouter {
    /// Router with the built-in HTTP clients.
    pub fn new(config: Arc<Config>) -> anyhow::Result<Self> {
        Ok(Self {
            config,
            backends: backend::default_backends()?,
        })
    }

    /// Router with no clients registered; add them with [`with_backend`](Self::with_backend).
    pub fn empty(config: Arc<Config>) -> Self {
        Self {
            config,
            backends: HashMap::new(),
        }
    }

    /// Register (or replace) the client used for services speaking `kind`.
    pub fn with_backend(mut self, kind: BackendKind, backend: Arc<dyn Backend>) -> Self {
        self.backends.insert(kind, backend);
        self
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Resolve the service for `kind`: `name` if given, else the kind's default.
    pub fn resolve(&self, kind: ServiceKind, name: Option<&str>) -> Result<&Service> {
        let not_configured = || Error::NoServiceConfigured {
            kind,
            name: name.map(String::from),
        };
        match name {
            Some(name) => match self.config.service(name) {
                Some(service) if service.kind == kind => Ok(service),
                Some(service) => {
                    warn!(
                        service = name,
                        expected = %kind,
                        actual = %service.kind,
                        "service kind mismatch"
                    );
                    Err(not_configured())
                }
                None => Err(not_configured()),
            },
            None => self.config.default_service(kind).ok_or_else(not_configured),
        }
    }

    /// Dispatch a normalized request to the resolved service.
    pub async fn call(&self, name: Option<&str>, request: ServiceRequest) -> Result<ServiceResponse> {
        self.dispatch(name, request).await.map(|(_, response)| response)
    }

    /// [`call`](Self::call), also returning the service that answered.
    async fn dispatch(
        &self,
        name: Option<&str>,
        request: ServiceRequest,
    ) -> Result<(&Service, ServiceResponse)> {
        let kind = request.kind();
        let service = self.resolve(kind, name)?;
        let failed = |detail: String| Error::ServiceCallFailed {
            kind,
            service_name: service.name.clone(),
            detail,
        };

        let backend = self
            .backends
            .get(&service.backend)
            .ok_or_else(|| failed(format!("no client for backend {:?}", service.backend)))?;
        debug!(service = %service.name, %kind, backend = backend.name(), "calling service");

        let outcome = match &request {
            ServiceRequest::Chat(req) => backend.chat(service, req).await.map(ServiceResponse::Text),
            ServiceRequest::Embedding(req) => backend
                .embed(service, req)
                .await
                .map(ServiceResponse::Embeddings),
            ServiceRequest::Transcription(req) => backend
                .transcribe(service, req)
                .await
                .map(ServiceResponse::Text),
            ServiceRequest::Synthesis(req) => backend
                .synthesize(service, req)
                .await
                .map(ServiceResponse::Audio),
        };

        let response = outcome.map_err(|e| {
            warn!(service = %service.name, %kind, "service call failed: {:#}", e);
            failed(format!("{:#}", e))
        })?;

        if let (ServiceRequest::Embedding(req), ServiceResponse::Embeddings(vecs)) =
            (&request, &response)
        {
            if vecs.len() != req.texts.len() {
                return Err(failed(format!(
                    "returned {} vectors for {} texts",
                    vecs.len(),
                    req.texts.len()
                )));
            }
        }

        Ok((service, response))
    }

    pub async fn chat(&self, name: Option<&str>, request: ChatRequest) -> Result<String> {
        match self.dispatch(name, ServiceRequest::Chat(request)).await? {
            (_, ServiceResponse::Text(text)) => Ok(text),
            (service, other) => Err(unexpected(ServiceKind::Chat, service, &other)),
        }
    }

    pub async fn embed(&self, name: Option<&str>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match self
            .dispatch(name, ServiceRequest::Embedding(EmbeddingRequest { texts }))
            .await?
        {
            (_, ServiceResponse::Embeddings(vecs)) => Ok(vecs),
            (service, other) => Err(unexpected(ServiceKind::Embedding, service, &other)),
        }
    }

    pub async fn transcribe(&self, name: Option<&str>, request: TranscriptionRequest) -> Result<String> {
        match self.dispatch(name, ServiceRequest::Transcription(request)).await? {
            (_, ServiceResponse::Text(text)) => Ok(text),
            (service, other) => Err(unexpected(ServiceKind::Transcription, service, &other)),
        }
    }

    pub async fn synthesize(&self, name: Option<&str>, text: String) -> Result<Vec<u8>> {
        match self
            .dispatch(name, ServiceRequest::Synthesis(SynthesisRequest { text }))
            .await?
        {
            (_, ServiceResponse::Audio(audio)) => Ok(audio),
            (service, other) => Err(unexpected(ServiceKind::Synthesis, service, &other)),
        }
    }
}

fn unexpected(kind: ServiceKind, service: &Service, response: &ServiceResponse) -> Error {
    let shape = match response {
        ServiceResponse::Text(_) => "text",
        ServiceResponse::Embeddings(_) => "embeddings",
        ServiceResponse::Audio(_) => "audio",
    };
    Error::ServiceCallFailed {
        kind,
        service_name: service.name.clone(),
        detail: format!("unexpected {} response to a {} request", shape, kind),
    }
}
