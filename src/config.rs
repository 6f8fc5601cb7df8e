//! TOML configuration: prompts, services, footer and retrieval settings.
//!
//! The configuration is read once per session and handed around as an
//! immutable value. Missing sections fall back to [`Config::builtin`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use wallo_core::models::{AttachmentMode, BackendKind, Prompt, Service, ServiceKind};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_prompt_footer", alias = "promptFooter")]
    pub prompt_footer: String,
    /// Send preceding completed exchanges as chat history.
    #[serde(default)]
    pub include_history: bool,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RagConfig {
    #[serde(default = "default_rag_path")]
    pub path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_top_k")]
    pub top_k: i64,
    /// Most chunk texts sent in one embedding request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Embedding service name; the default embedding service when unset.
    #[serde(default)]
    pub embedding_service: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            path: default_rag_path(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            batch_size: default_batch_size(),
            embedding_service: None,
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}
fn default_prompt_footer() -> String {
    "\nPlease reply with the html formatted string only".to_string()
}
fn default_rag_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wallo_rag")
        .join("index.json")
}
fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_top_k() -> i64 {
    4
}
fn default_batch_size() -> usize {
    64
}

/// Replace a leading `~` with the home directory.
fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

/// `~/.wallo.toml`, or `./.wallo.toml` when no home directory is known.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".wallo.toml")
}

impl Config {
    /// Defaults used when no configuration file exists.
    pub fn builtin() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            prompt_footer: default_prompt_footer(),
            include_history: false,
            rag: RagConfig::default(),
            prompts: builtin_prompts(),
            services: builtin_services(),
        }
    }

    pub fn prompt(&self, name: &str) -> Option<&Prompt> {
        self.prompts.iter().find(|p| p.name == name)
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn default_service(&self, kind: ServiceKind) -> Option<&Service> {
        self.services.values().find(|s| s.kind == kind && s.default)
    }

    fn validate(&self) -> Result<()> {
        if self.rag.chunk_size == 0 {
            bail!("rag.chunk_size must be > 0");
        }
        if self.rag.chunk_overlap >= self.rag.chunk_size {
            bail!(
                "rag.chunk_overlap ({}) must be smaller than rag.chunk_size ({})",
                self.rag.chunk_overlap,
                self.rag.chunk_size
            );
        }
        if self.rag.top_k < 1 {
            bail!("rag.top_k must be >= 1");
        }
        if self.rag.batch_size < 1 {
            bail!("rag.batch_size must be >= 1");
        }

        let mut seen: Vec<&str> = Vec::new();
        for prompt in &self.prompts {
            if seen.contains(&prompt.name.as_str()) {
                bail!("Duplicate prompt name: '{}'", prompt.name);
            }
            seen.push(&prompt.name);
            if prompt.attachment == AttachmentMode::Inquiry
                && prompt.declared_inquiry_fields().is_empty()
            {
                bail!(
                    "Prompt '{}' uses attachment 'inquiry' but declares no inquiry fields",
                    prompt.name
                );
            }
        }

        for kind in ServiceKind::ALL {
            let defaults: Vec<&str> = self
                .services
                .values()
                .filter(|s| s.kind == kind && s.default)
                .map(|s| s.name.as_str())
                .collect();
            if defaults.len() > 1 {
                bail!(
                    "At most one default {} service allowed, found: {}",
                    kind,
                    defaults.join(", ")
                );
            }
        }

        if let Some(name) = &self.rag.embedding_service {
            match self.services.get(name) {
                Some(s) if s.kind == ServiceKind::Embedding => {}
                Some(s) => bail!(
                    "rag.embedding_service '{}' is a {} service, not embedding",
                    name,
                    s.kind
                ),
                None => bail!("rag.embedding_service '{}' is not configured", name),
            }
        }

        Ok(())
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.prompts.is_empty() {
        config.prompts = builtin_prompts();
    }
    if config.services.is_empty() {
        config.services = builtin_services();
    }
    for (name, service) in config.services.iter_mut() {
        service.name = name.clone();
    }
    config.rag.path = expand_home(&config.rag.path);

    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Invalid config file: {}", path.display()))
}

fn builtin_prompts() -> Vec<Prompt> {
    vec![
        Prompt {
            name: "Professional".to_string(),
            description: "Make the text professional".to_string(),
            user_prompt: "Can you make the following paragraph more professional and polished:"
                .to_string(),
            attachment: AttachmentMode::Selection,
            inquiry_fields: None,
            service: None,
        },
        Prompt {
            name: "summarize_paper".to_string(),
            description: "Summarize pdf after uploading it".to_string(),
            user_prompt: "Can you summarize the following paper:".to_string(),
            attachment: AttachmentMode::Pdf,
            inquiry_fields: None,
            service: None,
        },
        Prompt {
            name: "summarize the paper".to_string(),
            description: "Summarize in a given number of words".to_string(),
            user_prompt: "Can you summarize the following paper in |k words|:".to_string(),
            attachment: AttachmentMode::Inquiry,
            inquiry_fields: None,
            service: None,
        },
    ]
}

fn builtin_services() -> BTreeMap<String, Service> {
    let openai = |name: &str, kind: ServiceKind, model: &str, voice: Option<&str>| Service {
        name: name.to_string(),
        kind,
        backend: BackendKind::Openai,
        endpoint: String::new(),
        api_key_env: Some("OPENAI_API_KEY".to_string()),
        model: model.to_string(),
        default: true,
        voice: voice.map(String::from),
    };
    [
        openai("openAI", ServiceKind::Chat, "gpt-4o", None),
        openai(
            "openAI-embedding",
            ServiceKind::Embedding,
            "text-embedding-3-small",
            None,
        ),
        openai("whisper", ServiceKind::Transcription, "whisper-1", None),
        openai("tts", ServiceKind::Synthesis, "tts-1", Some("alloy")),
    ]
    .into_iter()
    .map(|s| (s.name.clone(), s))
    .collect()
}
