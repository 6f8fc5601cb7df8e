//! The operations a front end drives.
//!
//! [`Assistant`] wires configuration, router, retrieval index, exchange
//! store and task runner together. UI-facing calls either mutate the store
//! directly (edits) or submit a task; task failures of every kind end up as
//! the exchange's `failed` status rather than an error returned here.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::warn;

use wallo_core::error::{Error, Result};
use wallo_core::models::{AttachmentMode, Prompt};
use wallo_core::prompt::{clean_reply, PromptBuilder, PromptContext};
use wallo_core::service::{ChatMessage, ChatRequest, TranscriptionRequest};

use crate::config::Config;
use crate::exchange::{ExchangeStore, TaskOutput};
use crate::extract;
use crate::index::{IngestReport, QueryResult, RagIndex};
use crate::router::ServiceRouter;
use crate::runner::{TaskContext, TaskHandle, TaskRunner};

const STAGE_PDF: &str = "extracting PDF";
const STAGE_INDEX: &str = "querying index";
const STAGE_MODEL: &str = "awaiting model";

/// Shared state handed to every chat task.
#[derive(Clone)]
struct ChatDeps {
    config: Arc<Config>,
    router: Arc<ServiceRouter>,
    index: Arc<RagIndex>,
    store: Arc<ExchangeStore>,
    builder: PromptBuilder,
}

/// What a chat task asks the model.
enum ChatKind {
    Prompt {
        prompt: Prompt,
        answers: BTreeMap<String, String>,
    },
    Free,
}

pub struct Assistant {
    deps: ChatDeps,
    runner: TaskRunner,
}

impl Assistant {
    /// Open the retrieval index and build an assistant on the current runtime.
    pub async fn new(config: Arc<Config>, router: Arc<ServiceRouter>) -> Result<Self> {
        let index = Arc::new(RagIndex::open(&config.rag, Arc::clone(&router)).await?);
        let store = Arc::new(ExchangeStore::new());
        let runner = TaskRunner::new(Arc::clone(&store), Handle::current());
        let builder = PromptBuilder::new(config.prompt_footer.clone());
        Ok(Self {
            deps: ChatDeps {
                config,
                router,
                index,
                store,
                builder,
            },
            runner,
        })
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.deps.config
    }

    pub fn store(&self) -> &Arc<ExchangeStore> {
        &self.deps.store
    }

    pub fn index(&self) -> &Arc<RagIndex> {
        &self.deps.index
    }

    pub fn add_exchange(&self, after: Option<&str>, text: &str) -> Result<String> {
        self.deps.store.add_exchange(after, text)
    }

    pub fn remove_exchange(&self, id: &str) -> Result<()> {
        self.deps.store.remove_exchange(id).map(|_| ())
    }

    pub fn edit_exchange_text(&self, id: &str, text: &str) -> Result<()> {
        self.deps.store.edit_task_text(id, text)
    }

    pub fn toggle_rag(&self, id: &str) -> Result<bool> {
        self.deps.store.toggle_rag(id)
    }

    /// Run a configured prompt against exchange `id`.
    ///
    /// `service` overrides the prompt's own chat service. Missing inquiry
    /// answers fail the task, not this call.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownPrompt`], plus the submission errors of [`TaskRunner::submit`].
    pub fn submit_prompt(
        &self,
        id: &str,
        prompt_name: &str,
        answers: BTreeMap<String, String>,
        service: Option<String>,
    ) -> Result<TaskHandle> {
        let prompt = self
            .deps
            .config
            .prompt(prompt_name)
            .cloned()
            .ok_or_else(|| Error::UnknownPrompt(prompt_name.to_string()))?;
        let service = service.or_else(|| prompt.service.clone());
        let deps = self.deps.clone();
        self.runner.submit(id, move |ctx| {
            run_chat(deps, ctx, ChatKind::Prompt { prompt, answers }, service)
        })
    }

    /// Send the exchange's task text as-is (no template), footer appended.
    pub fn submit_chat(&self, id: &str, service: Option<String>) -> Result<TaskHandle> {
        let deps = self.deps.clone();
        self.runner
            .submit(id, move |ctx| run_chat(deps, ctx, ChatKind::Free, service))
    }

    /// Transcribe `audio` and append the transcript to the task text.
    pub fn submit_transcription(
        &self,
        id: &str,
        audio: Vec<u8>,
        format: &str,
        service: Option<String>,
    ) -> Result<TaskHandle> {
        let router = Arc::clone(&self.deps.router);
        let format = format.to_string();
        self.runner.submit(id, move |ctx| async move {
            ctx.stage.stage(STAGE_MODEL);
            let transcript = router
                .transcribe(service.as_deref(), TranscriptionRequest { audio, format })
                .await?;
            Ok(TaskOutput::Transcript(transcript))
        })
    }

    /// Speak the exchange's reply, or its task text when there is no reply yet.
    pub fn submit_synthesis(&self, id: &str, service: Option<String>) -> Result<TaskHandle> {
        let router = Arc::clone(&self.deps.router);
        self.runner.submit(id, move |ctx| async move {
            let ex = &ctx.exchange;
            let text = if ex.reply_text.trim().is_empty() {
                ex.task_text.trim().to_string()
            } else {
                ex.reply_text.trim().to_string()
            };
            if text.is_empty() {
                return Err(Error::InvalidArgument(
                    "nothing to synthesize: exchange is empty".to_string(),
                ));
            }
            ctx.stage.stage(STAGE_MODEL);
            let audio = router.synthesize(service.as_deref(), text).await?;
            Ok(TaskOutput::Audio(audio))
        })
    }

    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        self.deps.index.ingest_path(path).await
    }

    /// Query the index with `k`, or the configured `top_k` when `None`.
    pub async fn query(&self, text: &str, k: Option<i64>) -> Result<QueryResult> {
        let k = k.unwrap_or(self.deps.config.rag.top_k);
        self.deps.index.query(text, k).await
    }
}

async fn run_chat(
    deps: ChatDeps,
    ctx: TaskContext,
    kind: ChatKind,
    service: Option<String>,
) -> Result<TaskOutput> {
    let exchange = &ctx.exchange;

    if let ChatKind::Prompt { prompt, answers } = &kind {
        PromptBuilder::validate(prompt, answers)?;
    }

    let document_text = match &kind {
        ChatKind::Prompt { prompt, .. } if prompt.attachment == AttachmentMode::Pdf => {
            let path = exchange.attached_file.clone().ok_or_else(|| {
                Error::InvalidArgument(format!("prompt '{}' needs an attached document", prompt.name))
            })?;
            ctx.stage.stage(STAGE_PDF);
            Some(extract::load_file(path).await?)
        }
        _ => None,
    };

    let mut warnings = Vec::new();
    let retrieved = if exchange.rag_enabled {
        ctx.stage.stage(STAGE_INDEX);
        let query_text = match &kind {
            ChatKind::Prompt { prompt, .. } if exchange.task_text.trim().is_empty() => {
                prompt.user_prompt.as_str()
            }
            _ => exchange.task_text.as_str(),
        };
        let QueryResult { hits, warning } =
            deps.index.query(query_text, deps.config.rag.top_k).await?;
        if let Some(warning) = warning {
            warn!(exchange = %exchange.id, "{}", warning);
            warnings.push(warning.to_string());
        }
        hits
    } else {
        Vec::new()
    };

    let no_answers = BTreeMap::new();
    let prompt_ctx = PromptContext {
        selection: &exchange.task_text,
        document_text: document_text.as_deref(),
        inquiry_answers: match &kind {
            ChatKind::Prompt { answers, .. } => answers,
            ChatKind::Free => &no_answers,
        },
        rag_enabled: exchange.rag_enabled,
        retrieved: &retrieved,
    };
    let built = match &kind {
        ChatKind::Prompt { prompt, .. } => deps.builder.build(prompt, &prompt_ctx)?,
        ChatKind::Free => deps.builder.build_chat(&prompt_ctx),
    };

    let mut messages = vec![ChatMessage::system(deps.config.system_prompt.clone())];
    if deps.config.include_history {
        for (task, reply) in deps.store.history_before(&exchange.id)? {
            messages.push(ChatMessage::user(task));
            messages.push(ChatMessage::assistant(reply));
        }
    }
    messages.push(ChatMessage::user(built.text));

    ctx.stage.stage(STAGE_MODEL);
    let reply = deps
        .router
        .chat(
            service.as_deref(),
            ChatRequest {
                messages,
                ..Default::default()
            },
        )
        .await?;

    Ok(TaskOutput::Reply {
        text: clean_reply(&reply),
        attachments: built.attachments,
        warnings,
    })
}
