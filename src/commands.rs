//! Handlers behind the `wallo` subcommands.
//!
//! Each handler prints human-readable output to stdout; logs go to stderr.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use wallo_core::models::{ExchangeStatus, ServiceKind};

use crate::assistant::Assistant;
use crate::config::Config;

/// Options for `wallo ask`.
#[derive(Debug, Default)]
pub struct AskOptions {
    pub text: String,
    /// Prompt name; free chat when `None`.
    pub prompt: Option<String>,
    pub service: Option<String>,
    pub file: Option<PathBuf>,
    pub rag: bool,
    pub answers: Vec<(String, String)>,
}

pub async fn run_ingest(assistant: &Assistant, paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        if !path.exists() {
            bail!("No such file or directory: {}", path.display());
        }
        let report = assistant
            .ingest_path(path)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        println!(
            "{}: {} files, {} chunks, {} skipped",
            path.display(),
            report.files,
            report.chunks,
            report.skipped.len()
        );
        for (file, reason) in &report.skipped {
            println!("  skipped {}: {}", file.display(), reason);
        }
    }
    println!(
        "index: {} chunks from {} sources ({})",
        assistant.index().len().await,
        assistant.index().sources().await.len(),
        assistant.index().path().display()
    );
    Ok(())
}

pub async fn run_query(assistant: &Assistant, text: &str, k: Option<i64>) -> Result<()> {
    let result = assistant.query(text, k).await?;
    if let Some(warning) = &result.warning {
        println!("warning: {}", warning);
    }
    if result.hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (rank, hit) in result.hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({}..{})",
            rank + 1,
            hit.score,
            hit.chunk.source_path,
            hit.chunk.offset_range.start,
            hit.chunk.offset_range.end
        );
        println!("   {}", snippet(&hit.chunk.text, 160));
    }
    Ok(())
}

/// Run one exchange to completion. Returns `false` when the task failed.
pub async fn run_ask(assistant: &Assistant, opts: AskOptions) -> Result<bool> {
    let id = assistant.add_exchange(None, &opts.text)?;
    if opts.rag {
        assistant.store().set_rag(&id, true)?;
    }
    if let Some(file) = opts.file {
        assistant.store().set_attached_file(&id, Some(file))?;
    }

    let handle = match &opts.prompt {
        Some(name) => {
            let answers: BTreeMap<String, String> = opts.answers.into_iter().collect();
            assistant.submit_prompt(&id, name, answers, opts.service)?
        }
        None => assistant.submit_chat(&id, opts.service)?,
    };

    match handle.wait().await {
        ExchangeStatus::Done => {
            let exchange = assistant.store().get(&id)?;
            for warning in &exchange.warnings {
                eprintln!("warning: {}", warning);
            }
            println!("{}", exchange.reply_text);
            Ok(true)
        }
        ExchangeStatus::Failed { detail } => {
            eprintln!("error: {}", detail);
            Ok(false)
        }
        other => bail!("Task ended in unexpected state {:?}", other),
    }
}

pub async fn run_transcribe(assistant: &Assistant, audio_path: &Path) -> Result<bool> {
    let audio = tokio::fs::read(audio_path)
        .await
        .with_context(|| format!("Failed to read audio file: {}", audio_path.display()))?;
    let format = audio_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("wav")
        .to_ascii_lowercase();

    let id = assistant.add_exchange(None, "")?;
    let handle = assistant.submit_transcription(&id, audio, &format, None)?;
    match handle.wait().await {
        ExchangeStatus::Failed { detail } => {
            eprintln!("error: {}", detail);
            Ok(false)
        }
        _ => {
            println!("{}", assistant.store().get(&id)?.task_text);
            Ok(true)
        }
    }
}

pub async fn run_speak(assistant: &Assistant, text: &str, out: &Path) -> Result<bool> {
    let id = assistant.add_exchange(None, text)?;
    let handle = assistant.submit_synthesis(&id, None)?;
    if let ExchangeStatus::Failed { detail } = handle.wait().await {
        eprintln!("error: {}", detail);
        return Ok(false);
    }
    let audio = assistant
        .store()
        .get(&id)?
        .synthesized_audio
        .unwrap_or_default();
    tokio::fs::write(out, &audio)
        .await
        .with_context(|| format!("Failed to write audio to {}", out.display()))?;
    println!("wrote {} bytes to {}", audio.len(), out.display());
    Ok(true)
}

pub fn list_prompts(config: &Config) {
    for prompt in &config.prompts {
        let attachment = format!("{:?}", prompt.attachment).to_lowercase();
        println!("{:<20} {:<10} {}", prompt.name, attachment, prompt.description);
        let fields = prompt.declared_inquiry_fields();
        if !fields.is_empty() {
            println!("{:<20} asks for: {}", "", fields.join(", "));
        }
    }
}

pub fn list_services(config: &Config) {
    for kind in ServiceKind::ALL {
        for service in config.services.values().filter(|s| s.kind == kind) {
            let backend = format!("{:?}", service.backend).to_lowercase();
            println!(
                "{:<20} {:<14} {:<8} {}{}",
                service.name,
                kind,
                backend,
                service.model,
                if service.default { "  (default)" } else { "" }
            );
        }
    }
}

/// Parse a `key=value` pair for `--answer` arguments.
pub fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut)
}
