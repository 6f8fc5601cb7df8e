//! Prompt assembly.
//!
//! [`PromptBuilder`] turns a configured [`Prompt`] plus live context into
//! the final request text. Sections are appended in a fixed order:
//!
//! 1. the user-prompt template with `|field|` inquiry placeholders replaced,
//! 2. the context selected by the prompt's [`AttachmentMode`],
//! 3. retrieved reference chunks with source attribution (RAG enabled only),
//! 4. the configured footer, verbatim.
//!
//! Sections 1–3 are separated by a blank line. The footer is appended
//! as-is, so a footer starting with `\n` controls its own spacing.

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::{Attachment, AttachmentKind, AttachmentMode, Prompt, ScoredChunk};

/// Live inputs for one prompt invocation.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    /// Exchange task text (the user's selection).
    pub selection: &'a str,
    /// Text extracted from the exchange's attached document.
    pub document_text: Option<&'a str>,
    pub inquiry_answers: &'a BTreeMap<String, String>,
    pub rag_enabled: bool,
    pub retrieved: &'a [ScoredChunk],
}

static NO_ANSWERS: BTreeMap<String, String> = BTreeMap::new();

impl Default for PromptContext<'_> {
    fn default() -> Self {
        Self {
            selection: "",
            document_text: None,
            inquiry_answers: &NO_ANSWERS,
            rag_enabled: false,
            retrieved: &[],
        }
    }
}

/// Final request text and the attachments that went into it.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPrompt {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    footer: String,
}

impl PromptBuilder {
    pub fn new(footer: impl Into<String>) -> Self {
        Self {
            footer: footer.into(),
        }
    }

    pub fn footer(&self) -> &str {
        &self.footer
    }

    /// Check that every declared field of an `inquiry` prompt has a
    /// non-blank answer. Other modes always pass.
    pub fn validate(prompt: &Prompt, answers: &BTreeMap<String, String>) -> Result<()> {
        if prompt.attachment != AttachmentMode::Inquiry {
            return Ok(());
        }
        for field in prompt.declared_inquiry_fields() {
            let answered = answers.get(&field).is_some_and(|a| !a.trim().is_empty());
            if !answered {
                return Err(Error::MissingInquiryAnswer {
                    prompt: prompt.name.clone(),
                    field,
                });
            }
        }
        Ok(())
    }

    /// Assemble the request text for `prompt`.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingInquiryAnswer`] when an `inquiry` prompt lacks an
    ///   answer for any declared field.
    /// - [`Error::InvalidArgument`] when a `selection` prompt has no text or
    ///   a `pdf` prompt has no attached document.
    pub fn build(&self, prompt: &Prompt, ctx: &PromptContext<'_>) -> Result<BuiltPrompt> {
        Self::validate(prompt, ctx.inquiry_answers)?;
        let fields = prompt.declared_inquiry_fields();

        let mut sections = vec![substitute_fields(
            &prompt.user_prompt,
            &fields,
            ctx.inquiry_answers,
        )];
        let mut attachments = Vec::new();

        let answers: Vec<String> = fields
            .iter()
            .filter_map(|f| ctx.inquiry_answers.get(f).map(|a| format!("{}: {}", f, a)))
            .collect();
        if !answers.is_empty() {
            attachments.push(Attachment {
                kind: AttachmentKind::InquiryAnswers,
                payload: answers.join("\n"),
            });
        }

        match prompt.attachment {
            AttachmentMode::Selection => {
                if ctx.selection.trim().is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "prompt '{}' needs selected text",
                        prompt.name
                    )));
                }
                sections.push(ctx.selection.to_string());
                attachments.push(Attachment {
                    kind: AttachmentKind::SelectionText,
                    payload: ctx.selection.to_string(),
                });
            }
            AttachmentMode::Pdf => {
                let text = ctx.document_text.ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "prompt '{}' needs an attached document",
                        prompt.name
                    ))
                })?;
                if !text.is_empty() {
                    sections.push(text.to_string());
                }
                attachments.push(Attachment {
                    kind: AttachmentKind::PdfText,
                    payload: text.to_string(),
                });
            }
            AttachmentMode::Inquiry | AttachmentMode::None => {}
        }

        Ok(self.finish(sections, attachments, ctx))
    }

    /// Free chat: the exchange text itself is the request, followed by any
    /// retrieved references and the footer.
    pub fn build_chat(&self, ctx: &PromptContext<'_>) -> BuiltPrompt {
        let sections = vec![ctx.selection.trim().to_string()];
        let attachments = vec![Attachment {
            kind: AttachmentKind::SelectionText,
            payload: ctx.selection.to_string(),
        }];
        self.finish(sections, attachments, ctx)
    }

    fn finish(
        &self,
        mut sections: Vec<String>,
        mut attachments: Vec<Attachment>,
        ctx: &PromptContext<'_>,
    ) -> BuiltPrompt {
        if ctx.rag_enabled && !ctx.retrieved.is_empty() {
            let references = format_references(ctx.retrieved);
            sections.push(format!("Reference material:\n{}", references));
            attachments.push(Attachment {
                kind: AttachmentKind::RagChunks,
                payload: references,
            });
        }

        let mut text = sections
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        text.push_str(&self.footer);

        BuiltPrompt { text, attachments }
    }
}

fn substitute_fields(
    template: &str,
    fields: &[String],
    answers: &BTreeMap<String, String>,
) -> String {
    let mut out = template.to_string();
    for field in fields {
        if let Some(answer) = answers.get(field) {
            out = out.replace(&format!("|{}|", field), answer.trim());
        }
    }
    out
}

fn format_references(retrieved: &[ScoredChunk]) -> String {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[{}] (source: {})\n{}",
                i + 1,
                hit.chunk.source_path,
                hit.chunk.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Strip whitespace and a surrounding Markdown code fence from a model reply.
pub fn clean_reply(content: &str) -> String {
    let mut content = content.trim();
    if let Some(stripped) = content.strip_suffix("```") {
        content = stripped.trim_end();
    }
    if content.starts_with("```") {
        content = content.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    }
    content.trim().to_string()
}
