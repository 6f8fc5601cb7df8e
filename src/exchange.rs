//! Ordered, independently editable conversation turns.
//!
//! [`ExchangeStore`] is the only owner of [`Exchange`] state. User edits and
//! task completions both go through its methods, each of which takes the
//! store lock for the duration of one mutation, so completions arriving from
//! different tasks can never interleave inside a single update.
//!
//! Status changes are broadcast as [`ExchangeEvent`]s for front ends that
//! prefer subscribing over polling.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use wallo_core::error::{Error, Result};
use wallo_core::models::{Attachment, Exchange, ExchangeStatus};

const EVENT_CAPACITY: usize = 256;

/// Notification emitted after a store mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeEvent {
    Added { id: String },
    Removed { id: String },
    /// Task or reply text, RAG flag or attached file changed.
    Edited { id: String },
    Status {
        id: String,
        status: ExchangeStatus,
        stage: Option<String>,
    },
}

/// What a finished task writes back into its exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutput {
    /// Chat reply; replaces the reply slot.
    Reply {
        text: String,
        attachments: Vec<Attachment>,
        warnings: Vec<String>,
    },
    /// Speech-to-text result; appended to the task text.
    Transcript(String),
    /// Synthesized speech for the exchange.
    Audio(Vec<u8>),
}

pub struct ExchangeStore {
    exchanges: Mutex<Vec<Exchange>>,
    events: broadcast::Sender<ExchangeEvent>,
}

impl Default for ExchangeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            exchanges: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Exchange>> {
        self.exchanges.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ExchangeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Apply `f` to exchange `id` under the store lock.
    fn with_exchange<T>(&self, id: &str, f: impl FnOnce(&mut Exchange) -> Result<T>) -> Result<T> {
        let mut exchanges = self.lock();
        let exchange = exchanges
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::UnknownExchange(id.to_string()))?;
        f(exchange)
    }

    fn edit<T>(&self, id: &str, f: impl FnOnce(&mut Exchange) -> Result<T>) -> Result<T> {
        let out = self.with_exchange(id, f)?;
        self.emit(ExchangeEvent::Edited { id: id.to_string() });
        Ok(out)
    }

    fn set_status(&self, id: &str, f: impl FnOnce(&mut Exchange) -> Result<()>) -> Result<Exchange> {
        let snapshot = self.with_exchange(id, |e| {
            f(e)?;
            Ok(e.clone())
        })?;
        self.emit(ExchangeEvent::Status {
            id: id.to_string(),
            status: snapshot.status.clone(),
            stage: snapshot.stage.clone(),
        });
        Ok(snapshot)
    }

    /// Insert a new exchange after `after`, or at the end when `None`.
    pub fn add_exchange(&self, after: Option<&str>, task_text: impl Into<String>) -> Result<String> {
        let exchange = Exchange::new(task_text);
        let id = exchange.id.clone();
        {
            let mut exchanges = self.lock();
            let position = match after {
                Some(after) => {
                    exchanges
                        .iter()
                        .position(|e| e.id == after)
                        .ok_or_else(|| Error::UnknownExchange(after.to_string()))?
                        + 1
                }
                None => exchanges.len(),
            };
            exchanges.insert(position, exchange);
        }
        self.emit(ExchangeEvent::Added { id: id.clone() });
        Ok(id)
    }

    /// Remove an exchange. Rejected while its task is running.
    pub fn remove_exchange(&self, id: &str) -> Result<Exchange> {
        let removed = {
            let mut exchanges = self.lock();
            let position = exchanges
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| Error::UnknownExchange(id.to_string()))?;
            if exchanges[position].status.is_running() {
                return Err(Error::ExchangeRunning(id.to_string()));
            }
            exchanges.remove(position)
        };
        self.emit(ExchangeEvent::Removed { id: id.to_string() });
        Ok(removed)
    }

    pub fn get(&self, id: &str) -> Result<Exchange> {
        self.with_exchange(id, |e| Ok(e.clone()))
    }

    /// Snapshot of all exchanges in order.
    pub fn list(&self) -> Vec<Exchange> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Task text stays editable while a task runs.
    pub fn edit_task_text(&self, id: &str, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.edit(id, |e| {
            e.task_text = text;
            Ok(())
        })
    }

    /// The reply slot is locked while the exchange's task runs.
    pub fn edit_reply_text(&self, id: &str, text: impl Into<String>) -> Result<()> {
        let text = text.into();
        self.edit(id, |e| {
            ensure_idle(e)?;
            e.reply_text = text;
            Ok(())
        })
    }

    /// Flip the RAG flag and return its new value.
    pub fn toggle_rag(&self, id: &str) -> Result<bool> {
        self.edit(id, |e| {
            e.rag_enabled = !e.rag_enabled;
            Ok(e.rag_enabled)
        })
    }

    pub fn set_rag(&self, id: &str, enabled: bool) -> Result<()> {
        self.edit(id, |e| {
            e.rag_enabled = enabled;
            Ok(())
        })
    }

    pub fn set_attached_file(&self, id: &str, file: Option<PathBuf>) -> Result<()> {
        self.edit(id, |e| {
            e.attached_file = file;
            Ok(())
        })
    }

    /// Keep the first paragraph of the task text and move every further
    /// paragraph (separated by a blank line) into its own exchange, inserted
    /// in order right after this one. Returns the new ids.
    pub fn split_paragraphs(&self, id: &str) -> Result<Vec<String>> {
        let created: Vec<String> = {
            let mut exchanges = self.lock();
            let position = exchanges
                .iter()
                .position(|e| e.id == id)
                .ok_or_else(|| Error::UnknownExchange(id.to_string()))?;

            let paragraphs: Vec<String> = exchanges[position]
                .task_text
                .split("\n\n")
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            let Some((first, rest)) = paragraphs.split_first() else {
                return Ok(Vec::new());
            };

            exchanges[position].task_text = first.clone();
            rest.iter()
                .enumerate()
                .map(|(offset, text)| {
                    let exchange = Exchange::new(text.clone());
                    let new_id = exchange.id.clone();
                    exchanges.insert(position + 1 + offset, exchange);
                    new_id
                })
                .collect()
        };

        self.emit(ExchangeEvent::Edited { id: id.to_string() });
        for new_id in &created {
            self.emit(ExchangeEvent::Added { id: new_id.clone() });
        }
        Ok(created)
    }

    /// Reply text becomes the task text; the reply slot is cleared.
    pub fn move_reply_to_task(&self, id: &str) -> Result<()> {
        self.edit(id, |e| {
            ensure_idle(e)?;
            e.task_text = std::mem::take(&mut e.reply_text);
            Ok(())
        })
    }

    /// Empty both text slots.
    pub fn clear(&self, id: &str) -> Result<()> {
        self.edit(id, |e| {
            ensure_idle(e)?;
            e.task_text.clear();
            e.reply_text.clear();
            e.attachments.clear();
            Ok(())
        })
    }

    /// `(task, reply)` pairs of the settled exchanges preceding `id`, oldest
    /// first. Exchanges without a reply are left out.
    pub fn history_before(&self, id: &str) -> Result<Vec<(String, String)>> {
        let exchanges = self.lock();
        let position = exchanges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| Error::UnknownExchange(id.to_string()))?;
        Ok(exchanges[..position]
            .iter()
            .filter(|e| !e.status.is_running() && !e.reply_text.trim().is_empty())
            .map(|e| (e.task_text.clone(), e.reply_text.clone()))
            .collect())
    }

    /// Mark the exchange running and return a snapshot of it.
    ///
    /// # Errors
    ///
    /// [`Error::ExchangeRunning`] when a task is already in flight for `id`.
    pub fn begin_task(&self, id: &str) -> Result<Exchange> {
        self.set_status(id, |e| {
            ensure_idle(e)?;
            e.status = ExchangeStatus::Running;
            e.stage = None;
            e.warnings.clear();
            Ok(())
        })
    }

    /// Update the display-only stage label of a running task.
    pub fn set_stage(&self, id: &str, stage: &str) -> Result<()> {
        self.set_status(id, |e| {
            if e.status.is_running() {
                e.stage = Some(stage.to_string());
            }
            Ok(())
        })
        .map(|_| ())
    }

    /// Write a task's result and mark the exchange done.
    pub fn complete(&self, id: &str, output: TaskOutput) -> Result<()> {
        self.set_status(id, |e| {
            match output {
                TaskOutput::Reply {
                    text,
                    attachments,
                    warnings,
                } => {
                    e.reply_text = text;
                    e.attachments = attachments;
                    e.warnings = warnings;
                }
                TaskOutput::Transcript(text) => {
                    let text = text.trim();
                    if !e.task_text.is_empty() && !text.is_empty() {
                        e.task_text.push('\n');
                    }
                    e.task_text.push_str(text);
                }
                TaskOutput::Audio(audio) => e.synthesized_audio = Some(audio),
            }
            e.status = ExchangeStatus::Done;
            e.stage = None;
            Ok(())
        })
        .map(|_| ())
    }

    /// Mark the exchange failed with a human-readable detail.
    pub fn fail(&self, id: &str, detail: impl Into<String>) -> Result<()> {
        let detail = detail.into();
        self.set_status(id, |e| {
            e.status = ExchangeStatus::Failed { detail };
            e.stage = None;
            Ok(())
        })
        .map(|_| ())
    }
}

fn ensure_idle(exchange: &Exchange) -> Result<()> {
    if exchange.status.is_running() {
        return Err(Error::ExchangeRunning(exchange.id.clone()));
    }
    Ok(())
}
