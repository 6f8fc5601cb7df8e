//! Off-thread task execution.
//!
//! [`TaskRunner::submit`] marks an exchange running and spawns one tokio
//! task for the submitted work. There is no queue and no bound on how many
//! tasks run at once; each exchange may have at most one task in flight.
//! Results reach the [`ExchangeStore`] only through its mutation API and are
//! applied in completion order.
//!
//! Submitted work is never cancelled or retried: it runs until it returns,
//! and an error (or panic) becomes the exchange's `failed` status exactly once.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wallo_core::error::Result;
use wallo_core::models::{Exchange, ExchangeStatus};

use crate::exchange::{ExchangeStore, TaskOutput};

/// Publishes display-only stage labels for one running exchange.
#[derive(Clone)]
pub struct StageReporter {
    store: Arc<ExchangeStore>,
    id: String,
}

impl StageReporter {
    pub fn stage(&self, label: &str) {
        debug!(exchange = %self.id, stage = label, "task stage");
        if let Err(e) = self.store.set_stage(&self.id, label) {
            warn!(exchange = %self.id, "could not record stage: {}", e);
        }
    }
}

/// Everything a unit of work receives when it starts.
pub struct TaskContext {
    /// The exchange as it was when the task was submitted.
    pub exchange: Exchange,
    pub stage: StageReporter,
}

/// Handle to a submitted task.
pub struct TaskHandle {
    exchange_id: String,
    join: JoinHandle<ExchangeStatus>,
}

impl TaskHandle {
    pub fn exchange_id(&self) -> &str {
        &self.exchange_id
    }

    /// Wait for the task to finish and return the exchange's final status.
    pub async fn wait(self) -> ExchangeStatus {
        self.join.await.unwrap_or_else(|e| ExchangeStatus::Failed {
            detail: format!("task aborted: {}", e),
        })
    }
}

pub struct TaskRunner {
    store: Arc<ExchangeStore>,
    runtime: Handle,
}

impl TaskRunner {
    pub fn new(store: Arc<ExchangeStore>, runtime: Handle) -> Self {
        Self { store, runtime }
    }

    pub fn store(&self) -> &Arc<ExchangeStore> {
        &self.store
    }

    /// Start `work` for exchange `id`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownExchange`](wallo_core::Error::UnknownExchange) if `id` is not in the store.
    /// - [`Error::ExchangeRunning`](wallo_core::Error::ExchangeRunning) if a task for `id` is
    ///   still in flight; the running task is unaffected.
    pub fn submit<F, Fut>(&self, id: &str, work: F) -> Result<TaskHandle>
    where
        F: FnOnce(TaskContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<TaskOutput>> + Send + 'static,
    {
        let exchange = self.store.begin_task(id)?;
        info!(exchange = id, "task submitted");

        let store = Arc::clone(&self.store);
        let runtime = self.runtime.clone();
        let id = id.to_string();
        let ctx = TaskContext {
            exchange,
            stage: StageReporter {
                store: Arc::clone(&store),
                id: id.clone(),
            },
        };

        let task_id = id.clone();
        let join = self.runtime.spawn(async move {
            // Run the work in its own task so a panic still settles the exchange.
            let outcome = runtime.spawn(work(ctx)).await;
            let applied = match outcome {
                Ok(Ok(output)) => {
                    info!(exchange = %task_id, "task done");
                    store.complete(&task_id, output)
                }
                Ok(Err(e)) => {
                    warn!(exchange = %task_id, "task failed: {}", e);
                    store.fail(&task_id, e.to_string())
                }
                Err(join_err) => {
                    warn!(exchange = %task_id, "task panicked: {}", join_err);
                    store.fail(&task_id, format!("task panicked: {}", join_err))
                }
            };
            if let Err(e) = applied {
                warn!(exchange = %task_id, "could not apply task result: {}", e);
            }
            store
                .get(&task_id)
                .map(|e| e.status)
                .unwrap_or_else(|e| ExchangeStatus::Failed {
                    detail: e.to_string(),
                })
        });

        Ok(TaskHandle {
            exchange_id: id,
            join,
        })
    }
}
