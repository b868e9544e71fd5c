use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hourglass_core::{FireInstanceId, JobDataMap, JobKey, TriggerKey};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors a job handler reports back to the engine.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job ran and failed.
    #[error("Job failed: {0}")]
    Failed(String),

    /// The job noticed an interrupt request and stopped early.
    #[error("Job interrupted")]
    Interrupted,
}

/// Code run when a trigger fires.
///
/// Handlers are registered with the engine under a job type name; stored
/// [`JobDetail`](crate::types::JobDetail)s refer to them by that name.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError>;

    /// Opt into cooperative interruption.
    ///
    /// An interruptible handler is expected to watch
    /// [`JobContext::is_interrupted`] or await [`JobContext::interrupted`].
    /// The engine never stops a handler forcibly.
    fn interruptible(&self) -> bool {
        false
    }
}

/// Everything a handler knows about the firing that started it.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub fire_instance_id: FireInstanceId,
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    /// Job data overlaid with the firing trigger's data.
    pub merged_data: JobDataMap,
    /// Snapshot of the scheduler context at fire time.
    pub scheduler_context: JobDataMap,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fire_time: DateTime<Utc>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub(crate) cancel: CancellationToken,
}

impl JobContext {
    /// True once an interrupt has been requested for this execution.
    pub fn is_interrupted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves when an interrupt is requested.
    pub async fn interrupted(&self) {
        self.cancel.cancelled().await
    }
}

/// Job type name → handler.
#[derive(Default)]
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `job_type`, replacing any previous handler.
    pub fn register(&self, job_type: &str, handler: Arc<dyn Job>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.insert(job_type.to_string(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn Job>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(job_type).cloned()
    }

    pub fn contains(&self, job_type: &str) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.contains_key(job_type)
    }

    /// Registered job type names, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
