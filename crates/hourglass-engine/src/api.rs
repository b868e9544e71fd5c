//! Engine-facing traits.
//!
//! [`EngineLifecycle`] is the narrow surface the lifecycle controller drives;
//! [`SchedulerEngine`] adds everything a scheduling client can ask for.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hourglass_core::{FireInstanceId, JobDataMap, JobKey, KeyMatcher, TriggerKey};

use crate::calendar::Calendar;
use crate::error::Result;
use crate::job::Job;
use crate::types::{ExecutingJob, JobDetail, SchedulerMetaData, Trigger, TriggerState};

#[async_trait]
pub trait EngineLifecycle: Send + Sync {
    /// Begin firing triggers. Calling it on a started engine leaves it in
    /// the running state.
    async fn start(&self) -> Result<()>;

    /// Stop firing triggers without touching their states. `start` resumes.
    async fn standby(&self) -> Result<()>;

    /// Pause every trigger group, including groups created later.
    async fn pause_all(&self) -> Result<()>;

    /// Resume every trigger group and forget all group pauses.
    async fn resume_all(&self) -> Result<()>;

    /// Stop the engine for good. With `wait_for_jobs`, returns only after all
    /// executing jobs have finished. Idempotent.
    ///
    /// Mutations are refused as soon as shutdown begins; queries until it
    /// completes.
    async fn shutdown(&self, wait_for_jobs: bool) -> Result<()>;

    fn is_shutdown(&self) -> bool;
}

#[async_trait]
pub trait SchedulerEngine: EngineLifecycle {
    // -- identity & context --------------------------------------------------

    /// Make `handler` available to jobs whose `job_type` is `job_type`.
    fn register_job_type(&self, job_type: &str, handler: Arc<dyn Job>);

    fn scheduler_name(&self) -> String;

    fn instance_id(&self) -> String;

    /// Snapshot of the scheduler context handed to every execution.
    async fn context(&self) -> Result<JobDataMap>;

    async fn put_context(&self, key: String, value: serde_json::Value) -> Result<()>;

    async fn metadata(&self) -> Result<SchedulerMetaData>;

    async fn currently_executing_jobs(&self) -> Result<Vec<ExecutingJob>>;

    // -- jobs & triggers -----------------------------------------------------

    /// Store a job with no trigger. A non-durable job is accepted only when
    /// `store_non_durable_while_awaiting_scheduling` is set.
    async fn add_job(
        &self,
        job: JobDetail,
        replace: bool,
        store_non_durable_while_awaiting_scheduling: bool,
    ) -> Result<()>;

    /// Store a new job and its trigger; returns the first fire time.
    async fn schedule_job(&self, job: JobDetail, trigger: Trigger) -> Result<DateTime<Utc>>;

    /// Store a trigger for an existing job; returns the first fire time.
    async fn schedule_trigger(&self, trigger: Trigger) -> Result<DateTime<Utc>>;

    async fn schedule_job_with_triggers(
        &self,
        job: JobDetail,
        triggers: Vec<Trigger>,
        replace: bool,
    ) -> Result<()>;

    /// Store several jobs with their triggers atomically.
    async fn schedule_jobs(
        &self,
        jobs: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
    ) -> Result<()>;

    /// Remove a trigger. `false` if it did not exist.
    async fn unschedule_job(&self, key: &TriggerKey) -> Result<bool>;

    /// Remove several triggers. `false` if any did not exist.
    async fn unschedule_jobs(&self, keys: &[TriggerKey]) -> Result<bool>;

    /// Replace the trigger under `key` with `trigger`, keeping the key.
    /// `None` if `key` does not exist.
    async fn reschedule_job(
        &self,
        key: &TriggerKey,
        trigger: Trigger,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Remove a job and its triggers. `false` if it did not exist.
    async fn delete_job(&self, key: &JobKey) -> Result<bool>;

    async fn delete_jobs(&self, keys: &[JobKey]) -> Result<bool>;

    /// Fire a stored job once, now, with `data` overlaid on the job's data.
    async fn trigger_job(&self, key: &JobKey, data: Option<JobDataMap>) -> Result<()>;

    // -- pause / resume ------------------------------------------------------

    async fn pause_job(&self, key: &JobKey) -> Result<()>;

    async fn pause_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()>;

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()>;

    async fn pause_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()>;

    async fn resume_job(&self, key: &JobKey) -> Result<()>;

    async fn resume_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()>;

    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()>;

    async fn resume_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()>;

    // -- introspection -------------------------------------------------------

    async fn job_group_names(&self) -> Result<Vec<String>>;

    async fn job_keys(&self, matcher: &KeyMatcher<JobKey>) -> Result<Vec<JobKey>>;

    async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>>;

    async fn trigger_group_names(&self) -> Result<Vec<String>>;

    async fn trigger_keys(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<Vec<TriggerKey>>;

    async fn paused_trigger_groups(&self) -> Result<Vec<String>>;

    async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>>;

    async fn trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>>;

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState>;

    async fn check_job_exists(&self, key: &JobKey) -> Result<bool>;

    async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool>;

    // -- calendars -----------------------------------------------------------

    async fn add_calendar(
        &self,
        name: &str,
        calendar: Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()>;

    /// `false` if the calendar did not exist.
    async fn delete_calendar(&self, name: &str) -> Result<bool>;

    async fn calendar(&self, name: &str) -> Result<Option<Calendar>>;

    async fn calendar_names(&self) -> Result<Vec<String>>;

    // -- interruption --------------------------------------------------------

    /// Request interruption of every live execution of `key`.
    /// `false` if none is running.
    async fn interrupt_job(&self, key: &JobKey) -> Result<bool>;

    /// Request interruption of one execution. `false` if it is not running.
    async fn interrupt_instance(&self, id: &FireInstanceId) -> Result<bool>;

    /// Remove every job, trigger and calendar.
    async fn clear(&self) -> Result<()>;
}
