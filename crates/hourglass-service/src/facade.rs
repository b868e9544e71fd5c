use std::sync::Arc;

use chrono::{DateTime, Utc};
use hourglass_core::{FireInstanceId, GroupedKey, JobDataMap, JobKey, KeyMatcher, TriggerKey};
use hourglass_engine::{
    Calendar, EngineError, ExecutingJob, Job, JobDetail, SchedulerEngine, SchedulerMetaData,
    Trigger, TriggerState,
};

use crate::error::{interrupt_failed, rejected, Result};

/// Scheduling operations on a managed engine.
///
/// Only key well-formedness is checked here; every other rule is the
/// engine's, and its failures come back as
/// [`ServiceError::EngineRejected`](crate::ServiceError::EngineRejected).
/// Once close begins, mutations fail with
/// [`ServiceError::EngineUnavailable`](crate::ServiceError::EngineUnavailable);
/// queries keep answering until executing jobs have drained.
///
/// Cheap to clone; all clones drive the same engine.
#[derive(Clone)]
pub struct SchedulingFacade {
    engine: Arc<dyn SchedulerEngine>,
}

fn check_key(operation: &'static str, key: &impl GroupedKey) -> Result<()> {
    key.validate()
        .map_err(|e| rejected(operation, key)(EngineError::from(e)))
}

fn check_keys<'a, K: GroupedKey + 'a>(
    operation: &'static str,
    keys: impl IntoIterator<Item = &'a K>,
) -> Result<()> {
    keys.into_iter().try_for_each(|key| check_key(operation, key))
}

fn batch_context<K: GroupedKey>(keys: &[K]) -> String {
    format!("{} keys", keys.len())
}

impl SchedulingFacade {
    pub fn new(engine: Arc<dyn SchedulerEngine>) -> Self {
        Self { engine }
    }

    // -----------------------------------------------------------------------
    // Scheduler identity & context
    // -----------------------------------------------------------------------

    pub fn scheduler_name(&self) -> String {
        self.engine.scheduler_name()
    }

    pub fn scheduler_instance_id(&self) -> String {
        self.engine.instance_id()
    }

    pub async fn context(&self) -> Result<JobDataMap> {
        self.engine
            .context()
            .await
            .map_err(rejected("context", "scheduler"))
    }

    pub async fn put_context(
        &self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<()> {
        let key = key.into();
        self.engine
            .put_context(key.clone(), value.into())
            .await
            .map_err(rejected("put_context", key))
    }

    pub async fn metadata(&self) -> Result<SchedulerMetaData> {
        self.engine
            .metadata()
            .await
            .map_err(rejected("metadata", "scheduler"))
    }

    /// Suspend firing without touching trigger states, until
    /// [`exit_standby`](Self::exit_standby).
    pub async fn standby(&self) -> Result<()> {
        self.engine
            .standby()
            .await
            .map_err(rejected("standby", "scheduler"))
    }

    /// Resume firing after [`standby`](Self::standby). Begins firing on an
    /// engine that was never started.
    pub async fn exit_standby(&self) -> Result<()> {
        self.engine
            .start()
            .await
            .map_err(rejected("exit_standby", "scheduler"))
    }

    /// Make `handler` available to jobs whose `job_type` is `job_type`.
    pub fn register_job_type(&self, job_type: &str, handler: Arc<dyn Job>) {
        self.engine.register_job_type(job_type, handler);
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Store a job with no trigger. Non-durable jobs are rejected; see
    /// [`add_job_awaiting_trigger`](Self::add_job_awaiting_trigger).
    pub async fn add_job(&self, job: JobDetail, replace: bool) -> Result<()> {
        check_key("add_job", &job.key)?;
        let key = job.key.clone();
        self.engine
            .add_job(job, replace, false)
            .await
            .map_err(rejected("add_job", key))
    }

    /// Store a job, durable or not, that a trigger will be scheduled for
    /// shortly.
    pub async fn add_job_awaiting_trigger(&self, job: JobDetail, replace: bool) -> Result<()> {
        check_key("add_job_awaiting_trigger", &job.key)?;
        let key = job.key.clone();
        self.engine
            .add_job(job, replace, true)
            .await
            .map_err(rejected("add_job_awaiting_trigger", key))
    }

    /// Store a new job with its trigger. Returns the first fire time.
    pub async fn schedule_job(&self, job: JobDetail, trigger: Trigger) -> Result<DateTime<Utc>> {
        check_key("schedule_job", &job.key)?;
        check_key("schedule_job", &trigger.key)?;
        let key = job.key.clone();
        self.engine
            .schedule_job(job, trigger)
            .await
            .map_err(rejected("schedule_job", key))
    }

    /// Store a trigger for a job that is already stored.
    pub async fn schedule_trigger(&self, trigger: Trigger) -> Result<DateTime<Utc>> {
        check_key("schedule_trigger", &trigger.key)?;
        check_key("schedule_trigger", &trigger.job_key)?;
        let key = trigger.key.clone();
        self.engine
            .schedule_trigger(trigger)
            .await
            .map_err(rejected("schedule_trigger", key))
    }

    pub async fn schedule_job_with_triggers(
        &self,
        job: JobDetail,
        triggers: Vec<Trigger>,
        replace: bool,
    ) -> Result<()> {
        check_key("schedule_job_with_triggers", &job.key)?;
        check_keys("schedule_job_with_triggers", triggers.iter().map(|t| &t.key))?;
        let key = job.key.clone();
        self.engine
            .schedule_job_with_triggers(job, triggers, replace)
            .await
            .map_err(rejected("schedule_job_with_triggers", key))
    }

    /// Store several jobs with their triggers. Nothing is stored if any entry
    /// is rejected.
    pub async fn schedule_jobs(
        &self,
        jobs: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
    ) -> Result<()> {
        for (job, triggers) in &jobs {
            check_key("schedule_jobs", &job.key)?;
            check_keys("schedule_jobs", triggers.iter().map(|t| &t.key))?;
        }
        let context = format!("{} jobs", jobs.len());
        self.engine
            .schedule_jobs(jobs, replace)
            .await
            .map_err(rejected("schedule_jobs", context))
    }

    /// Replace the trigger under `key`; the replacement takes over that key.
    /// `None` when no trigger is stored under `key`.
    pub async fn reschedule_job(
        &self,
        key: &TriggerKey,
        trigger: Trigger,
    ) -> Result<Option<DateTime<Utc>>> {
        check_key("reschedule_job", key)?;
        self.engine
            .reschedule_job(key, trigger)
            .await
            .map_err(rejected("reschedule_job", key))
    }

    /// Remove a trigger. A non-durable job left without triggers is removed
    /// with it.
    pub async fn unschedule_job(&self, key: &TriggerKey) -> Result<bool> {
        check_key("unschedule_job", key)?;
        self.engine
            .unschedule_job(key)
            .await
            .map_err(rejected("unschedule_job", key))
    }

    pub async fn unschedule_jobs(&self, keys: &[TriggerKey]) -> Result<bool> {
        check_keys("unschedule_jobs", keys)?;
        self.engine
            .unschedule_jobs(keys)
            .await
            .map_err(rejected("unschedule_jobs", batch_context(keys)))
    }

    pub async fn delete_job(&self, key: &JobKey) -> Result<bool> {
        check_key("delete_job", key)?;
        self.engine
            .delete_job(key)
            .await
            .map_err(rejected("delete_job", key))
    }

    pub async fn delete_jobs(&self, keys: &[JobKey]) -> Result<bool> {
        check_keys("delete_jobs", keys)?;
        self.engine
            .delete_jobs(keys)
            .await
            .map_err(rejected("delete_jobs", batch_context(keys)))
    }

    // -----------------------------------------------------------------------
    // Immediate firing
    // -----------------------------------------------------------------------

    pub async fn trigger_job(&self, key: &JobKey) -> Result<()> {
        check_key("trigger_job", key)?;
        self.engine
            .trigger_job(key, None)
            .await
            .map_err(rejected("trigger_job", key))
    }

    /// Fire now with `data` overlaid on the job's own data for this run only.
    pub async fn trigger_job_with_data(&self, key: &JobKey, data: JobDataMap) -> Result<()> {
        check_key("trigger_job_with_data", key)?;
        self.engine
            .trigger_job(key, Some(data))
            .await
            .map_err(rejected("trigger_job_with_data", key))
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    pub async fn pause_job(&self, key: &JobKey) -> Result<()> {
        check_key("pause_job", key)?;
        self.engine
            .pause_job(key)
            .await
            .map_err(rejected("pause_job", key))
    }

    pub async fn pause_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()> {
        self.engine
            .pause_jobs(matcher)
            .await
            .map_err(rejected("pause_jobs", format!("{matcher:?}")))
    }

    pub async fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        check_key("pause_trigger", key)?;
        self.engine
            .pause_trigger(key)
            .await
            .map_err(rejected("pause_trigger", key))
    }

    pub async fn pause_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()> {
        self.engine
            .pause_triggers(matcher)
            .await
            .map_err(rejected("pause_triggers", format!("{matcher:?}")))
    }

    pub async fn resume_job(&self, key: &JobKey) -> Result<()> {
        check_key("resume_job", key)?;
        self.engine
            .resume_job(key)
            .await
            .map_err(rejected("resume_job", key))
    }

    pub async fn resume_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()> {
        self.engine
            .resume_jobs(matcher)
            .await
            .map_err(rejected("resume_jobs", format!("{matcher:?}")))
    }

    pub async fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        check_key("resume_trigger", key)?;
        self.engine
            .resume_trigger(key)
            .await
            .map_err(rejected("resume_trigger", key))
    }

    pub async fn resume_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()> {
        self.engine
            .resume_triggers(matcher)
            .await
            .map_err(rejected("resume_triggers", format!("{matcher:?}")))
    }

    /// Pause every trigger group, including groups created later. Does not
    /// change the lifecycle controller's state.
    pub async fn pause_all(&self) -> Result<()> {
        self.engine
            .pause_all()
            .await
            .map_err(rejected("pause_all", "all groups"))
    }

    pub async fn resume_all(&self) -> Result<()> {
        self.engine
            .resume_all()
            .await
            .map_err(rejected("resume_all", "all groups"))
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn job_group_names(&self) -> Result<Vec<String>> {
        self.engine
            .job_group_names()
            .await
            .map_err(rejected("job_group_names", "all groups"))
    }

    pub async fn job_keys(&self, matcher: &KeyMatcher<JobKey>) -> Result<Vec<JobKey>> {
        self.engine
            .job_keys(matcher)
            .await
            .map_err(rejected("job_keys", format!("{matcher:?}")))
    }

    pub async fn trigger_group_names(&self) -> Result<Vec<String>> {
        self.engine
            .trigger_group_names()
            .await
            .map_err(rejected("trigger_group_names", "all groups"))
    }

    pub async fn trigger_keys(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<Vec<TriggerKey>> {
        self.engine
            .trigger_keys(matcher)
            .await
            .map_err(rejected("trigger_keys", format!("{matcher:?}")))
    }

    pub async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>> {
        check_key("triggers_of_job", key)?;
        self.engine
            .triggers_of_job(key)
            .await
            .map_err(rejected("triggers_of_job", key))
    }

    pub async fn paused_trigger_groups(&self) -> Result<Vec<String>> {
        self.engine
            .paused_trigger_groups()
            .await
            .map_err(rejected("paused_trigger_groups", "all groups"))
    }

    pub async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>> {
        check_key("job_detail", key)?;
        self.engine
            .job_detail(key)
            .await
            .map_err(rejected("job_detail", key))
    }

    pub async fn trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>> {
        check_key("trigger", key)?;
        self.engine
            .trigger(key)
            .await
            .map_err(rejected("trigger", key))
    }

    /// [`TriggerState::None`] when no such trigger exists.
    pub async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState> {
        check_key("trigger_state", key)?;
        self.engine
            .trigger_state(key)
            .await
            .map_err(rejected("trigger_state", key))
    }

    pub async fn currently_executing_jobs(&self) -> Result<Vec<ExecutingJob>> {
        self.engine
            .currently_executing_jobs()
            .await
            .map_err(rejected("currently_executing_jobs", "scheduler"))
    }

    pub async fn check_job_exists(&self, key: &JobKey) -> Result<bool> {
        check_key("check_job_exists", key)?;
        self.engine
            .check_job_exists(key)
            .await
            .map_err(rejected("check_job_exists", key))
    }

    pub async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool> {
        check_key("check_trigger_exists", key)?;
        self.engine
            .check_trigger_exists(key)
            .await
            .map_err(rejected("check_trigger_exists", key))
    }

    // -----------------------------------------------------------------------
    // Calendars
    // -----------------------------------------------------------------------

    pub async fn add_calendar(
        &self,
        name: &str,
        calendar: Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        self.engine
            .add_calendar(name, calendar, replace, update_triggers)
            .await
            .map_err(rejected("add_calendar", name))
    }

    /// Fails while any trigger references the calendar.
    pub async fn delete_calendar(&self, name: &str) -> Result<bool> {
        self.engine
            .delete_calendar(name)
            .await
            .map_err(rejected("delete_calendar", name))
    }

    pub async fn calendar(&self, name: &str) -> Result<Option<Calendar>> {
        self.engine
            .calendar(name)
            .await
            .map_err(rejected("calendar", name))
    }

    pub async fn calendar_names(&self) -> Result<Vec<String>> {
        self.engine
            .calendar_names()
            .await
            .map_err(rejected("calendar_names", "all calendars"))
    }

    // -----------------------------------------------------------------------
    // Interruption
    // -----------------------------------------------------------------------

    /// Ask every live execution of `key` to stop. `false` when none is running.
    pub async fn interrupt_job(&self, key: &JobKey) -> Result<bool> {
        check_key("interrupt_job", key)?;
        self.engine
            .interrupt_job(key)
            .await
            .map_err(interrupt_failed("interrupt_job", key))
    }

    /// Ask one execution to stop. `false` when it is not running.
    pub async fn interrupt_instance(&self, id: &FireInstanceId) -> Result<bool> {
        self.engine
            .interrupt_instance(id)
            .await
            .map_err(interrupt_failed("interrupt_instance", id))
    }

    /// Remove every job, trigger and calendar. Lifecycle state is untouched.
    pub async fn clear(&self) -> Result<()> {
        self.engine
            .clear()
            .await
            .map_err(rejected("clear", "all scheduling data"))
    }
}
