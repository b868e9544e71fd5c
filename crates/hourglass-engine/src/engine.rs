use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hourglass_core::{FireInstanceId, JobDataMap, JobKey, KeyMatcher, SchedulerConfig, TriggerKey};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::{EngineLifecycle, SchedulerEngine};
use crate::calendar::Calendar;
use crate::error::{EngineError, Result};
use crate::job::{Job, JobContext, JobError, JobRegistry};
use crate::schedule::Schedule;
use crate::store::{FiredTrigger, JobStore, MANUAL_TRIGGER_GROUP};
use crate::types::{ExecutingJob, JobDetail, SchedulerMetaData, Trigger, TriggerState};

/// In-memory scheduler engine.
///
/// Jobs, triggers and calendars live in a [`JobStore`] behind a mutex. A
/// polling loop started by [`EngineLifecycle::start`] claims due triggers
/// every tick and runs their handlers on Tokio tasks, at most `thread_count`
/// at a time.
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct RamEngine {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    instance_id: String,
    tick: Duration,
    thread_count: usize,
    registry: JobRegistry,
    store: Mutex<JobStore>,
    status: Mutex<Status>,
    context: RwLock<JobDataMap>,
    executing: DashMap<FireInstanceId, Execution>,
    pool: Arc<Semaphore>,
    jobs_executed: AtomicU64,
    shutdown_tx: watch::Sender<bool>,
    run_loop: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct Status {
    started: bool,
    standby: bool,
    /// Set as soon as shutdown begins; no more mutations are accepted.
    shutting_down: bool,
    shut_down: bool,
    running_since: Option<DateTime<Utc>>,
}

struct Execution {
    info: ExecutingJob,
    cancel: CancellationToken,
}

impl RamEngine {
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        let (shutdown_tx, _) = watch::channel(false);
        let inner = Inner {
            name: config.instance_name.clone(),
            instance_id: config.resolved_instance_id(),
            tick: Duration::from_millis(config.tick_interval_ms),
            thread_count: config.thread_count,
            registry: JobRegistry::new(),
            store: Mutex::new(JobStore::new()),
            status: Mutex::new(Status {
                started: false,
                standby: true,
                shutting_down: false,
                shut_down: false,
                running_since: None,
            }),
            context: RwLock::new(config.context.clone()),
            executing: DashMap::new(),
            pool: Arc::new(Semaphore::new(config.thread_count)),
            jobs_executed: AtomicU64::new(0),
            shutdown_tx,
            run_loop: tokio::sync::Mutex::new(None),
        };
        info!(
            scheduler = %inner.name,
            instance_id = %inner.instance_id,
            threads = inner.thread_count,
            "scheduler engine created"
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }
}

impl Inner {
    fn store(&self) -> MutexGuard<'_, JobStore> {
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn context_snapshot(&self) -> JobDataMap {
        self.context
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Guard for mutations: fails once shutdown has begun.
    fn ensure_open(&self) -> Result<()> {
        if self.status().shutting_down {
            return Err(EngineError::Shutdown);
        }
        Ok(())
    }

    /// Guard for queries: stored state stays readable while executing jobs
    /// drain, and fails only once shutdown has completed.
    fn ensure_readable(&self) -> Result<()> {
        if self.status().shut_down {
            return Err(EngineError::Shutdown);
        }
        Ok(())
    }

    fn ensure_job_type(&self, job: &JobDetail) -> Result<()> {
        if self.registry.contains(&job.job_type) {
            Ok(())
        } else {
            Err(EngineError::UnknownJobType {
                job_type: job.job_type.clone(),
            })
        }
    }

    /// One tick of the polling loop: claim due triggers and run their jobs.
    fn fire_due(self: &Arc<Self>) {
        {
            let status = self.status();
            if status.standby || status.shutting_down {
                return;
            }
        }
        let available = self.pool.available_permits();
        if available == 0 {
            return;
        }
        let fired = self.store().acquire_due(Utc::now(), available);
        for fired in fired {
            self.execute(fired);
        }
    }

    fn execute(self: &Arc<Self>, fired: FiredTrigger) {
        let FiredTrigger {
            trigger,
            job,
            scheduled_fire_time,
            merged_data,
        } = fired;

        let Some(handler) = self.registry.get(&job.job_type) else {
            error!(
                job = %job.key,
                trigger = %trigger.key,
                job_type = %job.job_type,
                "no handler for job type; trigger set to error"
            );
            let mut store = self.store();
            store.mark_trigger_error(&trigger.key);
            store.job_finished(&job);
            return;
        };
        let Ok(permit) = Arc::clone(&self.pool).try_acquire_owned() else {
            warn!(job = %job.key, trigger = %trigger.key, "no free worker; firing dropped");
            self.store().job_finished(&job);
            return;
        };

        let fire_instance_id = FireInstanceId::new();
        let cancel = CancellationToken::new();
        let fire_time = Utc::now();
        let ctx = JobContext {
            fire_instance_id: fire_instance_id.clone(),
            job_key: job.key.clone(),
            trigger_key: trigger.key.clone(),
            merged_data,
            scheduler_context: self.context_snapshot(),
            scheduled_fire_time,
            fire_time,
            previous_fire_time: trigger.previous_fire_time,
            next_fire_time: trigger.next_fire_time,
            cancel: cancel.clone(),
        };
        self.executing.insert(
            fire_instance_id.clone(),
            Execution {
                info: ExecutingJob {
                    fire_instance_id: fire_instance_id.clone(),
                    job_key: job.key.clone(),
                    trigger_key: trigger.key.clone(),
                    scheduled_fire_time,
                    fire_time,
                    interruptible: handler.interruptible(),
                },
                cancel,
            },
        );
        debug!(
            job = %job.key,
            trigger = %trigger.key,
            fire_instance = %fire_instance_id,
            run = trigger.times_fired,
            "executing job"
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            // Nested task so a panicking handler surfaces as a JoinError
            // instead of skipping the bookkeeping below.
            let outcome = tokio::spawn(async move { handler.execute(ctx).await }).await;
            match outcome {
                Ok(Ok(())) => {
                    debug!(job = %job.key, fire_instance = %fire_instance_id, "job completed")
                }
                Ok(Err(JobError::Interrupted)) => {
                    info!(job = %job.key, fire_instance = %fire_instance_id, "job interrupted")
                }
                Ok(Err(e)) => {
                    warn!(job = %job.key, fire_instance = %fire_instance_id, error = %e, "job failed")
                }
                Err(e) => {
                    error!(job = %job.key, fire_instance = %fire_instance_id, "job panicked: {e}")
                }
            }
            inner.executing.remove(&fire_instance_id);
            inner.jobs_executed.fetch_add(1, Ordering::Relaxed);
            inner.store().job_finished(&job);
        });
    }

    fn interrupt_where(&self, target: impl Fn(&ExecutingJob) -> bool) -> Result<bool> {
        let matching: Vec<(ExecutingJob, CancellationToken)> = self
            .executing
            .iter()
            .filter(|entry| target(&entry.info))
            .map(|entry| (entry.info.clone(), entry.cancel.clone()))
            .collect();
        if matching.is_empty() {
            return Ok(false);
        }
        if let Some((info, _)) = matching.iter().find(|(info, _)| !info.interruptible) {
            return Err(EngineError::NotInterruptible {
                job_key: info.job_key.to_string(),
            });
        }
        for (info, cancel) in matching {
            info!(job = %info.job_key, fire_instance = %info.fire_instance_id, "interrupt requested");
            cancel.cancel();
        }
        Ok(true)
    }
}

/// Polls the store every tick until `shutdown` broadcasts `true`.
async fn run_loop(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    info!(scheduler = %inner.name, "scheduler loop started");
    let mut interval = tokio::time::interval(inner.tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => inner.fire_due(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!(scheduler = %inner.name, "scheduler loop stopping");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl EngineLifecycle for RamEngine {
    async fn start(&self) -> Result<()> {
        {
            let mut status = self.inner.status();
            if status.shutting_down {
                return Err(EngineError::Shutdown);
            }
            status.standby = false;
            if status.started {
                debug!(scheduler = %self.inner.name, "engine already started");
                return Ok(());
            }
            status.started = true;
            status.running_since = Some(Utc::now());
        }
        let shutdown = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), shutdown));
        *self.inner.run_loop.lock().await = Some(handle);
        info!(scheduler = %self.inner.name, "engine started");
        Ok(())
    }

    async fn standby(&self) -> Result<()> {
        let mut status = self.inner.status();
        if status.shutting_down {
            return Err(EngineError::Shutdown);
        }
        status.standby = true;
        info!(scheduler = %self.inner.name, "engine in standby");
        Ok(())
    }

    async fn pause_all(&self) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().pause_all();
        info!(scheduler = %self.inner.name, "all triggers paused");
        Ok(())
    }

    async fn resume_all(&self) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().resume_all();
        info!(scheduler = %self.inner.name, "all triggers resumed");
        Ok(())
    }

    async fn shutdown(&self, wait_for_jobs: bool) -> Result<()> {
        {
            let mut status = self.inner.status();
            if status.shut_down || (status.shutting_down && !wait_for_jobs) {
                return Ok(());
            }
            status.shutting_down = true;
            status.standby = true;
        }
        info!(scheduler = %self.inner.name, wait_for_jobs, "engine shutting down");
        self.inner.shutdown_tx.send_replace(true);
        let run_loop = self.inner.run_loop.lock().await.take();
        if let Some(handle) = run_loop {
            if let Err(e) = handle.await {
                warn!(scheduler = %self.inner.name, "scheduler loop ended abnormally: {e}");
            }
        }

        if wait_for_jobs {
            let executing = self.inner.executing.len();
            if executing > 0 {
                info!(scheduler = %self.inner.name, executing, "waiting for executing jobs");
            }
            // Every permit back in the pool means nothing is executing.
            let permits = u32::try_from(self.inner.thread_count).unwrap_or(u32::MAX);
            match self.inner.pool.acquire_many(permits).await {
                Ok(all) => drop(all),
                Err(e) => warn!(scheduler = %self.inner.name, "worker pool closed: {e}"),
            }
        }

        self.inner.status().shut_down = true;
        info!(scheduler = %self.inner.name, "engine shut down");
        Ok(())
    }

    fn is_shutdown(&self) -> bool {
        self.inner.status().shutting_down
    }
}

#[async_trait]
impl SchedulerEngine for RamEngine {
    fn register_job_type(&self, job_type: &str, handler: Arc<dyn Job>) {
        self.inner.registry.register(job_type, handler);
        info!(scheduler = %self.inner.name, %job_type, "job type registered");
    }

    fn scheduler_name(&self) -> String {
        self.inner.name.clone()
    }

    fn instance_id(&self) -> String {
        self.inner.instance_id.clone()
    }

    async fn context(&self) -> Result<JobDataMap> {
        self.inner.ensure_readable()?;
        Ok(self.inner.context_snapshot())
    }

    async fn put_context(&self, key: String, value: serde_json::Value) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner
            .context
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
        Ok(())
    }

    async fn metadata(&self) -> Result<SchedulerMetaData> {
        let job_types = self.inner.registry.job_types();
        let status = self.inner.status();
        Ok(SchedulerMetaData {
            scheduler_name: self.inner.name.clone(),
            instance_id: self.inner.instance_id.clone(),
            started: status.started,
            in_standby: status.standby,
            shutdown: status.shut_down,
            running_since: status.running_since,
            jobs_executed: self.inner.jobs_executed.load(Ordering::Relaxed),
            thread_pool_size: self.inner.thread_count,
            job_types,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn currently_executing_jobs(&self) -> Result<Vec<ExecutingJob>> {
        let mut jobs: Vec<ExecutingJob> =
            self.inner.executing.iter().map(|e| e.info.clone()).collect();
        jobs.sort_by(|a, b| a.fire_time.cmp(&b.fire_time));
        Ok(jobs)
    }

    async fn add_job(
        &self,
        job: JobDetail,
        replace: bool,
        store_non_durable_while_awaiting_scheduling: bool,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.ensure_job_type(&job)?;
        let key = job.key.clone();
        self.inner
            .store()
            .store_job(job, replace, store_non_durable_while_awaiting_scheduling)?;
        info!(job = %key, "job added");
        Ok(())
    }

    async fn schedule_job(&self, job: JobDetail, trigger: Trigger) -> Result<DateTime<Utc>> {
        self.inner.ensure_open()?;
        self.inner.ensure_job_type(&job)?;
        let (job_key, trigger_key) = (job.key.clone(), trigger.key.clone());
        let firsts = self
            .inner
            .store()
            .store_job_with_triggers(job, vec![trigger], false, Utc::now())?;
        let first = firsts
            .first()
            .copied()
            .ok_or_else(|| EngineError::InvalidTrigger {
                key: trigger_key.to_string(),
                reason: "no fire time computed".to_string(),
            })?;
        info!(job = %job_key, trigger = %trigger_key, first_fire = %first, "job scheduled");
        Ok(first)
    }

    async fn schedule_trigger(&self, trigger: Trigger) -> Result<DateTime<Utc>> {
        self.inner.ensure_open()?;
        let (job_key, trigger_key) = (trigger.job_key.clone(), trigger.key.clone());
        let first = self.inner.store().store_trigger(trigger, false, Utc::now())?;
        info!(job = %job_key, trigger = %trigger_key, first_fire = %first, "trigger scheduled");
        Ok(first)
    }

    async fn schedule_job_with_triggers(
        &self,
        job: JobDetail,
        triggers: Vec<Trigger>,
        replace: bool,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.ensure_job_type(&job)?;
        let (key, count) = (job.key.clone(), triggers.len());
        self.inner
            .store()
            .store_job_with_triggers(job, triggers, replace, Utc::now())?;
        info!(job = %key, triggers = count, "job scheduled");
        Ok(())
    }

    async fn schedule_jobs(
        &self,
        jobs: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        for (job, _) in &jobs {
            self.inner.ensure_job_type(job)?;
        }
        let count = jobs.len();
        self.inner
            .store()
            .store_jobs_and_triggers(jobs, replace, Utc::now())?;
        info!(jobs = count, "job batch scheduled");
        Ok(())
    }

    async fn unschedule_job(&self, key: &TriggerKey) -> Result<bool> {
        self.inner.ensure_open()?;
        let removed = self.inner.store().remove_trigger(key);
        if removed {
            info!(trigger = %key, "trigger unscheduled");
        }
        Ok(removed)
    }

    async fn unschedule_jobs(&self, keys: &[TriggerKey]) -> Result<bool> {
        self.inner.ensure_open()?;
        let all = self.inner.store().remove_triggers(keys);
        info!(triggers = keys.len(), all_found = all, "triggers unscheduled");
        Ok(all)
    }

    async fn reschedule_job(
        &self,
        key: &TriggerKey,
        trigger: Trigger,
    ) -> Result<Option<DateTime<Utc>>> {
        self.inner.ensure_open()?;
        let first = self
            .inner
            .store()
            .replace_trigger(key, trigger, Utc::now())?;
        match first {
            Some(first) => info!(trigger = %key, first_fire = %first, "trigger rescheduled"),
            None => debug!(trigger = %key, "reschedule of unknown trigger ignored"),
        }
        Ok(first)
    }

    async fn delete_job(&self, key: &JobKey) -> Result<bool> {
        self.inner.ensure_open()?;
        let removed = self.inner.store().remove_job(key);
        if removed {
            info!(job = %key, "job deleted");
        }
        Ok(removed)
    }

    async fn delete_jobs(&self, keys: &[JobKey]) -> Result<bool> {
        self.inner.ensure_open()?;
        let all = self.inner.store().remove_jobs(keys);
        info!(jobs = keys.len(), all_found = all, "jobs deleted");
        Ok(all)
    }

    async fn trigger_job(&self, key: &JobKey, data: Option<JobDataMap>) -> Result<()> {
        self.inner.ensure_open()?;
        let now = Utc::now();
        let mut trigger = Trigger::new(
            TriggerKey::new(uuid::Uuid::new_v4().to_string(), MANUAL_TRIGGER_GROUP),
            key.clone(),
            Schedule::once(now),
        );
        if let Some(data) = data {
            trigger.data = data;
        }
        let trigger_key = trigger.key.clone();
        self.inner.store().store_transient_trigger(trigger, now)?;
        info!(job = %key, trigger = %trigger_key, "job triggered manually");
        Ok(())
    }

    async fn pause_job(&self, key: &JobKey) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().pause_job(key);
        info!(job = %key, "job paused");
        Ok(())
    }

    async fn pause_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().pause_jobs(matcher);
        info!(?matcher, "jobs paused");
        Ok(())
    }

    async fn pause_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().pause_trigger(key);
        info!(trigger = %key, "trigger paused");
        Ok(())
    }

    async fn pause_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().pause_triggers(matcher);
        info!(?matcher, "triggers paused");
        Ok(())
    }

    async fn resume_job(&self, key: &JobKey) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().resume_job(key);
        info!(job = %key, "job resumed");
        Ok(())
    }

    async fn resume_jobs(&self, matcher: &KeyMatcher<JobKey>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().resume_jobs(matcher);
        info!(?matcher, "jobs resumed");
        Ok(())
    }

    async fn resume_trigger(&self, key: &TriggerKey) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().resume_trigger(key);
        info!(trigger = %key, "trigger resumed");
        Ok(())
    }

    async fn resume_triggers(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().resume_triggers(matcher);
        info!(?matcher, "triggers resumed");
        Ok(())
    }

    async fn job_group_names(&self) -> Result<Vec<String>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().job_group_names())
    }

    async fn job_keys(&self, matcher: &KeyMatcher<JobKey>) -> Result<Vec<JobKey>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().job_keys(matcher))
    }

    async fn triggers_of_job(&self, key: &JobKey) -> Result<Vec<Trigger>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().triggers_of_job(key))
    }

    async fn trigger_group_names(&self) -> Result<Vec<String>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().trigger_group_names())
    }

    async fn trigger_keys(&self, matcher: &KeyMatcher<TriggerKey>) -> Result<Vec<TriggerKey>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().trigger_keys(matcher))
    }

    async fn paused_trigger_groups(&self) -> Result<Vec<String>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().paused_trigger_groups())
    }

    async fn job_detail(&self, key: &JobKey) -> Result<Option<JobDetail>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().job(key))
    }

    async fn trigger(&self, key: &TriggerKey) -> Result<Option<Trigger>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().trigger(key))
    }

    async fn trigger_state(&self, key: &TriggerKey) -> Result<TriggerState> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().trigger_state(key))
    }

    async fn check_job_exists(&self, key: &JobKey) -> Result<bool> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().contains_job(key))
    }

    async fn check_trigger_exists(&self, key: &TriggerKey) -> Result<bool> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().contains_trigger(key))
    }

    async fn add_calendar(
        &self,
        name: &str,
        calendar: Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner
            .store()
            .store_calendar(name, calendar, replace, update_triggers)?;
        info!(calendar = %name, update_triggers, "calendar added");
        Ok(())
    }

    async fn delete_calendar(&self, name: &str) -> Result<bool> {
        self.inner.ensure_open()?;
        let removed = self.inner.store().remove_calendar(name)?;
        if removed {
            info!(calendar = %name, "calendar deleted");
        }
        Ok(removed)
    }

    async fn calendar(&self, name: &str) -> Result<Option<Calendar>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().calendar(name))
    }

    async fn calendar_names(&self) -> Result<Vec<String>> {
        self.inner.ensure_readable()?;
        Ok(self.inner.store().calendar_names())
    }

    async fn interrupt_job(&self, key: &JobKey) -> Result<bool> {
        self.inner.interrupt_where(|info| &info.job_key == key)
    }

    async fn interrupt_instance(&self, id: &FireInstanceId) -> Result<bool> {
        self.inner.interrupt_where(|info| &info.fire_instance_id == id)
    }

    async fn clear(&self) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.store().clear();
        warn!(scheduler = %self.inner.name, "all scheduling data cleared");
        Ok(())
    }
}
