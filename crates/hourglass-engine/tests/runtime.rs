// Drive a real RamEngine loop with a short tick and observe executions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hourglass_core::{JobDataMap, JobKey, KeyMatcher, SchedulerConfig, TriggerKey};
use hourglass_engine::{
    EngineError, EngineLifecycle, Job, JobContext, JobDetail, JobError, RamEngine, Schedule,
    SchedulerEngine, Trigger, TriggerState,
};
use tokio::sync::Notify;

fn engine() -> RamEngine {
    let config = SchedulerConfig {
        tick_interval_ms: 10,
        thread_count: 4,
        ..SchedulerConfig::default()
    };
    RamEngine::new(&config).unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[derive(Default)]
struct Recorder {
    runs: AtomicUsize,
    seen: Mutex<Vec<JobDataMap>>,
}

#[async_trait]
impl Job for Recorder {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        self.seen.lock().unwrap().push(ctx.merged_data);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Runs until interrupted.
struct Sleeper;

#[async_trait]
impl Job for Sleeper {
    async fn execute(&self, ctx: JobContext) -> Result<(), JobError> {
        ctx.interrupted().await;
        Err(JobError::Interrupted)
    }

    fn interruptible(&self) -> bool {
        true
    }
}

/// Sleeps for a while and ignores interrupts.
struct Stubborn {
    finished: AtomicUsize,
}

#[async_trait]
impl Job for Stubborn {
    async fn execute(&self, _ctx: JobContext) -> Result<(), JobError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Holds its execution open until released.
#[derive(Default)]
struct Gate {
    release: Notify,
}

#[async_trait]
impl Job for Gate {
    async fn execute(&self, _ctx: JobContext) -> Result<(), JobError> {
        self.release.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn one_shot_trigger_fires_and_completes() {
    let engine = engine();
    let recorder = Arc::new(Recorder::default());
    engine.register_job_type("record", recorder.clone());
    engine.start().await.unwrap();

    let job = JobDetail::new(JobKey::new("j1", "g1"), "record");
    let trigger = Trigger::new(
        TriggerKey::new("t1", "g1"),
        job.key.clone(),
        Schedule::once(Utc::now() + chrono::Duration::milliseconds(100)),
    );
    engine.schedule_job(job, trigger.clone()).await.unwrap();
    assert_eq!(engine.trigger_state(&trigger.key).await.unwrap(), TriggerState::Normal);

    eventually(|| recorder.runs.load(Ordering::SeqCst) == 1).await;
    assert_eq!(engine.trigger_state(&trigger.key).await.unwrap(), TriggerState::Complete);
    assert_eq!(engine.metadata().await.unwrap().jobs_executed, 1);

    engine.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn unknown_job_type_is_rejected() {
    let engine = engine();
    let job = JobDetail::new(JobKey::named("x"), "missing").durable(true);
    let err = engine.add_job(job, false, false).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownJobType { .. }));
}

#[tokio::test]
async fn standby_engine_does_not_fire() {
    let engine = engine();
    let recorder = Arc::new(Recorder::default());
    engine.register_job_type("record", recorder.clone());

    let job = JobDetail::new(JobKey::named("j"), "record");
    let trigger = Trigger::new(TriggerKey::named("t"), job.key.clone(), Schedule::once(Utc::now()));
    engine.schedule_job(job, trigger).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(recorder.runs.load(Ordering::SeqCst), 0);

    engine.start().await.unwrap();
    eventually(|| recorder.runs.load(Ordering::SeqCst) == 1).await;
    engine.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn manual_trigger_overlays_data_and_leaves_no_trigger() {
    let engine = engine();
    let recorder = Arc::new(Recorder::default());
    engine.register_job_type("record", recorder.clone());
    engine.start().await.unwrap();

    let job = JobDetail::new(JobKey::named("report"), "record")
        .durable(true)
        .with_data("format", "pdf");
    engine.add_job(job.clone(), false, false).await.unwrap();

    let mut data = JobDataMap::new();
    data.insert("format".to_string(), "csv".into());
    engine.trigger_job(&job.key, Some(data)).await.unwrap();

    eventually(|| recorder.runs.load(Ordering::SeqCst) == 1).await;
    assert_eq!(recorder.seen.lock().unwrap()[0]["format"], "csv");
    assert!(engine.triggers_of_job(&job.key).await.unwrap().is_empty());
    assert_eq!(engine.job_detail(&job.key).await.unwrap().unwrap().data["format"], "pdf");

    engine.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn interrupt_reaches_cooperative_job() {
    let engine = engine();
    engine.register_job_type("sleep", Arc::new(Sleeper));
    engine.start().await.unwrap();

    let key = JobKey::named("long");
    assert!(!engine.interrupt_job(&key).await.unwrap());

    engine
        .add_job(JobDetail::new(key.clone(), "sleep").durable(true), false, false)
        .await
        .unwrap();
    engine.trigger_job(&key, None).await.unwrap();

    let watcher = engine.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.currently_executing_jobs().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let executing = engine.currently_executing_jobs().await.unwrap();
    assert!(executing[0].interruptible);
    assert!(engine.interrupt_instance(&executing[0].fire_instance_id).await.unwrap());

    tokio::time::timeout(Duration::from_secs(5), async {
        while !watcher.currently_executing_jobs().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    engine.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn non_interruptible_job_refuses_interrupt() {
    let engine = engine();
    let stubborn = Arc::new(Stubborn {
        finished: AtomicUsize::new(0),
    });
    engine.register_job_type("stubborn", stubborn.clone());
    engine.start().await.unwrap();

    let key = JobKey::named("busy");
    engine
        .add_job(JobDetail::new(key.clone(), "stubborn").durable(true), false, false)
        .await
        .unwrap();
    engine.trigger_job(&key, None).await.unwrap();

    let watcher = engine.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.currently_executing_jobs().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let err = engine.interrupt_job(&key).await.unwrap_err();
    assert!(matches!(err, EngineError::NotInterruptible { .. }));
    engine.shutdown(true).await.unwrap();
}

#[tokio::test]
async fn shutdown_waits_for_executing_jobs() {
    let engine = engine();
    let stubborn = Arc::new(Stubborn {
        finished: AtomicUsize::new(0),
    });
    engine.register_job_type("stubborn", stubborn.clone());
    engine.start().await.unwrap();

    let key = JobKey::named("drain");
    engine
        .add_job(JobDetail::new(key.clone(), "stubborn").durable(true), false, false)
        .await
        .unwrap();
    engine.trigger_job(&key, None).await.unwrap();

    let watcher = engine.clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while watcher.currently_executing_jobs().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    engine.shutdown(true).await.unwrap();
    assert_eq!(stubborn.finished.load(Ordering::SeqCst), 1);
    assert!(engine.is_shutdown());
    assert!(engine.metadata().await.unwrap().shutdown);

    // Idempotent, and the engine refuses further work.
    engine.shutdown(true).await.unwrap();
    assert!(matches!(engine.start().await, Err(EngineError::Shutdown)));
    assert!(matches!(
        engine.check_job_exists(&key).await,
        Err(EngineError::Shutdown)
    ));
}

#[tokio::test]
async fn queries_answer_while_shutdown_drains() {
    let engine = engine();
    let gate = Arc::new(Gate::default());
    engine.register_job_type("gate", gate.clone());
    engine.start().await.unwrap();

    let key = JobKey::named("held");
    engine
        .add_job(JobDetail::new(key.clone(), "gate").durable(true), false, false)
        .await
        .unwrap();
    engine.trigger_job(&key, None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while engine.currently_executing_jobs().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let closing = engine.clone();
    let shutdown = tokio::spawn(async move { closing.shutdown(true).await });
    eventually(|| engine.is_shutdown()).await;

    assert!(engine.check_job_exists(&key).await.unwrap());
    assert_eq!(engine.job_keys(&KeyMatcher::Any).await.unwrap(), vec![key.clone()]);
    assert!(engine.job_detail(&key).await.unwrap().is_some());
    assert!(matches!(
        engine
            .add_job(JobDetail::new(JobKey::named("late"), "gate").durable(true), false, false)
            .await,
        Err(EngineError::Shutdown)
    ));
    assert!(matches!(engine.pause_all().await, Err(EngineError::Shutdown)));

    gate.release.notify_one();
    shutdown.await.unwrap().unwrap();
    assert!(matches!(
        engine.check_job_exists(&key).await,
        Err(EngineError::Shutdown)
    ));
}

#[tokio::test]
async fn context_is_seeded_from_config_and_visible_to_jobs() {
    let mut config = SchedulerConfig {
        tick_interval_ms: 10,
        ..SchedulerConfig::default()
    };
    config.context.insert("region".to_string(), "eu".into());
    let engine = RamEngine::new(&config).unwrap();

    engine.put_context("tier".to_string(), "gold".into()).await.unwrap();
    let context = engine.context().await.unwrap();
    assert_eq!(context["region"], "eu");
    assert_eq!(context["tier"], "gold");
    assert_eq!(engine.scheduler_name(), config.instance_name);
}

#[test]
fn invalid_config_fails_construction() {
    let config = SchedulerConfig {
        thread_count: 0,
        ..SchedulerConfig::default()
    };
    assert!(matches!(RamEngine::new(&config), Err(EngineError::Config(_))));
}
