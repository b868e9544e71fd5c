use std::fmt;
use std::sync::Arc;

use hourglass_core::SchedulerConfig;
use hourglass_engine::{EngineLifecycle, RamEngine, SchedulerEngine};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{transition_failed, Result, ServiceError, Transition};
use crate::facade::SchedulingFacade;

/// Where a controller is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerLifecycleState {
    /// Constructed, never started.
    Created,
    /// Triggers fire.
    Running,
    /// Every trigger group is paused; executing jobs carry on.
    Paused,
    /// Close in progress, waiting for executing jobs.
    ShuttingDown,
    /// Terminal.
    Closed,
}

impl fmt::Display for SchedulerLifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchedulerLifecycleState::Created => "created",
            SchedulerLifecycleState::Running => "running",
            SchedulerLifecycleState::Paused => "paused",
            SchedulerLifecycleState::ShuttingDown => "shutting_down",
            SchedulerLifecycleState::Closed => "closed",
        };
        write!(f, "{s}")
    }
}

struct Transitions {
    /// Whether the engine's firing loop has ever been begun. A controller
    /// stopped before its first start only pauses trigger groups.
    engine_started: bool,
}

/// Owns one scheduler engine and drives it through
/// created → running ⇄ paused → closed.
///
/// Transitions are serialized by a single async mutex; [`state`] reads a
/// published snapshot without taking it.
///
/// [`state`]: LifecycleController::state
pub struct LifecycleController<E: ?Sized + EngineLifecycle = dyn SchedulerEngine> {
    engine: Arc<E>,
    transitions: Mutex<Transitions>,
    state_tx: watch::Sender<SchedulerLifecycleState>,
}

impl LifecycleController {
    /// Build an in-memory engine from `config` and wrap it.
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        let engine = RamEngine::new(config)
            .map_err(|source| ServiceError::EngineCreationFailed { source })?;
        Ok(Self::with_engine(Arc::new(engine)))
    }

    /// Scheduling operations on the managed engine. Still handed out while
    /// closing so callers can inspect state during the drain.
    pub fn facade(&self) -> Result<SchedulingFacade> {
        match self.state() {
            SchedulerLifecycleState::Closed => {
                Err(ServiceError::EngineUnavailable { operation: "facade" })
            }
            _ => Ok(SchedulingFacade::new(Arc::clone(&self.engine))),
        }
    }
}

impl<E: ?Sized + EngineLifecycle> LifecycleController<E> {
    pub fn with_engine(engine: Arc<E>) -> Self {
        let (state_tx, _) = watch::channel(SchedulerLifecycleState::Created);
        Self {
            engine,
            transitions: Mutex::new(Transitions {
                engine_started: false,
            }),
            state_tx,
        }
    }

    pub fn state(&self) -> SchedulerLifecycleState {
        *self.state_tx.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerLifecycleState> {
        self.state_tx.subscribe()
    }

    fn publish(&self, state: SchedulerLifecycleState) {
        self.state_tx.send_replace(state);
    }

    /// Begin firing, or resume after [`stop`](Self::stop). No-op when running.
    pub async fn start(&self) -> Result<()> {
        let mut transitions = self.transitions.lock().await;
        match self.state() {
            SchedulerLifecycleState::Running => {
                debug!("scheduler already running; start ignored");
                Ok(())
            }
            SchedulerLifecycleState::Created => {
                info!("starting scheduler");
                self.engine
                    .start()
                    .await
                    .map_err(transition_failed(Transition::Start))?;
                transitions.engine_started = true;
                self.publish(SchedulerLifecycleState::Running);
                Ok(())
            }
            SchedulerLifecycleState::Paused => {
                info!("resuming scheduler");
                self.engine
                    .resume_all()
                    .await
                    .map_err(transition_failed(Transition::Start))?;
                if !transitions.engine_started {
                    self.engine
                        .start()
                        .await
                        .map_err(transition_failed(Transition::Start))?;
                    transitions.engine_started = true;
                }
                self.publish(SchedulerLifecycleState::Running);
                Ok(())
            }
            SchedulerLifecycleState::ShuttingDown | SchedulerLifecycleState::Closed => {
                Err(ServiceError::EngineUnavailable { operation: "start" })
            }
        }
    }

    /// Pause every trigger group. Executing jobs are not interrupted.
    /// No-op when already paused.
    pub async fn stop(&self) -> Result<()> {
        let _transitions = self.transitions.lock().await;
        match self.state() {
            SchedulerLifecycleState::Paused => {
                debug!("scheduler already paused; stop ignored");
                Ok(())
            }
            SchedulerLifecycleState::Created | SchedulerLifecycleState::Running => {
                info!("pausing scheduler");
                self.engine
                    .pause_all()
                    .await
                    .map_err(transition_failed(Transition::Stop))?;
                self.publish(SchedulerLifecycleState::Paused);
                Ok(())
            }
            SchedulerLifecycleState::ShuttingDown | SchedulerLifecycleState::Closed => {
                Err(ServiceError::EngineUnavailable { operation: "stop" })
            }
        }
    }

    /// Shut the engine down, waiting for executing jobs. Allowed from any
    /// live state, including before the first start; only once.
    pub async fn close(&self) -> Result<()> {
        let _transitions = self.transitions.lock().await;
        let previous = self.state();
        if matches!(
            previous,
            SchedulerLifecycleState::ShuttingDown | SchedulerLifecycleState::Closed
        ) {
            return Err(ServiceError::EngineUnavailable { operation: "close" });
        }

        info!(from = %previous, "closing scheduler; waiting for executing jobs");
        self.publish(SchedulerLifecycleState::ShuttingDown);
        match self.engine.shutdown(true).await {
            Ok(()) => {
                self.publish(SchedulerLifecycleState::Closed);
                info!("scheduler closed");
                Ok(())
            }
            Err(source) => {
                let state = if self.engine.is_shutdown() {
                    SchedulerLifecycleState::Closed
                } else {
                    previous
                };
                warn!(error = %source, state = %state, "scheduler close failed");
                self.publish(state);
                Err(transition_failed(Transition::Close)(source))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use hourglass_engine::EngineError;

    use super::*;

    /// Records which engine calls the controller makes.
    #[derive(Default)]
    struct FakeEngine {
        calls: StdMutex<Vec<&'static str>>,
        fail_shutdown: AtomicBool,
        shut_down: AtomicBool,
    }

    impl FakeEngine {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EngineLifecycle for FakeEngine {
        async fn start(&self) -> hourglass_engine::Result<()> {
            self.record("start");
            Ok(())
        }

        async fn standby(&self) -> hourglass_engine::Result<()> {
            self.record("standby");
            Ok(())
        }

        async fn pause_all(&self) -> hourglass_engine::Result<()> {
            self.record("pause_all");
            Ok(())
        }

        async fn resume_all(&self) -> hourglass_engine::Result<()> {
            self.record("resume_all");
            Ok(())
        }

        async fn shutdown(&self, wait_for_jobs: bool) -> hourglass_engine::Result<()> {
            assert!(wait_for_jobs);
            self.record("shutdown");
            if self.fail_shutdown.load(Ordering::SeqCst) {
                return Err(EngineError::Config("disk on fire".to_string()));
            }
            self.shut_down.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_shutdown(&self) -> bool {
            self.shut_down.load(Ordering::SeqCst)
        }
    }

    fn controller() -> (Arc<FakeEngine>, LifecycleController<FakeEngine>) {
        let engine = Arc::new(FakeEngine::default());
        (Arc::clone(&engine), LifecycleController::with_engine(engine))
    }

    #[tokio::test]
    async fn start_begins_then_is_idempotent() {
        let (engine, ctl) = controller();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Created);
        ctl.start().await.unwrap();
        ctl.start().await.unwrap();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Running);
        assert_eq!(engine.calls(), vec!["start"]);
    }

    #[tokio::test]
    async fn restart_after_stop_resumes_instead_of_beginning() {
        let (engine, ctl) = controller();
        ctl.start().await.unwrap();
        ctl.stop().await.unwrap();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Paused);
        ctl.stop().await.unwrap();
        ctl.start().await.unwrap();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Running);
        assert_eq!(engine.calls(), vec!["start", "pause_all", "resume_all"]);
    }

    #[tokio::test]
    async fn stop_before_first_start_still_begins_firing_later() {
        let (engine, ctl) = controller();
        ctl.stop().await.unwrap();
        ctl.start().await.unwrap();
        assert_eq!(engine.calls(), vec!["pause_all", "resume_all", "start"]);

        ctl.stop().await.unwrap();
        ctl.start().await.unwrap();
        assert_eq!(
            engine.calls(),
            vec!["pause_all", "resume_all", "start", "pause_all", "resume_all"]
        );
    }

    #[tokio::test]
    async fn close_before_start_succeeds() {
        let (engine, ctl) = controller();
        let mut states = ctl.subscribe();
        ctl.close().await.unwrap();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Closed);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), SchedulerLifecycleState::Closed);
        assert_eq!(engine.calls(), vec!["shutdown"]);
    }

    #[tokio::test]
    async fn everything_after_close_is_unavailable() {
        let (engine, ctl) = controller();
        ctl.start().await.unwrap();
        ctl.close().await.unwrap();

        for err in [
            ctl.close().await.unwrap_err(),
            ctl.start().await.unwrap_err(),
            ctl.stop().await.unwrap_err(),
        ] {
            assert!(matches!(err, ServiceError::EngineUnavailable { .. }));
        }
        assert_eq!(engine.calls(), vec!["start", "shutdown"]);
    }

    #[tokio::test]
    async fn failed_close_restores_previous_state() {
        let (engine, ctl) = controller();
        ctl.start().await.unwrap();
        engine.fail_shutdown.store(true, Ordering::SeqCst);

        let err = ctl.close().await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::LifecycleTransitionFailed {
                transition: Transition::Close,
                ..
            }
        ));
        assert_eq!(ctl.state(), SchedulerLifecycleState::Running);

        engine.fail_shutdown.store(false, Ordering::SeqCst);
        ctl.close().await.unwrap();
        assert_eq!(ctl.state(), SchedulerLifecycleState::Closed);
    }

    #[tokio::test]
    async fn concurrent_transitions_are_serialized() {
        let (engine, ctl) = controller();
        let ctl = Arc::new(ctl);
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ctl = Arc::clone(&ctl);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        ctl.start().await
                    } else {
                        ctl.stop().await
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        // The engine is begun exactly once however the calls interleave.
        let calls = engine.calls();
        assert_eq!(calls.iter().filter(|c| **c == "start").count(), 1);
        assert!(matches!(
            ctl.state(),
            SchedulerLifecycleState::Running | SchedulerLifecycleState::Paused
        ));
    }

    #[test]
    fn invalid_config_fails_creation() {
        let config = SchedulerConfig {
            tick_interval_ms: 0,
            ..SchedulerConfig::default()
        };
        let err = LifecycleController::new(&config).err().unwrap();
        assert_eq!(err.code(), "ENGINE_CREATION_FAILED");
    }
}
