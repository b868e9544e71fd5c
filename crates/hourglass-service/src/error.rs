use std::fmt;

use hourglass_engine::EngineError;
use thiserror::Error;

/// Lifecycle transition that failed in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
    Close,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Transition::Start => "start",
            Transition::Stop => "stop",
            Transition::Close => "close",
        };
        write!(f, "{s}")
    }
}

/// Failures surfaced by the lifecycle controller and the scheduling facade.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The engine could not be constructed; no instance exists.
    #[error("Scheduler engine could not be created: {source}")]
    EngineCreationFailed { source: EngineError },

    /// The engine refused a start, stop or close. The controller state is
    /// unchanged.
    #[error("Scheduler {transition} failed: {source}")]
    LifecycleTransitionFailed {
        transition: Transition,
        source: EngineError,
    },

    /// The engine has been shut down.
    #[error("Scheduler is shut down; cannot {operation}")]
    EngineUnavailable { operation: &'static str },

    /// The engine rejected a scheduling or query call.
    #[error("{operation} failed for {context}: {source}")]
    EngineRejected {
        operation: &'static str,
        context: String,
        source: EngineError,
    },

    /// The executing job does not support interruption.
    #[error("Cannot interrupt {target}: {source}")]
    InterruptUnsupported { target: String, source: EngineError },

    /// Interruption was supported but the request failed.
    #[error("Interrupt of {target} failed: {source}")]
    InterruptFailed { target: String, source: EngineError },
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::EngineCreationFailed { .. } => "ENGINE_CREATION_FAILED",
            ServiceError::LifecycleTransitionFailed { .. } => "LIFECYCLE_TRANSITION_FAILED",
            ServiceError::EngineUnavailable { .. } => "ENGINE_UNAVAILABLE",
            ServiceError::EngineRejected { .. } => "ENGINE_REJECTED",
            ServiceError::InterruptUnsupported { .. } => "INTERRUPT_UNSUPPORTED",
            ServiceError::InterruptFailed { .. } => "INTERRUPT_FAILED",
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// Translate an engine failure from a scheduling or query call.
pub(crate) fn rejected(
    operation: &'static str,
    context: impl fmt::Display,
) -> impl FnOnce(EngineError) -> ServiceError {
    let context = context.to_string();
    move |source| match source {
        EngineError::Shutdown => ServiceError::EngineUnavailable { operation },
        source => ServiceError::EngineRejected {
            operation,
            context,
            source,
        },
    }
}

/// Translate an engine failure from an interrupt request.
pub(crate) fn interrupt_failed(
    operation: &'static str,
    target: impl fmt::Display,
) -> impl FnOnce(EngineError) -> ServiceError {
    let target = target.to_string();
    move |source| match source {
        EngineError::Shutdown => ServiceError::EngineUnavailable { operation },
        EngineError::NotInterruptible { .. } => {
            ServiceError::InterruptUnsupported { target, source }
        }
        source => ServiceError::InterruptFailed { target, source },
    }
}

/// Translate an engine failure from a lifecycle transition.
pub(crate) fn transition_failed(
    transition: Transition,
) -> impl FnOnce(EngineError) -> ServiceError {
    move |source| ServiceError::LifecycleTransitionFailed { transition, source }
}
