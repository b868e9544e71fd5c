use thiserror::Error;

/// Errors that can occur within the scheduling engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine settings are unusable.
    #[error("Invalid engine configuration: {0}")]
    Config(String),

    /// A job, trigger or calendar with this identity is already stored and
    /// replacement was not requested.
    #[error("{kind} already exists: {key}")]
    ObjectAlreadyExists { kind: &'static str, key: String },

    /// No job with the given key exists in the store.
    #[error("Job not found: {key}")]
    JobNotFound { key: String },

    /// A trigger names a calendar that was never added.
    #[error("Calendar not found: {name}")]
    CalendarNotFound { name: String },

    /// The calendar is still referenced by at least one trigger.
    #[error("Calendar '{name}' is referenced by trigger {trigger}")]
    CalendarInUse { name: String, trigger: String },

    /// The job's `job_type` has no registered handler.
    #[error("No handler registered for job type '{job_type}'")]
    UnknownJobType { job_type: String },

    /// A non-durable job cannot be stored without a trigger.
    #[error("Job {key} is not durable and has no trigger")]
    NonDurableWithoutTrigger { key: String },

    /// The trigger definition is inconsistent or can never fire.
    #[error("Invalid trigger {key}: {reason}")]
    InvalidTrigger { key: String, reason: String },

    /// The provided schedule or calendar definition is invalid or unsupported.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// A job or trigger key failed well-formedness checks.
    #[error(transparent)]
    InvalidKey(#[from] hourglass_core::HourglassError),

    /// The engine has been shut down and accepts no further calls.
    #[error("Scheduler has been shut down")]
    Shutdown,

    /// The targeted job does not opt into cooperative interruption.
    #[error("Job {job_key} does not support interruption")]
    NotInterruptible { job_key: String },
}

impl EngineError {
    /// Short error code string, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::ObjectAlreadyExists { .. } => "OBJECT_ALREADY_EXISTS",
            EngineError::JobNotFound { .. } => "JOB_NOT_FOUND",
            EngineError::CalendarNotFound { .. } => "CALENDAR_NOT_FOUND",
            EngineError::CalendarInUse { .. } => "CALENDAR_IN_USE",
            EngineError::UnknownJobType { .. } => "UNKNOWN_JOB_TYPE",
            EngineError::NonDurableWithoutTrigger { .. } => "NON_DURABLE_WITHOUT_TRIGGER",
            EngineError::InvalidTrigger { .. } => "INVALID_TRIGGER",
            EngineError::InvalidSchedule(_) => "INVALID_SCHEDULE",
            EngineError::InvalidKey(e) => e.code(),
            EngineError::Shutdown => "SHUTDOWN",
            EngineError::NotInterruptible { .. } => "NOT_INTERRUPTIBLE",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
