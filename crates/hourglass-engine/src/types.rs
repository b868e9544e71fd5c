use chrono::{DateTime, Utc};
use hourglass_core::{FireInstanceId, JobDataMap, JobKey, TriggerKey};
use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// Priority given to triggers that do not set one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// A stored job definition: what to run, independent of when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub key: JobKey,
    /// Name under which the handler was registered with the engine.
    pub job_type: String,
    pub description: Option<String>,
    /// Data handed to every execution, overlaid by trigger data.
    pub data: JobDataMap,
    /// Keep the job when no trigger references it any more.
    pub durable: bool,
    /// At most one live execution; other triggers of the job wait (Blocked).
    pub concurrent_execution_disallowed: bool,
    /// Informational: the job asks to be re-run after an unclean shutdown.
    pub requests_recovery: bool,
}

impl JobDetail {
    pub fn new(key: JobKey, job_type: impl Into<String>) -> Self {
        Self {
            key,
            job_type: job_type.into(),
            description: None,
            data: JobDataMap::new(),
            durable: false,
            concurrent_execution_disallowed: false,
            requests_recovery: false,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn disallow_concurrent_execution(mut self) -> Self {
        self.concurrent_execution_disallowed = true;
        self
    }

    pub fn requests_recovery(mut self, requests_recovery: bool) -> Self {
        self.requests_recovery = requests_recovery;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// A schedule bound to one job.
///
/// `next_fire_time`, `previous_fire_time` and `times_fired` are maintained by
/// the engine; values supplied by callers are ignored when the trigger is
/// stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub key: TriggerKey,
    pub job_key: JobKey,
    pub schedule: Schedule,
    pub calendar_name: Option<String>,
    /// Higher fires first when several triggers are due at the same instant.
    pub priority: i32,
    pub description: Option<String>,
    /// Overlaid on the job's data for executions caused by this trigger.
    pub data: JobDataMap,
    /// No fire before this instant.
    pub start_at: Option<DateTime<Utc>>,
    /// No fire after this instant.
    pub end_at: Option<DateTime<Utc>>,
    /// Stop after this many fires (`None` means unlimited).
    pub max_fires: Option<u32>,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub times_fired: u32,
}

impl Trigger {
    pub fn new(key: TriggerKey, job_key: JobKey, schedule: Schedule) -> Self {
        Self {
            key,
            job_key,
            schedule,
            calendar_name: None,
            priority: DEFAULT_PRIORITY,
            description: None,
            data: JobDataMap::new(),
            start_at: None,
            end_at: None,
            max_fires: None,
            next_fire_time: None,
            previous_fire_time: None,
            times_fired: 0,
        }
    }

    pub fn with_calendar(mut self, name: impl Into<String>) -> Self {
        self.calendar_name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn starting_at(mut self, start_at: DateTime<Utc>) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn ending_at(mut self, end_at: DateTime<Utc>) -> Self {
        self.end_at = Some(end_at);
        self
    }

    pub fn with_max_fires(mut self, max_fires: u32) -> Self {
        self.max_fires = Some(max_fires);
        self
    }
}

/// Externally visible state of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    /// Waiting for its next fire time.
    Normal,
    /// Firing suppressed until resumed.
    Paused,
    /// Will never fire again.
    Complete,
    /// Its job could not be run (e.g. the handler disappeared).
    Error,
    /// Its job disallows concurrent execution and is currently running.
    Blocked,
    /// No such trigger.
    None,
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerState::Normal => "normal",
            TriggerState::Paused => "paused",
            TriggerState::Complete => "complete",
            TriggerState::Error => "error",
            TriggerState::Blocked => "blocked",
            TriggerState::None => "none",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TriggerState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "normal" => Ok(TriggerState::Normal),
            "paused" => Ok(TriggerState::Paused),
            "complete" => Ok(TriggerState::Complete),
            "error" => Ok(TriggerState::Error),
            "blocked" => Ok(TriggerState::Blocked),
            "none" => Ok(TriggerState::None),
            other => Err(format!("unknown trigger state: {other}")),
        }
    }
}

/// Snapshot of one live execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutingJob {
    pub fire_instance_id: FireInstanceId,
    pub job_key: JobKey,
    pub trigger_key: TriggerKey,
    pub scheduled_fire_time: DateTime<Utc>,
    pub fire_time: DateTime<Utc>,
    /// Whether the handler observes interrupt requests.
    pub interruptible: bool,
}

/// Descriptive snapshot of an engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerMetaData {
    pub scheduler_name: String,
    pub instance_id: String,
    pub started: bool,
    pub in_standby: bool,
    pub shutdown: bool,
    pub running_since: Option<DateTime<Utc>>,
    pub jobs_executed: u64,
    pub thread_pool_size: usize,
    /// Registered job type names, sorted.
    pub job_types: Vec<String>,
    pub version: String,
}
