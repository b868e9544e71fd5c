//! `hourglass-engine` — in-memory job scheduling engine on Tokio.
//!
//! # Overview
//!
//! Jobs (what to run) and triggers (when to run it) are kept in memory by
//! [`RamEngine`]. A polling loop claims triggers whose next fire time has
//! arrived and executes the registered [`Job`] handler for each, bounded by
//! the configured worker count.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                              |
//! |------------|--------------------------------------------------------|
//! | `Once`     | Single fire at an absolute UTC instant                 |
//! | `Interval` | Repeat every N seconds                                 |
//! | `Daily`    | Fire at HH:MM UTC every day                            |
//! | `Weekly`   | Fire at HH:MM UTC on a specific weekday                |
//! | `Cron`     | 5/6/7-field cron expression, optionally in a time zone |
//!
//! Triggers may reference a named [`Calendar`] whose excluded instants are
//! skipped.

pub mod api;
pub mod calendar;
pub mod engine;
pub mod error;
pub mod job;
pub mod schedule;
mod store;
pub mod types;

pub use api::{EngineLifecycle, SchedulerEngine};
pub use calendar::Calendar;
pub use engine::RamEngine;
pub use error::{EngineError, Result};
pub use job::{Job, JobContext, JobError, JobRegistry};
pub use schedule::{compute_next_run, Schedule};
pub use store::MANUAL_TRIGGER_GROUP;
pub use types::{
    ExecutingJob, JobDetail, SchedulerMetaData, Trigger, TriggerState, DEFAULT_PRIORITY,
};
