//! `hourglass-core` — identities, group matchers and configuration shared by
//! the engine, the service layer and the host binary.

pub mod config;
pub mod error;
pub mod matcher;
pub mod types;

pub use config::{HourglassConfig, LoggingConfig, SchedulerConfig};
pub use error::{HourglassError, Result};
pub use matcher::KeyMatcher;
pub use types::{FireInstanceId, GroupedKey, JobDataMap, JobKey, TriggerKey, DEFAULT_GROUP};
