use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::JobDataMap;

pub const DEFAULT_INSTANCE_NAME: &str = "HourglassScheduler";
pub const DEFAULT_INSTANCE_ID: &str = "NON_CLUSTERED";
/// Setting `instance_id = "AUTO"` generates a fresh UUID per process.
pub const AUTO_INSTANCE_ID: &str = "AUTO";
pub const DEFAULT_THREAD_COUNT: usize = 10;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LOG_FILTER: &str = "hourglass=info";

/// Top-level config (hourglass.toml + HOURGLASS_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HourglassConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Engine settings consumed when the scheduler is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Upper bound on concurrently executing jobs.
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    /// How often the engine looks for due triggers.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Initial contents of the scheduler context shared by every job.
    #[serde(default)]
    pub context: JobDataMap,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            instance_id: default_instance_id(),
            thread_count: DEFAULT_THREAD_COUNT,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            context: JobDataMap::new(),
        }
    }
}

impl SchedulerConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.instance_name.trim().is_empty() {
            return Err(crate::error::HourglassError::Config(
                "scheduler.instance_name must not be empty".to_string(),
            ));
        }
        if self.thread_count == 0 {
            return Err(crate::error::HourglassError::Config(
                "scheduler.thread_count must be at least 1".to_string(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(crate::error::HourglassError::Config(
                "scheduler.tick_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The instance id with `AUTO` expanded.
    pub fn resolved_instance_id(&self) -> String {
        if self.instance_id.eq_ignore_ascii_case(AUTO_INSTANCE_ID) {
            Uuid::new_v4().to_string()
        } else {
            self.instance_id.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_instance_name() -> String {
    DEFAULT_INSTANCE_NAME.to_string()
}
fn default_instance_id() -> String {
    DEFAULT_INSTANCE_ID.to_string()
}
fn default_thread_count() -> usize {
    DEFAULT_THREAD_COUNT
}
fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl HourglassConfig {
    /// Load config from a TOML file with HOURGLASS_* env var overrides.
    ///
    /// Nested keys use a double underscore:
    /// `HOURGLASS_SCHEDULER__THREAD_COUNT=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("HOURGLASS_").split("__")),
        )
    }

    /// Extract and validate from an already-assembled figment.
    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        let config: HourglassConfig = figment
            .extract()
            .map_err(|e| crate::error::HourglassError::Config(e.to_string()))?;
        config.scheduler.validate()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.hourglass/hourglass.toml", home)
}
