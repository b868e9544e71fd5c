use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{HourglassError, Result};

/// Group assigned to keys created without an explicit group.
pub const DEFAULT_GROUP: &str = "DEFAULT";

/// Free-form data bag attached to jobs, triggers and the scheduler context.
pub type JobDataMap = serde_json::Map<String, serde_json::Value>;

/// Common shape of job and trigger identities: a `(name, group)` pair.
///
/// Group matchers and the engine's group bookkeeping are written against this
/// trait so the same code serves both key kinds.
pub trait GroupedKey: Clone + Eq + std::hash::Hash + fmt::Display {
    fn name(&self) -> &str;
    fn group(&self) -> &str;

    /// Both parts must be non-empty.
    fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(HourglassError::InvalidKey {
                key: self.to_string(),
                reason: "name must not be empty",
            });
        }
        if self.group().trim().is_empty() {
            return Err(HourglassError::InvalidKey {
                key: self.to_string(),
                reason: "group must not be empty",
            });
        }
        Ok(())
    }
}

/// Identifies a job definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub name: String,
    pub group: String,
}

impl JobKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    /// Key in the [`DEFAULT_GROUP`].
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl GroupedKey for JobKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identifies a trigger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    pub name: String,
    pub group: String,
}

impl TriggerKey {
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_GROUP)
    }
}

impl GroupedKey for TriggerKey {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identifies one concrete firing of a job (UUIDv7, time-sortable in logs).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FireInstanceId(pub String);

impl FireInstanceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FireInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for FireInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for FireInstanceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for FireInstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
