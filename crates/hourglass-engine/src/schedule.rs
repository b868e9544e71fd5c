use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Longest accepted interval: one hundred years.
pub const MAX_INTERVAL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Defines when and how often a trigger fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire exactly once at the given UTC instant.
    Once { at: DateTime<Utc> },

    /// Fire repeatedly with a fixed interval in seconds.
    Interval { every_secs: u64 },

    /// Fire every day at the given hour and minute (UTC).
    Daily { hour: u8, minute: u8 },

    /// Fire on a specific weekday (0 = Monday … 6 = Sunday) at the given time (UTC).
    Weekly { day: u8, hour: u8, minute: u8 },

    /// Fire according to a 5- or 6-field cron expression, evaluated in
    /// `timezone` (UTC when absent).
    Cron {
        expression: String,
        #[serde(default)]
        timezone: Option<String>,
    },
}

impl Schedule {
    pub fn once(at: DateTime<Utc>) -> Self {
        Schedule::Once { at }
    }

    pub fn every_secs(every_secs: u64) -> Self {
        Schedule::Interval { every_secs }
    }

    pub fn cron(expression: impl Into<String>) -> Self {
        Schedule::Cron {
            expression: expression.into(),
            timezone: None,
        }
    }

    /// Check field ranges and parse cron expressions up front, so a bad
    /// schedule is rejected when the trigger is stored rather than when it
    /// would fire.
    pub fn validate(&self) -> Result<()> {
        match self {
            Schedule::Once { .. } => Ok(()),
            Schedule::Interval { every_secs } => {
                if *every_secs == 0 {
                    Err(EngineError::InvalidSchedule(
                        "interval must be at least one second".to_string(),
                    ))
                } else if *every_secs > MAX_INTERVAL_SECS {
                    Err(EngineError::InvalidSchedule(format!(
                        "interval of {every_secs}s exceeds the maximum of {MAX_INTERVAL_SECS}s"
                    )))
                } else {
                    Ok(())
                }
            }
            Schedule::Daily { hour, minute } => check_time_of_day(*hour, *minute),
            Schedule::Weekly { day, hour, minute } => {
                if *day > 6 {
                    return Err(EngineError::InvalidSchedule(format!(
                        "weekday {day} out of range 0..=6"
                    )));
                }
                check_time_of_day(*hour, *minute)
            }
            Schedule::Cron {
                expression,
                timezone,
            } => {
                parse_cron(expression)?;
                parse_timezone(timezone.as_deref())?;
                Ok(())
            }
        }
    }
}

fn check_time_of_day(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(EngineError::InvalidSchedule(format!(
            "time {hour:02}:{minute:02} out of range"
        )));
    }
    Ok(())
}

/// Parse a cron expression, accepting the 5-field form by prepending a
/// zero seconds field.
pub(crate) fn parse_cron(expression: &str) -> Result<CronSchedule> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", expression.trim()),
        6 | 7 => expression.trim().to_string(),
        n => {
            return Err(EngineError::InvalidSchedule(format!(
                "cron expression '{expression}' has {n} fields, expected 5 to 7"
            )))
        }
    };
    CronSchedule::from_str(&normalized)
        .map_err(|e| EngineError::InvalidSchedule(format!("cron expression '{expression}': {e}")))
}

fn parse_timezone(timezone: Option<&str>) -> Result<Tz> {
    match timezone {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| EngineError::InvalidSchedule(format!("unknown timezone '{name}'"))),
    }
}

/// Compute the next UTC fire time for `schedule` strictly *after* `from`.
///
/// Returns `None` when the schedule is exhausted (a `Once` whose instant has
/// passed), cannot be evaluated, or would land beyond the representable range.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Schedule::Interval { every_secs } => {
            let secs = i64::try_from(*every_secs).ok()?;
            from.checked_add_signed(Duration::try_seconds(secs)?)
        }

        Schedule::Daily { hour, minute } => {
            let candidate = Utc
                .with_ymd_and_hms(
                    from.year(),
                    from.month(),
                    from.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;
            if candidate > from {
                Some(candidate)
            } else {
                candidate.checked_add_signed(Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            // ISO weekday numbering, matching chrono's `num_days_from_monday`.
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let days_ahead = (target_dow - today_dow).rem_euclid(7);
            let candidate_day = from.checked_add_signed(Duration::days(days_ahead))?;

            let candidate = Utc
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;

            if candidate > from {
                Some(candidate)
            } else {
                candidate.checked_add_signed(Duration::days(7))
            }
        }

        Schedule::Cron {
            expression,
            timezone,
        } => {
            let cron = parse_cron(expression).ok()?;
            let tz = parse_timezone(timezone.as_deref()).ok()?;
            cron.after(&from.with_timezone(&tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}
