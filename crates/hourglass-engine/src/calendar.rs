use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::schedule::parse_cron;

/// Upper bound on candidate fire times skipped while looking for one the
/// calendar allows. Keeps a calendar that excludes everything from spinning.
const MAX_EXCLUDED_CANDIDATES: usize = 1_000;

/// A named set of excluded instants, referenced by triggers.
///
/// All variants work in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Calendar {
    /// Excludes whole days.
    Holiday { dates: BTreeSet<NaiveDate> },

    /// Excludes whole weekdays (0 = Monday … 6 = Sunday).
    Weekly { excluded_days: BTreeSet<u8> },

    /// Excludes the `[start, end)` time-of-day window every day, or
    /// everything outside it when `invert` is set.
    Daily {
        start: NaiveTime,
        end: NaiveTime,
        #[serde(default)]
        invert: bool,
    },

    /// Excludes every second matched by the cron expression.
    Cron { expression: String },
}

impl Calendar {
    pub fn validate(&self) -> Result<()> {
        match self {
            Calendar::Weekly { excluded_days } => {
                if let Some(day) = excluded_days.iter().find(|d| **d > 6) {
                    return Err(EngineError::InvalidSchedule(format!(
                        "calendar weekday {day} out of range 0..=6"
                    )));
                }
                if excluded_days.len() == 7 {
                    return Err(EngineError::InvalidSchedule(
                        "weekly calendar cannot exclude every day".to_string(),
                    ));
                }
                Ok(())
            }
            Calendar::Daily { start, end, .. } => {
                if start >= end {
                    return Err(EngineError::InvalidSchedule(format!(
                        "daily calendar window {start}..{end} is empty"
                    )));
                }
                Ok(())
            }
            Calendar::Cron { expression } => parse_cron(expression).map(|_| ()),
            Calendar::Holiday { .. } => Ok(()),
        }
    }

    /// Whether `t` may be used as a fire time.
    pub fn is_time_included(&self, t: DateTime<Utc>) -> bool {
        match self {
            Calendar::Holiday { dates } => !dates.contains(&t.date_naive()),
            Calendar::Weekly { excluded_days } => {
                let dow = t.weekday().num_days_from_monday() as u8;
                !excluded_days.contains(&dow)
            }
            Calendar::Daily { start, end, invert } => {
                let time = t.time();
                let in_window = time >= *start && time < *end;
                // The window is excluded unless inverted.
                in_window == *invert
            }
            Calendar::Cron { expression } => match parse_cron(expression) {
                Ok(cron) => !cron.includes(t),
                Err(_) => true,
            },
        }
    }
}

/// Walk `next` forward until `calendar` allows the candidate.
///
/// `next` receives the previously rejected candidate and yields the
/// following one; `None` from it ends the search.
pub(crate) fn first_included(
    calendar: Option<&Calendar>,
    first: Option<DateTime<Utc>>,
    mut next: impl FnMut(DateTime<Utc>) -> Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let Some(calendar) = calendar else {
        return first;
    };
    let mut candidate = first?;
    for _ in 0..MAX_EXCLUDED_CANDIDATES {
        if calendar.is_time_included(candidate) {
            return Some(candidate);
        }
        candidate = next(candidate)?;
    }
    None
}
