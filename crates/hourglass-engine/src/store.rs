//! In-memory job store: jobs, triggers, calendars and pause bookkeeping.
//!
//! Purely synchronous and clock-free (callers pass `now`), so every rule the
//! engine enforces can be exercised without a runtime. [`RamEngine`] wraps a
//! single `JobStore` in a mutex.
//!
//! [`RamEngine`]: crate::engine::RamEngine

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use hourglass_core::{GroupedKey, JobDataMap, JobKey, KeyMatcher, TriggerKey};

use crate::calendar::{first_included, Calendar};
use crate::error::{EngineError, Result};
use crate::schedule::{compute_next_run, Schedule};
use crate::types::{JobDetail, Trigger, TriggerState};

/// Group used for the one-shot triggers created by `trigger_job`.
pub const MANUAL_TRIGGER_GROUP: &str = "MANUAL_TRIGGER";

/// Internal trigger state; the paused/blocked combination collapses to
/// `Paused` when reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoredState {
    Waiting,
    Paused,
    Blocked,
    PausedBlocked,
    Complete,
    Error,
}

impl StoredState {
    fn external(self) -> TriggerState {
        match self {
            StoredState::Waiting => TriggerState::Normal,
            StoredState::Paused | StoredState::PausedBlocked => TriggerState::Paused,
            StoredState::Blocked => TriggerState::Blocked,
            StoredState::Complete => TriggerState::Complete,
            StoredState::Error => TriggerState::Error,
        }
    }

    fn paused(self) -> Self {
        match self {
            StoredState::Waiting => StoredState::Paused,
            StoredState::Blocked => StoredState::PausedBlocked,
            other => other,
        }
    }

    fn resumed(self) -> Self {
        match self {
            StoredState::Paused => StoredState::Waiting,
            StoredState::PausedBlocked => StoredState::Blocked,
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
struct TriggerRecord {
    trigger: Trigger,
    state: StoredState,
    /// One-shot trigger from `trigger_job`; dropped as soon as it fires.
    transient: bool,
}

/// A trigger that came due and the job it fires.
#[derive(Debug, Clone)]
pub(crate) struct FiredTrigger {
    /// Trigger as updated by the firing (previous/next fire times advanced).
    pub trigger: Trigger,
    pub job: JobDetail,
    pub scheduled_fire_time: DateTime<Utc>,
    pub merged_data: JobDataMap,
}

#[derive(Debug, Default)]
pub(crate) struct JobStore {
    jobs: HashMap<JobKey, JobDetail>,
    triggers: HashMap<TriggerKey, TriggerRecord>,
    calendars: HashMap<String, Calendar>,
    paused_trigger_groups: HashSet<String>,
    paused_job_groups: HashSet<String>,
    /// Set by `pause_all`; new triggers in any group start paused.
    paused_all: bool,
    /// Non-concurrent jobs with a live execution.
    blocked_jobs: HashSet<JobKey>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    /// Store a job without triggers.
    ///
    /// A non-durable job needs either an existing trigger or
    /// `allow_orphan` (it is about to be scheduled).
    pub fn store_job(&mut self, job: JobDetail, replace: bool, allow_orphan: bool) -> Result<()> {
        job.key.validate()?;
        if !replace && self.jobs.contains_key(&job.key) {
            return Err(already_exists("Job", &job.key));
        }
        if !job.durable && !allow_orphan && !self.has_triggers(&job.key) {
            return Err(EngineError::NonDurableWithoutTrigger {
                key: job.key.to_string(),
            });
        }
        self.jobs.insert(job.key.clone(), job);
        Ok(())
    }

    /// Store a job together with its triggers, all or nothing.
    ///
    /// Returns the first fire time of each trigger, in input order.
    pub fn store_job_with_triggers(
        &mut self,
        job: JobDetail,
        triggers: Vec<Trigger>,
        replace: bool,
        now: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let mut seen = HashSet::new();
        let firsts = self.check_job_with_triggers(&job, &triggers, replace, now, &mut seen)?;
        self.insert_job_with_triggers(job, triggers, &firsts);
        Ok(firsts)
    }

    /// Store several jobs with their triggers; nothing is stored if any
    /// entry is rejected.
    pub fn store_jobs_and_triggers(
        &mut self,
        batch: Vec<(JobDetail, Vec<Trigger>)>,
        replace: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut seen_triggers = HashSet::new();
        let mut seen_jobs = HashSet::new();
        let mut checked = Vec::with_capacity(batch.len());
        for (job, triggers) in &batch {
            if !seen_jobs.insert(job.key.clone()) {
                return Err(already_exists("Job", &job.key));
            }
            checked.push(self.check_job_with_triggers(
                job,
                triggers,
                replace,
                now,
                &mut seen_triggers,
            )?);
        }
        for ((job, triggers), firsts) in batch.into_iter().zip(checked) {
            self.insert_job_with_triggers(job, triggers, &firsts);
        }
        Ok(())
    }

    fn check_job_with_triggers(
        &self,
        job: &JobDetail,
        triggers: &[Trigger],
        replace: bool,
        now: DateTime<Utc>,
        seen_triggers: &mut HashSet<TriggerKey>,
    ) -> Result<Vec<DateTime<Utc>>> {
        job.key.validate()?;
        if !replace && self.jobs.contains_key(&job.key) {
            return Err(already_exists("Job", &job.key));
        }
        if triggers.is_empty() && !job.durable && !self.has_triggers(&job.key) {
            return Err(EngineError::NonDurableWithoutTrigger {
                key: job.key.to_string(),
            });
        }
        let mut firsts = Vec::with_capacity(triggers.len());
        for trigger in triggers {
            if trigger.job_key != job.key {
                return Err(EngineError::InvalidTrigger {
                    key: trigger.key.to_string(),
                    reason: format!("references job {}, not {}", trigger.job_key, job.key),
                });
            }
            if !seen_triggers.insert(trigger.key.clone()) {
                return Err(already_exists("Trigger", &trigger.key));
            }
            firsts.push(self.check_trigger(trigger, replace, true, now)?);
        }
        Ok(firsts)
    }

    fn insert_job_with_triggers(
        &mut self,
        job: JobDetail,
        triggers: Vec<Trigger>,
        firsts: &[DateTime<Utc>],
    ) {
        self.jobs.insert(job.key.clone(), job);
        for (trigger, first) in triggers.into_iter().zip(firsts) {
            self.insert_trigger(trigger, *first, false);
        }
    }

    /// Remove a job and every trigger that fires it.
    pub fn remove_job(&mut self, key: &JobKey) -> bool {
        self.triggers.retain(|_, r| &r.trigger.job_key != key);
        self.blocked_jobs.remove(key);
        self.jobs.remove(key).is_some()
    }

    /// Remove several jobs; true only if every one existed.
    pub fn remove_jobs(&mut self, keys: &[JobKey]) -> bool {
        keys.iter().fold(true, |all, key| self.remove_job(key) && all)
    }

    pub fn job(&self, key: &JobKey) -> Option<JobDetail> {
        self.jobs.get(key).cloned()
    }

    pub fn contains_job(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn job_group_names(&self) -> Vec<String> {
        sorted_groups(self.jobs.keys().map(|k| k.group.as_str()))
    }

    pub fn job_keys(&self, matcher: &KeyMatcher<JobKey>) -> Vec<JobKey> {
        let mut keys: Vec<JobKey> = self.jobs.keys().filter(|k| matcher.matches(k)).cloned().collect();
        keys.sort();
        keys
    }

    // -----------------------------------------------------------------------
    // Triggers
    // -----------------------------------------------------------------------

    /// Store a trigger for an already stored job. Returns its first fire time.
    pub fn store_trigger(
        &mut self,
        trigger: Trigger,
        replace: bool,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let first = self.check_trigger(&trigger, replace, false, now)?;
        self.insert_trigger(trigger, first, false);
        Ok(first)
    }

    /// Store the one-shot trigger behind `trigger_job`.
    ///
    /// Manual triggers ignore group pauses (an explicit request to run now)
    /// but still wait while a non-concurrent job is executing.
    pub fn store_transient_trigger(&mut self, trigger: Trigger, now: DateTime<Utc>) -> Result<()> {
        let first = self.check_trigger(&trigger, false, false, now)?;
        self.insert_trigger(trigger, first, true);
        Ok(())
    }

    fn check_trigger(
        &self,
        trigger: &Trigger,
        replace: bool,
        job_pending: bool,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        trigger.key.validate()?;
        trigger.job_key.validate()?;
        trigger.schedule.validate()?;
        if !replace && self.triggers.contains_key(&trigger.key) {
            return Err(already_exists("Trigger", &trigger.key));
        }
        if !job_pending && !self.jobs.contains_key(&trigger.job_key) {
            return Err(EngineError::JobNotFound {
                key: trigger.job_key.to_string(),
            });
        }
        let calendar = match &trigger.calendar_name {
            Some(name) => Some(
                self.calendars
                    .get(name)
                    .ok_or_else(|| EngineError::CalendarNotFound { name: name.clone() })?,
            ),
            None => None,
        };
        first_fire_time(trigger, calendar, now).ok_or_else(|| EngineError::InvalidTrigger {
            key: trigger.key.to_string(),
            reason: "schedule will never fire".to_string(),
        })
    }

    fn insert_trigger(&mut self, mut trigger: Trigger, first: DateTime<Utc>, transient: bool) {
        trigger.next_fire_time = Some(first);
        trigger.previous_fire_time = None;
        trigger.times_fired = 0;

        let mut state = if self.blocked_jobs.contains(&trigger.job_key) {
            StoredState::Blocked
        } else {
            StoredState::Waiting
        };
        if !transient
            && (self.paused_all
                || self.paused_trigger_groups.contains(&trigger.key.group)
                || self.paused_job_groups.contains(&trigger.job_key.group))
        {
            state = state.paused();
        }

        self.triggers.insert(
            trigger.key.clone(),
            TriggerRecord {
                trigger,
                state,
                transient,
            },
        );
    }

    /// Remove a trigger; a non-durable job left without triggers goes too.
    pub fn remove_trigger(&mut self, key: &TriggerKey) -> bool {
        let Some(record) = self.triggers.remove(key) else {
            return false;
        };
        let job_key = record.trigger.job_key;
        let orphaned = self
            .jobs
            .get(&job_key)
            .is_some_and(|job| !job.durable && !self.has_triggers(&job_key));
        if orphaned {
            self.jobs.remove(&job_key);
            self.blocked_jobs.remove(&job_key);
        }
        true
    }

    /// Remove several triggers; true only if every one existed.
    pub fn remove_triggers(&mut self, keys: &[TriggerKey]) -> bool {
        keys.iter().fold(true, |all, key| self.remove_trigger(key) && all)
    }

    /// Swap the trigger stored under `key` for `replacement`, which takes
    /// over the same key. `Ok(None)` if nothing is stored under `key`.
    pub fn replace_trigger(
        &mut self,
        key: &TriggerKey,
        mut replacement: Trigger,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let Some(old) = self.triggers.get(key) else {
            return Ok(None);
        };
        if replacement.job_key != old.trigger.job_key {
            return Err(EngineError::InvalidTrigger {
                key: key.to_string(),
                reason: format!(
                    "replacement fires job {}, the original fires {}",
                    replacement.job_key, old.trigger.job_key
                ),
            });
        }
        let was_paused = matches!(old.state, StoredState::Paused | StoredState::PausedBlocked);
        replacement.key = key.clone();
        let first = self.check_trigger(&replacement, true, false, now)?;
        self.insert_trigger(replacement, first, false);
        if was_paused {
            if let Some(record) = self.triggers.get_mut(key) {
                record.state = record.state.paused();
            }
        }
        Ok(Some(first))
    }

    pub fn trigger(&self, key: &TriggerKey) -> Option<Trigger> {
        self.triggers.get(key).map(|r| r.trigger.clone())
    }

    pub fn contains_trigger(&self, key: &TriggerKey) -> bool {
        self.triggers.contains_key(key)
    }

    pub fn trigger_state(&self, key: &TriggerKey) -> TriggerState {
        self.triggers
            .get(key)
            .map_or(TriggerState::None, |r| r.state.external())
    }

    pub fn triggers_of_job(&self, key: &JobKey) -> Vec<Trigger> {
        let mut triggers: Vec<Trigger> = self
            .triggers
            .values()
            .filter(|r| &r.trigger.job_key == key)
            .map(|r| r.trigger.clone())
            .collect();
        triggers.sort_by(|a, b| a.key.cmp(&b.key));
        triggers
    }

    pub fn trigger_group_names(&self) -> Vec<String> {
        sorted_groups(self.triggers.keys().map(|k| k.group.as_str()))
    }

    pub fn trigger_keys(&self, matcher: &KeyMatcher<TriggerKey>) -> Vec<TriggerKey> {
        let mut keys: Vec<TriggerKey> = self
            .triggers
            .keys()
            .filter(|k| matcher.matches(k))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn has_triggers(&self, job_key: &JobKey) -> bool {
        self.triggers.values().any(|r| &r.trigger.job_key == job_key)
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    pub fn pause_trigger(&mut self, key: &TriggerKey) {
        if let Some(record) = self.triggers.get_mut(key) {
            record.state = record.state.paused();
        }
    }

    /// Pause every matching trigger. `GroupEquals` also pauses triggers
    /// added to that group later.
    pub fn pause_triggers(&mut self, matcher: &KeyMatcher<TriggerKey>) {
        if let Some(group) = matcher.exact_group() {
            self.paused_trigger_groups.insert(group.to_string());
        }
        for record in self.triggers.values_mut() {
            if matcher.matches(&record.trigger.key) {
                record.state = record.state.paused();
            }
        }
    }

    pub fn resume_trigger(&mut self, key: &TriggerKey) {
        if let Some(record) = self.triggers.get_mut(key) {
            record.state = record.state.resumed();
        }
    }

    pub fn resume_triggers(&mut self, matcher: &KeyMatcher<TriggerKey>) {
        if !matches!(matcher, KeyMatcher::Exact(_)) {
            self.paused_trigger_groups.retain(|g| !matcher.matches_group(g));
        }
        for record in self.triggers.values_mut() {
            if matcher.matches(&record.trigger.key) {
                record.state = record.state.resumed();
            }
        }
    }

    pub fn pause_job(&mut self, key: &JobKey) {
        for record in self.triggers.values_mut() {
            if &record.trigger.job_key == key {
                record.state = record.state.paused();
            }
        }
    }

    /// Pause the triggers of every matching job. `GroupEquals` also pauses
    /// triggers of jobs added to that group later.
    pub fn pause_jobs(&mut self, matcher: &KeyMatcher<JobKey>) {
        if let Some(group) = matcher.exact_group() {
            self.paused_job_groups.insert(group.to_string());
        }
        for record in self.triggers.values_mut() {
            if matcher.matches(&record.trigger.job_key) {
                record.state = record.state.paused();
            }
        }
    }

    pub fn resume_job(&mut self, key: &JobKey) {
        for record in self.triggers.values_mut() {
            if &record.trigger.job_key == key {
                record.state = record.state.resumed();
            }
        }
    }

    pub fn resume_jobs(&mut self, matcher: &KeyMatcher<JobKey>) {
        if !matches!(matcher, KeyMatcher::Exact(_)) {
            self.paused_job_groups.retain(|g| !matcher.matches_group(g));
        }
        for record in self.triggers.values_mut() {
            if matcher.matches(&record.trigger.job_key) {
                record.state = record.state.resumed();
            }
        }
    }

    /// Pause every trigger group, including groups that do not exist yet.
    pub fn pause_all(&mut self) {
        self.paused_all = true;
        let groups: Vec<String> = self.trigger_group_names();
        self.paused_trigger_groups.extend(groups);
        for record in self.triggers.values_mut() {
            if !record.transient {
                record.state = record.state.paused();
            }
        }
    }

    pub fn resume_all(&mut self) {
        self.paused_all = false;
        self.paused_trigger_groups.clear();
        self.paused_job_groups.clear();
        for record in self.triggers.values_mut() {
            record.state = record.state.resumed();
        }
    }

    pub fn paused_trigger_groups(&self) -> Vec<String> {
        sorted_groups(self.paused_trigger_groups.iter().map(String::as_str))
    }

    // -----------------------------------------------------------------------
    // Calendars
    // -----------------------------------------------------------------------

    /// Add or replace a calendar. With `update_triggers`, triggers that
    /// reference it have their next fire time moved past newly excluded
    /// instants; a trigger left with no allowed instant completes.
    pub fn store_calendar(
        &mut self,
        name: &str,
        calendar: Calendar,
        replace: bool,
        update_triggers: bool,
    ) -> Result<()> {
        calendar.validate()?;
        if !replace && self.calendars.contains_key(name) {
            return Err(EngineError::ObjectAlreadyExists {
                kind: "Calendar",
                key: name.to_string(),
            });
        }
        if update_triggers {
            for record in self.triggers.values_mut() {
                if record.trigger.calendar_name.as_deref() != Some(name)
                    || record.state == StoredState::Complete
                {
                    continue;
                }
                let trigger = &record.trigger;
                let next = first_included(Some(&calendar), trigger.next_fire_time, |t| {
                    next_candidate(trigger, t)
                });
                record.trigger.next_fire_time = next;
                if next.is_none() {
                    record.state = StoredState::Complete;
                }
            }
        }
        self.calendars.insert(name.to_string(), calendar);
        Ok(())
    }

    /// Remove a calendar that no trigger references.
    pub fn remove_calendar(&mut self, name: &str) -> Result<bool> {
        if let Some(record) = self
            .triggers
            .values()
            .find(|r| r.trigger.calendar_name.as_deref() == Some(name))
        {
            return Err(EngineError::CalendarInUse {
                name: name.to_string(),
                trigger: record.trigger.key.to_string(),
            });
        }
        Ok(self.calendars.remove(name).is_some())
    }

    pub fn calendar(&self, name: &str) -> Option<Calendar> {
        self.calendars.get(name).cloned()
    }

    pub fn calendar_names(&self) -> Vec<String> {
        sorted_groups(self.calendars.keys().map(String::as_str))
    }

    // -----------------------------------------------------------------------
    // Firing
    // -----------------------------------------------------------------------

    /// Claim up to `limit` due triggers, earliest first and higher priority
    /// first on ties, advancing each to its next fire time.
    pub fn acquire_due(&mut self, now: DateTime<Utc>, limit: usize) -> Vec<FiredTrigger> {
        let mut due: Vec<(DateTime<Utc>, Reverse<i32>, TriggerKey)> = self
            .triggers
            .values()
            .filter(|r| r.state == StoredState::Waiting)
            .filter_map(|r| {
                r.trigger
                    .next_fire_time
                    .filter(|t| *t <= now)
                    .map(|t| (t, Reverse(r.trigger.priority), r.trigger.key.clone()))
            })
            .collect();
        due.sort();

        let mut fired = Vec::new();
        for (scheduled, _, key) in due {
            if fired.len() >= limit {
                break;
            }
            let Some(record) = self.triggers.get_mut(&key) else {
                continue;
            };
            // An earlier firing in this batch may have blocked the job.
            if record.state != StoredState::Waiting {
                continue;
            }
            let Some(job) = self.jobs.get(&record.trigger.job_key).cloned() else {
                record.state = StoredState::Error;
                continue;
            };

            let calendar = record
                .trigger
                .calendar_name
                .as_ref()
                .and_then(|name| self.calendars.get(name));
            record.trigger.times_fired += 1;
            record.trigger.previous_fire_time = Some(scheduled);
            let next = next_fire_time(&record.trigger, calendar, scheduled.max(now));
            record.trigger.next_fire_time = next;
            if next.is_none() {
                record.state = StoredState::Complete;
            }

            let mut merged_data = job.data.clone();
            merged_data.extend(record.trigger.data.clone());
            let trigger = record.trigger.clone();
            let transient = record.transient;

            if transient {
                self.remove_trigger(&key);
            }
            if job.concurrent_execution_disallowed {
                self.block_job(&job.key);
            }
            fired.push(FiredTrigger {
                trigger,
                job,
                scheduled_fire_time: scheduled,
                merged_data,
            });
        }
        fired
    }

    /// An execution of `job` ended; unblock its triggers if it was exclusive.
    pub fn job_finished(&mut self, job: &JobDetail) {
        if !job.concurrent_execution_disallowed || !self.blocked_jobs.remove(&job.key) {
            return;
        }
        for record in self.triggers.values_mut() {
            if record.trigger.job_key == job.key {
                record.state = match record.state {
                    StoredState::Blocked => StoredState::Waiting,
                    StoredState::PausedBlocked => StoredState::Paused,
                    other => other,
                };
            }
        }
    }

    /// The trigger's job could not be run.
    pub fn mark_trigger_error(&mut self, key: &TriggerKey) {
        if let Some(record) = self.triggers.get_mut(key) {
            record.state = StoredState::Error;
        }
    }

    fn block_job(&mut self, key: &JobKey) {
        self.blocked_jobs.insert(key.clone());
        for record in self.triggers.values_mut() {
            if &record.trigger.job_key == key {
                record.state = match record.state {
                    StoredState::Waiting => StoredState::Blocked,
                    StoredState::Paused => StoredState::PausedBlocked,
                    other => other,
                };
            }
        }
    }

    /// Drop all jobs, triggers and calendars. A pending `pause_all` stays in
    /// force.
    pub fn clear(&mut self) {
        self.jobs.clear();
        self.triggers.clear();
        self.calendars.clear();
        self.paused_trigger_groups.clear();
        self.paused_job_groups.clear();
        self.blocked_jobs.clear();
    }
}

fn already_exists(kind: &'static str, key: &impl GroupedKey) -> EngineError {
    EngineError::ObjectAlreadyExists {
        kind,
        key: key.to_string(),
    }
}

fn sorted_groups<'a>(groups: impl Iterator<Item = &'a str>) -> Vec<String> {
    groups
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(String::from)
        .collect()
}

/// First fire time of a freshly stored trigger.
///
/// A `Once` in the past fires immediately; an interval without `start_at`
/// first fires one period from now.
fn first_fire_time(
    trigger: &Trigger,
    calendar: Option<&Calendar>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if trigger.max_fires == Some(0) {
        return None;
    }
    let first = match &trigger.schedule {
        Schedule::Once { at } => Some(trigger.start_at.map_or(*at, |s| s.max(*at))),
        Schedule::Interval { .. } => match trigger.start_at {
            Some(start) => Some(start),
            None => compute_next_run(&trigger.schedule, now),
        },
        schedule => compute_next_run(schedule, trigger.start_at.unwrap_or(now)),
    };
    let first = first_included(calendar, first, |t| next_candidate(trigger, t));
    first.filter(|t| trigger.end_at.map_or(true, |end| *t <= end))
}

/// Next fire time after a firing, honouring `max_fires`, calendar and `end_at`.
fn next_fire_time(
    trigger: &Trigger,
    calendar: Option<&Calendar>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if trigger.max_fires.is_some_and(|max| trigger.times_fired >= max) {
        return None;
    }
    let next = compute_next_run(&trigger.schedule, after);
    let next = first_included(calendar, next, |t| next_candidate(trigger, t));
    next.filter(|t| trigger.end_at.map_or(true, |end| *t <= end))
}

fn next_candidate(trigger: &Trigger, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    compute_next_run(&trigger.schedule, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
    }

    fn job(name: &str, group: &str) -> JobDetail {
        JobDetail::new(JobKey::new(name, group), "noop")
    }

    fn once(name: &str, job: &JobDetail, in_secs: i64) -> Trigger {
        Trigger::new(
            TriggerKey::new(name, job.key.group.clone()),
            job.key.clone(),
            Schedule::once(now() + Duration::seconds(in_secs)),
        )
    }

    #[test]
    fn trigger_for_missing_job_is_rejected_and_not_stored() {
        let mut store = JobStore::new();
        let ghost = job("ghost", "g");
        let t = once("t1", &ghost, 60);
        let err = store.store_trigger(t, false, now()).unwrap_err();
        assert!(matches!(err, EngineError::JobNotFound { .. }));
        assert!(!store.contains_trigger(&TriggerKey::new("t1", "g")));
    }

    #[test]
    fn oversized_interval_is_rejected_and_not_stored() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        for every in [u64::MAX, 10_000_000_000_000] {
            let t = Trigger::new(TriggerKey::new("t", "g"), j.key.clone(), Schedule::every_secs(every));
            let err = store
                .store_job_with_triggers(j.clone(), vec![t], false, now())
                .unwrap_err();
            assert!(matches!(err, EngineError::InvalidSchedule(_)));
        }
        assert!(!store.contains_job(&j.key));
        assert!(!store.contains_trigger(&TriggerKey::new("t", "g")));
    }

    #[test]
    fn non_durable_job_needs_a_trigger() {
        let mut store = JobStore::new();
        let err = store.store_job(job("j", "g"), false, false).unwrap_err();
        assert!(matches!(err, EngineError::NonDurableWithoutTrigger { .. }));
        store.store_job(job("j", "g"), false, true).unwrap();
        store.store_job(job("d", "g").durable(true), false, false).unwrap();
        assert!(store.contains_job(&JobKey::new("d", "g")));
    }

    #[test]
    fn duplicate_job_without_replace_fails() {
        let mut store = JobStore::new();
        store.store_job(job("d", "g").durable(true), false, false).unwrap();
        let err = store.store_job(job("d", "g").durable(true), false, false).unwrap_err();
        assert!(matches!(err, EngineError::ObjectAlreadyExists { kind: "Job", .. }));
        store.store_job(job("d", "g").durable(true), true, false).unwrap();
    }

    #[test]
    fn removing_last_trigger_deletes_non_durable_job() {
        let mut store = JobStore::new();
        let j = job("j1", "g1");
        let (a, b) = (once("a", &j, 60), once("b", &j, 120));
        store
            .store_job_with_triggers(j.clone(), vec![a.clone(), b.clone()], false, now())
            .unwrap();

        assert!(store.remove_trigger(&a.key));
        assert!(!store.contains_trigger(&a.key));
        assert!(store.contains_job(&j.key));

        assert!(store.remove_trigger(&b.key));
        assert!(!store.contains_job(&j.key));
        assert!(!store.remove_trigger(&b.key));
    }

    #[test]
    fn durable_job_outlives_its_triggers() {
        let mut store = JobStore::new();
        let j = job("keep", "g").durable(true);
        let t = once("t", &j, 60);
        store.store_job_with_triggers(j.clone(), vec![t.clone()], false, now()).unwrap();
        store.remove_trigger(&t.key);
        assert!(store.contains_job(&j.key));
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut store = JobStore::new();
        let good = job("good", "g");
        let bad = job("bad", "g");
        let mut bad_trigger = once("bt", &bad, 60);
        bad_trigger.calendar_name = Some("missing".to_string());

        let err = store
            .store_jobs_and_triggers(
                vec![
                    (good.clone(), vec![once("gt", &good, 60)]),
                    (bad, vec![bad_trigger]),
                ],
                false,
                now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::CalendarNotFound { .. }));
        assert!(!store.contains_job(&good.key));
        assert!(store.trigger_keys(&KeyMatcher::Any).is_empty());
    }

    #[test]
    fn batch_rejects_duplicate_trigger_keys() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let err = store
            .store_job_with_triggers(j.clone(), vec![once("t", &j, 60), once("t", &j, 90)], false, now())
            .unwrap_err();
        assert!(matches!(err, EngineError::ObjectAlreadyExists { kind: "Trigger", .. }));
    }

    #[test]
    fn trigger_must_reference_its_paired_job() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let other = job("other", "g");
        let err = store
            .store_job_with_triggers(j, vec![once("t", &other, 60)], false, now())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTrigger { .. }));
    }

    #[test]
    fn past_once_fires_immediately_and_completes() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let t = once("t", &j, -30);
        let first = store.store_job_with_triggers(j, vec![t.clone()], false, now()).unwrap();
        assert_eq!(first[0], now() - Duration::seconds(30));

        let fired = store.acquire_due(now(), 10);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger.times_fired, 1);
        assert_eq!(store.trigger_state(&t.key), TriggerState::Complete);
        assert!(store.acquire_due(now() + Duration::hours(1), 10).is_empty());
    }

    #[test]
    fn interval_reschedules_and_respects_max_fires() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let t = Trigger::new(TriggerKey::new("t", "g"), j.key.clone(), Schedule::every_secs(10))
            .starting_at(now())
            .with_max_fires(2);
        store.store_job_with_triggers(j, vec![t.clone()], false, now()).unwrap();

        assert_eq!(store.acquire_due(now(), 10).len(), 1);
        assert_eq!(
            store.trigger(&t.key).unwrap().next_fire_time,
            Some(now() + Duration::seconds(10))
        );
        let later = now() + Duration::seconds(10);
        assert_eq!(store.acquire_due(later, 10).len(), 1);
        assert_eq!(store.trigger_state(&t.key), TriggerState::Complete);
    }

    #[test]
    fn due_triggers_ordered_by_time_then_priority() {
        let mut store = JobStore::new();
        let j = job("j", "g").durable(true);
        store.store_job(j.clone(), false, false).unwrap();
        store.store_trigger(once("low", &j, -5).with_priority(1), false, now()).unwrap();
        store.store_trigger(once("high", &j, -5).with_priority(9), false, now()).unwrap();
        store.store_trigger(once("early", &j, -10), false, now()).unwrap();

        let names: Vec<String> = store
            .acquire_due(now(), 2)
            .into_iter()
            .map(|f| f.trigger.key.name)
            .collect();
        assert_eq!(names, vec!["early", "high"]);
    }

    #[test]
    fn pause_all_pauses_new_triggers_until_resume_all() {
        let mut store = JobStore::new();
        let j = job("j", "g").durable(true);
        store.store_job(j.clone(), false, false).unwrap();
        store.pause_all();

        let t = once("fresh", &j, 60);
        store.store_trigger(t.clone(), false, now()).unwrap();
        assert_eq!(store.trigger_state(&t.key), TriggerState::Paused);

        store.resume_all();
        assert_eq!(store.trigger_state(&t.key), TriggerState::Normal);
        assert!(store.paused_trigger_groups().is_empty());
    }

    #[test]
    fn paused_triggers_do_not_fire() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let t = once("t", &j, -1);
        store.store_job_with_triggers(j, vec![t.clone()], false, now()).unwrap();
        store.pause_trigger(&t.key);
        assert!(store.acquire_due(now(), 10).is_empty());
        store.resume_trigger(&t.key);
        assert_eq!(store.acquire_due(now(), 10).len(), 1);
    }

    #[test]
    fn group_pause_applies_to_later_triggers() {
        let mut store = JobStore::new();
        let j = job("j", "etl").durable(true);
        store.store_job(j.clone(), false, false).unwrap();
        store.pause_triggers(&KeyMatcher::group_equals("etl"));
        assert_eq!(store.paused_trigger_groups(), vec!["etl".to_string()]);

        let t = once("later", &j, 60);
        store.store_trigger(t.clone(), false, now()).unwrap();
        assert_eq!(store.trigger_state(&t.key), TriggerState::Paused);

        store.resume_triggers(&KeyMatcher::group_starts_with("et"));
        assert_eq!(store.trigger_state(&t.key), TriggerState::Normal);
        assert!(store.paused_trigger_groups().is_empty());
    }

    #[test]
    fn job_group_pause_covers_all_triggers_of_matching_jobs() {
        let mut store = JobStore::new();
        let a = job("a", "reports");
        let b = job("b", "billing");
        let ta = once("ta", &a, 60);
        let tb = once("tb", &b, 60);
        store.store_job_with_triggers(a, vec![ta.clone()], false, now()).unwrap();
        store.store_job_with_triggers(b, vec![tb.clone()], false, now()).unwrap();

        store.pause_jobs(&KeyMatcher::group_equals("reports"));
        assert_eq!(store.trigger_state(&ta.key), TriggerState::Paused);
        assert_eq!(store.trigger_state(&tb.key), TriggerState::Normal);

        store.resume_jobs(&KeyMatcher::group_equals("reports"));
        assert_eq!(store.trigger_state(&ta.key), TriggerState::Normal);
    }

    #[test]
    fn reschedule_keeps_key_and_pause() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let t = once("t", &j, 60);
        store.store_job_with_triggers(j.clone(), vec![t.clone()], false, now()).unwrap();
        store.pause_trigger(&t.key);

        let replacement = Trigger::new(TriggerKey::new("other-name", "g"), j.key.clone(), Schedule::every_secs(30));
        let first = store.replace_trigger(&t.key, replacement, now()).unwrap();
        assert_eq!(first, Some(now() + Duration::seconds(30)));
        assert!(!store.contains_trigger(&TriggerKey::new("other-name", "g")));
        assert_eq!(store.trigger(&t.key).unwrap().schedule, Schedule::every_secs(30));
        assert_eq!(store.trigger_state(&t.key), TriggerState::Paused);

        let missing = store
            .replace_trigger(&TriggerKey::new("nope", "g"), once("x", &j, 5), now())
            .unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn calendar_in_use_cannot_be_deleted() {
        let mut store = JobStore::new();
        let cal = Calendar::Weekly { excluded_days: [6].into() };
        store.store_calendar("no-sundays", cal.clone(), false, false).unwrap();
        let err = store.store_calendar("no-sundays", cal, false, false).unwrap_err();
        assert!(matches!(err, EngineError::ObjectAlreadyExists { kind: "Calendar", .. }));

        let j = job("j", "g");
        let t = once("t", &j, 60).with_calendar("no-sundays");
        store.store_job_with_triggers(j, vec![t.clone()], false, now()).unwrap();
        assert!(matches!(
            store.remove_calendar("no-sundays"),
            Err(EngineError::CalendarInUse { .. })
        ));

        store.remove_trigger(&t.key);
        assert!(store.remove_calendar("no-sundays").unwrap());
        assert!(!store.remove_calendar("no-sundays").unwrap());
    }

    #[test]
    fn replacing_calendar_can_move_next_fire_time() {
        let mut store = JobStore::new();
        store
            .store_calendar("open", Calendar::Holiday { dates: BTreeSet::new() }, false, false)
            .unwrap();
        let j = job("j", "g");
        let t = Trigger::new(TriggerKey::new("t", "g"), j.key.clone(), Schedule::Daily { hour: 12, minute: 0 })
            .with_calendar("open");
        store.store_job_with_triggers(j, vec![t.clone()], false, now()).unwrap();
        let today_noon = now().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc();
        assert_eq!(store.trigger(&t.key).unwrap().next_fire_time, Some(today_noon));

        let closed_today = Calendar::Holiday { dates: [now().date_naive()].into() };
        store.store_calendar("open", closed_today, true, true).unwrap();
        assert_eq!(
            store.trigger(&t.key).unwrap().next_fire_time,
            Some(today_noon + Duration::days(1))
        );
    }

    #[test]
    fn non_concurrent_job_blocks_other_triggers_until_finished() {
        let mut store = JobStore::new();
        let j = job("solo", "g").disallow_concurrent_execution();
        let (a, b) = (once("a", &j, -2), once("b", &j, -1));
        store.store_job_with_triggers(j.clone(), vec![a.clone(), b.clone()], false, now()).unwrap();

        let fired = store.acquire_due(now(), 10);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].trigger.key, a.key);
        assert_eq!(store.trigger_state(&b.key), TriggerState::Blocked);

        store.job_finished(&j);
        assert_eq!(store.trigger_state(&b.key), TriggerState::Normal);
        assert_eq!(store.acquire_due(now(), 10).len(), 1);
    }

    #[test]
    fn transient_trigger_carries_data_and_disappears() {
        let mut store = JobStore::new();
        let j = job("j", "g").durable(true).with_data("who", "job").with_data("keep", 1);
        store.store_job(j.clone(), false, false).unwrap();
        store.pause_all();

        let manual = Trigger::new(
            TriggerKey::new("m1", MANUAL_TRIGGER_GROUP),
            j.key.clone(),
            Schedule::once(now()),
        )
        .with_data("who", "manual");
        store.store_transient_trigger(manual.clone(), now()).unwrap();

        let fired = store.acquire_due(now(), 10);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].merged_data["who"], "manual");
        assert_eq!(fired[0].merged_data["keep"], 1);
        assert!(!store.contains_trigger(&manual.key));
        assert!(store.job(&j.key).unwrap().data.get("who").is_some_and(|v| v == "job"));
    }

    #[test]
    fn never_firing_trigger_is_invalid() {
        let mut store = JobStore::new();
        let j = job("j", "g");
        let t = once("t", &j, 60).ending_at(now());
        let err = store.store_job_with_triggers(j, vec![t], false, now()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTrigger { .. }));
    }

    #[test]
    fn clear_keeps_global_pause() {
        let mut store = JobStore::new();
        let j = job("j", "g").durable(true);
        store.store_job(j.clone(), false, false).unwrap();
        store.pause_all();
        store.clear();
        assert!(store.job_keys(&KeyMatcher::Any).is_empty());

        store.store_job(j.clone(), false, false).unwrap();
        let t = once("t", &j, 60);
        store.store_trigger(t.clone(), false, now()).unwrap();
        assert_eq!(store.trigger_state(&t.key), TriggerState::Paused);
    }

    #[test]
    fn group_queries_are_sorted_and_deduplicated() {
        let mut store = JobStore::new();
        for (name, group) in [("a", "zeta"), ("b", "alpha"), ("c", "alpha")] {
            store.store_job(job(name, group).durable(true), false, false).unwrap();
        }
        assert_eq!(store.job_group_names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(
            store.job_keys(&KeyMatcher::group_equals("alpha")),
            vec![JobKey::new("b", "alpha"), JobKey::new("c", "alpha")]
        );
    }
}
