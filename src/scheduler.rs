//! Session scheduling: turn the task pool into a time-boxed queue and walk it.
//!
//! Queue building:
//! - candidates are pending tasks matching the session's zone/level filter
//! - unblocked before blocked, then by priority, then shortest first
//! - greedy admission while the running total stays within the budget
//!
//! Nothing here touches storage. The pool comes in as a snapshot and every
//! write leaves as a [`TaskUpdate`] for the caller to apply.

use std::collections::{HashMap, HashSet};
use std::fmt;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Priority, Status, Task, TaskPatch, TaskUpdate, Zone};

/// Budget value the old dashboard used for "no limit".
pub const LEGACY_UNLIMITED: u32 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBudget {
    Minutes(u32),
    Unlimited,
}

impl TimeBudget {
    pub fn minutes(m: u32) -> Self {
        if m >= LEGACY_UNLIMITED {
            Self::Unlimited
        } else {
            Self::Minutes(m)
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.eq_ignore_ascii_case("unlimited") {
            return Ok(Self::Unlimited);
        }
        let digits = s.strip_suffix('m').unwrap_or(s);
        match digits.parse::<u32>() {
            Ok(0) => bail!("time budget must be positive"),
            Ok(m) => Ok(Self::minutes(m)),
            Err(_) => bail!("invalid time budget '{s}': expected minutes or 'all'"),
        }
    }

    pub fn is_finite(self) -> bool {
        matches!(self, Self::Minutes(_))
    }

    /// Whether a queue totalling `total` minutes fits.
    pub fn admits(self, total: i64) -> bool {
        match self {
            Self::Minutes(m) => total <= i64::from(m),
            Self::Unlimited => true,
        }
    }
}

impl fmt::Display for TimeBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minutes(m) => write!(f, "{m}m"),
            Self::Unlimited => f.write_str("all"),
        }
    }
}

/// Which part of the house a session covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFilter {
    pub zone: Option<String>,
    pub level: Option<String>,
}

impl SessionFilter {
    /// A level filter only matches tasks whose zone is listed with that level.
    pub fn matches(&self, task: &Task, zones: &[Zone]) -> bool {
        if let Some(zone) = &self.zone {
            if task.zone != *zone {
                return false;
            }
        }
        match &self.level {
            None => true,
            Some(level) => zones
                .iter()
                .any(|z| z.name == task.zone && z.level.as_deref() == Some(level.as_str())),
        }
    }
}

/// The slice of a task a running session needs to remember.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub zone: String,
    pub label: String,
    pub duration: i64,
    pub priority: Priority,
}

impl From<&Task> for QueueEntry {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            zone: task.zone.clone(),
            label: task.label.clone(),
            duration: task.duration,
            priority: task.priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    Ready(Vec<QueueEntry>),
    /// Nothing pending for this filter.
    AllClear,
    /// Pending work exists but nothing could be admitted under the budget.
    NothingFits,
}

type PoolIndex<'a> = HashMap<&'a str, &'a Task>;

fn index_pool(pool: &[Task]) -> PoolIndex<'_> {
    let mut index = HashMap::with_capacity(pool.len());
    for task in pool {
        index.entry(task.id.as_str()).or_insert(task);
    }
    index
}

/// A dependency only blocks while it resolves to a task that isn't completed.
/// Dangling references are ignored.
fn blocked_in(index: &PoolIndex<'_>, task: &Task) -> bool {
    task.dependency
        .as_deref()
        .and_then(|dep| index.get(dep))
        .is_some_and(|dep| dep.status != Status::Completed)
}

pub fn is_blocked(task: &Task, pool: &[Task]) -> bool {
    blocked_in(&index_pool(pool), task)
}

pub fn build_queue(
    pool: &[Task],
    zones: &[Zone],
    filter: &SessionFilter,
    budget: TimeBudget,
) -> BuildOutcome {
    let index = index_pool(pool);

    let mut candidates: Vec<(bool, &Task)> = pool
        .iter()
        .filter(|t| t.is_pending() && filter.matches(t, zones))
        .map(|t| (blocked_in(&index, t), t))
        .collect();
    if candidates.is_empty() {
        return BuildOutcome::AllClear;
    }

    candidates.sort_by(|(a_blocked, a), (b_blocked, b)| {
        a_blocked
            .cmp(b_blocked)
            .then(a.priority.cmp(&b.priority))
            .then(a.duration.cmp(&b.duration))
    });

    let mut total: i64 = 0;
    let mut queue = Vec::new();
    for (_, task) in candidates {
        if blocked_in(&index, task) {
            continue;
        }
        let next = total.saturating_add(task.duration);
        if !budget.admits(next) {
            continue;
        }
        total = next;
        queue.push(QueueEntry::from(task));
    }

    if !queue.is_empty() {
        BuildOutcome::Ready(queue)
    } else if budget.is_finite() {
        BuildOutcome::NothingFits
    } else {
        BuildOutcome::AllClear
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    Swapped {
        replaced: QueueEntry,
        with: QueueEntry,
    },
    NoAlternative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub planned_minutes: i64,
    pub completed_minutes: i64,
    pub completed: usize,
    pub skipped: usize,
    pub remaining: usize,
    pub percent: u32,
}

/// One pass through a built queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub budget: TimeBudget,
    pub filter: SessionFilter,
    pub queue: Vec<QueueEntry>,
    pub cursor: usize,
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        queue: Vec<QueueEntry>,
        filter: SessionFilter,
        budget: TimeBudget,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            budget,
            filter,
            queue,
            cursor: 0,
            completed: Vec::new(),
            skipped: Vec::new(),
            started_at,
        }
    }

    pub fn current(&self) -> Option<&QueueEntry> {
        self.queue.get(self.cursor)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.queue.len()
    }

    pub fn upcoming(&self) -> &[QueueEntry] {
        &self.queue[self.cursor.min(self.queue.len())..]
    }

    pub fn total_minutes(&self) -> i64 {
        self.queue
            .iter()
            .fold(0i64, |acc, e| acc.saturating_add(e.duration))
    }

    /// Mark the current task done and move on. The returned update is the
    /// caller's to persist; the queue itself is not rebuilt.
    pub fn complete_current(
        &mut self,
        now: DateTime<Utc>,
        by: Option<&str>,
    ) -> Option<TaskUpdate> {
        let id = self.current()?.id.clone();
        self.cursor += 1;
        self.completed.push(id.clone());
        Some(TaskUpdate {
            id,
            patch: TaskPatch::completed(now, by.map(str::to_string)),
        })
    }

    /// Move past the current task without touching its status.
    pub fn skip_current(&mut self) -> Option<String> {
        let id = self.current()?.id.clone();
        self.cursor += 1;
        self.skipped.push(id.clone());
        Some(id)
    }

    /// Replace the current entry with the eligible task closest in duration.
    ///
    /// Eligible means pending, unblocked, not already queued, inside the
    /// session filter, and small enough that the queue stays within budget.
    /// Ties go to the earlier task in the pool.
    pub fn swap_current(&mut self, pool: &[Task], zones: &[Zone]) -> SwapOutcome {
        let Some(current) = self.current() else {
            return SwapOutcome::NoAlternative;
        };
        let index = index_pool(pool);
        let queued: HashSet<&str> = self.queue.iter().map(|e| e.id.as_str()).collect();
        let target = current.duration;
        let rest = self.total_minutes().saturating_sub(target);

        let best = pool
            .iter()
            .filter(|t| t.is_pending())
            .filter(|t| !queued.contains(t.id.as_str()))
            .filter(|t| !blocked_in(&index, t))
            .filter(|t| self.filter.matches(t, zones))
            .filter(|t| self.budget.admits(rest.saturating_add(t.duration)))
            .min_by_key(|t| t.duration.abs_diff(target));

        match best {
            Some(task) => {
                let with = QueueEntry::from(task);
                let replaced = std::mem::replace(&mut self.queue[self.cursor], with.clone());
                SwapOutcome::Swapped { replaced, with }
            }
            None => SwapOutcome::NoAlternative,
        }
    }

    /// Tasks waiting on the current one, i.e. what completing it unlocks.
    pub fn unlocked_next<'a>(&self, pool: &'a [Task]) -> Vec<&'a Task> {
        let Some(current) = self.current() else {
            return Vec::new();
        };
        pool.iter()
            .filter(|t| t.is_pending() && t.dependency.as_deref() == Some(current.id.as_str()))
            .collect()
    }

    /// End the session early. With `skip_rest` the untouched entries are
    /// recorded as skipped; statuses are never changed either way.
    pub fn finish(&mut self, skip_rest: bool) -> Vec<String> {
        let rest: Vec<String> = self.upcoming().iter().map(|e| e.id.clone()).collect();
        self.cursor = self.queue.len();
        if skip_rest {
            self.skipped.extend(rest.iter().cloned());
            rest
        } else {
            Vec::new()
        }
    }

    /// Drop upcoming entries whose task has disappeared from the pool or is no
    /// longer pending. Used when resuming a stored session.
    pub fn reconcile(&mut self, pool: &[Task]) -> usize {
        let index = index_pool(pool);
        let before = self.queue.len();
        let cursor = self.cursor;
        let mut position = 0;
        self.queue.retain(|entry| {
            let keep = position < cursor
                || index.get(entry.id.as_str()).is_some_and(|t| t.is_pending());
            position += 1;
            keep
        });
        before - self.queue.len()
    }

    pub fn summary(&self) -> Summary {
        let done: HashSet<&str> = self.completed.iter().map(String::as_str).collect();
        let completed_minutes = self
            .queue
            .iter()
            .filter(|e| done.contains(e.id.as_str()))
            .fold(0i64, |acc, e| acc.saturating_add(e.duration));
        let percent = if self.queue.is_empty() {
            100
        } else {
            (self.completed.len() * 100 / self.queue.len()) as u32
        };
        Summary {
            planned_minutes: self.total_minutes(),
            completed_minutes,
            completed: self.completed.len(),
            skipped: self.skipped.len(),
            remaining: self.upcoming().len(),
            percent,
        }
    }
}
