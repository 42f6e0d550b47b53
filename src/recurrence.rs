//! Due-ness of recurring tasks.
//!
//! A completed task with a recurrence of `N` days comes back at the first
//! daily checkpoint (07:00 local unless configured otherwise) at or after
//! `completed_at + N` calendar days. Everything here is a pure function of
//! the task, the evaluation time and the checkpoint hour.

use chrono::{DateTime, Days, NaiveTime, TimeZone};

use crate::model::{Status, Task, TaskPatch, TaskUpdate};

pub const DEFAULT_RESET_HOUR: u32 = 7;

/// When a task completed at `completed_at` with the given recurrence becomes
/// due again, expressed in `completed_at`'s time zone. `None` for one-shot
/// tasks and for dates chrono cannot represent.
pub fn reactivation_at<Tz: TimeZone>(
    completed_at: &DateTime<Tz>,
    recurrence_days: u32,
    reset_hour: u32,
) -> Option<DateTime<Tz>> {
    if recurrence_days == 0 {
        return None;
    }
    let deadline = completed_at
        .clone()
        .checked_add_days(Days::new(u64::from(recurrence_days)))?;
    let local = deadline.naive_local();
    let checkpoint = NaiveTime::from_hms_opt(reset_hour.min(23), 0, 0)?;

    let mut boundary = local.date().and_time(checkpoint);
    if boundary < local {
        boundary = boundary.checked_add_days(Days::new(1))?;
    }

    // A checkpoint that falls in a DST gap has no local instant; the
    // naive deadline stands in for it.
    Some(
        deadline
            .timezone()
            .from_local_datetime(&boundary)
            .earliest()
            .unwrap_or(deadline),
    )
}

/// Whether a task belongs in the due pool at `now`.
///
/// Pending tasks are always due. A completed task is due once its
/// reactivation boundary has passed; a recurring task with no recorded
/// completion time counts as never completed.
pub fn is_due<Tz: TimeZone>(task: &Task, now: &DateTime<Tz>, reset_hour: u32) -> bool {
    match task.status {
        Status::Pending => true,
        Status::Blocked => false,
        Status::Completed => {
            if task.recurrence == 0 {
                return false;
            }
            match next_due(task, &now.timezone(), reset_hour) {
                Some(boundary) => *now >= boundary,
                None => task.completed_at.is_none(),
            }
        }
    }
}

/// Reactivation boundary of a completed recurring task in the caller's zone.
pub fn next_due<Tz: TimeZone>(task: &Task, tz: &Tz, reset_hour: u32) -> Option<DateTime<Tz>> {
    if task.status != Status::Completed {
        return None;
    }
    let completed = task.completed_at?.with_timezone(tz);
    reactivation_at(&completed, task.recurrence, reset_hour)
}

/// Updates that return every due completed task in `pool` to pending.
pub fn reactivations<Tz: TimeZone>(
    pool: &[Task],
    now: &DateTime<Tz>,
    reset_hour: u32,
) -> Vec<TaskUpdate> {
    pool.iter()
        .filter(|t| t.is_completed() && is_due(t, now, reset_hour))
        .map(|t| TaskUpdate {
            id: t.id.clone(),
            patch: TaskPatch::reactivated(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;
    use chrono::{FixedOffset, Utc};

    fn at(d: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, h, m, 0).unwrap()
    }

    fn completed(recurrence: u32, when: Option<DateTime<Utc>>) -> Task {
        Task {
            id: "t".into(),
            zone: "Bathroom".into(),
            label: "Clean toilet".into(),
            duration: 10,
            priority: Priority::High,
            status: Status::Completed,
            dependency: None,
            recurrence,
            completed_at: when,
            completed_by: None,
            image_path: None,
        }
    }

    #[test]
    fn weekly_task_waits_for_checkpoint() {
        let t = completed(7, Some(at(1, 0, 0)));
        assert!(!is_due(&t, &at(7, 23, 59), 7));
        assert!(!is_due(&t, &at(8, 6, 59), 7));
        assert!(is_due(&t, &at(8, 7, 0), 7));
        assert!(is_due(&t, &at(9, 12, 0), 7));
    }

    #[test]
    fn afternoon_completion_rolls_to_next_morning() {
        // completed 15:00 on the 1st, +1 day = 15:00 on the 2nd; the next
        // 07:00 at or after that is the 3rd.
        let t = completed(1, Some(at(1, 15, 0)));
        assert_eq!(reactivation_at(&at(1, 15, 0), 1, 7), Some(at(3, 7, 0)));
        assert!(!is_due(&t, &at(2, 23, 0), 7));
        assert!(is_due(&t, &at(3, 7, 0), 7));
    }

    #[test]
    fn completion_exactly_at_checkpoint() {
        assert_eq!(reactivation_at(&at(1, 7, 0), 2, 7), Some(at(3, 7, 0)));
    }

    #[test]
    fn one_shot_never_reactivates() {
        let t = completed(0, Some(at(1, 0, 0)));
        assert!(!is_due(&t, &at(30, 12, 0), 7));
        assert!(reactivation_at(&at(1, 0, 0), 0, 7).is_none());
    }

    #[test]
    fn recurring_without_timestamp_is_due() {
        let t = completed(3, None);
        assert!(is_due(&t, &at(1, 0, 0), 7));
    }

    #[test]
    fn pending_is_always_due() {
        let mut t = completed(7, None);
        t.status = Status::Pending;
        assert!(is_due(&t, &at(1, 0, 0), 7));
    }

    #[test]
    fn checkpoint_uses_callers_zone() {
        // 2025-06-01 00:00 UTC is 2025-06-01 02:00 at +02:00.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let t = completed(1, Some(at(1, 0, 0)));
        let before = tz.with_ymd_and_hms(2025, 6, 2, 6, 59, 0).unwrap();
        let after = tz.with_ymd_and_hms(2025, 6, 2, 7, 0, 0).unwrap();
        assert!(!is_due(&t, &before, 7));
        assert!(is_due(&t, &after, 7));
    }

    #[test]
    fn reactivations_only_for_due_completed() {
        let due = completed(1, Some(at(1, 0, 0)));
        let mut waiting = completed(7, Some(at(1, 0, 0)));
        waiting.id = "w".into();
        let mut pending = completed(1, None);
        pending.id = "p".into();
        pending.status = Status::Pending;

        let updates = reactivations(&[due, waiting, pending], &at(3, 8, 0), 7);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, "t");
        assert_eq!(updates[0].patch, TaskPatch::reactivated());
    }
}
