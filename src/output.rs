use std::collections::HashMap;

use serde::Serialize;

use crate::model::{Status, Task, Zone};
use crate::scheduler::{is_blocked, QueueEntry, Session, Summary, TimeBudget};

#[derive(Serialize)]
pub struct TaskDetail<'a> {
    #[serde(flatten)]
    pub task: &'a Task,
    pub blocked: bool,
    pub unlocks: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<String>,
}

/// Status as shown to people: pending tasks waiting on an unfinished
/// dependency read as blocked.
pub fn display_status(task: &Task, pool: &[Task]) -> Status {
    if task.is_pending() && is_blocked(task, pool) {
        Status::Blocked
    } else {
        task.status
    }
}

fn rounded_percent(done: usize, total: usize) -> u32 {
    ((done * 100 + total / 2) / total) as u32
}

fn task_line(task: &Task, pool: &[Task]) -> String {
    let mut line = format!(
        "{} {}  {} {:>3}m  {}",
        display_status(task, pool).icon(),
        task.id,
        task.priority,
        task.duration,
        task.label
    );
    if task.recurrence > 0 {
        line.push_str(&format!("  (every {}d)", task.recurrence));
    }
    if let Some(dep) = &task.dependency {
        line.push_str(&format!("  (after {dep})"));
    }
    line
}

pub fn format_task_detail(
    task: &Task,
    pool: &[Task],
    dependents: &[&Task],
    next_due: Option<&str>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Id:          {}\n", task.id));
    out.push_str(&format!("Label:       {}\n", task.label));
    out.push_str(&format!("Zone:        {}\n", task.zone));
    out.push_str(&format!("Status:      {}\n", display_status(task, pool)));
    out.push_str(&format!("Priority:    {}\n", task.priority));
    out.push_str(&format!("Duration:    {}m\n", task.duration));
    if task.recurrence > 0 {
        out.push_str(&format!("Repeats:     every {} day(s)\n", task.recurrence));
    }
    if let Some(at) = &task.completed_at {
        out.push_str(&format!("Completed:   {}\n", at.to_rfc3339()));
    }
    if let Some(by) = &task.completed_by {
        out.push_str(&format!("Done by:     {by}\n"));
    }
    if let Some(due) = next_due {
        out.push_str(&format!("Next due:    {due}\n"));
    }
    if let Some(dep) = &task.dependency {
        let label = pool
            .iter()
            .find(|t| &t.id == dep)
            .map(|t| t.label.as_str())
            .unwrap_or("missing");
        out.push_str(&format!("After:       {dep} ({label})\n"));
    }
    if !dependents.is_empty() {
        let ids: Vec<&str> = dependents.iter().map(|t| t.id.as_str()).collect();
        out.push_str(&format!("Unlocks:     {}\n", ids.join(", ")));
    }
    if let Some(image) = &task.image_path {
        out.push_str(&format!("Image:       {image}\n"));
    }
    out
}

pub fn format_task_list(tasks: &[Task], pool: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&task_line(task, pool));
        out.push('\n');
    }
    out
}

/// Tasks grouped under their zone, zones in first-seen order.
pub fn format_zone_tree(tasks: &[Task], pool: &[Task]) -> String {
    let mut order: Vec<&str> = Vec::new();
    let mut by_zone: HashMap<&str, Vec<&Task>> = HashMap::new();
    for task in tasks {
        let entry = by_zone.entry(task.zone.as_str()).or_default();
        if entry.is_empty() {
            order.push(task.zone.as_str());
        }
        entry.push(task);
    }

    let mut out = String::new();
    for zone in order {
        let members = &by_zone[zone];
        out.push_str(&format!("{zone}\n"));
        for (i, task) in members.iter().enumerate() {
            let connector = if i == members.len() - 1 {
                "└── "
            } else {
                "├── "
            };
            out.push_str(&format!("{connector}{}\n", task_line(task, pool)));
        }
    }
    out
}

pub fn format_zones(zones: &[Zone]) -> String {
    let mut out = String::new();
    for zone in zones {
        match &zone.level {
            Some(level) => out.push_str(&format!("{}  [{level}]\n", zone.name)),
            None => out.push_str(&format!("{}\n", zone.name)),
        }
    }
    out
}

pub fn format_queue(queue: &[QueueEntry], budget: TimeBudget) -> String {
    let mut out = String::new();
    let mut total: i64 = 0;
    for (i, entry) in queue.iter().enumerate() {
        total = total.saturating_add(entry.duration);
        out.push_str(&format!(
            "{:>2}. {}  {} {:>3}m  {}: {}\n",
            i + 1,
            entry.id,
            entry.priority,
            entry.duration,
            entry.zone,
            entry.label
        ));
    }
    out.push_str(&format!("Total: {total}m of {budget}\n"));
    out
}

pub fn format_summary(summary: &Summary) -> String {
    format!(
        "{} done, {} skipped, {} left; {}m of {}m planned ({}%)\n",
        summary.completed,
        summary.skipped,
        summary.remaining,
        summary.completed_minutes,
        summary.planned_minutes,
        summary.percent
    )
}

pub fn format_session_status(session: &Session) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Session started {} with budget {}\n",
        session.started_at.format("%Y-%m-%d %H:%M"),
        session.budget
    ));
    if let Some(zone) = &session.filter.zone {
        out.push_str(&format!("Zone:  {zone}\n"));
    }
    if let Some(level) = &session.filter.level {
        out.push_str(&format!("Level: {level}\n"));
    }
    match session.current() {
        Some(entry) => out.push_str(&format!(
            "Now:   {} {}: {} ({}m)\n",
            entry.id, entry.zone, entry.label, entry.duration
        )),
        None => out.push_str("Now:   nothing left in this session\n"),
    }
    for entry in session.upcoming().iter().skip(1) {
        out.push_str(&format!(
            "  next {} {}: {} ({}m)\n",
            entry.id, entry.zone, entry.label, entry.duration
        ));
    }
    out.push_str(&format_summary(&session.summary()));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneProgress {
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
    pub zones: Vec<ZoneProgress>,
}

/// Completion per zone. An empty house counts as fully tidied; an empty zone
/// as not started.
pub fn progress(pool: &[Task], zones: &[Zone]) -> Progress {
    let completed = pool.iter().filter(|t| t.is_completed()).count();
    let per_zone = zones
        .iter()
        .map(|zone| {
            let members: Vec<&Task> = pool.iter().filter(|t| t.zone == zone.name).collect();
            let done = members.iter().filter(|t| t.is_completed()).count();
            ZoneProgress {
                zone: zone.name.clone(),
                level: zone.level.clone(),
                completed: done,
                total: members.len(),
                percent: if members.is_empty() {
                    0
                } else {
                    rounded_percent(done, members.len())
                },
            }
        })
        .collect();
    Progress {
        completed,
        total: pool.len(),
        percent: if pool.is_empty() {
            100
        } else {
            rounded_percent(completed, pool.len())
        },
        zones: per_zone,
    }
}

pub fn format_progress(progress: &Progress) -> String {
    let mut out = format!(
        "Overall: {}% tidied ({}/{})\n",
        progress.percent, progress.completed, progress.total
    );
    for zone in &progress.zones {
        let filled = (zone.percent / 10) as usize;
        out.push_str(&format!(
            "  {:<16} [{}{}] {:>3}%  {}/{}\n",
            zone.zone,
            "#".repeat(filled),
            "-".repeat(10 - filled),
            zone.percent,
            zone.completed,
            zone.total
        ));
    }
    out
}
