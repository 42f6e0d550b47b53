use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use crate::model::{NewTask, Priority, Status, Task, TaskPatch, TaskUpdate, Zone};
use crate::recurrence;
use crate::scheduler::Session;
use crate::validate::{detect_dep_cycle, validate_duration, validate_label, validate_zone_name};

const TASK_COLUMNS: &str = "id, zone, label, duration, priority, status, dependency, recurrence, completed_at, completed_by, image_path";

fn task_exists(conn: &Connection, id: &str) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks WHERE id = ?1", [id], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn require_task(conn: &Connection, id: &str) -> Result<()> {
    if !task_exists(conn, id)? {
        bail!("task '{id}' not found");
    }
    Ok(())
}

fn zone_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM zones WHERE name = ?1", [name], |row| {
        row.get(0)
    })?;
    Ok(count > 0)
}

fn ensure_zone(conn: &Connection, name: &str) -> Result<()> {
    let created = conn.execute("INSERT OR IGNORE INTO zones (name) VALUES (?1)", [name])?;
    if created > 0 {
        log::info!("created zone '{name}'");
    }
    Ok(())
}

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status: String = row.get(5)?;
    let recurrence: i64 = row.get(7)?;
    Ok(Task {
        id: row.get(0)?,
        zone: row.get(1)?,
        label: row.get(2)?,
        duration: row.get(3)?,
        priority: Priority::from_rank(row.get(4)?),
        status: Status::from_stored(&status),
        dependency: row.get(6)?,
        recurrence: recurrence.clamp(0, u32::MAX as i64) as u32,
        completed_at: parse_timestamp(row.get(8)?),
        completed_by: row.get(9)?,
        image_path: row.get(10)?,
    })
}

/// Short random id, unique within the store.
pub(crate) fn generate_id(conn: &Connection) -> Result<String> {
    loop {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        if !task_exists(conn, &id)? {
            return Ok(id);
        }
    }
}

pub fn add_zone(conn: &Connection, name: &str, level: Option<&str>) -> Result<()> {
    validate_zone_name(name)?;
    if zone_exists(conn, name)? {
        bail!("zone '{name}' already exists");
    }
    conn.execute(
        "INSERT INTO zones (name, level) VALUES (?1, ?2)",
        rusqlite::params![name, level],
    )?;
    Ok(())
}

pub fn set_zone_level(conn: &Connection, name: &str, level: Option<&str>) -> Result<()> {
    let changed = conn.execute(
        "UPDATE zones SET level = ?1 WHERE name = ?2",
        rusqlite::params![level, name],
    )?;
    if changed == 0 {
        bail!("zone '{name}' not found");
    }
    Ok(())
}

pub fn list_zones(conn: &Connection) -> Result<Vec<Zone>> {
    let mut stmt = conn.prepare("SELECT name, level FROM zones ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Zone {
            name: row.get(0)?,
            level: row.get(1)?,
        })
    })?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

pub fn remove_zone(conn: &Connection, name: &str) -> Result<()> {
    if !zone_exists(conn, name)? {
        bail!("zone '{name}' not found");
    }
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks WHERE zone = ?1", [name], |row| {
        row.get(0)
    })?;
    if count > 0 {
        bail!("zone '{name}' still has {count} task(s); move or remove them first");
    }
    conn.execute("DELETE FROM zones WHERE name = ?1", [name])?;
    Ok(())
}

/// Insert a new pending task and return its generated id. The zone is
/// created on the fly if it does not exist yet.
pub fn add_task(conn: &Connection, new: &NewTask) -> Result<String> {
    validate_zone_name(&new.zone)?;
    validate_label(&new.label)?;
    validate_duration(new.duration)?;
    if let Some(dep) = &new.dependency {
        require_task(conn, dep)?;
    }
    ensure_zone(conn, &new.zone)?;
    let id = generate_id(conn)?;
    conn.execute(
        "INSERT INTO tasks (id, zone, label, duration, priority, recurrence, dependency, image_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            id,
            new.zone,
            new.label,
            new.duration,
            new.priority.rank(),
            new.recurrence,
            new.dependency,
            new.image_path,
        ],
    )?;
    log::debug!("added task {id} '{}' in {}", new.label, new.zone);
    Ok(id)
}

/// Insert a fully formed task as is. Used by import, which has already
/// assigned fresh ids.
pub(crate) fn insert_task(conn: &Connection, task: &Task) -> Result<()> {
    ensure_zone(conn, &task.zone)?;
    conn.execute(
        &format!("INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
        rusqlite::params![
            task.id,
            task.zone,
            task.label,
            task.duration,
            task.priority.rank(),
            task.status.as_str(),
            task.dependency,
            task.recurrence,
            task.completed_at.as_ref().map(format_timestamp),
            task.completed_by,
            task.image_path,
        ],
    )?;
    Ok(())
}

pub fn get_task(conn: &Connection, id: &str) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        [id],
        row_to_task,
    )
    .optional()?
    .with_context(|| format!("task '{id}' not found"))
}

/// All tasks in insertion order, optionally limited to one zone.
pub fn list_tasks(conn: &Connection, zone: Option<&str>) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE (?1 IS NULL OR zone = ?1) ORDER BY rowid"
    ))?;
    let rows = stmt.query_map([zone], row_to_task)?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Delete a task. Tasks depending on it keep the now dangling reference.
pub fn remove_task(conn: &Connection, id: &str) -> Result<()> {
    require_task(conn, id)?;
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    Ok(())
}

/// Merge `patch` into the stored task and return the result.
pub fn update_task(conn: &Connection, id: &str, patch: &TaskPatch) -> Result<Task> {
    patch.validate()?;
    let mut task = get_task(conn, id)?;
    if patch.is_empty() {
        return Ok(task);
    }
    if let Some(Some(dep)) = &patch.dependency {
        require_task(conn, dep)?;
        if detect_dep_cycle(conn, id, dep)? {
            bail!("making '{id}' depend on '{dep}' would create a cycle");
        }
    }
    if let Some(zone) = &patch.zone {
        validate_zone_name(zone)?;
        ensure_zone(conn, zone)?;
    }
    patch.apply(&mut task);
    conn.execute(
        "UPDATE tasks SET zone = ?1, label = ?2, duration = ?3, priority = ?4, status = ?5,
             dependency = ?6, recurrence = ?7, completed_at = ?8, completed_by = ?9,
             image_path = ?10, updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
         WHERE id = ?11",
        rusqlite::params![
            task.zone,
            task.label,
            task.duration,
            task.priority.rank(),
            task.status.as_str(),
            task.dependency,
            task.recurrence,
            task.completed_at.as_ref().map(format_timestamp),
            task.completed_by,
            task.image_path,
            id,
        ],
    )?;
    Ok(task)
}

pub fn apply_update(conn: &Connection, update: &TaskUpdate) -> Result<Task> {
    update_task(conn, &update.id, &update.patch)
        .with_context(|| format!("failed to update task '{}'", update.id))
}

pub fn mark_completed(
    conn: &Connection,
    id: &str,
    at: DateTime<Utc>,
    by: Option<&str>,
) -> Result<Task> {
    update_task(conn, id, &TaskPatch::completed(at, by.map(str::to_string)))
}

pub fn reopen(conn: &Connection, id: &str) -> Result<Task> {
    update_task(conn, id, &TaskPatch::reactivated())
}

/// Read the whole pool, returning every due recurring task to pending
/// first. `now` carries the time zone the checkpoint is evaluated in.
pub fn load_pool<Tz: TimeZone>(
    conn: &Connection,
    now: &DateTime<Tz>,
    reset_hour: u32,
) -> Result<Vec<Task>> {
    let mut pool = list_tasks(conn, None)?;
    let updates = recurrence::reactivations(&pool, now, reset_hour);
    if updates.is_empty() {
        return Ok(pool);
    }
    let tx = conn.unchecked_transaction()?;
    for update in &updates {
        apply_update(&tx, update)?;
    }
    tx.commit()?;
    log::info!("reactivated {} recurring task(s)", updates.len());

    for update in &updates {
        if let Some(task) = pool.iter_mut().find(|t| t.id == update.id) {
            update.patch.apply(task);
        }
    }
    Ok(pool)
}

pub fn save_session(conn: &Connection, session: &Session) -> Result<()> {
    let body = serde_json::to_string(session).context("failed to encode session")?;
    conn.execute(
        "INSERT INTO session_state (id, body) VALUES (1, ?1)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body,
             updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')",
        [body],
    )?;
    Ok(())
}

pub fn load_session(conn: &Connection) -> Result<Option<Session>> {
    let body: Option<String> = conn
        .query_row("SELECT body FROM session_state WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;
    match body {
        Some(b) => match serde_json::from_str(&b) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                log::warn!("discarding unreadable session record: {e}");
                clear_session(conn)?;
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

/// Load the stored session and drop entries that changed underneath it.
/// Returns the session with the number of entries dropped. A session left
/// with nothing to do is cleared from the store but still returned so the
/// caller can summarise it.
pub fn resume_session(conn: &Connection, pool: &[Task]) -> Result<Option<(Session, usize)>> {
    let Some(mut session) = load_session(conn)? else {
        return Ok(None);
    };
    let dropped = session.reconcile(pool);
    if dropped > 0 {
        log::info!("session: dropped {dropped} entry(ies) no longer pending");
    }
    if session.is_finished() {
        clear_session(conn)?;
    } else if dropped > 0 {
        save_session(conn, &session)?;
    }
    Ok(Some((session, dropped)))
}

pub fn clear_session(conn: &Connection) -> Result<()> {
    conn.execute("DELETE FROM session_state WHERE id = 1", [])?;
    Ok(())
}
