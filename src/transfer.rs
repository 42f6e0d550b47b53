//! JSON backup of the whole inventory.
//!
//! The document shape is `{ "inventory": [...], "zones": [...], "version" }`.
//! Zones may be plain names (older backups) or `{ name, level }` objects.
//! Import never trusts incoming ids: every task gets a fresh one and
//! dependencies are remapped through the old to new table.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::model::{Status, Task, Zone};
use crate::ops;

pub const BACKUP_VERSION: &str = "3.2";

/// Zone name given to imported tasks that carry none.
pub const FALLBACK_ZONE: &str = "Unassigned";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZoneEntry {
    Name(String),
    Full(Zone),
}

impl ZoneEntry {
    fn into_zone(self) -> Zone {
        match self {
            Self::Name(name) => Zone { name, level: None },
            Self::Full(zone) => zone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub inventory: Vec<Task>,
    #[serde(default)]
    pub zones: Vec<ZoneEntry>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub tasks: usize,
    pub zones_created: usize,
    pub dangling_dependencies: usize,
    pub skipped: usize,
}

pub fn export(conn: &Connection) -> Result<Backup> {
    Ok(Backup {
        inventory: ops::list_tasks(conn, None)?,
        zones: ops::list_zones(conn)?
            .into_iter()
            .map(ZoneEntry::Full)
            .collect(),
        version: Some(BACKUP_VERSION.to_string()),
    })
}

pub fn write_backup<W: Write>(backup: &Backup, mut out: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut out, backup).context("failed to encode backup")?;
    writeln!(out)?;
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<Backup> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load a backup into the store inside one transaction. With `replace` the
/// existing tasks and any running session are dropped first; zones are
/// always merged by name, keeping levels already on record.
pub fn import(conn: &Connection, backup: Backup, replace: bool) -> Result<ImportReport> {
    let tx = conn.unchecked_transaction()?;
    let mut report = ImportReport::default();

    if replace {
        let removed = tx.execute("DELETE FROM tasks", [])?;
        ops::clear_session(&tx)?;
        log::info!("import: replaced {removed} existing task(s)");
    }

    if let Some(v) = backup.version.as_deref() {
        if v != BACKUP_VERSION {
            log::warn!("import: backup version {v}, expected {BACKUP_VERSION}");
        }
    }

    for zone in backup.zones.into_iter().map(ZoneEntry::into_zone) {
        if zone.name.trim().is_empty() {
            log::warn!("import: ignoring zone with an empty name");
            continue;
        }
        report.zones_created += tx.execute(
            "INSERT OR IGNORE INTO zones (name, level) VALUES (?1, ?2)",
            rusqlite::params![zone.name, zone.level],
        )?;
    }

    let mut tasks = Vec::with_capacity(backup.inventory.len());
    for task in backup.inventory {
        if task.label.trim().is_empty() {
            log::warn!("import: skipping task '{}' with no label", task.id);
            report.skipped += 1;
            continue;
        }
        tasks.push(task);
    }

    // Each record gets its own fresh id. Dependencies follow the first
    // record carrying a given source id.
    let mut taken = HashSet::new();
    let mut ids: HashMap<String, String> = HashMap::new();
    let mut fresh_ids = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let fresh = loop {
            let id = ops::generate_id(&tx)?;
            if taken.insert(id.clone()) {
                break id;
            }
        };
        if ids.contains_key(&task.id) {
            log::warn!(
                "import: duplicate task id '{}'; dependencies follow the first",
                task.id
            );
        } else {
            ids.insert(task.id.clone(), fresh.clone());
        }
        fresh_ids.push(fresh);
    }

    let zones_before: i64 = tx.query_row("SELECT COUNT(*) FROM zones", [], |row| row.get(0))?;
    for (mut task, id) in tasks.into_iter().zip(fresh_ids) {
        task.id = id;
        task.dependency = match task.dependency.take() {
            Some(old) => {
                let mapped = ids.get(&old).cloned();
                if mapped.is_none() {
                    report.dangling_dependencies += 1;
                }
                mapped
            }
            None => None,
        };
        if task.zone.trim().is_empty() {
            task.zone = FALLBACK_ZONE.to_string();
        }
        normalize_status(&mut task);
        ops::insert_task(&tx, &task)?;
        report.tasks += 1;
    }
    let zones_after: i64 = tx.query_row("SELECT COUNT(*) FROM zones", [], |row| row.get(0))?;
    report.zones_created += (zones_after - zones_before).max(0) as usize;

    tx.commit()?;
    log::info!(
        "import: {} task(s), {} new zone(s), {} dangling dependency reference(s) dropped",
        report.tasks,
        report.zones_created,
        report.dangling_dependencies
    );
    Ok(report)
}

/// `blocked` is never stored, and pending tasks carry no completion record.
fn normalize_status(task: &mut Task) {
    match task.status {
        Status::Blocked => {
            task.status = Status::Pending;
            task.completed_at = None;
            task.completed_by = None;
        }
        Status::Pending => {
            task.completed_at = None;
            task.completed_by = None;
        }
        Status::Completed => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{NewTask, Priority};

    fn new_task(zone: &str, label: &str, dependency: Option<String>) -> NewTask {
        NewTask {
            zone: zone.into(),
            label: label.into(),
            duration: 10,
            priority: Priority::Medium,
            recurrence: 0,
            dependency,
            image_path: None,
        }
    }

    const LEGACY: &str = r#"{
        "inventory": [
            {"id": 1, "zone": "Kitchen", "label": "Clear counters", "duration": 5,
             "priority": 1, "status": "pending", "dependency": null, "recurrence": 1},
            {"id": 2, "zone": "Kitchen", "label": "Wipe counters", "duration": 10,
             "priority": 1, "status": "blocked", "dependency": 1, "recurrence": 1},
            {"id": 3, "zone": "", "label": "Water plants", "duration": 5,
             "priority": 2, "status": "completed", "dependency": 99,
             "lastCompleted": "2025-06-01T08:00:00.000Z", "recurrence": 3},
            {"id": 4, "zone": "Hall", "label": "", "duration": 5}
        ],
        "zones": ["Kitchen", "Bathroom"],
        "version": "3.1"
    }"#;

    #[test]
    fn import_legacy_backup() {
        let conn = db::open_memory().unwrap();
        let backup: Backup = serde_json::from_str(LEGACY).unwrap();
        let report = import(&conn, backup, false).unwrap();

        assert_eq!(report.tasks, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dangling_dependencies, 1);
        // Kitchen, Bathroom from the list; Unassigned from the orphan task.
        assert_eq!(report.zones_created, 3);

        let tasks = ops::list_tasks(&conn, None).unwrap();
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.id.len() == 8));

        let clear = tasks.iter().find(|t| t.label == "Clear counters").unwrap();
        let wipe = tasks.iter().find(|t| t.label == "Wipe counters").unwrap();
        assert_eq!(wipe.dependency.as_deref(), Some(clear.id.as_str()));
        assert_eq!(wipe.status, Status::Pending);

        let plants = tasks.iter().find(|t| t.label == "Water plants").unwrap();
        assert_eq!(plants.zone, FALLBACK_ZONE);
        assert!(plants.dependency.is_none());
        assert_eq!(plants.status, Status::Completed);
        assert!(plants.completed_at.is_some());
    }

    #[test]
    fn import_merges_zones_keeping_levels() {
        let conn = db::open_memory().unwrap();
        ops::add_zone(&conn, "Kitchen", Some("Ground")).unwrap();
        let backup: Backup = serde_json::from_str(
            r#"{"inventory": [], "zones": [{"name": "Kitchen", "level": "Upstairs"}, {"name": "Loft", "level": "Top"}]}"#,
        )
        .unwrap();
        let report = import(&conn, backup, false).unwrap();
        assert_eq!(report.zones_created, 1);

        let zones = ops::list_zones(&conn).unwrap();
        let kitchen = zones.iter().find(|z| z.name == "Kitchen").unwrap();
        assert_eq!(kitchen.level.as_deref(), Some("Ground"));
        let loft = zones.iter().find(|z| z.name == "Loft").unwrap();
        assert_eq!(loft.level.as_deref(), Some("Top"));
    }

    #[test]
    fn import_twice_duplicates_without_id_clashes() {
        let conn = db::open_memory().unwrap();
        let a = ops::add_task(&conn, &new_task("Kitchen", "A", None)).unwrap();
        ops::add_task(&conn, &new_task("Kitchen", "B", Some(a))).unwrap();

        let backup = export(&conn).unwrap();
        import(&conn, backup.clone(), false).unwrap();
        assert_eq!(ops::list_tasks(&conn, None).unwrap().len(), 4);

        import(&conn, backup, true).unwrap();
        let tasks = ops::list_tasks(&conn, None).unwrap();
        assert_eq!(tasks.len(), 2);
        let a = tasks.iter().find(|t| t.label == "A").unwrap();
        let b = tasks.iter().find(|t| t.label == "B").unwrap();
        assert_eq!(b.dependency.as_deref(), Some(a.id.as_str()));
    }

    #[test]
    fn repeated_source_ids_get_distinct_new_ids() {
        let conn = db::open_memory().unwrap();
        let backup: Backup = serde_json::from_str(
            r#"{
                "inventory": [
                    {"id": "k1", "zone": "Kitchen", "label": "Sweep", "duration": 5},
                    {"id": "k1", "zone": "Kitchen", "label": "Mop", "duration": 10},
                    {"id": "k2", "zone": "Kitchen", "label": "Bins", "duration": 5, "dependency": "k1"}
                ],
                "zones": ["Kitchen"]
            }"#,
        )
        .unwrap();
        let report = import(&conn, backup, false).unwrap();
        assert_eq!(report.tasks, 3);

        let tasks = ops::list_tasks(&conn, None).unwrap();
        let ids: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 3);

        let sweep = tasks.iter().find(|t| t.label == "Sweep").unwrap();
        let bins = tasks.iter().find(|t| t.label == "Bins").unwrap();
        assert_eq!(bins.dependency.as_deref(), Some(sweep.id.as_str()));
    }

    #[test]
    fn export_writes_current_version() {
        let conn = db::open_memory().unwrap();
        ops::add_zone(&conn, "Kitchen", Some("Ground")).unwrap();
        ops::add_task(&conn, &new_task("Kitchen", "Mop", None)).unwrap();

        let mut buf = Vec::new();
        write_backup(&export(&conn).unwrap(), &mut buf).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["version"], BACKUP_VERSION);
        assert_eq!(value["zones"][0]["level"], "Ground");
        assert_eq!(value["inventory"][0]["label"], "Mop");
        assert_eq!(value["inventory"][0]["priority"], 2);
    }

    #[test]
    fn read_backup_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json");
        std::fs::write(&path, "{ nope").unwrap();
        let err = read_backup(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse"));
        assert!(read_backup(&dir.path().join("missing.json")).is_err());
    }
}
