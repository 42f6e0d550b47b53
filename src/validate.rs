use std::collections::HashSet;

use anyhow::{bail, Result};
use rusqlite::{Connection, OptionalExtension};

/// Validate a zone name: non-empty and free of control characters.
pub fn validate_zone_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        bail!("zone name must not be empty");
    }
    if name.chars().any(char::is_control) {
        bail!("zone name '{}' contains control characters", name.escape_debug());
    }
    Ok(())
}

pub fn validate_label(label: &str) -> Result<()> {
    if label.trim().is_empty() {
        bail!("task label must not be empty");
    }
    Ok(())
}

pub fn validate_duration(minutes: i64) -> Result<()> {
    if minutes <= 0 {
        bail!("duration must be a positive number of minutes, got {minutes}");
    }
    Ok(())
}

/// Detect if making `task_id` depend on `dependency` would close a cycle.
///
/// Walks the dependency chain starting at `dependency`. Chains that already
/// loop without reaching `task_id` terminate via the visited set.
pub fn detect_dep_cycle(conn: &Connection, task_id: &str, dependency: &str) -> Result<bool> {
    if task_id == dependency {
        return Ok(true);
    }
    let mut visited = HashSet::new();
    let mut current = Some(dependency.to_string());
    while let Some(id) = current {
        if !visited.insert(id.clone()) {
            return Ok(false);
        }
        let next: Option<Option<String>> = conn
            .query_row(
                "SELECT dependency FROM tasks WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        match next.flatten() {
            Some(n) if n == task_id => return Ok(true),
            other => current = other,
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn insert(conn: &Connection, id: &str, dependency: Option<&str>) {
        conn.execute(
            "INSERT OR IGNORE INTO zones (name) VALUES ('Kitchen')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tasks (id, zone, label, duration, dependency) VALUES (?1, 'Kitchen', ?1, 5, ?2)",
            rusqlite::params![id, dependency],
        )
        .unwrap();
    }

    #[test]
    fn zone_names() {
        assert!(validate_zone_name("Kitchen").is_ok());
        assert!(validate_zone_name("Living Room").is_ok());
        assert!(validate_zone_name("").is_err());
        assert!(validate_zone_name("   ").is_err());
        assert!(validate_zone_name("bad\nname").is_err());
    }

    #[test]
    fn labels_and_durations() {
        assert!(validate_label("Vacuum").is_ok());
        assert!(validate_label(" ").is_err());
        assert!(validate_duration(1).is_ok());
        assert!(validate_duration(0).is_err());
        assert!(validate_duration(-3).is_err());
    }

    #[test]
    fn chain_cycle_detected() {
        let conn = db::open_memory().unwrap();
        insert(&conn, "a", None);
        insert(&conn, "b", Some("a"));
        insert(&conn, "c", Some("b"));
        assert!(detect_dep_cycle(&conn, "a", "c").unwrap());
        assert!(!detect_dep_cycle(&conn, "c", "a").unwrap());
        assert!(detect_dep_cycle(&conn, "a", "a").unwrap());
    }

    #[test]
    fn existing_loop_terminates() {
        let conn = db::open_memory().unwrap();
        insert(&conn, "x", Some("y"));
        insert(&conn, "y", Some("x"));
        insert(&conn, "z", None);
        assert!(!detect_dep_cycle(&conn, "z", "x").unwrap());
    }

    #[test]
    fn dangling_chain_is_not_a_cycle() {
        let conn = db::open_memory().unwrap();
        insert(&conn, "a", Some("ghost"));
        insert(&conn, "b", None);
        assert!(!detect_dep_cycle(&conn, "b", "a").unwrap());
    }
}
