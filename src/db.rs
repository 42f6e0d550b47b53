use anyhow::Result;
use rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS zones (
    name  TEXT PRIMARY KEY CHECK(length(trim(name)) > 0),
    level TEXT
);

CREATE TABLE IF NOT EXISTS tasks (
    id           TEXT PRIMARY KEY CHECK(length(id) > 0),
    zone         TEXT NOT NULL REFERENCES zones(name) ON UPDATE CASCADE ON DELETE RESTRICT,
    label        TEXT NOT NULL,
    duration     INTEGER NOT NULL,
    priority     INTEGER NOT NULL DEFAULT 2,
    status       TEXT NOT NULL DEFAULT 'pending',
    dependency   TEXT,
    recurrence   INTEGER NOT NULL DEFAULT 0,
    completed_at TEXT,
    completed_by TEXT,
    image_path   TEXT,
    created_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
    updated_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE INDEX IF NOT EXISTS tasks_dependency ON tasks(dependency);

CREATE TABLE IF NOT EXISTS session_state (
    id         INTEGER PRIMARY KEY CHECK(id = 1),
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);
";

fn set_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )?;
    Ok(())
}

pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    set_pragmas(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    set_pragmas(&conn)?;
    init(&conn)?;
    Ok(conn)
}
