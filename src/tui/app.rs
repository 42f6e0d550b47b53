use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};
use rusqlite::Connection;

use crate::model::{Task, Zone};
use crate::ops;
use crate::scheduler::{Session, SwapOutcome};

/// State behind the session view: the stored session plus a fresh snapshot
/// of the pool it is walking.
pub struct App {
    pub session: Session,
    pub pool: Vec<Task>,
    pub zones: Vec<Zone>,
    pub message: Option<String>,
    /// Set once the queue is exhausted and the stored record cleared.
    pub finished: bool,
    reset_hour: u32,
}

impl App {
    pub fn new(conn: &Connection, reset_hour: u32) -> Result<Self> {
        let pool = ops::load_pool(conn, &Local::now(), reset_hour)?;
        let Some((session, dropped)) = ops::resume_session(conn, &pool)? else {
            bail!("no session in progress; start one with `sweep session start`");
        };
        let finished = session.is_finished();
        let mut app = Self {
            session,
            pool,
            zones: ops::list_zones(conn)?,
            message: None,
            finished,
            reset_hour,
        };
        if dropped > 0 {
            app.message = Some(format!("dropped {dropped} task(s) that are no longer pending"));
        }
        Ok(app)
    }

    fn refresh(&mut self, conn: &Connection) -> Result<()> {
        self.pool = ops::load_pool(conn, &Local::now(), self.reset_hour)?;
        self.zones = ops::list_zones(conn)?;
        Ok(())
    }

    fn persist(&mut self, conn: &Connection) -> Result<()> {
        if self.session.is_finished() {
            ops::clear_session(conn)?;
            self.finished = true;
        } else {
            ops::save_session(conn, &self.session)?;
        }
        Ok(())
    }

    /// The pool record behind the current queue entry.
    pub fn current_task(&self) -> Option<&Task> {
        let entry = self.session.current()?;
        self.pool.iter().find(|t| t.id == entry.id)
    }

    pub fn unlocks(&self) -> Vec<&Task> {
        self.session.unlocked_next(&self.pool)
    }

    pub fn complete(&mut self, conn: &Connection) -> Result<()> {
        self.complete_at(conn, Utc::now())
    }

    pub fn complete_at(&mut self, conn: &Connection, now: DateTime<Utc>) -> Result<()> {
        let label = self.session.current().map(|e| e.label.clone());
        let Some(update) = self.session.complete_current(now, None) else {
            self.message = Some("nothing left to complete".into());
            return Ok(());
        };
        ops::apply_update(conn, &update)?;
        log::info!("session: completed {}", update.id);
        self.message = label.map(|l| format!("done: {l}"));
        self.refresh(conn)?;
        self.persist(conn)
    }

    pub fn skip(&mut self, conn: &Connection) -> Result<()> {
        let label = self.session.current().map(|e| e.label.clone());
        if self.session.skip_current().is_none() {
            self.message = Some("nothing left to skip".into());
            return Ok(());
        }
        self.message = label.map(|l| format!("skipped: {l}"));
        self.persist(conn)
    }

    pub fn swap(&mut self, conn: &Connection) -> Result<()> {
        match self.session.swap_current(&self.pool, &self.zones) {
            SwapOutcome::Swapped { replaced, with } => {
                self.message = Some(format!("swapped {} for {}", replaced.label, with.label));
                self.persist(conn)
            }
            SwapOutcome::NoAlternative => {
                self.message = Some("no other task fits".into());
                Ok(())
            }
        }
    }

    pub fn finish(&mut self, conn: &Connection) -> Result<()> {
        self.session.finish(false);
        self.message = Some("session finished".into());
        self.persist(conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::model::{NewTask, Priority, Status};
    use crate::scheduler::{build_queue, BuildOutcome, SessionFilter, TimeBudget};

    fn seed(conn: &Connection) -> (String, String) {
        let task = |label: &str, duration, dependency| NewTask {
            zone: "Kitchen".into(),
            label: label.into(),
            duration,
            priority: Priority::High,
            recurrence: 0,
            dependency,
            image_path: None,
        };
        let a = ops::add_task(conn, &task("Clear counters", 5, None)).unwrap();
        let b = ops::add_task(conn, &task("Wipe counters", 10, Some(a.clone()))).unwrap();
        (a, b)
    }

    fn start(conn: &Connection, budget: TimeBudget) {
        let pool = ops::list_tasks(conn, None).unwrap();
        let zones = ops::list_zones(conn).unwrap();
        let BuildOutcome::Ready(queue) =
            build_queue(&pool, &zones, &SessionFilter::default(), budget)
        else {
            panic!("expected a queue");
        };
        let session = Session::new(queue, SessionFilter::default(), budget, Utc::now());
        ops::save_session(conn, &session).unwrap();
    }

    #[test]
    fn requires_a_stored_session() {
        let conn = db::open_memory().unwrap();
        assert!(App::new(&conn, 7).is_err());
    }

    #[test]
    fn complete_persists_and_shows_unlocks() {
        let conn = db::open_memory().unwrap();
        let (a, b) = seed(&conn);
        start(&conn, TimeBudget::Minutes(30));

        let mut app = App::new(&conn, 7).unwrap();
        assert_eq!(app.current_task().unwrap().id, a);
        let unlocks: Vec<&str> = app.unlocks().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(unlocks, vec![b.as_str()]);

        app.complete(&conn).unwrap();
        assert_eq!(ops::get_task(&conn, &a).unwrap().status, Status::Completed);
        assert!(app.finished);
        assert!(ops::load_session(&conn).unwrap().is_none());
    }

    #[test]
    fn skip_keeps_status_and_saves_cursor() {
        let conn = db::open_memory().unwrap();
        let (a, _) = seed(&conn);
        ops::add_task(
            &conn,
            &NewTask {
                zone: "Hall".into(),
                label: "Shoes".into(),
                duration: 5,
                priority: Priority::Low,
                recurrence: 0,
                dependency: None,
                image_path: None,
            },
        )
        .unwrap();
        start(&conn, TimeBudget::Minutes(30));

        let mut app = App::new(&conn, 7).unwrap();
        app.skip(&conn).unwrap();
        assert_eq!(ops::get_task(&conn, &a).unwrap().status, Status::Pending);
        assert!(!app.finished);
        let stored = ops::load_session(&conn).unwrap().unwrap();
        assert_eq!(stored.cursor, 1);
        assert_eq!(stored.skipped, vec![a]);
    }

    #[test]
    fn finish_clears_session() {
        let conn = db::open_memory().unwrap();
        seed(&conn);
        start(&conn, TimeBudget::Unlimited);

        let mut app = App::new(&conn, 7).unwrap();
        app.finish(&conn).unwrap();
        assert!(app.finished);
        assert!(ops::load_session(&conn).unwrap().is_none());
    }

    #[test]
    fn resume_drops_tasks_completed_elsewhere() {
        let conn = db::open_memory().unwrap();
        let (a, _) = seed(&conn);
        ops::add_task(
            &conn,
            &NewTask {
                zone: "Hall".into(),
                label: "Shoes".into(),
                duration: 5,
                priority: Priority::Low,
                recurrence: 0,
                dependency: None,
                image_path: None,
            },
        )
        .unwrap();
        start(&conn, TimeBudget::Minutes(30));
        ops::mark_completed(&conn, &a, Utc::now(), None).unwrap();

        let app = App::new(&conn, 7).unwrap();
        assert!(app.message.is_some());
        assert_eq!(app.session.current().unwrap().label, "Shoes");
    }

    #[test]
    fn opening_a_session_emptied_elsewhere_clears_it() {
        let conn = db::open_memory().unwrap();
        let (a, _) = seed(&conn);
        start(&conn, TimeBudget::Minutes(5));
        ops::mark_completed(&conn, &a, Utc::now(), None).unwrap();

        let app = App::new(&conn, 7).unwrap();
        assert!(app.finished);
        assert!(app.session.current().is_none());
        assert!(ops::load_session(&conn).unwrap().is_none());
    }
}
