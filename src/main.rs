mod cli;

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::Parser;
use rusqlite::Connection;

use cli::{Cli, Command, SessionAction, ZoneAction};
use sweep::config::Config;
use sweep::model::{NewTask, Priority, TaskPatch};
use sweep::output::{self, TaskDetail};
use sweep::scheduler::{self, BuildOutcome, Session, SessionFilter, SwapOutcome, TimeBudget};
use sweep::{db, ops, paths, recurrence, transfer, tui};

fn setup_logging() -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .format_timestamp_secs();
    if let Some(log_path) = paths::log_path() {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open log file {log_path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn ensure_db_dir(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }
    Ok(())
}

fn open_db(db_path: &str) -> Result<Connection> {
    let conn = db::open(db_path)?;
    db::init(&conn)?;
    Ok(conn)
}

fn budget_or_default(budget: Option<String>, config: &Config) -> Result<TimeBudget> {
    match budget {
        Some(b) => TimeBudget::parse(&b),
        None => Ok(config.default_budget()),
    }
}

fn load_pool(conn: &Connection, config: &Config) -> Result<Vec<sweep::model::Task>> {
    ops::load_pool(conn, &Local::now(), config.reset_hour())
}

/// Load the running session and drop entries that changed underneath it.
/// A session emptied that way is already cleared from the store.
fn resume_session(
    conn: &Connection,
    pool: &[sweep::model::Task],
) -> Result<Session> {
    let Some((session, dropped)) = ops::resume_session(conn, pool)? else {
        bail!("no session in progress; start one with `sweep session start`");
    };
    if dropped > 0 {
        eprintln!("Dropped {dropped} task(s) that are no longer pending");
    }
    Ok(session)
}

/// Print the summary of a session that has nothing left to do.
fn report_finished(session: &Session) {
    eprintln!("Session complete.");
    print!("{}", output::format_summary(&session.summary()));
}

/// Store the session, or clear it and print the summary once it is over.
fn persist_session(conn: &Connection, session: &Session) -> Result<()> {
    if session.is_finished() {
        ops::clear_session(conn)?;
        report_finished(session);
    } else {
        ops::save_session(conn, session)?;
        if let Some(next) = session.current() {
            eprintln!("Next: {} {} ({}m)", next.id, next.label, next.duration);
        }
    }
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_logging()?;
    let config = Config::load()?;
    let db_path = cli.db.unwrap_or_else(paths::db_path);
    ensure_db_dir(&db_path)?;
    let conn = open_db(&db_path)?;

    match cli.command {
        Command::Zone { action } => match action {
            ZoneAction::Add { name, level } => {
                let exists = ops::list_zones(&conn)?.iter().any(|z| z.name == name);
                if exists {
                    ops::set_zone_level(&conn, &name, level.as_deref())?;
                    eprintln!("Updated zone '{name}'");
                } else {
                    ops::add_zone(&conn, &name, level.as_deref())?;
                    eprintln!("Added zone '{name}'");
                }
            }
            ZoneAction::List => {
                print!("{}", output::format_zones(&ops::list_zones(&conn)?));
            }
            ZoneAction::Rm { name } => {
                ops::remove_zone(&conn, &name)?;
                eprintln!("Removed zone '{name}'");
            }
        },

        Command::Add {
            zone,
            label,
            duration,
            priority,
            recurrence,
            after,
            image,
        } => {
            let id = ops::add_task(
                &conn,
                &NewTask {
                    zone,
                    label: label.clone(),
                    duration,
                    priority: Priority::parse(&priority)?,
                    recurrence,
                    dependency: after,
                    image_path: image,
                },
            )?;
            println!("{id}");
            eprintln!("Added '{label}'");
        }

        Command::Edit {
            id,
            zone,
            label,
            duration,
            priority,
            recurrence,
            image,
            no_image,
        } => {
            let patch = TaskPatch {
                zone,
                label,
                duration,
                priority: priority.as_deref().map(Priority::parse).transpose()?,
                recurrence,
                image_path: if no_image { Some(None) } else { image.map(Some) },
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                bail!("nothing to change; pass at least one field");
            }
            ops::update_task(&conn, &id, &patch)?;
            eprintln!("Updated '{id}'");
        }

        Command::Rm { id } => {
            ops::remove_task(&conn, &id)?;
            eprintln!("Removed '{id}'");
        }

        Command::List { zone, flat, json } => {
            let pool = load_pool(&conn, &config)?;
            let tasks: Vec<_> = match &zone {
                Some(z) => pool.iter().filter(|t| &t.zone == z).cloned().collect(),
                None => pool.clone(),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else if flat {
                print!("{}", output::format_task_list(&tasks, &pool));
            } else {
                print!("{}", output::format_zone_tree(&tasks, &pool));
            }
        }

        Command::Show { id, json } => {
            let pool = load_pool(&conn, &config)?;
            let task = pool
                .iter()
                .find(|t| t.id == id)
                .with_context(|| format!("task '{id}' not found"))?;
            let dependents: Vec<&sweep::model::Task> = pool
                .iter()
                .filter(|t| t.dependency.as_deref() == Some(id.as_str()))
                .collect();
            let next_due = recurrence::next_due(task, &Local, config.reset_hour())
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string());
            if json {
                let detail = TaskDetail {
                    task,
                    blocked: scheduler::is_blocked(task, &pool),
                    unlocks: dependents.iter().map(|t| t.id.as_str()).collect(),
                    next_due,
                };
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                print!(
                    "{}",
                    output::format_task_detail(task, &pool, &dependents, next_due.as_deref())
                );
            }
        }

        Command::Done { id, by } => {
            let task = ops::mark_completed(&conn, &id, Utc::now(), by.as_deref())?;
            eprintln!("Completed '{}'", task.label);
        }

        Command::Reopen { id } => {
            let task = ops::reopen(&conn, &id)?;
            eprintln!("Reopened '{}'", task.label);
        }

        Command::Depend { id, on } => {
            let patch = TaskPatch {
                dependency: Some(on.clone()),
                ..TaskPatch::default()
            };
            ops::update_task(&conn, &id, &patch)?;
            match on {
                Some(dep) => eprintln!("'{id}' now waits for '{dep}'"),
                None => eprintln!("Cleared dependency of '{id}'"),
            }
        }

        Command::Plan {
            budget,
            zone,
            level,
            json,
        } => {
            let budget = budget_or_default(budget, &config)?;
            let pool = load_pool(&conn, &config)?;
            let zones = ops::list_zones(&conn)?;
            let filter = SessionFilter { zone, level };
            match scheduler::build_queue(&pool, &zones, &filter, budget) {
                BuildOutcome::Ready(queue) if json => {
                    println!("{}", serde_json::to_string_pretty(&queue)?);
                }
                BuildOutcome::Ready(queue) => print!("{}", output::format_queue(&queue, budget)),
                BuildOutcome::AllClear => eprintln!("All clear: nothing pending here."),
                BuildOutcome::NothingFits => {
                    eprintln!("Nothing fits in {budget}; try a bigger budget.")
                }
            }
        }

        Command::Session { action } => run_session(&conn, &config, action)?,

        Command::Run => tui::run(&conn, config.reset_hour())?,

        Command::Progress { json } => {
            let pool = load_pool(&conn, &config)?;
            let zones = ops::list_zones(&conn)?;
            let progress = output::progress(&pool, &zones);
            if json {
                println!("{}", serde_json::to_string_pretty(&progress)?);
            } else {
                print!("{}", output::format_progress(&progress));
            }
        }

        Command::Export { path } => {
            let backup = transfer::export(&conn)?;
            match path {
                Some(p) => {
                    let file = std::fs::File::create(&p)
                        .with_context(|| format!("failed to create {p}"))?;
                    transfer::write_backup(&backup, file)?;
                    eprintln!("Exported {} task(s) to {p}", backup.inventory.len());
                }
                None => transfer::write_backup(&backup, std::io::stdout().lock())?,
            }
        }

        Command::Import { path, replace } => {
            let backup = transfer::read_backup(Path::new(&path))?;
            let report = transfer::import(&conn, backup, replace)?;
            eprintln!(
                "Imported {} task(s), {} new zone(s)",
                report.tasks, report.zones_created
            );
            if report.dangling_dependencies > 0 {
                eprintln!(
                    "Dropped {} dependency reference(s) to tasks not in the backup",
                    report.dangling_dependencies
                );
            }
            if report.skipped > 0 {
                eprintln!("Skipped {} task(s) without a label", report.skipped);
            }
        }
    }

    Ok(())
}

fn run_session(conn: &Connection, config: &Config, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::Start {
            budget,
            zone,
            level,
        } => {
            if ops::load_session(conn)?.is_some() {
                bail!("a session is already in progress; finish or cancel it first");
            }
            let budget = budget_or_default(budget, config)?;
            let pool = load_pool(conn, config)?;
            let zones = ops::list_zones(conn)?;
            let filter = SessionFilter { zone, level };
            match scheduler::build_queue(&pool, &zones, &filter, budget) {
                BuildOutcome::Ready(queue) => {
                    let session = Session::new(queue, filter, budget, Utc::now());
                    ops::save_session(conn, &session)?;
                    log::info!(
                        "session started: {} task(s), {}m, budget {budget}",
                        session.queue.len(),
                        session.total_minutes()
                    );
                    print!("{}", output::format_queue(&session.queue, budget));
                }
                BuildOutcome::AllClear => eprintln!("All clear: nothing pending here."),
                BuildOutcome::NothingFits => {
                    eprintln!("Nothing fits in {budget}; try a bigger budget.")
                }
            }
        }

        SessionAction::Status => {
            let pool = load_pool(conn, config)?;
            let session = resume_session(conn, &pool)?;
            print!("{}", output::format_session_status(&session));
        }

        SessionAction::Done { by } => {
            let pool = load_pool(conn, config)?;
            let mut session = resume_session(conn, &pool)?;
            if session.is_finished() {
                report_finished(&session);
                return Ok(());
            }
            let unlocks: Vec<String> = session
                .unlocked_next(&pool)
                .iter()
                .map(|t| t.label.clone())
                .collect();
            let label = session.current().map(|e| e.label.clone());
            let Some(update) = session.complete_current(Utc::now(), by.as_deref()) else {
                bail!("nothing left in this session");
            };
            ops::apply_update(conn, &update)?;
            if let Some(label) = label {
                eprintln!("Done: {label}");
            }
            if !unlocks.is_empty() {
                eprintln!("Unlocked: {}", unlocks.join(", "));
            }
            persist_session(conn, &session)?;
        }

        SessionAction::Skip => {
            let pool = load_pool(conn, config)?;
            let mut session = resume_session(conn, &pool)?;
            if session.is_finished() {
                report_finished(&session);
                return Ok(());
            }
            let label = session.current().map(|e| e.label.clone());
            if session.skip_current().is_none() {
                bail!("nothing left in this session");
            }
            if let Some(label) = label {
                eprintln!("Skipped: {label}");
            }
            persist_session(conn, &session)?;
        }

        SessionAction::Swap => {
            let pool = load_pool(conn, config)?;
            let zones = ops::list_zones(conn)?;
            let mut session = resume_session(conn, &pool)?;
            match session.swap_current(&pool, &zones) {
                SwapOutcome::Swapped { replaced, with } => {
                    eprintln!(
                        "Swapped '{}' ({}m) for '{}' ({}m)",
                        replaced.label, replaced.duration, with.label, with.duration
                    );
                }
                SwapOutcome::NoAlternative => eprintln!("No other task fits; keeping this one."),
            }
            persist_session(conn, &session)?;
        }

        SessionAction::Finish { skip_rest } => {
            let pool = load_pool(conn, config)?;
            let mut session = resume_session(conn, &pool)?;
            let skipped = session.finish(skip_rest);
            log::info!("session finished early, {} task(s) marked skipped", skipped.len());
            persist_session(conn, &session)?;
        }

        SessionAction::Cancel => {
            if ops::load_session(conn)?.is_none() {
                bail!("no session in progress");
            }
            ops::clear_session(conn)?;
            eprintln!("Session cancelled");
        }
    }
    Ok(())
}
