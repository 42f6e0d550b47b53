mod app;
mod event;
mod view;

use std::io;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self as ct_event, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::prelude::*;
use rusqlite::Connection;

pub use app::App;
use event::KeyAction;

/// Walk the stored session in a full-screen view. Quitting leaves the
/// session on record so it can be resumed.
pub fn run(conn: &Connection, reset_hour: u32) -> Result<()> {
    let mut app = App::new(conn, reset_hour)?;

    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut terminal, &mut app, conn);

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    conn: &Connection,
) -> Result<()> {
    let poll_duration = Duration::from_millis(250);

    loop {
        terminal.draw(|frame| view::render(frame, app))?;

        if !ct_event::poll(poll_duration)? {
            continue;
        }
        let Event::Key(key) = ct_event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let result = match event::handle_key(key, app.finished) {
            KeyAction::Quit => return Ok(()),
            KeyAction::Complete => app.complete(conn),
            KeyAction::Skip => app.skip(conn),
            KeyAction::Swap => app.swap(conn),
            KeyAction::Finish => app.finish(conn),
            KeyAction::Continue => Ok(()),
        };
        if let Err(e) = result {
            log::error!("session view: {e:#}");
            app.message = Some(format!("error: {e:#}"));
        }
    }
}
