use std::collections::HashSet;

use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Gauge, List, ListItem, Paragraph, Wrap};

use super::app::App;

pub fn render(frame: &mut Frame, app: &App) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(3),
        ])
        .split(frame.area());

    render_progress(frame, app, rows[0]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[1]);
    render_queue(frame, app, body[0]);
    render_current(frame, app, body[1]);

    render_footer(frame, app, rows[2]);
}

fn render_progress(frame: &mut Frame, app: &App, area: Rect) {
    let summary = app.session.summary();
    let title = format!(
        " Session: {} · {}m of {}m done ",
        app.session.budget, summary.completed_minutes, summary.planned_minutes
    );
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title(title))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(summary.percent.min(100) as u16);
    frame.render_widget(gauge, area);
}

fn render_queue(frame: &mut Frame, app: &App, area: Rect) {
    let done: HashSet<&str> = app.session.completed.iter().map(String::as_str).collect();
    let skipped: HashSet<&str> = app.session.skipped.iter().map(String::as_str).collect();

    let items: Vec<ListItem> = app
        .session
        .queue
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let (icon, style) = if done.contains(entry.id.as_str()) {
                ("x", Style::default().fg(Color::DarkGray))
            } else if skipped.contains(entry.id.as_str()) {
                ("-", Style::default().fg(Color::Yellow))
            } else if i == app.session.cursor {
                (">", Style::default().bold())
            } else {
                (" ", Style::default())
            };
            let line = Line::from(vec![
                Span::styled(format!("{icon} "), style),
                Span::styled(format!("{:>3}m ", entry.duration), Style::default().fg(Color::Cyan)),
                Span::styled(entry.label.clone(), style),
                Span::styled(format!("  {}", entry.zone), Style::default().fg(Color::DarkGray)),
            ]);
            let item = ListItem::new(line);
            if i == app.session.cursor {
                item.style(Style::default().bg(Color::DarkGray))
            } else {
                item
            }
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(" Queue "));
    frame.render_widget(list, area);
}

fn render_current(frame: &mut Frame, app: &App, area: Rect) {
    let mut lines: Vec<Line> = Vec::new();
    if app.finished || app.session.is_finished() {
        let s = app.session.summary();
        lines.push(Line::from(Span::styled("All done for now.", Style::default().bold())));
        lines.push(Line::from(""));
        lines.push(Line::from(format!("Completed: {}", s.completed)));
        lines.push(Line::from(format!("Skipped:   {}", s.skipped)));
        lines.push(Line::from(format!("Left:      {}", s.remaining)));
        lines.push(Line::from(format!(
            "Time:      {}m of {}m",
            s.completed_minutes, s.planned_minutes
        )));
    } else if let Some(entry) = app.session.current() {
        lines.push(Line::from(Span::styled(entry.label.clone(), Style::default().bold())));
        lines.push(Line::from(format!("{} · {} · {}m", entry.zone, entry.priority, entry.duration)));
        if let Some(image) = app.current_task().and_then(|t| t.image_path.as_deref()) {
            lines.push(Line::from(format!("Image: {image}")));
        }
        let unlocks = app.unlocks();
        if !unlocks.is_empty() {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Unlocks next:",
                Style::default().fg(Color::Green),
            )));
            for task in unlocks {
                lines.push(Line::from(format!("  {} ({}m)", task.label, task.duration)));
            }
        }
    }

    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Now "))
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, app: &App, area: Rect) {
    let keys = if app.finished {
        "q quit"
    } else {
        "d/Enter done  s skip  w swap  f finish  q quit"
    };
    let mut spans = vec![Span::styled(keys, Style::default().fg(Color::DarkGray))];
    if let Some(message) = &app.message {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(message.clone(), Style::default().fg(Color::Yellow)));
    }
    let footer = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    frame.render_widget(footer, area);
}
