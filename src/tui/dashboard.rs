use crate::tui::app::{App, Phase, RunState, fmt_bytes, fmt_count};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
};

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(title)
}

fn heading(text: &str) -> Line<'_> {
    Line::from(Span::styled(text, Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)))
}

pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),  // Header
            Constraint::Length(4),  // Progress
            Constraint::Length(9),  // Snapshot
            Constraint::Min(6),     // Logs
            Constraint::Length(3),  // Controls
        ])
        .split(f.area());

    render_header(f, chunks[0], app);
    render_progress(f, chunks[1], app);
    render_snapshot(f, chunks[2], app);
    render_logs(f, chunks[3], app);
    render_controls(f, chunks[4], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let bold = |c: Color| Style::default().fg(c).add_modifier(Modifier::BOLD);
    let state = match &app.run_state {
        RunState::Running => Span::styled(" POLLING ", bold(Color::Green)),
        RunState::Paused => Span::styled(" PAUSED ", bold(Color::Yellow)),
        RunState::Finished => Span::styled(" STOPPED ", bold(Color::Cyan)),
        RunState::Error(_) => Span::styled(" ERROR ", bold(Color::Red)),
        RunState::Idle => Span::styled(" IDLE ", Style::default().fg(Color::DarkGray)),
    };

    let latest = app
        .last_update
        .map(|dt| format!("  latest update {}", dt.format("%d/%m/%Y %H:%M")))
        .unwrap_or_default();

    let header = Paragraph::new(Line::from(vec![
        Span::styled(" GIS COVID Poller ", bold(Color::Cyan)),
        state,
        Span::styled(format!(" cycle {}", app.cycle), Style::default().fg(Color::White)),
        Span::styled(latest, Style::default().fg(Color::Gray)),
    ]))
    .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));
    f.render_widget(header, area);
}

fn render_progress(f: &mut Frame, area: Rect, app: &App) {
    let block = panel(" Progress ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner);

    let (ratio, label, color) = match app.phase {
        Phase::Downloading => {
            let name = app.dl_resource.map(|r| r.file_name()).unwrap_or("payload");
            // unknown length: show bytes without a ratio
            let ratio = if app.dl_total > 0 { app.dl_read as f64 / app.dl_total as f64 } else { 0.0 };
            (ratio, format!("{}: {} / {}", name, fmt_bytes(app.dl_read), fmt_bytes(app.dl_total)), Color::Green)
        }
        Phase::Waiting => {
            let left = app.wait_remaining().as_secs();
            (app.wait_ratio(), format!("Next check in {}m {:02}s", left / 60, left % 60), Color::Cyan)
        }
        Phase::Checking => (0.0, "Checking config.json".into(), Color::Green),
        Phase::Done => (1.0, "Stopped".into(), Color::DarkGray),
    };
    f.render_widget(
        Gauge::default().label(label).ratio(ratio.min(1.0)).gauge_style(Style::default().fg(color)),
        rows[0],
    );

    let totals = format!(
        "Snapshots written: {}   no new data: {}   failed checks: {}",
        app.written, app.skipped, app.failures
    );
    let style = if app.failures > 0 { Color::Yellow } else { Color::White };
    f.render_widget(Paragraph::new(Span::styled(totals, Style::default().fg(style))), rows[1]);
}

fn render_snapshot(f: &mut Frame, area: Rect, app: &App) {
    let block = panel(" Last Snapshot ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some((path, summary)) = &app.last_snapshot else {
        f.render_widget(
            Paragraph::new(Span::styled("  Nothing written yet", Style::default().fg(Color::DarkGray))),
            inner,
        );
        return;
    };

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(inner);

    let left = vec![
        heading(" Snapshot"),
        Line::from(format!("  File:           {}", path.display())),
        Line::from(format!("  Updated at:     {}", summary.updated_at.format("%Y-%m-%d %H:%M"))),
        Line::from(format!("  Municipalities: {}", summary.rows)),
        Line::from(format!("  Positivi:       {}", fmt_count(summary.total_cases))),
        Line::from(format!("  Unnamed codes:  {}", summary.unknown)),
    ];
    f.render_widget(Paragraph::new(left), cols[0]);

    let mut right = vec![heading(" Highest positivi per 1000")];
    right.extend(summary.top.iter().map(|(id, name, positivi, rate)| {
        Line::from(format!("  {} {:<24.24} {:>7} {:>9.4}", id, name, positivi, rate))
    }));
    f.render_widget(Paragraph::new(right), cols[1]);
}

fn render_logs(f: &mut Frame, area: Rect, app: &App) {
    let block = panel("").title(format!(" Logs ({}) ", app.logs.len()));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let height = inner.height as usize;
    let start = app.log_scroll.min(app.logs.len().saturating_sub(height));

    let lines: Vec<Line> = app
        .logs
        .iter()
        .skip(start)
        .take(height)
        .map(|msg| {
            let color = if msg.contains("ERROR") {
                Color::Red
            } else if msg.starts_with("WARNING") {
                Color::Yellow
            } else if msg.starts_with("Snapshot complete") {
                Color::Green
            } else {
                Color::Gray
            };
            Line::from(Span::styled(format!("  {}", msg), Style::default().fg(color)))
        })
        .collect();

    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

fn render_controls(f: &mut Frame, area: Rect, app: &App) {
    let controls = match app.run_state {
        RunState::Running => " [P] Pause  [S] Stop  [Q] Quit  [↑↓] Scroll logs ",
        RunState::Paused => " [R] Resume  [S] Stop  [Q] Quit  [↑↓] Scroll logs ",
        RunState::Finished | RunState::Error(_) => " [Q] Quit  [↑↓] Scroll logs ",
        RunState::Idle => "",
    };
    f.render_widget(
        Paragraph::new(Span::styled(controls, Style::default().fg(Color::DarkGray))).block(panel("")),
        area,
    );
}
