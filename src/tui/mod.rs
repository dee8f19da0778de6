pub mod app;
pub mod config_screen;
pub mod dashboard;

use crate::config::Config;
use crate::events::{ChannelSink, PipelineControl, UiEvent};
use crate::fetch::{PayloadSource, RemoteSource};
use crate::pipeline::{self, RunMode};
use anyhow::Result;
use app::{App, RunState, Screen};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io;
use std::sync::{Arc, mpsc};
use std::time::Duration;

type Term = Terminal<CrosstermBackend<io::Stdout>>;

/// Run the dashboard, starting from `initial` on the config screen.
pub fn run(initial: Config) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(&initial);
    let result = main_loop(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;

    result
}

fn main_loop(terminal: &mut Term, app: &mut App) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|f| match app.screen {
            Screen::Config => config_screen::render(f, app),
            Screen::Dashboard => dashboard::render(f, app),
        })?;

        let pending: Vec<UiEvent> = app
            .event_rx
            .as_ref()
            .map(|rx| rx.try_iter().collect())
            .unwrap_or_default();
        for ev in pending {
            app.handle_event(ev);
        }

        // 50ms keeps the wait countdown moving without spinning
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else { continue };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            stop_poller(app);
            break;
        }

        match app.screen {
            Screen::Config => handle_config_key(app, key),
            Screen::Dashboard => handle_dashboard_key(app, key),
        }
    }
    Ok(())
}

fn stop_poller(app: &App) {
    if let Some(control) = &app.control {
        control.cancel();
    }
}

// ── Config screen ───────────────────────────────────────────────────────────

fn handle_config_key(app: &mut App, key: KeyEvent) {
    if app.editing {
        edit_selected_field(app, key.code);
        return;
    }

    let last = app.total_items() - 1;
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Up => app.selected = app.selected.saturating_sub(1),
        KeyCode::Down => app.selected = (app.selected + 1).min(last),
        KeyCode::Tab => app.selected = (app.selected + 1) % app.total_items(),
        KeyCode::BackTab => app.selected = app.selected.checked_sub(1).unwrap_or(last),
        KeyCode::Enter if app.is_on_start_button() => start_polling(app),
        KeyCode::Enter => {
            app.editing = true;
            app.edit_cursor = app.fields[app.selected].value.chars().count();
        }
        KeyCode::F(5) => start_polling(app),
        _ => {}
    }
}

/// Line editing on the selected field. The cursor counts characters, not bytes.
fn edit_selected_field(app: &mut App, code: KeyCode) {
    let value = &mut app.fields[app.selected].value;
    let len = value.chars().count();
    let cursor = app.edit_cursor.min(len);
    let byte_at = |s: &str, i: usize| s.char_indices().nth(i).map_or(s.len(), |(b, _)| b);

    app.edit_cursor = match code {
        KeyCode::Enter | KeyCode::Esc => {
            app.editing = false;
            cursor
        }
        KeyCode::Char(c) => {
            value.insert(byte_at(value, cursor), c);
            cursor + 1
        }
        KeyCode::Backspace if cursor > 0 => {
            value.remove(byte_at(value, cursor - 1));
            cursor - 1
        }
        KeyCode::Delete if cursor < len => {
            value.remove(byte_at(value, cursor));
            cursor
        }
        KeyCode::Left => cursor.saturating_sub(1),
        KeyCode::Right => (cursor + 1).min(len),
        KeyCode::Home => 0,
        KeyCode::End => len,
        _ => cursor,
    };
}

fn start_polling(app: &mut App) {
    let config = match app.build_config() {
        Ok(config) => config,
        Err(err) => {
            app.validation_error = Some(err);
            return;
        }
    };
    app.validation_error = None;

    let (tx, rx) = mpsc::channel::<UiEvent>();
    let control = Arc::new(PipelineControl::new());
    let sink = ChannelSink::new(tx.clone(), control.clone());

    app.event_rx = Some(rx);
    app.control = Some(control);
    app.screen = Screen::Dashboard;
    app.run_state = RunState::Running;
    app.add_log(format!("Polling {} every {}s", config.base_url, config.poll_interval.as_secs()));

    std::thread::spawn(move || {
        let source = RemoteSource::new(&config.base_url, config.request_timeout);
        let mode = RunMode::Repeat {
            interval: config.poll_interval,
            max_cycles: None,
        };
        poll_worker(&config, &source, mode, &*sink, &tx);
    });
}

/// Body of the dashboard's worker thread. `pipeline::run` reports `Finished`
/// itself, so only a failed run adds an event here.
fn poll_worker(
    config: &Config,
    source: &dyn PayloadSource,
    mode: RunMode,
    sink: &ChannelSink,
    tx: &mpsc::Sender<UiEvent>,
) {
    if let Err(e) = pipeline::run(config, source, mode, sink) {
        let _ = tx.send(UiEvent::Error(format!("{:#}", e)));
    }
}

// ── Dashboard ───────────────────────────────────────────────────────────────

fn handle_dashboard_key(app: &mut App, key: KeyEvent) {
    let max_scroll = app.logs.len().saturating_sub(1);
    match key.code {
        KeyCode::Char('q') => {
            stop_poller(app);
            app.should_quit = true;
        }
        KeyCode::Char('s') if matches!(app.run_state, RunState::Running | RunState::Paused) => {
            // stops after the current download; the worker reports Finished
            stop_poller(app);
            app.add_log("Stopping...".into());
        }
        KeyCode::Char('p') if app.run_state == RunState::Running => {
            if let Some(control) = &app.control {
                control.pause();
            }
            app.run_state = RunState::Paused;
        }
        KeyCode::Char('r') if app.run_state == RunState::Paused => {
            if let Some(control) = &app.control {
                control.resume();
            }
            app.run_state = RunState::Running;
        }
        KeyCode::Up => app.log_scroll = app.log_scroll.saturating_sub(1),
        KeyCode::Down => app.log_scroll = (app.log_scroll + 1).min(max_scroll),
        KeyCode::PageUp => app.log_scroll = app.log_scroll.saturating_sub(10),
        KeyCode::PageDown => app.log_scroll = (app.log_scroll + 10).min(max_scroll),
        _ => {}
    }
}
