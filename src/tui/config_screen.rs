use crate::tui::app::App;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};

const LABEL_WIDTH: usize = 20;

fn bordered(color: Color) -> Block<'static> {
    Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))
}

pub fn render(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(app.fields.len() as u16 + 6),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(f.area());

    let title = Paragraph::new(Line::from(vec![
        Span::styled(" GIS COVID Poller ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::styled(" Piemonte tile data", Style::default().fg(Color::DarkGray)),
    ]))
    .block(bordered(Color::Cyan));
    f.render_widget(title, chunks[0]);

    render_form(f, chunks[1], app);
    render_status(f, chunks[2], app);

    let help = if app.editing {
        " Type to edit │ ←→ Home End: Move │ Enter/Esc: Done "
    } else {
        " ↑↓: Navigate │ Enter: Edit/Start │ F5: Start │ q: Quit "
    };
    f.render_widget(
        Paragraph::new(Span::styled(help, Style::default().fg(Color::DarkGray))).block(bordered(Color::DarkGray)),
        chunks[3],
    );
}

fn render_form(f: &mut Frame, area: Rect, app: &App) {
    let block = bordered(Color::DarkGray).title(" Settings ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut constraints = vec![Constraint::Length(1); app.fields.len() + 2];
    constraints.push(Constraint::Min(0));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(constraints)
        .split(inner);

    for (i, field) in app.fields.iter().enumerate() {
        let selected = app.selected == i;
        let editing = selected && app.editing;

        let (label_style, value_style) = match (selected, editing) {
            (_, true) => (
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::White).bg(Color::DarkGray),
            ),
            (true, false) => (
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::White),
            ),
            _ => (Style::default().fg(Color::Gray), Style::default().fg(Color::Gray)),
        };

        let value = if editing {
            let mut shown: String = field.value.chars().take(app.edit_cursor).collect();
            shown.push('▏');
            shown.extend(field.value.chars().skip(app.edit_cursor));
            shown
        } else {
            field.value.clone()
        };

        let line = Line::from(vec![
            Span::styled(format!("{:>w$} │ ", field.label, w = LABEL_WIDTH), label_style),
            Span::styled(value, value_style),
            Span::styled(format!("  {}", field.hint), Style::default().fg(Color::DarkGray)),
        ]);
        f.render_widget(Paragraph::new(line), rows[i]);
    }

    let on_button = app.is_on_start_button();
    let button = Line::from(vec![
        Span::raw(" ".repeat(LABEL_WIDTH + 1)),
        Span::styled(
            format!("{}[ Start Polling ]", if on_button { "▶ " } else { "  " }),
            if on_button {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::DarkGray)
            },
        ),
    ]);
    // one spacer row between the fields and the button
    f.render_widget(Paragraph::new(button), rows[app.fields.len() + 1]);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let line = match &app.validation_error {
        Some(err) => Span::styled(format!(" ⚠ {}", err), Style::default().fg(Color::Red)),
        None => Span::styled(
            " Snapshots are written once per dashboard update.",
            Style::default().fg(Color::DarkGray),
        ),
    };
    f.render_widget(Paragraph::new(line).block(bordered(Color::DarkGray)), area);
}
