use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::app::{App, MessageType, State};
use crate::ui::widgets::{
    render_help_view, render_level_meter, render_spectrum, render_status_bar, render_time_bar,
};

/// Width of the meter bars in characters
const METER_WIDTH: usize = 40;

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App) {
    // If help is shown, render help view instead of normal UI
    if app.show_help {
        render_help_view(frame, frame.area());
        return;
    }

    // Check if we have a message to display
    let has_message = app.message.is_some();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Line break
            Constraint::Length(1), // Level meter
            Constraint::Length(1), // Time bar
            Constraint::Length(1), // Line break
            Constraint::Length(4), // Spectrum
            Constraint::Length(1), // Line break
            Constraint::Length(1), // Device counters
            Constraint::Length(1), // Line break
            Constraint::Length(if has_message { 3 } else { 0 }), // Message bar
            Constraint::Min(1),    // Options / prompt
        ])
        .split(frame.area());

    let state = app.engine.state();
    let file_name = app.file().map(|f| f.name());

    render_status_bar(
        frame,
        chunks[0],
        app.state(),
        app.state_str(),
        file_name.as_deref(),
        app.filter_enabled(),
    );

    render_level_meter(frame, chunks[2], state.avg_intensity(), METER_WIDTH);
    render_time_bar(
        frame,
        chunks[3],
        state.progress(),
        &app.time_str(),
        METER_WIDTH,
    );
    render_spectrum(frame, chunks[5], &app.spectrum, METER_WIDTH);
    render_counters(frame, chunks[7], state.underruns(), state.write_errors());

    if let Some(ref msg) = app.message {
        let (color, prefix) = match msg.msg_type {
            MessageType::Info => (Color::Cyan, "ℹ "),
            MessageType::Warning => (Color::Yellow, "⚠ "),
            MessageType::Error => (Color::Red, "✖ "),
        };

        let text = format!("{}{}", prefix, msg.text);
        let message_widget = Paragraph::new(Line::from(text))
            .style(Style::default().fg(color).add_modifier(Modifier::BOLD))
            .block(Block::default().borders(Borders::ALL));

        frame.render_widget(message_widget, chunks[9]);
    }

    if app.state() == State::FilenameInput {
        render_filename_prompt(frame, chunks[10], &app.filename_input);
    } else {
        render_options(frame, chunks[10], app);
    }
}

/// Device error counters for the current playback
fn render_counters(frame: &mut Frame, area: Rect, underruns: usize, write_errors: usize) {
    let style = if underruns + write_errors > 0 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let text = format!("  underruns: {}; write errors: {}", underruns, write_errors);

    frame.render_widget(Paragraph::new(text).style(style), area);
}

/// Keys that do something in the current state
fn render_options(frame: &mut Frame, area: Rect, app: &App) {
    let options: &[(&str, &str)] = match app.state() {
        State::NoFile => &[("l", "load file")],
        State::FileLoad => &[("d", "default file"), ("f", "enter path")],
        State::FilenameInput => &[],
        State::Stopped => &[("p", "play"), ("l", "load file"), ("e", "filter")],
        State::Playing => &[("s", "stop"), ("e", "filter")],
    };

    let mut spans = vec![Span::raw("  ")];
    for (key, label) in options.iter().chain([("q", "quit"), ("?", "help")].iter()) {
        spans.push(Span::styled(
            format!("[{}]", key),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {}  ", label)));
    }

    let mut lines = vec![Line::from(spans)];
    if app.state() == State::FileLoad {
        let default = app
            .default_file()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none configured)".to_string());
        lines.push(Line::from(format!("  default file: {}", default)));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

/// Path entry line with a block cursor
fn render_filename_prompt(frame: &mut Frame, area: Rect, input: &str) {
    let lines = vec![
        Line::from(vec![
            Span::raw("  path: "),
            Span::styled(input.to_string(), Style::default().fg(Color::Cyan)),
            Span::styled("█", Style::default().fg(Color::Cyan)),
        ]),
        Line::from(Span::styled(
            "  [Enter] load  [Esc] cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    frame.render_widget(Paragraph::new(lines), area);
}
