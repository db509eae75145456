use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};

use crate::app::State;

/// Render the status bar
pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    state: State,
    state_text: &str,
    file_name: Option<&str>,
    filter_enabled: bool,
) {
    // Simple format: "state: {state}; file: {name}; filter: {on|off}"
    let file_text = file_name.unwrap_or("-");
    let filter_text = if filter_enabled { "on" } else { "off" };

    // Add 2 spaces of left padding
    let status_text = format!(
        "  state: {}; file: {}; filter: {}",
        state_text.to_lowercase(),
        file_text,
        filter_text
    );

    let color = match state {
        State::Playing => Color::Green,
        State::NoFile => Color::Gray,
        _ => Color::White,
    };

    let status_widget = Paragraph::new(status_text)
        .style(Style::default().fg(color))
        .alignment(Alignment::Left);

    frame.render_widget(status_widget, area);
}
