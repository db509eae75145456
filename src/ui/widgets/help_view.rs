use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

/// Render the help view
pub fn render_help_view(frame: &mut Frame, area: Rect) {
    let help_text = vec![
        Line::from(""),
        Line::from("  rtplay - real-time audio player"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Loading", Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from("    l                Load a file (from No file or Stopped)"),
        Line::from("    d                Load the default file"),
        Line::from("    f                Type a file path"),
        Line::from("    Enter / Esc      Load the typed path / cancel"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Playback", Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from("    p                Play"),
        Line::from("    s                Stop"),
        Line::from("    e                Toggle lowpass filter"),
        Line::from(""),
        Line::from(vec![
            Span::styled("  Other", Style::default().add_modifier(Modifier::BOLD)),
        ]),
        Line::from("    ?                Toggle this help"),
        Line::from("    q or Ctrl+c      Quit"),
        Line::from(""),
        Line::from("  Press ? to close"),
    ];

    let paragraph = Paragraph::new(help_text).alignment(Alignment::Left);

    frame.render_widget(paragraph, area);
}
