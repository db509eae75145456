use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame,
};

use crate::audio::analyzer::BAND_EDGES_HZ;
use crate::audio::player::LOUDNESS_FLOOR_DB;
use crate::types::{SpectrumBins, NUM_SPECTRUM_BANDS};

/// Full-scale value of a spectrum bar
const SPECTRUM_FULL_SCALE: f32 = 4.0;

/// Render the loudness meter ("level") from the running average in dB
pub fn render_level_meter(frame: &mut Frame, area: Rect, avg_intensity: f32, width: usize) {
    let level = avg_intensity / LOUDNESS_FLOOR_DB;
    let line = Line::from(vec![
        Span::raw("  level  "),
        Span::styled(create_meter_string(level, width), meter_style(level)),
        Span::raw(format!(" {:5.1} dB", avg_intensity - LOUDNESS_FLOOR_DB)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render the playback position bar
pub fn render_time_bar(frame: &mut Frame, area: Rect, progress: f32, time: &str, width: usize) {
    let line = Line::from(vec![
        Span::raw("  time   "),
        Span::styled(
            create_meter_string(progress, width),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw(format!(" {}", time)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render one bar per spectrum band, lowest band first
pub fn render_spectrum(frame: &mut Frame, area: Rect, bins: &SpectrumBins, width: usize) {
    let lines: Vec<Line> = (0..NUM_SPECTRUM_BANDS)
        .map(|band| {
            let level = bins.data[band] / SPECTRUM_FULL_SCALE;
            Line::from(vec![
                Span::raw(format!("  {:>5} ", band_label(band))),
                Span::styled(create_meter_string(level, width), meter_style(level)),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), area);
}

/// Short label for a band, e.g. "2k"
fn band_label(band: usize) -> String {
    let hz = BAND_EDGES_HZ[band];
    if hz >= 1000.0 {
        format!("{}k", (hz / 1000.0) as u32)
    } else {
        format!("{}", hz as u32)
    }
}

fn meter_style(level: f32) -> Style {
    if level > 0.9 {
        Style::default().fg(Color::Red)
    } else if level > 0.7 {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::Green)
    }
}

/// Create a simple text-based meter
pub fn create_meter_string(level: f32, width: usize) -> String {
    let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    let filled = (level * width as f32) as usize;

    let mut meter = String::with_capacity(width * 3);

    for i in 0..width {
        if i < filled {
            meter.push('▓');
        } else {
            meter.push('░');
        }
    }

    meter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meter_string_fill() {
        assert_eq!(create_meter_string(0.0, 4), "░░░░");
        assert_eq!(create_meter_string(0.5, 4), "▓▓░░");
        assert_eq!(create_meter_string(1.0, 4), "▓▓▓▓");
    }

    #[test]
    fn test_meter_string_clamps() {
        assert_eq!(create_meter_string(2.0, 3), "▓▓▓");
        assert_eq!(create_meter_string(-1.0, 3), "░░░");
        assert_eq!(create_meter_string(f32::NAN, 3), "░░░");
    }

    #[test]
    fn test_band_labels() {
        assert_eq!(band_label(0), "60");
        assert_eq!(band_label(1), "250");
        assert_eq!(band_label(2), "2k");
        assert_eq!(band_label(3), "6k");
    }
}
