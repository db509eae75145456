use crossterm::event::{self, Event, KeyCode, KeyEvent as TermKeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;

use crate::app::{App, KeyEvent, State};

/// Handle keyboard input
pub fn handle_input(app: &mut App) -> anyhow::Result<()> {
    // Short poll so the meters keep refreshing while idle
    if event::poll(Duration::from_millis(16))? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                handle_key_event(app, key);
            }
        }
    }

    Ok(())
}

/// Handle a key event
fn handle_key_event(app: &mut App, key: TermKeyEvent) {
    // Ctrl+C - quit from anywhere
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.handle_event(KeyEvent::Quit);
        return;
    }

    if app.state() == State::FilenameInput {
        handle_filename_key(app, key);
        return;
    }

    match key.code {
        // ? - toggle help
        KeyCode::Char('?') => {
            app.toggle_help();
        }

        KeyCode::Char(c) => {
            app.handle_event(KeyEvent::from_char(c));
        }

        _ => {}
    }
}

/// Edit the path being typed
fn handle_filename_key(app: &mut App, key: TermKeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit_filename(),
        KeyCode::Esc => app.cancel_filename_input(),
        KeyCode::Backspace => {
            app.filename_input.pop();
        }
        KeyCode::Char(c) => app.filename_input.push(c),
        _ => {}
    }
}
