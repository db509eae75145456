use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{LoadError, PlaybackEngine, PlaybackOutcome, SampleBuffer};
use crate::types::SpectrumBins;

/// Message type for user notifications
#[derive(Debug, Clone)]
pub enum MessageType {
    Info,
    Warning,
    Error,
}

/// User notification message
#[derive(Debug, Clone)]
pub struct Message {
    pub text: String,
    pub msg_type: MessageType,
    pub timestamp: Instant,
}

/// Application state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    NoFile,
    FileLoad,
    FilenameInput,
    Stopped,
    Playing,
}

/// Commands from the keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEvent {
    Load,
    LoadDefault,
    EnterPath,
    Play,
    Stop,
    ToggleFilter,
    Quit,
    Unrecognized,
}

impl KeyEvent {
    /// Map a command key to its event
    pub fn from_char(c: char) -> Self {
        match c {
            'l' => KeyEvent::Load,
            'd' => KeyEvent::LoadDefault,
            'f' => KeyEvent::EnterPath,
            'p' => KeyEvent::Play,
            's' => KeyEvent::Stop,
            'e' => KeyEvent::ToggleFilter,
            'q' => KeyEvent::Quit,
            _ => KeyEvent::Unrecognized,
        }
    }
}

/// A decoded file ready to play
#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub buffer: Arc<SampleBuffer>,
}

impl LoadedFile {
    /// File name for display
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Main application state
pub struct App {
    /// Playback and analysis threads
    pub engine: PlaybackEngine,

    /// Current state
    state: State,

    /// Most recently loaded file
    file: Option<LoadedFile>,

    /// File loaded by the "default file" command
    default_file: Option<PathBuf>,

    /// Cleared by Quit
    running: bool,

    /// Path being typed in FilenameInput
    pub filename_input: String,

    /// Last spectrum received from the analysis thread
    pub spectrum: SpectrumBins,

    /// Current message to display (if any)
    pub message: Option<Message>,

    /// Message display duration
    pub message_duration: Duration,

    /// Whether to show the help view
    pub show_help: bool,
}

impl App {
    pub fn new(engine: PlaybackEngine, default_file: Option<PathBuf>) -> Self {
        Self {
            engine,
            state: State::NoFile,
            file: None,
            default_file,
            running: true,
            filename_input: String::new(),
            spectrum: SpectrumBins::zeroed(),
            message: None,
            message_duration: Duration::from_secs(3),
            show_help: false,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// The loaded file, if the current state has one
    pub fn file(&self) -> Option<&LoadedFile> {
        match self.state {
            State::Stopped | State::Playing => self.file.as_ref(),
            _ => None,
        }
    }

    pub fn default_file(&self) -> Option<&Path> {
        self.default_file.as_deref()
    }

    /// Apply one command and return the resulting state
    pub fn handle_event(&mut self, event: KeyEvent) -> State {
        match self.state {
            State::NoFile => self.handle_event_no_file(event),
            State::FileLoad => self.handle_event_file_load(event),
            State::FilenameInput => self.handle_event_filename_input(event),
            State::Stopped => self.handle_event_stopped(event),
            State::Playing => self.handle_event_playing(event),
        }
        self.state
    }

    fn handle_event_no_file(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Load => self.state = State::FileLoad,
            _ => self.handle_event_generic(event),
        }
    }

    fn handle_event_file_load(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::LoadDefault => {
                if let Err(e) = self.load_audio_file(None) {
                    self.show_error(format!("Failed to load default file: {}", e));
                }
            }
            KeyEvent::EnterPath => {
                self.filename_input.clear();
                self.state = State::FilenameInput;
            }
            _ => self.handle_event_generic(event),
        }
    }

    fn handle_event_filename_input(&mut self, event: KeyEvent) {
        // Letters are part of the path here; the UI routes them to
        // `filename_input` and only Quit (Ctrl+C) reaches this handler
        if event == KeyEvent::Quit {
            self.handle_event_generic(event);
        }
    }

    fn handle_event_stopped(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Play => self.play_audio_file(),
            KeyEvent::Load => self.state = State::FileLoad,
            KeyEvent::ToggleFilter => self.toggle_filter(),
            _ => self.handle_event_generic(event),
        }
    }

    fn handle_event_playing(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Stop => self.stop_playback(),
            KeyEvent::ToggleFilter => self.toggle_filter(),
            _ => self.handle_event_generic(event),
        }
    }

    fn handle_event_generic(&mut self, event: KeyEvent) {
        match event {
            KeyEvent::Quit => self.quit(),
            _ => log::debug!("Ignoring {:?} in state {:?}", event, self.state),
        }
    }

    /// Load `path`, or the configured default file when `None`
    ///
    /// On success the file replaces the current one and the state becomes
    /// Stopped. On failure the state becomes NoFile.
    pub fn load_audio_file(&mut self, path: Option<&Path>) -> Result<LoadedFile, LoadError> {
        if self.state == State::Playing {
            self.stop_playback();
        }

        let Some(path) = path
            .map(Path::to_path_buf)
            .or_else(|| self.default_file.clone())
        else {
            self.state = State::NoFile;
            return Err(LoadError::NoPath);
        };

        match SampleBuffer::load(&path) {
            Ok(buffer) => Ok(self.commit_file(path, buffer)),
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                self.state = State::NoFile;
                Err(e)
            }
        }
    }

    /// Load a path typed by the user. An empty path returns to NoFile.
    pub fn load_user_audio_file(&mut self, input: &str) -> Result<LoadedFile, LoadError> {
        let input = input.trim();
        if input.is_empty() {
            self.state = State::NoFile;
            return Err(LoadError::NoPath);
        }
        self.load_audio_file(Some(Path::new(input)))
    }

    /// Make `buffer` the current file and move to Stopped
    pub fn commit_file(&mut self, path: PathBuf, buffer: SampleBuffer) -> LoadedFile {
        log::info!(
            "Loaded {}: {} ch, {} Hz, {:.1} s",
            path.display(),
            buffer.channels(),
            buffer.sample_rate(),
            buffer.duration_secs()
        );

        let file = LoadedFile {
            path,
            buffer: Arc::new(buffer),
        };
        self.file = Some(file.clone());
        self.engine.reset_stats();
        self.spectrum = SpectrumBins::zeroed();
        self.state = State::Stopped;
        file
    }

    /// Load the path typed so far
    pub fn submit_filename(&mut self) {
        let input = std::mem::take(&mut self.filename_input);
        match self.load_user_audio_file(&input) {
            Ok(file) => self.show_info(format!("Loaded {}", file.name())),
            Err(LoadError::NoPath) => {}
            Err(e) => self.show_error(format!("Failed to load: {}", e)),
        }
    }

    /// Abandon filename entry
    pub fn cancel_filename_input(&mut self) {
        self.filename_input.clear();
        let _ = self.load_user_audio_file("");
    }

    /// Start the playback and analysis threads for the current file
    fn play_audio_file(&mut self) {
        let Some(file) = self.file.as_ref() else {
            self.state = State::NoFile;
            return;
        };

        match self.engine.start(file.buffer.clone()) {
            Ok(()) => {
                log::info!("Playing {}", file.path.display());
                self.state = State::Playing;
            }
            Err(e) => {
                log::error!("Failed to start playback: {:#}", e);
                self.show_error(format!("Failed to start playback: {}", e));
            }
        }
    }

    /// Stop playback, join the threads and clear telemetry
    fn stop_playback(&mut self) {
        if let Err(e) = self.engine.stop() {
            log::error!("Error stopping playback: {:#}", e);
            self.show_error(format!("Error stopping playback: {}", e));
        }
        self.engine.reset_stats();
        self.spectrum = SpectrumBins::zeroed();
        self.state = State::Stopped;
    }

    /// Detect playback that ended on its own. Returns true if the state
    /// changed.
    pub fn update_state(&mut self) -> bool {
        if self.state != State::Playing || self.engine.is_in_progress() {
            return false;
        }

        match self.engine.finish() {
            Ok(Some(PlaybackOutcome::Failed(reason))) => {
                self.show_error(format!("Playback failed: {}", reason));
            }
            Ok(Some(PlaybackOutcome::Finished(summary)))
                if summary.underruns + summary.write_errors > 0 =>
            {
                self.show_warning(format!(
                    "Finished with {} underruns and {} write errors",
                    summary.underruns, summary.write_errors
                ));
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("Error finishing playback: {:#}", e);
                self.show_error(format!("Error finishing playback: {}", e));
            }
        }

        self.state = State::Stopped;
        true
    }

    /// Pull the newest spectrum from the analysis thread
    pub fn update_spectrum(&mut self) {
        if let Some(bins) = self.engine.latest_spectrum() {
            self.spectrum = bins;
        }
    }

    pub fn toggle_filter(&mut self) {
        let state = self.engine.state();
        let enabled = !state.filter_enabled();
        state.set_filter_enabled(enabled);
        log::info!("Lowpass filter {}", if enabled { "on" } else { "off" });
    }

    pub fn filter_enabled(&self) -> bool {
        self.engine.state().filter_enabled()
    }

    /// Clear message if it has expired
    pub fn update_message(&mut self) {
        if let Some(ref msg) = self.message {
            if msg.timestamp.elapsed() > self.message_duration {
                self.message = None;
            }
        }
    }

    /// Show an informational message
    pub fn show_info(&mut self, text: impl Into<String>) {
        self.set_message(text, MessageType::Info);
    }

    /// Show a warning message
    pub fn show_warning(&mut self, text: impl Into<String>) {
        self.set_message(text, MessageType::Warning);
    }

    /// Show an error message
    pub fn show_error(&mut self, text: impl Into<String>) {
        self.set_message(text, MessageType::Error);
    }

    fn set_message(&mut self, text: impl Into<String>, msg_type: MessageType) {
        self.message = Some(Message {
            text: text.into(),
            msg_type,
            timestamp: Instant::now(),
        });
    }

    /// Get state as string
    pub fn state_str(&self) -> &'static str {
        match self.state {
            State::NoFile => "NO FILE",
            State::FileLoad => "LOAD",
            State::FilenameInput => "ENTER PATH",
            State::Stopped => "STOPPED",
            State::Playing => "PLAYING",
        }
    }

    /// Elapsed and total time, e.g. "00:12 / 01:30"
    pub fn time_str(&self) -> String {
        let Some(file) = self.file() else {
            return "--:-- / --:--".to_string();
        };
        let total = file.buffer.duration_secs();
        let elapsed = total * self.engine.state().progress() as f64;
        format!("{} / {}", format_secs(elapsed), format_secs(total))
    }

    /// Stop playback if needed and leave the main loop
    pub fn quit(&mut self) {
        if self.state == State::Playing {
            self.stop_playback();
        }
        self.running = false;
    }

    /// Toggle help view
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }
}

impl Drop for App {
    fn drop(&mut self) {
        // Ensure clean shutdown
        let _ = self.engine.stop();
    }
}

fn format_secs(secs: f64) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
