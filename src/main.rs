mod app;
mod audio;
mod config;
mod types;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::App;
use crate::audio::device::{CpalOpener, NullOpener, OutputOpener};
use crate::audio::{EngineConfig, PlaybackEngine};
use crate::config::{Config, LogConfig};
use crate::ui::{handle_input, render_ui};

const DEFAULT_CONFIG: &str = "rtplay.yaml";

/// rtplay - real-time audio player with live analysis
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Terminal audio player with live loudness and spectrum meters",
    long_about = "Terminal audio player with live loudness and spectrum meters.\n\n\
                  Plays WAV files through an output device while a separate thread \
                  analyzes what is being played.\n\n\
                  Configuration is loaded from rtplay.yaml by default, or use --config \
                  to specify a different file."
)]
struct Args {
    /// List available audio output devices
    #[arg(short, long)]
    list_devices: bool,

    /// Path to configuration file
    #[arg(short, long, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    config: String,

    /// Write logs to this file instead of the configured one
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Discard audio instead of opening an output device
    #[arg(long)]
    null_output: bool,

    /// WAV file to load at startup
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
}

/// Load configuration from file or use defaults
fn load_config(config_path: &str) -> Result<Config> {
    let path = Path::new(config_path);

    // If explicit config path provided and file doesn't exist, error
    if config_path != DEFAULT_CONFIG && !path.exists() {
        anyhow::bail!("Config file not found: {}", config_path);
    }

    // If default path and file doesn't exist, use defaults
    if config_path == DEFAULT_CONFIG && !path.exists() {
        return Ok(Config::default());
    }

    Config::from_file(path)
}

/// Send log output to a file; the terminal belongs to the UI
fn init_logging(log: &LogConfig, override_path: Option<&Path>) -> Result<()> {
    let path = override_path.unwrap_or(log.file.as_path());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    env_logger::Builder::new()
        .parse_filters(&log.level)
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();

    Ok(())
}

/// Build the output opener described by the config
fn build_opener(config: &Config, null_output: bool) -> Result<Arc<dyn OutputOpener>> {
    let device = &config.device;

    if null_output || device.null {
        log::info!("Using null output");
        return Ok(Arc::new(NullOpener {
            period_frames: device.period_frames,
            paced: true,
        }));
    }

    // Fail at startup rather than on first play
    let name = match device.output {
        Some(ref name) => {
            let found = audio::device::get_output_device_by_name(name)?;
            audio::device::device_name(&found)
        }
        None => {
            let found = audio::device::get_default_output_device()?;
            audio::device::device_name(&found)
        }
    };
    log::info!("Using output device: {}", name);

    Ok(Arc::new(CpalOpener {
        device_name: device.output.clone(),
        period_frames: device.period_frames,
        buffer_periods: device.buffer_periods,
    }))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Handle --list-devices flag
    if args.list_devices {
        list_output_devices()?;
        return Ok(());
    }

    // Load configuration
    let config = load_config(&args.config)?;
    init_logging(&config.log, args.log_file.as_deref())?;
    log::info!("rtplay {} starting", env!("CARGO_PKG_VERSION"));

    let opener = build_opener(&config, args.null_output)?;
    let engine = PlaybackEngine::new(
        opener,
        EngineConfig {
            queue_capacity: config.playback.queue_capacity,
            filter_mix: config.filter.mix,
        },
    );
    engine.state().set_filter_enabled(config.filter.enabled);

    let mut app = App::new(engine, config.playback.default_file.clone());

    // Preload a file given on the command line
    if let Some(ref path) = args.file {
        if let Err(e) = app.load_audio_file(Some(path.as_path())) {
            app.show_error(format!("Failed to load {}: {}", path.display(), e));
        }
    }

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run main loop
    let result = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(ref e) = result {
        log::error!("Exiting with error: {:#}", e);
    }
    result
}

/// List available audio output devices
fn list_output_devices() -> Result<()> {
    println!("rtplay - available output devices");
    println!("=================================");
    println!();

    match audio::device::list_output_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No audio output devices found");
            } else {
                for (i, device) in devices.iter().enumerate() {
                    let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
                    println!(
                        "  [{}] {} - {}ch @ {}Hz{}",
                        i,
                        device.name,
                        device.max_output_channels,
                        device.sample_rate,
                        default_marker
                    );
                }
            }
        }
        Err(e) => {
            println!("  Error: {}", e);
        }
    }

    println!();
    println!("Configuration:");
    println!("  Create a rtplay.yaml file to choose a device and default file");
    println!("  Use --config <path> to specify a different config file");
    println!();
    println!("Example rtplay.yaml:");
    println!("  device:");
    println!("    output: \"Built-in Output\"");
    println!("    period_frames: 256");
    println!("  playback:");
    println!("    default_file: \"media/low_e.wav\"");
    println!("  filter:");
    println!("    mix: 0.8");

    Ok(())
}

/// Main application loop
fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        // Notice playback that ended on its own
        app.update_state();

        // Pull the newest analysis result
        app.update_spectrum();

        // Update message display (auto-clear expired messages)
        app.update_message();

        // Render UI
        terminal.draw(|frame| render_ui(frame, app))?;

        // Handle input
        handle_input(app)?;

        // Check for quit
        if !app.running() {
            break;
        }
    }

    Ok(())
}
