use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::types::{PERIOD_FRAMES, QUEUE_CAPACITY};

/// Top-level configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub playback: PlaybackConfig,

    #[serde(default)]
    pub filter: FilterConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Output device configuration
#[derive(Debug, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Output device name (substring match); default device if unset
    pub output: Option<String>,

    #[serde(default = "default_period_frames")]
    pub period_frames: usize,

    /// Periods the device-side ring can hold
    #[serde(default = "default_buffer_periods")]
    pub buffer_periods: usize,

    /// Discard audio instead of opening a device
    #[serde(default)]
    pub null: bool,
}

/// Playback configuration
#[derive(Debug, Deserialize, Serialize)]
pub struct PlaybackConfig {
    /// File loaded by the "default file" key
    pub default_file: Option<PathBuf>,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Lowpass effect configuration
#[derive(Debug, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Gain of the filtered signal added on top of the dry signal
    #[serde(default = "default_filter_mix")]
    pub mix: f32,
}

/// Log file configuration
#[derive(Debug, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,

    /// env_logger filter string, e.g. "info" or "rtplay=debug"
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_period_frames() -> usize {
    PERIOD_FRAMES
}

fn default_buffer_periods() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    QUEUE_CAPACITY
}

fn default_filter_mix() -> f32 {
    0.8
}

fn default_log_file() -> PathBuf {
    PathBuf::from("rtplay.log")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            output: None,
            period_frames: default_period_frames(),
            buffer_periods: default_buffer_periods(),
            null: false,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            default_file: None,
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mix: default_filter_mix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(content).context("Failed to parse YAML")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.device.period_frames == 0 {
            anyhow::bail!("device.period_frames must be > 0");
        }

        // The writer needs room for one period while another plays
        if self.device.buffer_periods < 2 {
            anyhow::bail!(
                "device.buffer_periods must be >= 2, got {}",
                self.device.buffer_periods
            );
        }

        if self.playback.queue_capacity < 2 {
            anyhow::bail!(
                "playback.queue_capacity must be >= 2, got {}",
                self.playback.queue_capacity
            );
        }

        if !(0.0..=4.0).contains(&self.filter.mix) {
            anyhow::bail!(
                "filter.mix must be between 0.0 and 4.0, got {}",
                self.filter.mix
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();

        assert_eq!(config.device.output, None);
        assert_eq!(config.device.period_frames, PERIOD_FRAMES);
        assert_eq!(config.device.buffer_periods, 4);
        assert!(!config.device.null);
        assert_eq!(config.playback.queue_capacity, QUEUE_CAPACITY);
        assert!(!config.filter.enabled);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_full_document() {
        let yaml = r#"
device:
  output: "Speakers"
  period_frames: 256
  buffer_periods: 3
  null: true
playback:
  default_file: "media/low_e.wav"
  queue_capacity: 8
filter:
  enabled: true
  mix: 1.5
log:
  file: "/tmp/rtplay-test.log"
  level: "debug"
"#;
        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.device.output.as_deref(), Some("Speakers"));
        assert_eq!(config.device.period_frames, 256);
        assert_eq!(config.device.buffer_periods, 3);
        assert!(config.device.null);
        assert_eq!(
            config.playback.default_file,
            Some(PathBuf::from("media/low_e.wav"))
        );
        assert_eq!(config.playback.queue_capacity, 8);
        assert!(config.filter.enabled);
        assert_eq!(config.filter.mix, 1.5);
        assert_eq!(config.log.file, PathBuf::from("/tmp/rtplay-test.log"));
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::from_yaml("device:\n  period_frames: 1024\n").unwrap();

        assert_eq!(config.device.period_frames, 1024);
        assert_eq!(config.device.buffer_periods, 4);
        assert_eq!(config.filter.mix, 0.8);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_yaml("device:\n  period_frames: 0\n").is_err());
        assert!(Config::from_yaml("device:\n  buffer_periods: 1\n").is_err());
        assert!(Config::from_yaml("playback:\n  queue_capacity: 1\n").is_err());
        assert!(Config::from_yaml("filter:\n  mix: 5.0\n").is_err());
        assert!(Config::from_yaml("filter:\n  mix: -0.1\n").is_err());
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(Config::from_yaml("device: [unclosed").is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::env::temp_dir().join("rtplay-config-does-not-exist.yaml");
        assert!(Config::from_file(path).is_err());
    }
}
