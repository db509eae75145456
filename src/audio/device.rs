//! Output device access.
//!
//! The playback loop wants a blocking "write one period" device, the way a
//! PCM handle behaves. cpal is callback driven, so `CpalOutput` bridges the
//! two: writes go into a small ring that the cpal callback drains, and the
//! writer sleeps while the ring is full. That sleep is what paces playback
//! to real time.
//!
//! Only one output should be open per process. Nothing enforces this; the
//! playback session opens one at a time and closes it before the thread
//! exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, Stream, StreamConfig};
use rtrb::{Producer, RingBuffer};
use thiserror::Error;

/// Errors opening or configuring an output
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no default output device available")]
    NoDefaultDevice,

    #[error("output device '{0}' not found")]
    NotFound(String),

    #[error("device does not support {channels}ch f32 @ {sample_rate}Hz")]
    UnsupportedConfig { channels: u16, sample_rate: u32 },

    #[error("failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

/// Errors from a single period write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriteError {
    /// The device starved; call `prepare` and keep going
    #[error("output underrun")]
    Underrun,

    #[error("output write failed: {0}")]
    Other(&'static str),
}

/// A playback handle that accepts interleaved periods and blocks until
/// the device has room for them
pub trait AudioOutput {
    /// Frames per period
    fn period_size_frames(&self) -> usize;

    /// Duration of one period in microseconds
    fn period_time_us(&self) -> u64;

    /// Write interleaved samples (whole frames). Returns frames written.
    fn write_frames(&mut self, data: &[f32]) -> Result<usize, WriteError>;

    /// Recover after an underrun
    fn prepare(&mut self);

    /// Let queued audio finish and release the device
    fn close(&mut self);
}

/// Opens outputs on the playback thread
pub trait OutputOpener: Send + Sync {
    fn open(&self, channels: u16, sample_rate: u32) -> Result<Box<dyn AudioOutput>, DeviceError>;
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub max_output_channels: usize,
    pub sample_rate: u32,
}

/// Get the default audio host
pub fn get_host() -> Host {
    cpal::default_host()
}

/// Get the default output device
pub fn get_default_output_device() -> Result<Device, DeviceError> {
    get_host()
        .default_output_device()
        .ok_or(DeviceError::NoDefaultDevice)
}

/// List all available output devices
pub fn list_output_devices() -> Result<Vec<AudioDeviceInfo>, DeviceError> {
    let host = get_host();
    let default_name = host
        .default_output_device()
        .as_ref()
        .and_then(|d| d.description().ok())
        .map(|desc| desc.name().to_string());

    let mut devices = Vec::new();

    for device in host.output_devices()? {
        let Ok(desc) = device.description() else {
            continue;
        };
        let name = desc.name().to_string();
        let is_default = Some(&name) == default_name.as_ref();

        let (max_channels, sample_rate) = match device.default_output_config() {
            Ok(cfg) => (cfg.channels() as usize, cfg.sample_rate()),
            Err(_) => (0, 0),
        };

        devices.push(AudioDeviceInfo {
            name,
            is_default,
            max_output_channels: max_channels,
            sample_rate,
        });
    }

    Ok(devices)
}

/// Display name of a device
pub fn device_name(device: &Device) -> String {
    device
        .description()
        .map(|desc| desc.name().to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

/// Find an output device whose name contains `name` (case-insensitive)
pub fn get_output_device_by_name(name: &str) -> Result<Device, DeviceError> {
    let needle = name.to_lowercase();

    for device in get_host().output_devices()? {
        if let Ok(desc) = device.description() {
            if desc.name().to_lowercase().contains(&needle) {
                return Ok(device);
            }
        }
    }

    Err(DeviceError::NotFound(name.to_string()))
}

/// Check the device advertises f32 output for this channel count and rate
///
/// Falls back to "supported" if the device can't be queried; stream
/// creation will report the real error.
fn supports_config(device: &Device, channels: u16, sample_rate: u32) -> bool {
    match device.supported_output_configs() {
        Ok(configs) => configs.into_iter().any(|range| {
            range.channels() == channels
                && range.sample_format() == SampleFormat::F32
                && range.min_sample_rate() <= sample_rate
                && sample_rate <= range.max_sample_rate()
        }),
        Err(_) => true,
    }
}

/// Opens cpal outputs by name (or the default device)
#[derive(Debug, Clone)]
pub struct CpalOpener {
    pub device_name: Option<String>,
    pub period_frames: usize,
    /// Ring size in periods; bounds output latency
    pub buffer_periods: usize,
}

impl OutputOpener for CpalOpener {
    fn open(&self, channels: u16, sample_rate: u32) -> Result<Box<dyn AudioOutput>, DeviceError> {
        let device = match self.device_name {
            Some(ref name) => get_output_device_by_name(name)?,
            None => get_default_output_device()?,
        };

        if !supports_config(&device, channels, sample_rate) {
            return Err(DeviceError::UnsupportedConfig {
                channels,
                sample_rate,
            });
        }

        let output = CpalOutput::new(
            &device,
            channels,
            sample_rate,
            self.period_frames,
            self.buffer_periods,
        )?;

        log::info!(
            "Opened output '{}' ({}ch @ {}Hz, {} frames/period)",
            device_name(&device),
            channels,
            sample_rate,
            self.period_frames
        );

        Ok(Box::new(output))
    }
}

/// Blocking writer on top of a cpal output stream
pub struct CpalOutput {
    stream: Stream,
    producer: Producer<f32>,
    started: bool,
    underrun: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    channels: usize,
    sample_rate: u32,
    period_frames: usize,
    buffer_periods: usize,
}

impl CpalOutput {
    fn new(
        device: &Device,
        channels: u16,
        sample_rate: u32,
        period_frames: usize,
        buffer_periods: usize,
    ) -> Result<Self, DeviceError> {
        let config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: cpal::BufferSize::Fixed(period_frames as u32),
        };

        let ring_samples = period_frames * buffer_periods * channels as usize;
        let (producer, mut consumer) = RingBuffer::<f32>::new(ring_samples);

        let underrun = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let callback_underrun = underrun.clone();
        let data_callback = move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            let mut starved = false;
            for sample in data.iter_mut() {
                *sample = match consumer.pop() {
                    Ok(s) => s,
                    Err(_) => {
                        starved = true;
                        0.0
                    }
                };
            }
            if starved {
                callback_underrun.store(true, Ordering::Relaxed);
            }
        };

        let callback_failed = failed.clone();
        let error_callback = move |_err: cpal::StreamError| {
            callback_failed.store(true, Ordering::Relaxed);
        };

        let stream = device.build_output_stream(&config, data_callback, error_callback, None)?;

        Ok(Self {
            stream,
            producer,
            started: false,
            underrun,
            failed,
            channels: channels as usize,
            sample_rate,
            period_frames,
            buffer_periods,
        })
    }

    fn buffer_duration(&self) -> Duration {
        Duration::from_micros(self.period_time_us() * self.buffer_periods as u64)
    }
}

impl AudioOutput for CpalOutput {
    fn period_size_frames(&self) -> usize {
        self.period_frames
    }

    fn period_time_us(&self) -> u64 {
        self.period_frames as u64 * 1_000_000 / self.sample_rate as u64
    }

    fn write_frames(&mut self, data: &[f32]) -> Result<usize, WriteError> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(WriteError::Other("stream error"));
        }
        if self.started && self.underrun.load(Ordering::Relaxed) {
            return Err(WriteError::Underrun);
        }

        // Block until the callback has drained enough room
        let poll = Duration::from_micros((self.period_time_us() / 4).max(100));
        let deadline = Instant::now() + self.buffer_duration() * 4;
        while self.producer.slots() < data.len() {
            if Instant::now() > deadline {
                return Err(WriteError::Other("device stalled"));
            }
            thread::sleep(poll);
        }

        for &sample in data {
            let _ = self.producer.push(sample);
        }

        if !self.started {
            if self.stream.play().is_err() {
                return Err(WriteError::Other("failed to start stream"));
            }
            self.started = true;
            self.underrun.store(false, Ordering::Relaxed);
        }

        Ok(data.len() / self.channels)
    }

    fn prepare(&mut self) {
        self.underrun.store(false, Ordering::Relaxed);
    }

    fn close(&mut self) {
        if self.started {
            // Drain what's queued, bounded by the ring length
            let deadline = Instant::now() + self.buffer_duration() * 2;
            let capacity = self.producer.buffer().capacity();
            while self.producer.slots() < capacity
                && Instant::now() < deadline
                && !self.failed.load(Ordering::Relaxed)
            {
                thread::sleep(Duration::from_millis(1));
            }
        }
        let _ = self.stream.pause();
    }
}

/// Opens outputs that discard audio. Used for headless runs.
#[derive(Debug, Clone)]
pub struct NullOpener {
    pub period_frames: usize,
    /// Sleep one period per write so playback still runs in real time
    pub paced: bool,
}

impl OutputOpener for NullOpener {
    fn open(&self, channels: u16, sample_rate: u32) -> Result<Box<dyn AudioOutput>, DeviceError> {
        log::info!(
            "Opened null output ({}ch @ {}Hz, paced: {})",
            channels,
            sample_rate,
            self.paced
        );
        Ok(Box::new(NullOutput {
            channels: channels as usize,
            sample_rate,
            period_frames: self.period_frames,
            paced: self.paced,
            next_deadline: None,
        }))
    }
}

/// Output that accepts and discards every period
pub struct NullOutput {
    channels: usize,
    sample_rate: u32,
    period_frames: usize,
    paced: bool,
    next_deadline: Option<Instant>,
}

impl AudioOutput for NullOutput {
    fn period_size_frames(&self) -> usize {
        self.period_frames
    }

    fn period_time_us(&self) -> u64 {
        self.period_frames as u64 * 1_000_000 / self.sample_rate as u64
    }

    fn write_frames(&mut self, data: &[f32]) -> Result<usize, WriteError> {
        if self.paced {
            let period = Duration::from_micros(self.period_time_us());
            let deadline = self.next_deadline.unwrap_or_else(Instant::now) + period;
            let now = Instant::now();
            if deadline > now {
                thread::sleep(deadline - now);
            }
            self.next_deadline = Some(deadline);
        }
        Ok(data.len() / self.channels)
    }

    fn prepare(&mut self) {
        self.next_deadline = None;
    }

    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // This test may fail on systems without audio devices
        if let Ok(devices) = list_output_devices() {
            println!("Found {} output devices", devices.len());
            for device in devices {
                println!(
                    "  - {} ({}ch @ {}Hz) {}",
                    device.name,
                    device.max_output_channels,
                    device.sample_rate,
                    if device.is_default { "[DEFAULT]" } else { "" }
                );
            }
        }
    }

    #[test]
    fn test_unknown_device_name() {
        // Only meaningful where the host can enumerate devices
        if let Err(err) = get_output_device_by_name("no-such-device-rtplay-xyz") {
            assert!(matches!(
                err,
                DeviceError::NotFound(_) | DeviceError::Devices(_)
            ));
        }
    }

    #[test]
    fn test_null_output_reports_frames() {
        let opener = NullOpener {
            period_frames: 256,
            paced: false,
        };
        let mut output = opener.open(2, 48000).unwrap();

        assert_eq!(output.period_size_frames(), 256);
        assert_eq!(output.period_time_us(), 5333);
        assert_eq!(output.write_frames(&[0.0; 512]), Ok(256));
        output.close();
    }

    #[test]
    fn test_paced_null_output_takes_real_time() {
        let opener = NullOpener {
            period_frames: 480,
            paced: true,
        };
        let mut output = opener.open(1, 48000).unwrap();

        let start = Instant::now();
        for _ in 0..5 {
            output.write_frames(&[0.0; 480]).unwrap();
        }
        // Five 10ms periods
        assert!(start.elapsed() >= Duration::from_millis(45));
    }
}
