//! Test outputs that count writes instead of making sound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::audio::device::{AudioOutput, DeviceError, OutputOpener, WriteError};
use crate::audio::state::SharedPlaybackState;

/// Counters shared between a test and the outputs it opens
#[derive(Debug, Default)]
pub struct OutputStats {
    pub opens: AtomicUsize,
    pub writes: AtomicUsize,
    pub prepares: AtomicUsize,
    pub closes: AtomicUsize,
    pub samples: AtomicUsize,
}

impl OutputStats {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct CountingOpener {
    pub period_frames: usize,
    pub stats: Arc<OutputStats>,
    /// Report an underrun on this (0-based) write
    pub underrun_at: Option<usize>,
    /// Fail every write after the first
    pub failing_writes: bool,
    /// Clear `playing` once this many writes have happened
    pub stop_after: Option<(usize, Arc<SharedPlaybackState>)>,
    /// Simulated time spent blocked in each write
    pub write_delay: Option<Duration>,
    /// Refuse to open
    pub fail_open: bool,
}

impl CountingOpener {
    pub fn new(period_frames: usize) -> Self {
        Self {
            period_frames,
            stats: Arc::new(OutputStats::default()),
            underrun_at: None,
            failing_writes: false,
            stop_after: None,
            write_delay: None,
            fail_open: false,
        }
    }
}

impl OutputOpener for CountingOpener {
    fn open(&self, channels: u16, _sample_rate: u32) -> Result<Box<dyn AudioOutput>, DeviceError> {
        if self.fail_open {
            return Err(DeviceError::NoDefaultDevice);
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingOutput {
            opener: self.clone(),
            channels: channels.max(1) as usize,
        }))
    }
}

pub struct CountingOutput {
    opener: CountingOpener,
    channels: usize,
}

impl AudioOutput for CountingOutput {
    fn period_size_frames(&self) -> usize {
        self.opener.period_frames
    }

    fn period_time_us(&self) -> u64 {
        self.opener
            .write_delay
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }

    fn write_frames(&mut self, data: &[f32]) -> Result<usize, WriteError> {
        let stats = &self.opener.stats;
        let index = stats.writes.fetch_add(1, Ordering::SeqCst);
        stats.samples.fetch_add(data.len(), Ordering::SeqCst);

        if let Some(delay) = self.opener.write_delay {
            thread::sleep(delay);
        }

        if let Some((after, ref state)) = self.opener.stop_after {
            if index + 1 >= after {
                state.request_stop();
            }
        }

        if self.opener.underrun_at == Some(index) {
            return Err(WriteError::Underrun);
        }
        if self.opener.failing_writes && index > 0 {
            return Err(WriteError::Other("injected failure"));
        }

        Ok(data.len() / self.channels)
    }

    fn prepare(&mut self) {
        self.opener.stats.prepares.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.opener.stats.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_reports_frames_not_samples() {
        let opener = CountingOpener::new(256);
        let mut stereo = opener.open(2, 44100).unwrap();
        let mut mono = opener.open(1, 44100).unwrap();

        assert_eq!(stereo.write_frames(&[0.0; 512]), Ok(256));
        assert_eq!(mono.write_frames(&[0.0; 256]), Ok(256));
        assert_eq!(opener.stats.samples.load(Ordering::SeqCst), 768);
    }
}
