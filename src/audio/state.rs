use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::types::AtomicF32;

/// Playback telemetry shared between the real-time thread and observers
///
/// Every field is individually atomic and has a single designated writer:
/// - `playing`: set by the playback thread at loop start and exit; the
///   control thread only ever clears it to request a stop
/// - `avg_intensity`, `tick_num`, `num_ticks`, `underruns`, `write_errors`:
///   playback thread
/// - `filter_enabled`: control thread
#[derive(Debug, Default)]
pub struct SharedPlaybackState {
    playing: AtomicBool,
    avg_intensity: AtomicF32,
    tick_num: AtomicUsize,
    num_ticks: AtomicUsize,
    underruns: AtomicUsize,
    write_errors: AtomicUsize,
    filter_enabled: AtomicBool,
}

impl SharedPlaybackState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    /// Ask the playback loop to exit at its next period boundary
    pub fn request_stop(&self) {
        self.set_playing(false);
    }

    pub fn avg_intensity(&self) -> f32 {
        self.avg_intensity.load(Ordering::Relaxed)
    }

    pub fn set_avg_intensity(&self, value: f32) {
        self.avg_intensity.store(value, Ordering::Relaxed);
    }

    pub fn tick_num(&self) -> usize {
        self.tick_num.load(Ordering::Relaxed)
    }

    pub fn set_tick_num(&self, tick: usize) {
        self.tick_num.store(tick, Ordering::Relaxed);
    }

    pub fn num_ticks(&self) -> usize {
        self.num_ticks.load(Ordering::Relaxed)
    }

    pub fn set_num_ticks(&self, ticks: usize) {
        self.num_ticks.store(ticks, Ordering::Relaxed);
    }

    pub fn underruns(&self) -> usize {
        self.underruns.load(Ordering::Relaxed)
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_errors(&self) -> usize {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled.load(Ordering::Relaxed)
    }

    pub fn set_filter_enabled(&self, enabled: bool) {
        self.filter_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Fraction of the buffer played so far (0.0 - 1.0)
    pub fn progress(&self) -> f32 {
        let total = self.num_ticks();
        if total == 0 {
            return 0.0;
        }
        ((self.tick_num() + 1) as f32 / total as f32).min(1.0)
    }

    /// Clear telemetry after playback has been joined
    ///
    /// Only called by the control thread while no playback thread exists,
    /// so the single-writer rule still holds.
    pub fn reset_stats(&self) {
        self.set_avg_intensity(0.0);
        self.set_num_ticks(0);
        self.set_tick_num(0);
        self.underruns.store(0, Ordering::Relaxed);
        self.write_errors.store(0, Ordering::Relaxed);
    }
}
