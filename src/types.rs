use std::sync::atomic::{AtomicU32, Ordering};

/// Raw samples per analysis window (one channel, pre-mixed if stereo)
pub const PROCESSING_WINDOW_SIZE: usize = 512;

/// Coarse frequency bands in a spectrum record
pub const NUM_SPECTRUM_BANDS: usize = 4;

/// Default capacity of the real-time queues (records)
pub const QUEUE_CAPACITY: usize = 20;

/// Frames between the starts of consecutive analysis windows
pub const ANALYSIS_HOP: usize = PROCESSING_WINDOW_SIZE / 2;

/// Default device period (frames). At most `ANALYSIS_HOP`, so playback
/// sends one window per period and the analyzer can keep up with each.
pub const PERIOD_FRAMES: usize = 256;

/// Atomic float wrapper for real-time audio thread safety
#[derive(Debug)]
pub struct AtomicF32 {
    storage: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            storage: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self, ordering: Ordering) -> f32 {
        f32::from_bits(self.storage.load(ordering))
    }

    pub fn store(&self, value: f32, ordering: Ordering) {
        self.storage.store(value.to_bits(), ordering);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Fixed-size record passed through the real-time queues
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record<const N: usize> {
    pub data: [f32; N],
}

impl<const N: usize> Record<N> {
    pub const fn zeroed() -> Self {
        Self { data: [0.0; N] }
    }
}

impl<const N: usize> Default for Record<N> {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Window of raw samples sent from playback to analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowRecord {
    /// Frame of the source buffer the window starts at
    pub start_frame: usize,
    pub data: [f32; PROCESSING_WINDOW_SIZE],
}

impl WindowRecord {
    pub const fn zeroed() -> Self {
        Self {
            start_frame: 0,
            data: [0.0; PROCESSING_WINDOW_SIZE],
        }
    }

    /// True if `self` starts exactly one hop after `previous`
    pub fn follows(&self, previous_start: usize) -> bool {
        self.start_frame == previous_start + ANALYSIS_HOP
    }
}

impl Default for WindowRecord {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Band energies sent from analysis to the UI
pub type SpectrumBins = Record<NUM_SPECTRUM_BANDS>;
