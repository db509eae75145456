//! Spectral analysis thread.
//!
//! Windows of raw samples arrive from playback every half window. Each one
//! is placed in the back two-thirds of a buffer 1.5x its length, tapered
//! and transformed. Shifting the previous transform by a third of the
//! buffer (a rotation of 2π/3 per bin) lines it up with the current one,
//! so their sum is the spectrum of both windows together without a
//! transform over the whole span.
//!
//! The 1.5x ratio is what makes the rotation exactly 2π/3; changing either
//! length breaks the alignment. The shift also has to be real: when the
//! window before the current one was skipped or dropped, the current
//! spectrum is used on its own.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::audio::queue::{QueueConsumer, QueueProducer};
use crate::types::{SpectrumBins, WindowRecord, NUM_SPECTRUM_BANDS, PROCESSING_WINDOW_SIZE};

/// Transform length (1.5x the raw window)
pub const ANALYSIS_LEN: usize = PROCESSING_WINDOW_SIZE * 3 / 2;

/// Band edges in Hz. Bins outside the outer edges are ignored.
pub const BAND_EDGES_HZ: [f32; NUM_SPECTRUM_BANDS + 1] = [60.0, 250.0, 2000.0, 6000.0, 12000.0];

/// How long the thread sleeps while the window queue is empty
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// sin² taper over the whole transform buffer
pub fn make_taper(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let s = (PI * i as f32 / len as f32).sin();
            s * s
        })
        .collect()
}

/// Frequency in Hz represented by bin `k` of an `len`-point transform
pub fn bin_frequency(k: usize, len: usize, sample_rate: u32) -> f32 {
    k.min(len - k) as f32 * sample_rate as f32 / len as f32
}

/// Band index for a frequency, or `None` outside the band of interest
pub fn band_for_frequency(freq: f32) -> Option<usize> {
    let last = NUM_SPECTRUM_BANDS;
    if freq < BAND_EDGES_HZ[0] || freq > BAND_EDGES_HZ[last] {
        return None;
    }
    (0..last)
        .find(|&b| freq < BAND_EDGES_HZ[b + 1])
        .or(Some(last - 1))
}

/// Overlap-add spectral analyzer
///
/// All buffers are allocated in `new`; `process` does no allocation.
pub struct SpectralAnalyzer {
    taper: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    current: Vec<Complex<f32>>,
    previous: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    /// Band for each bin, precomputed from the sample rate
    bands: Vec<Option<usize>>,
    /// Powers of the per-bin rotation; it repeats every 3 bins
    rotations: [Complex<f32>; 3],
    /// Start frame of the window held in `previous`
    previous_start: Option<usize>,
    /// Windows overlap-added with their predecessor
    combined: usize,
}

impl SpectralAnalyzer {
    pub fn new(sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(ANALYSIS_LEN);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let bands = (0..ANALYSIS_LEN)
            .map(|k| band_for_frequency(bin_frequency(k, ANALYSIS_LEN, sample_rate)))
            .collect();

        let step = 2.0 * PI / 3.0;
        let rotations = [
            Complex::new(1.0, 0.0),
            Complex::from_polar(1.0, step),
            Complex::from_polar(1.0, 2.0 * step),
        ];

        Self {
            taper: make_taper(ANALYSIS_LEN),
            fft,
            current: vec![Complex::new(0.0, 0.0); ANALYSIS_LEN],
            previous: vec![Complex::new(0.0, 0.0); ANALYSIS_LEN],
            scratch,
            bands,
            rotations,
            previous_start: None,
            combined: 0,
        }
    }

    /// Analyze one window and return its band energies
    pub fn process(&mut self, window: &WindowRecord) -> SpectrumBins {
        let offset = ANALYSIS_LEN - PROCESSING_WINDOW_SIZE;

        for (i, slot) in self.current.iter_mut().enumerate() {
            let x = if i >= offset {
                window.data[i - offset]
            } else {
                0.0
            };
            *slot = Complex::new(x * self.taper[i], 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.current, &mut self.scratch);

        let overlap = self
            .previous_start
            .is_some_and(|start| window.follows(start));
        let norm = 1.0 / ANALYSIS_LEN as f32;
        let mut bins = SpectrumBins::zeroed();

        for (k, (cur, prev)) in self.current.iter().zip(self.previous.iter()).enumerate() {
            let Some(band) = self.bands[k] else {
                continue;
            };
            // Advance the previous window by a third of the buffer
            let combined = if overlap {
                cur + prev * self.rotations[k % 3]
            } else {
                *cur
            };
            // Cheap magnitude; this only drives a meter
            bins.data[band] += (combined.re.abs() + combined.im.abs()) * norm;
        }

        if overlap {
            self.combined += 1;
        }
        self.previous_start = Some(window.start_frame);
        std::mem::swap(&mut self.current, &mut self.previous);
        bins
    }

    /// Windows that were overlap-added with the one before them
    pub fn combined(&self) -> usize {
        self.combined
    }

    /// Forget the previous window
    pub fn reset(&mut self) {
        self.previous_start = None;
        for c in self.previous.iter_mut() {
            *c = Complex::new(0.0, 0.0);
        }
    }
}

/// Queue handles and counters handed back when the analysis thread exits
pub struct AnalyzerOutcome {
    pub windows: QueueConsumer<WindowRecord>,
    pub bins: QueueProducer<SpectrumBins>,
    pub processed: usize,
    pub combined: usize,
    pub skipped: usize,
    pub dropped: usize,
}

/// Analysis thread body
///
/// Waits for windows until `running` is cleared. Only the newest queued
/// window is analyzed; older ones are stale by the time we get to them.
pub fn run_analyzer(
    mut analyzer: SpectralAnalyzer,
    mut windows: QueueConsumer<WindowRecord>,
    mut bins: QueueProducer<SpectrumBins>,
    running: Arc<AtomicBool>,
) -> AnalyzerOutcome {
    log::debug!("Analysis thread started");

    let mut processed = 0;
    let mut skipped = 0;
    let mut dropped = 0;

    loop {
        while running.load(Ordering::Acquire) && windows.is_empty() {
            thread::sleep(POLL_INTERVAL);
        }
        if !running.load(Ordering::Acquire) {
            break;
        }

        skipped += windows.discard_stale();
        let Some(window) = windows.front() else {
            continue;
        };

        let spectrum = analyzer.process(window);
        windows.pop();
        processed += 1;

        if !bins.try_push(spectrum) {
            dropped += 1;
        }
    }

    AnalyzerOutcome {
        windows,
        bins,
        processed,
        combined: analyzer.combined(),
        skipped,
        dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::player::Player;
    use crate::audio::queue;
    use crate::audio::source::SampleBuffer;
    use crate::audio::state::SharedPlaybackState;
    use crate::audio::testing::CountingOpener;
    use crate::types::ANALYSIS_HOP;
    use std::time::Instant;

    fn sine_window(freq: f32, sample_rate: u32, start: usize) -> WindowRecord {
        let mut record = WindowRecord::zeroed();
        record.start_frame = start;
        for (i, slot) in record.data.iter_mut().enumerate() {
            let t = (start + i) as f32 / sample_rate as f32;
            *slot = (2.0 * PI * freq * t).sin() * 0.8;
        }
        record
    }

    fn loudest_band(bins: &SpectrumBins) -> usize {
        bins.data
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_silent_windows_give_zero_spectrum() {
        let mut analyzer = SpectralAnalyzer::new(44100);
        let silent = WindowRecord::zeroed();

        let first = analyzer.process(&silent);
        let second = analyzer.process(&silent);

        assert!(first.data.iter().all(|&v| v == 0.0));
        assert!(second.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_tone_lands_in_expected_band() {
        let sample_rate = 44100;
        let cases = [(120.0, 0), (1000.0, 1), (4000.0, 2), (9000.0, 3)];

        for (freq, band) in cases {
            let mut analyzer = SpectralAnalyzer::new(sample_rate);
            analyzer.process(&sine_window(freq, sample_rate, 0));
            let bins = analyzer.process(&sine_window(freq, sample_rate, PROCESSING_WINDOW_SIZE / 2));
            assert_eq!(loudest_band(&bins), band, "{} Hz", freq);
        }
    }

    #[test]
    fn test_adjacent_windows_are_overlap_added() {
        let mut analyzer = SpectralAnalyzer::new(44100);
        analyzer.process(&sine_window(1000.0, 44100, 0));
        let joined = analyzer.process(&sine_window(1000.0, 44100, ANALYSIS_HOP));

        let alone = SpectralAnalyzer::new(44100).process(&sine_window(1000.0, 44100, ANALYSIS_HOP));

        assert_eq!(analyzer.combined(), 1);
        assert_ne!(joined, alone);
    }

    #[test]
    fn test_gap_between_windows_skips_overlap() {
        // A period twice the hop: the window at 256 was discarded
        let mut analyzer = SpectralAnalyzer::new(44100);
        analyzer.process(&sine_window(1000.0, 44100, 0));
        let after_gap = analyzer.process(&sine_window(1000.0, 44100, 2 * ANALYSIS_HOP));

        let alone =
            SpectralAnalyzer::new(44100).process(&sine_window(1000.0, 44100, 2 * ANALYSIS_HOP));

        assert_eq!(analyzer.combined(), 0);
        assert_eq!(after_gap, alone);
    }

    #[test]
    fn test_live_playback_windows_all_overlap() {
        let state = Arc::new(SharedPlaybackState::new());
        let mut opener = CountingOpener::new(ANALYSIS_HOP);
        opener.write_delay = Some(Duration::from_millis(10));
        let mut player = Player::new(state, 0.8);

        let samples: Vec<f32> = (0..ANALYSIS_HOP * 20)
            .map(|i| (2.0 * PI * 1000.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let buffer = Arc::new(SampleBuffer::from_samples(samples, 1, 44100).unwrap());

        let (mut window_tx, window_rx) = queue::channel(20);
        let (bins_tx, _bins_rx) = queue::channel(20);
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            run_analyzer(SpectralAnalyzer::new(44100), window_rx, bins_tx, thread_running)
        });

        player.init(buffer, &opener).unwrap();
        let summary = player.play(Some(&mut window_tx)).unwrap();
        thread::sleep(Duration::from_millis(50));
        running.store(false, Ordering::Release);
        let outcome = handle.join().unwrap();

        // One window per period, each analyzed against the one before it
        assert_eq!(summary.windows_sent, 19);
        assert_eq!(outcome.skipped, 0);
        assert_eq!(outcome.processed, summary.windows_sent);
        assert_eq!(outcome.combined, outcome.processed - 1);
    }

    #[test]
    fn test_bin_frequency_mirrors_upper_half() {
        assert_eq!(bin_frequency(0, ANALYSIS_LEN, 44100), 0.0);
        assert_eq!(
            bin_frequency(10, ANALYSIS_LEN, 44100),
            bin_frequency(ANALYSIS_LEN - 10, ANALYSIS_LEN, 44100)
        );
    }

    #[test]
    fn test_band_edges() {
        assert_eq!(band_for_frequency(0.0), None);
        assert_eq!(band_for_frequency(59.9), None);
        assert_eq!(band_for_frequency(60.0), Some(0));
        assert_eq!(band_for_frequency(250.0), Some(1));
        assert_eq!(band_for_frequency(5999.0), Some(2));
        assert_eq!(band_for_frequency(12000.0), Some(3));
        assert_eq!(band_for_frequency(12001.0), None);
    }

    #[test]
    fn test_taper_shape() {
        let taper = make_taper(ANALYSIS_LEN);
        assert_eq!(taper[0], 0.0);
        assert!((taper[ANALYSIS_LEN / 2] - 1.0).abs() < 1e-6);
        assert!(taper.iter().all(|&w| (0.0..=1.0).contains(&w)));
    }

    #[test]
    fn test_reset_forgets_previous_window() {
        let mut analyzer = SpectralAnalyzer::new(44100);
        analyzer.process(&sine_window(1000.0, 44100, 0));
        analyzer.reset();

        // Would follow the first window if it were still remembered
        let mut silent = WindowRecord::zeroed();
        silent.start_frame = ANALYSIS_HOP;
        let bins = analyzer.process(&silent);
        assert_eq!(analyzer.combined(), 0);
        assert!(bins.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_thread_analyzes_newest_window() {
        let (mut window_tx, window_rx) = queue::channel(20);
        let (bins_tx, mut bins_rx) = queue::channel(20);

        for _ in 0..4 {
            window_tx.try_push(WindowRecord::zeroed());
        }
        window_tx.try_push(sine_window(1000.0, 44100, 0));

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            run_analyzer(SpectralAnalyzer::new(44100), window_rx, bins_tx, thread_running)
        });

        let deadline = Instant::now() + Duration::from_secs(5);
        while bins_rx.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        running.store(false, Ordering::Release);
        let outcome = handle.join().unwrap();

        assert_eq!(outcome.processed, 1);
        assert_eq!(outcome.skipped, 4);
        let bins = bins_rx.pop().unwrap();
        assert!(bins.data.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_thread_exits_promptly_when_stopped() {
        let (_window_tx, window_rx) = queue::channel::<WindowRecord>(20);
        let (bins_tx, _bins_rx) = queue::channel::<SpectrumBins>(20);

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let handle = thread::spawn(move || {
            run_analyzer(SpectralAnalyzer::new(48000), window_rx, bins_tx, thread_running)
        });

        thread::sleep(Duration::from_millis(5));
        let start = Instant::now();
        running.store(false, Ordering::Release);
        let outcome = handle.join().unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(outcome.processed, 0);
    }
}
