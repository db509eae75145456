use std::sync::Arc;

use thiserror::Error;

use crate::audio::device::{AudioOutput, DeviceError, OutputOpener, WriteError};
use crate::audio::filter::IirLowpass;
use crate::audio::queue::QueueProducer;
use crate::audio::source::SampleBuffer;
use crate::audio::state::SharedPlaybackState;
use crate::types::{WindowRecord, ANALYSIS_HOP, PROCESSING_WINDOW_SIZE};

/// Loudness metric floor; a period at -60 dBFS or quieter reads as 0
pub const LOUDNESS_FLOOR_DB: f32 = 60.0;

/// Weight of the previous average in the loudness EWMA
const EWMA_KEEP: f32 = 0.6;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player has not been initialized")]
    NotInitialized,

    #[error("output reported a zero-length period")]
    InvalidPeriod,

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// What happened during one call to `play`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub ticks_played: usize,
    pub num_ticks: usize,
    pub underruns: usize,
    pub write_errors: usize,
    pub windows_sent: usize,
    pub windows_dropped: usize,
    pub stopped_early: bool,
}

/// Mean-square energy of a period in dB above `-LOUDNESS_FLOOR_DB` dBFS
pub fn period_loudness(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    (10.0 * (mean_square + 1e-12).log10() + LOUDNESS_FLOOR_DB).max(0.0)
}

/// One step of the running loudness average
pub fn ewma(prev: f32, metric: f32) -> f32 {
    EWMA_KEEP * prev + (1.0 - EWMA_KEEP) * metric
}

/// Copy `PROCESSING_WINDOW_SIZE` frames starting at `start_frame`, mixed
/// to mono. Frames past the end of the buffer read as silence.
pub fn mono_window(data: &[f32], channels: usize, start_frame: usize) -> WindowRecord {
    let total_frames = data.len() / channels;
    let mut record = WindowRecord::zeroed();
    record.start_frame = start_frame;

    for (i, slot) in record.data.iter_mut().enumerate() {
        let frame = start_frame + i;
        if frame >= total_frames {
            break;
        }
        let base = frame * channels;
        *slot = if channels == 2 {
            0.5 * (data[base] + data[base + 1])
        } else {
            data[base]
        };
    }

    record
}

/// Feeds a `SampleBuffer` to an output one period at a time
///
/// `init` opens the output and allocates everything the loop needs; `play`
/// then runs without allocating or locking. Only the device write blocks.
pub struct Player {
    state: Arc<SharedPlaybackState>,
    source: Option<Arc<SampleBuffer>>,
    output: Option<Box<dyn AudioOutput>>,
    filter: Option<IirLowpass>,
    filter_mix: f32,
    scratch: Vec<f32>,
}

impl Player {
    pub fn new(state: Arc<SharedPlaybackState>, filter_mix: f32) -> Self {
        Self {
            state,
            source: None,
            output: None,
            filter: None,
            filter_mix,
            scratch: Vec::new(),
        }
    }

    /// Open an output matching the buffer's format
    pub fn init(
        &mut self,
        source: Arc<SampleBuffer>,
        opener: &dyn OutputOpener,
    ) -> Result<(), PlayerError> {
        let channels = source.channels();
        assert!(
            channels == 1 || channels == 2,
            "sample buffer must be mono or stereo, got {} channels",
            channels
        );

        let output = opener.open(channels, source.sample_rate())?;
        let period_frames = output.period_size_frames();
        if period_frames == 0 {
            return Err(PlayerError::InvalidPeriod);
        }

        self.scratch = vec![0.0; period_frames * channels as usize];
        self.filter = Some(IirLowpass::new(channels as usize));
        self.output = Some(output);
        self.source = Some(source);

        Ok(())
    }

    /// Run the real-time loop until the buffer is exhausted or `playing`
    /// is cleared
    ///
    /// The last partial period of the buffer is not played: the tick count
    /// is `len / samples_per_period`, rounded down.
    pub fn play(
        &mut self,
        mut window_tx: Option<&mut QueueProducer<WindowRecord>>,
    ) -> Result<PlaybackSummary, PlayerError> {
        let Self {
            state,
            source,
            output,
            filter,
            filter_mix,
            scratch,
        } = self;

        let (Some(source), Some(output), Some(filter)) =
            (source.as_ref(), output.as_mut(), filter.as_mut())
        else {
            return Err(PlayerError::NotInitialized);
        };

        let data = source.data();
        let channels = source.channels() as usize;
        let period_frames = output.period_size_frames();
        let samples_per_period = period_frames * channels;
        let num_ticks = data.len() / samples_per_period;
        let mix = *filter_mix;

        let mut summary = PlaybackSummary {
            num_ticks,
            ..Default::default()
        };
        let mut avg = 0.0f32;
        let mut next_window_start = 0usize;

        state.set_num_ticks(num_ticks);
        state.set_tick_num(0);
        state.set_playing(true);

        // ---------------
        // Real-time loop.

        let mut tick = 0;
        while tick < num_ticks && state.is_playing() {
            let offset = tick * samples_per_period;
            let period = &data[offset..offset + samples_per_period];

            let written: &[f32] = if state.filter_enabled() {
                filter.fill_buffer(period, &mut scratch[..], mix);
                &scratch[..]
            } else {
                period
            };

            match output.write_frames(written) {
                Ok(_) => {}
                Err(WriteError::Underrun) => {
                    output.prepare();
                    state.record_underrun();
                    summary.underruns += 1;
                }
                Err(WriteError::Other(_)) => {
                    state.record_write_error();
                    summary.write_errors += 1;
                }
            }

            avg = ewma(avg, period_loudness(written));
            state.set_avg_intensity(avg);
            state.set_tick_num(tick);

            // Send every analysis window that is now fully played
            if let Some(tx) = window_tx.as_deref_mut() {
                let played_frames = (tick + 1) * period_frames;
                while next_window_start + PROCESSING_WINDOW_SIZE <= played_frames {
                    let record = mono_window(data, channels, next_window_start);
                    if tx.try_push(record) {
                        summary.windows_sent += 1;
                    } else {
                        summary.windows_dropped += 1;
                    }
                    next_window_start += ANALYSIS_HOP;
                }
            }

            tick += 1;
        }

        summary.ticks_played = tick;
        summary.stopped_early = tick < num_ticks;
        state.set_playing(false);

        Ok(summary)
    }

    /// Drain and release the output
    pub fn shutdown(&mut self) {
        if let Some(mut output) = self.output.take() {
            output.close();
        }
        if let Some(filter) = self.filter.as_mut() {
            filter.reset();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown();
    }
}
