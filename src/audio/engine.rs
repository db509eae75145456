use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::analyzer::{run_analyzer, AnalyzerOutcome, SpectralAnalyzer};
use crate::audio::device::OutputOpener;
use crate::audio::player::{PlaybackSummary, Player};
use crate::audio::queue::{self, QueueConsumer, QueueProducer};
use crate::audio::source::SampleBuffer;
use crate::audio::state::SharedPlaybackState;
use crate::types::{SpectrumBins, WindowRecord};

/// How a playback thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished(PlaybackSummary),
    Failed(String),
}

/// Returned by the playback thread on join
type PlaybackThreadResult = (QueueProducer<WindowRecord>, PlaybackOutcome);

/// Playback engine settings
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub filter_mix: f32,
}

/// Owns the playback and analysis threads, the queues between them, and
/// the shared playback state
///
/// Queue handles move into the threads on `start` and come back when the
/// threads are joined, so the same queues serve every playback.
pub struct PlaybackEngine {
    /// Opens the output on the playback thread
    opener: Arc<dyn OutputOpener>,

    config: EngineConfig,

    /// Atomic telemetry written by the playback thread
    state: Arc<SharedPlaybackState>,

    /// Cleared by the playback thread as its last action
    in_progress: Arc<AtomicBool>,

    /// Keeps the analysis thread alive
    analyzer_running: Arc<AtomicBool>,

    window_tx: Option<QueueProducer<WindowRecord>>,
    window_rx: Option<QueueConsumer<WindowRecord>>,
    bins_tx: Option<QueueProducer<SpectrumBins>>,
    bins_rx: QueueConsumer<SpectrumBins>,

    playback_thread: Option<JoinHandle<PlaybackThreadResult>>,
    analysis_thread: Option<JoinHandle<AnalyzerOutcome>>,

    last_outcome: Option<PlaybackOutcome>,
}

impl PlaybackEngine {
    /// Create an engine that plays through outputs from `opener`
    pub fn new(opener: Arc<dyn OutputOpener>, config: EngineConfig) -> Self {
        let (window_tx, window_rx) = queue::channel(config.queue_capacity);
        let (bins_tx, bins_rx) = queue::channel(config.queue_capacity);

        Self {
            opener,
            config,
            state: Arc::new(SharedPlaybackState::new()),
            in_progress: Arc::new(AtomicBool::new(false)),
            analyzer_running: Arc::new(AtomicBool::new(false)),
            window_tx: Some(window_tx),
            window_rx: Some(window_rx),
            bins_tx: Some(bins_tx),
            bins_rx,
            playback_thread: None,
            analysis_thread: None,
            last_outcome: None,
        }
    }

    /// Spawn the analysis and playback threads for `source`
    pub fn start(&mut self, source: Arc<SampleBuffer>) -> Result<()> {
        if self.playback_thread.is_some() {
            anyhow::bail!("Playback already running");
        }
        if source.is_empty() {
            anyhow::bail!("Nothing to play");
        }

        let window_tx = self
            .window_tx
            .take()
            .context("Window queue producer not returned by previous playback")?;
        let mut window_rx = self
            .window_rx
            .take()
            .context("Window queue consumer not returned by previous analysis")?;
        let bins_tx = self
            .bins_tx
            .take()
            .context("Spectrum queue producer not returned by previous analysis")?;

        // Nothing from an earlier playback should reach this one
        window_rx.clear();
        self.bins_rx.clear();
        self.state.reset_stats();
        self.last_outcome = None;

        // Analysis thread
        let analyzer = SpectralAnalyzer::new(source.sample_rate());
        let running = self.analyzer_running.clone();
        running.store(true, Ordering::Release);

        let analysis_thread = thread::Builder::new()
            .name("analysis".into())
            .spawn(move || run_analyzer(analyzer, window_rx, bins_tx, running));

        let analysis_thread = match analysis_thread {
            Ok(handle) => handle,
            Err(e) => {
                self.analyzer_running.store(false, Ordering::Release);
                self.rebuild_queues();
                return Err(e).context("Failed to spawn analysis thread");
            }
        };
        self.analysis_thread = Some(analysis_thread);

        // Playback thread
        let state = self.state.clone();
        let in_progress = self.in_progress.clone();
        let opener = self.opener.clone();
        let filter_mix = self.config.filter_mix;

        self.in_progress.store(true, Ordering::Release);
        self.state.set_playing(true);

        let playback_thread = thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                run_playback(source, opener, state, in_progress, window_tx, filter_mix)
            });

        match playback_thread {
            Ok(handle) => {
                self.playback_thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.in_progress.store(false, Ordering::Release);
                self.state.set_playing(false);
                self.stop_analysis();
                self.rebuild_queues();
                Err(e).context("Failed to spawn playback thread")
            }
        }
    }

    /// Ask playback to stop and join both threads
    pub fn stop(&mut self) -> Result<Option<PlaybackOutcome>> {
        self.join_threads(true)
    }

    /// Join both threads after playback ended on its own
    pub fn finish(&mut self) -> Result<Option<PlaybackOutcome>> {
        self.join_threads(false)
    }

    fn join_threads(&mut self, request_stop: bool) -> Result<Option<PlaybackOutcome>> {
        let mut result = Ok(());

        if let Some(handle) = self.playback_thread.take() {
            // Keep clearing the flag until the thread is gone, in case the
            // loop had not yet started when the first request landed
            while !handle.is_finished() {
                if request_stop {
                    self.state.request_stop();
                }
                thread::sleep(Duration::from_millis(1));
            }

            match handle.join() {
                Ok((window_tx, outcome)) => {
                    self.window_tx = Some(window_tx);
                    log::info!("Playback ended: {:?}", outcome);
                    self.last_outcome = Some(outcome);
                }
                Err(_) => {
                    self.state.set_playing(false);
                    self.in_progress.store(false, Ordering::Release);
                    result = Err(anyhow::anyhow!("Playback thread panicked"));
                }
            }
        }

        if !self.stop_analysis() {
            result = Err(anyhow::anyhow!("Analysis thread panicked"));
        }

        if self.window_tx.is_none() || self.window_rx.is_none() || self.bins_tx.is_none() {
            self.rebuild_queues();
        }

        result.map(|_| self.last_outcome.clone())
    }

    /// Stop and join the analysis thread. Returns false if it panicked.
    fn stop_analysis(&mut self) -> bool {
        self.analyzer_running.store(false, Ordering::Release);

        let Some(handle) = self.analysis_thread.take() else {
            return true;
        };

        match handle.join() {
            Ok(outcome) => {
                log::debug!(
                    "Analysis stopped: {} windows analyzed ({} overlap-added), {} skipped, {} results dropped",
                    outcome.processed,
                    outcome.combined,
                    outcome.skipped,
                    outcome.dropped
                );
                self.window_rx = Some(outcome.windows);
                self.bins_tx = Some(outcome.bins);
                true
            }
            Err(_) => false,
        }
    }

    /// Replace queues whose handles were lost with a panicked thread
    fn rebuild_queues(&mut self) {
        log::warn!("Rebuilding real-time queues");
        let (window_tx, window_rx) = queue::channel(self.config.queue_capacity);
        let (bins_tx, bins_rx) = queue::channel(self.config.queue_capacity);
        self.window_tx = Some(window_tx);
        self.window_rx = Some(window_rx);
        self.bins_tx = Some(bins_tx);
        self.bins_rx = bins_rx;
    }

    /// True from `start` until the playback thread finishes
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// True while a playback thread exists (finished or not)
    pub fn has_threads(&self) -> bool {
        self.playback_thread.is_some() || self.analysis_thread.is_some()
    }

    pub fn state(&self) -> &Arc<SharedPlaybackState> {
        &self.state
    }

    /// Newest spectrum from the analysis thread, if any arrived
    pub fn latest_spectrum(&mut self) -> Option<SpectrumBins> {
        self.bins_rx.latest()
    }

    /// Clear telemetry. Only valid with no playback thread running.
    pub fn reset_stats(&self) {
        if self.playback_thread.is_none() {
            self.state.reset_stats();
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        // Ensure no thread outlives the engine
        if self.has_threads() {
            let _ = self.stop();
        }
    }
}

/// Playback thread body
fn run_playback(
    source: Arc<SampleBuffer>,
    opener: Arc<dyn OutputOpener>,
    state: Arc<SharedPlaybackState>,
    in_progress: Arc<AtomicBool>,
    mut window_tx: QueueProducer<WindowRecord>,
    filter_mix: f32,
) -> PlaybackThreadResult {
    let mut player = Player::new(state.clone(), filter_mix);

    let outcome = match player.init(source, opener.as_ref()) {
        Ok(()) => match player.play(Some(&mut window_tx)) {
            Ok(summary) => {
                log::debug!(
                    "Played {}/{} periods (stopped early: {}), {} underruns, {} write errors",
                    summary.ticks_played,
                    summary.num_ticks,
                    summary.stopped_early,
                    summary.underruns,
                    summary.write_errors
                );
                log::debug!(
                    "Windows: {} sent, {} dropped, {}/{} still queued",
                    summary.windows_sent,
                    summary.windows_dropped,
                    window_tx.size(),
                    window_tx.capacity()
                );
                PlaybackOutcome::Finished(summary)
            }
            Err(e) => PlaybackOutcome::Failed(e.to_string()),
        },
        Err(e) => {
            log::error!("Failed to initialize output: {}", e);
            state.set_playing(false);
            PlaybackOutcome::Failed(e.to_string())
        }
    };

    player.shutdown();
    in_progress.store(false, Ordering::Release);

    (window_tx, outcome)
}
