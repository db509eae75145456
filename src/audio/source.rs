use std::path::Path;

use hound::{SampleFormat, WavReader};
use thiserror::Error;

/// Errors produced while loading a sample buffer
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed WAV data in '{path}': {reason}")]
    Format { path: String, reason: String },

    #[error("unsupported channel count {0}, expected 1 or 2")]
    UnsupportedChannels(u16),

    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),

    #[error("sample rate must be positive")]
    InvalidSampleRate,

    #[error("no audio frames in source")]
    Empty,

    #[error("no file path given")]
    NoPath,
}

/// Fully decoded audio held in memory (interleaved for stereo)
///
/// Immutable once built; the playback thread reads it through an `Arc`.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl SampleBuffer {
    /// Build a buffer from already-decoded samples
    ///
    /// A trailing partial frame is dropped so the sample count is always a
    /// multiple of the channel count.
    pub fn from_samples(
        mut samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, LoadError> {
        if channels != 1 && channels != 2 {
            return Err(LoadError::UnsupportedChannels(channels));
        }
        if sample_rate == 0 {
            return Err(LoadError::InvalidSampleRate);
        }

        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);

        if samples.is_empty() {
            return Err(LoadError::Empty);
        }

        Ok(Self {
            samples,
            channels,
            sample_rate,
        })
    }

    /// Load a WAV file from disk
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let display = path.display().to_string();
        let reader = WavReader::open(path).map_err(|e| wav_error(&display, e))?;
        let spec = reader.spec();

        // Validate channel count (mono or stereo only)
        if spec.channels != 1 && spec.channels != 2 {
            return Err(LoadError::UnsupportedChannels(spec.channels));
        }

        let samples: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| wav_error(&display, e))?,
            SampleFormat::Int => match spec.bits_per_sample {
                8 => reader
                    .into_samples::<i8>()
                    .map(|s| s.map(|v| v as f32 / i8::MAX as f32))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| wav_error(&display, e))?,
                16 => reader
                    .into_samples::<i16>()
                    .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| wav_error(&display, e))?,
                24 => reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / 8_388_607.0))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| wav_error(&display, e))?,
                32 => reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| wav_error(&display, e))?,
                bits => return Err(LoadError::UnsupportedBitDepth(bits)),
            },
        };

        let buffer = Self::from_samples(samples, spec.channels, spec.sample_rate)?;
        log::info!(
            "Loaded '{}': {} ch @ {} Hz, {} frames",
            display,
            buffer.channels,
            buffer.sample_rate,
            buffer.num_frames()
        );
        Ok(buffer)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn data(&self) -> &[f32] {
        &self.samples
    }

    /// Total number of samples across all channels
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_frames(&self) -> usize {
        self.len() / self.channels as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }
}

fn wav_error(path: &str, err: hound::Error) -> LoadError {
    match err {
        hound::Error::IoError(source) => LoadError::Io {
            path: path.to_string(),
            source,
        },
        other => LoadError::Format {
            path: path.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn temp_wav(name: &str, spec: WavSpec, samples: &[i16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("rtplay-{}-{}.wav", name, std::process::id()));
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_from_samples_truncates_partial_frame() {
        let buffer = SampleBuffer::from_samples(vec![0.1; 9], 2, 44100).unwrap();
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.num_frames(), 4);
        assert_eq!(buffer.len() % buffer.channels() as usize, 0);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_from_samples_rejects_bad_channels() {
        let err = SampleBuffer::from_samples(vec![0.0; 12], 3, 44100).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedChannels(3)));
    }

    #[test]
    fn test_from_samples_rejects_empty_and_zero_rate() {
        assert!(matches!(
            SampleBuffer::from_samples(Vec::new(), 1, 44100),
            Err(LoadError::Empty)
        ));
        assert!(matches!(
            SampleBuffer::from_samples(vec![0.0; 4], 1, 0),
            Err(LoadError::InvalidSampleRate)
        ));
    }

    #[test]
    fn test_load_int16_stereo() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = temp_wav("stereo", spec, &[i16::MAX, 0, 0, i16::MAX, 0, 0]);

        let buffer = SampleBuffer::load(&path).unwrap();
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.num_frames(), 3);
        assert!((buffer.data()[0] - 1.0).abs() < 1e-6);
        assert_eq!(buffer.data()[1], 0.0);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = SampleBuffer::load(Path::new("/nonexistent/rtplay/missing.wav")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn test_load_garbage_is_format_error() {
        let path = std::env::temp_dir().join(format!("rtplay-garbage-{}.wav", std::process::id()));
        std::fs::write(&path, b"definitely not a RIFF header").unwrap();

        let err = SampleBuffer::load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Format { .. }));

        let _ = std::fs::remove_file(path);
    }
}
