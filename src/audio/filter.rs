//! IIR lowpass effect applied to outgoing samples.
//!
//! A fixed 5th-order design (six numerator / denominator coefficients)
//! run independently on each channel of an interleaved buffer. Each
//! channel keeps a circular history of past inputs and outputs.

/// Number of b / a coefficients
const FILTER_SIZE: usize = 6;

#[rustfmt::skip]
const B_COEFFS: [f64; FILTER_SIZE] = [0.00319064, -0.00927144, 0.00608712, 0.00608712, -0.00927144, 0.00319064];
#[rustfmt::skip]
const A_COEFFS: [f64; FILTER_SIZE] = [1.0, -4.84007379, 9.40031811, -9.1568206, 4.4733176, -0.87672867];

/// History length; must exceed FILTER_SIZE
const HISTORY_LEN: usize = 32;

#[derive(Debug, Clone)]
struct ChannelHistory {
    inputs: [f64; HISTORY_LEN],
    outputs: [f64; HISTORY_LEN],
    /// Index of the most recently written slot
    last: usize,
}

impl ChannelHistory {
    fn new() -> Self {
        Self {
            inputs: [0.0; HISTORY_LEN],
            outputs: [0.0; HISTORY_LEN],
            last: FILTER_SIZE - 1,
        }
    }

    /// Slot holding the value `offset` samples back (1 = previous sample)
    #[inline(always)]
    fn slot(&self, offset: usize) -> usize {
        (self.last + HISTORY_LEN - (offset - 1)) % HISTORY_LEN
    }

    #[inline(always)]
    fn next(&self, sample: f64) -> f64 {
        let mut out = B_COEFFS[0] * sample;
        for i in 1..FILTER_SIZE {
            let slot = self.slot(i);
            out += B_COEFFS[i] * self.inputs[slot];
            out -= A_COEFFS[i] * self.outputs[slot];
        }
        out
    }

    #[inline(always)]
    fn push(&mut self, input: f64, output: f64) {
        self.last = (self.last + 1) % HISTORY_LEN;
        self.inputs[self.last] = input;
        self.outputs[self.last] = output;
    }
}

/// Per-channel IIR lowpass with a dry/wet blend
#[derive(Debug, Clone)]
pub struct IirLowpass {
    channels: Vec<ChannelHistory>,
}

impl IirLowpass {
    /// Create a filter for 1 (mono) or 2 (interleaved stereo) channels
    pub fn new(num_channels: usize) -> Self {
        assert!(
            num_channels == 1 || num_channels == 2,
            "IIR filter supports 1 or 2 channels, got {}",
            num_channels
        );
        Self {
            channels: vec![ChannelHistory::new(); num_channels],
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Filter `input` into `output`: `out = mix * filtered + in`
    ///
    /// Both buffers are interleaved and must be the same length. Runs on
    /// the playback thread, so no allocation happens here.
    pub fn fill_buffer(&mut self, input: &[f32], output: &mut [f32], mix: f32) {
        debug_assert_eq!(input.len(), output.len());
        let num_channels = self.num_channels();

        for (in_frame, out_frame) in input
            .chunks_exact(num_channels)
            .zip(output.chunks_exact_mut(num_channels))
        {
            for ((history, &x), y) in self
                .channels
                .iter_mut()
                .zip(in_frame)
                .zip(out_frame.iter_mut())
            {
                let filtered = history.next(x as f64);
                // Debug builds only; the coefficients are stable for finite input
                debug_assert!(!filtered.is_nan(), "IIR filter produced NaN");
                history.push(x as f64, filtered);

                *y = mix * filtered as f32 + x;
            }
        }
    }

    /// Forget all history
    pub fn reset(&mut self) {
        for history in &mut self.channels {
            *history = ChannelHistory::new();
        }
    }
}
