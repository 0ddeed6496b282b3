//! DC / Rumble High-Pass Filter
//!
//! Single-pole RC high-pass:
//!
//! ```text
//! RC = 1 / (2π·cutoff)
//! α  = RC / (RC + 1/fs)
//! y[n] = α · (y[n-1] + x[n] - x[n-1])
//! ```
//!
//! Carries the previous input and output across calls so consecutive frames
//! are filtered as one continuous stream.

/// Compute the filter coefficient for a cutoff and sample rate.
///
/// Precondition: `cutoff_hz > 0` and `sample_rate > 0`. Range checks belong to
/// the configuration layer.
#[inline]
pub fn high_pass_coefficient(cutoff_hz: f32, sample_rate: f32) -> f32 {
    debug_assert!(cutoff_hz > 0.0, "high-pass cutoff must be positive");
    debug_assert!(sample_rate > 0.0, "sample rate must be positive");

    let rc = 1.0 / (2.0 * std::f32::consts::PI * cutoff_hz);
    let dt = 1.0 / sample_rate;
    rc / (rc + dt)
}

/// Single-pole high-pass with carry-over state
#[derive(Debug, Clone)]
pub struct HighPassFilter {
    alpha: f32,
    cutoff_hz: f32,
    sample_rate: f32,
    prev_input: f32,
    prev_output: f32,
}

impl HighPassFilter {
    pub fn new(cutoff_hz: f32, sample_rate: f32) -> Self {
        Self {
            alpha: high_pass_coefficient(cutoff_hz, sample_rate),
            cutoff_hz,
            sample_rate,
            prev_input: 0.0,
            prev_output: 0.0,
        }
    }

    /// Update the cutoff. Carry state is kept so the stream stays continuous.
    pub fn set_cutoff(&mut self, cutoff_hz: f32) {
        if cutoff_hz == self.cutoff_hz {
            return;
        }
        self.cutoff_hz = cutoff_hz;
        self.alpha = high_pass_coefficient(cutoff_hz, self.sample_rate);
    }

    pub fn cutoff_hz(&self) -> f32 {
        self.cutoff_hz
    }

    /// Current α coefficient
    pub fn coefficient(&self) -> f32 {
        self.alpha
    }

    /// Filter a frame, returning a new buffer.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let mut output = Vec::with_capacity(input.len());
        let mut prev_input = self.prev_input;
        let mut prev_output = self.prev_output;

        for &x in input {
            let y = self.alpha * (prev_output + x - prev_input);
            prev_input = x;
            prev_output = y;
            output.push(y);
        }

        self.prev_input = prev_input;
        self.prev_output = prev_output;
        output
    }

    /// Clear carry state (coefficient is kept)
    pub fn reset(&mut self) {
        self.prev_input = 0.0;
        self.prev_output = 0.0;
    }

    /// Carry state as `(prev_input, prev_output)`
    pub fn carry(&self) -> (f32, f32) {
        (self.prev_input, self.prev_output)
    }
}
