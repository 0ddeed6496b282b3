//! NLMS Acoustic Echo Canceller
//!
//! Removes loudspeaker echo from the microphone signal by:
//! 1. Keeping a circular buffer of the reference (what the speaker played)
//! 2. Modeling the speaker-to-mic path as an adaptive FIR filter
//! 3. Subtracting the predicted echo from the input
//!
//! Weights adapt with the Normalized LMS rule:
//!
//! ```text
//! w[j] += (μ / ||x||²) · e · x[n-j]
//! ```
//!
//! Normalizing by reference power decouples convergence speed from the
//! reference amplitude.
//!
//! # Alignment
//!
//! Reference sample `i` of the frame is taken at `min(i, ref_len - 1)`: the
//! reference is assumed frame-synchronous with the input. There is no delay
//! estimation.
//!
//! # Cost
//!
//! O(frame_len × filter_len) per call. This dominates the pipeline.

use std::collections::VecDeque;

use crate::error::DspError;
use crate::level::rms;

/// Floor on reference power used in the step normalization
pub const POWER_EPSILON: f32 = 0.001;

/// Samples of |error| tracked for convergence detection
pub const ERROR_HISTORY_LEN: usize = 50;

/// Mean |error| under which the filter is considered converged
pub const CONVERGENCE_THRESHOLD: f32 = 0.01;

/// Upper bound on taps accepted by [`NlmsEchoCanceller::new`]
pub const MAX_FILTER_LENGTH: usize = 8192;

/// Result of cancelling one frame
#[derive(Debug, Clone, PartialEq)]
pub struct EchoFrame {
    /// De-echoed samples (the NLMS error signal)
    pub output: Vec<f32>,
    /// 20·log10(rms_out / rms_in); negative means attenuation
    pub reduction_db: f32,
}

/// Time-domain NLMS echo canceller
#[derive(Debug, Clone)]
pub struct NlmsEchoCanceller {
    weights: Vec<f32>,
    reference_buffer: Vec<f32>,
    cursor: usize,
    step_size: f32,
    error_history: VecDeque<f32>,
    converged: bool,
    reduction_db: f32,
}

impl NlmsEchoCanceller {
    /// Create a canceller with `filter_length` taps.
    ///
    /// `step_size` (μ) must lie in (0, 2) for NLMS to be stable; the
    /// configuration layer enforces that range.
    pub fn new(filter_length: usize, step_size: f32) -> Result<Self, DspError> {
        if filter_length == 0 || filter_length > MAX_FILTER_LENGTH {
            return Err(DspError::InvalidFilterLength(filter_length));
        }

        Ok(Self {
            weights: vec![0.0; filter_length],
            reference_buffer: vec![0.0; filter_length],
            cursor: 0,
            step_size,
            error_history: VecDeque::with_capacity(ERROR_HISTORY_LEN),
            converged: false,
            reduction_db: 0.0,
        })
    }

    pub fn filter_length(&self) -> usize {
        self.weights.len()
    }

    pub fn set_step_size(&mut self, step_size: f32) {
        self.step_size = step_size;
    }

    pub fn step_size(&self) -> f32 {
        self.step_size
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn is_converged(&self) -> bool {
        self.converged
    }

    /// Echo reduction measured on the last frame (dB)
    pub fn reduction_db(&self) -> f32 {
        self.reduction_db
    }

    /// Cancel echo from `input` using the frame-aligned `reference`.
    ///
    /// An empty reference leaves the input untouched.
    pub fn process(&mut self, input: &[f32], reference: &[f32]) -> EchoFrame {
        if reference.is_empty() {
            return EchoFrame {
                output: input.to_vec(),
                reduction_db: self.reduction_db,
            };
        }

        let len = self.weights.len();
        let last_ref = reference.len() - 1;
        let mut output = Vec::with_capacity(input.len());

        for (i, &mic) in input.iter().enumerate() {
            self.reference_buffer[self.cursor] = reference[i.min(last_ref)];

            // Walk the delay line newest-first: tap j sees x[n-j]
            let mut predicted = 0.0f32;
            let mut power = 0.0f32;
            for j in 0..len {
                let x = self.reference_buffer[(self.cursor + len - j) % len];
                predicted += self.weights[j] * x;
                power += x * x;
            }

            let error = mic - predicted;
            output.push(error);

            let step = self.step_size / power.max(POWER_EPSILON) * error;
            for j in 0..len {
                let x = self.reference_buffer[(self.cursor + len - j) % len];
                self.weights[j] += step * x;
            }

            self.cursor = (self.cursor + 1) % len;
            self.track_error(error);
        }

        let rms_in = rms(input);
        let rms_out = rms(&output);
        self.reduction_db = if rms_in > 0.0 {
            20.0 * (rms_out / rms_in).max(crate::level::MIN_LINEAR).log10()
        } else {
            0.0
        };

        EchoFrame {
            output,
            reduction_db: self.reduction_db,
        }
    }

    fn track_error(&mut self, error: f32) {
        if self.error_history.len() == ERROR_HISTORY_LEN {
            self.error_history.pop_front();
        }
        self.error_history.push_back(error.abs());

        if self.error_history.len() == ERROR_HISTORY_LEN {
            let mean = self.error_history.iter().sum::<f32>() / ERROR_HISTORY_LEN as f32;
            self.converged = mean < CONVERGENCE_THRESHOLD;
        }
    }

    /// Forget the learned echo path
    pub fn reset(&mut self) {
        self.weights.fill(0.0);
        self.reference_buffer.fill(0.0);
        self.cursor = 0;
        self.error_history.clear();
        self.converged = false;
        self.reduction_db = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 16000.0;

    fn tone(freq: f32, amplitude: f32, start: usize, len: usize) -> Vec<f32> {
        (start..start + len)
            .map(|n| amplitude * (2.0 * std::f32::consts::PI * freq * n as f32 / FS).sin())
            .collect()
    }

    #[test]
    fn test_rejects_bad_filter_length() {
        assert!(matches!(
            NlmsEchoCanceller::new(0, 0.1),
            Err(DspError::InvalidFilterLength(0))
        ));
        assert!(NlmsEchoCanceller::new(MAX_FILTER_LENGTH + 1, 0.1).is_err());
        assert!(NlmsEchoCanceller::new(64, 0.1).is_ok());
    }

    #[test]
    fn test_empty_reference_is_identity() {
        let mut aec = NlmsEchoCanceller::new(32, 0.1).unwrap();
        let input = tone(440.0, 0.3, 0, 160);
        let frame = aec.process(&input, &[]);
        assert_eq!(frame.output, input);
        assert!(aec.weights().iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_perfect_echo_converges() {
        let mut aec = NlmsEchoCanceller::new(128, 0.1).unwrap();
        let frame_len = 160;

        let mut last_reduction = 0.0;
        for f in 0..60 {
            let signal = tone(440.0, 0.5, f * frame_len, frame_len);
            let frame = aec.process(&signal, &signal);
            last_reduction = frame.reduction_db;
        }

        assert!(aec.is_converged(), "canceller should converge on a pure echo");
        assert!(last_reduction < -20.0, "reduction {} dB", last_reduction);
    }

    #[test]
    fn test_scaled_echo_is_learned() {
        // Echo path is a plain 0.6 gain; the first tap should approach it
        let mut aec = NlmsEchoCanceller::new(16, 0.5).unwrap();
        let frame_len = 160;
        for f in 0..100 {
            let reference = tone(300.0, 0.4, f * frame_len, frame_len);
            let mic: Vec<f32> = reference.iter().map(|r| 0.6 * r).collect();
            aec.process(&mic, &reference);
        }
        assert!(aec.is_converged());
        assert!(aec.reduction_db() < -20.0);
    }

    #[test]
    fn test_reference_index_is_clamped() {
        // A reference shorter than the frame reuses its last sample
        let mut aec = NlmsEchoCanceller::new(8, 0.1).unwrap();
        let input = vec![0.1f32; 32];
        let frame = aec.process(&input, &[0.2, 0.2]);
        assert_eq!(frame.output.len(), input.len());
        assert!(frame.output.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_silent_input_reports_zero_reduction() {
        let mut aec = NlmsEchoCanceller::new(8, 0.1).unwrap();
        let frame = aec.process(&[0.0; 64], &[0.0; 64]);
        assert_eq!(frame.reduction_db, 0.0);
        assert!(frame.output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_not_converged_before_history_fills() {
        let mut aec = NlmsEchoCanceller::new(8, 0.1).unwrap();
        aec.process(&[0.0; ERROR_HISTORY_LEN - 1], &[0.0; ERROR_HISTORY_LEN - 1]);
        assert!(!aec.is_converged());
        aec.process(&[0.0; 1], &[0.0; 1]);
        assert!(aec.is_converged());
    }

    #[test]
    fn test_reset_clears_weights() {
        let mut aec = NlmsEchoCanceller::new(32, 0.2).unwrap();
        let signal = tone(500.0, 0.5, 0, 640);
        aec.process(&signal, &signal);
        assert!(aec.weights().iter().any(|&w| w != 0.0));

        aec.reset();
        assert!(aec.weights().iter().all(|&w| w == 0.0));
        assert!(!aec.is_converged());
        assert_eq!(aec.reduction_db(), 0.0);
        assert_eq!(aec.filter_length(), 32);
    }
}
