//! Noise Floor Estimation and Spectral Subtraction
//!
//! The estimator keeps a short rolling buffer of "quiet" frames (frames whose
//! level sits within 10 dB above the gate threshold or lower) and derives a
//! per-sample noise floor as the mean absolute value across those frames.
//!
//! This is a moving, non-parametric model: it tracks nonstationary noise well
//! but needs several quiet frames before it produces anything. A stream that is
//! voice all the way through never yields quiet frames, so its noise floor stays
//! absent (or stale from the last quiet stretch).

use std::collections::VecDeque;

use crate::level::{linear_to_db, rms};

/// Maximum number of quiet frames retained
pub const MAX_NOISE_BUFFER_FRAMES: usize = 10;

/// Quiet frames required before the first floor is computed
pub const MIN_NOISE_FRAMES: usize = MAX_NOISE_BUFFER_FRAMES / 2;

/// How far above the gate threshold a frame may sit and still count as quiet (dB)
pub const QUIET_MARGIN_DB: f32 = 10.0;

/// Guards the attenuation ratio against division by zero
const ATTENUATION_EPSILON: f32 = 1e-10;

/// Outcome of feeding one frame to the estimator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseUpdate {
    /// Frame level was under the quiet threshold and got buffered
    pub frame_was_quiet: bool,
    /// Noise floor was recomputed from the buffer
    pub floor_updated: bool,
}

/// Rolling estimator of the background noise floor
#[derive(Debug, Clone, Default)]
pub struct NoiseEstimator {
    frames: VecDeque<Vec<f32>>,
    floor: Option<Vec<f32>>,
    floor_rms: f32,
}

impl NoiseEstimator {
    pub fn new() -> Self {
        Self {
            frames: VecDeque::with_capacity(MAX_NOISE_BUFFER_FRAMES + 1),
            floor: None,
            floor_rms: 0.0,
        }
    }

    /// Feed one frame.
    ///
    /// `gate_threshold_db` is the noise gate threshold; anything below
    /// `threshold + 10 dB` is treated as background noise.
    pub fn update(&mut self, frame: &[f32], gate_threshold_db: f32) -> NoiseUpdate {
        if frame.is_empty() {
            return NoiseUpdate {
                frame_was_quiet: false,
                floor_updated: false,
            };
        }

        let level_db = linear_to_db(rms(frame));
        if level_db >= gate_threshold_db + QUIET_MARGIN_DB {
            return NoiseUpdate {
                frame_was_quiet: false,
                floor_updated: false,
            };
        }

        self.frames.push_back(frame.to_vec());
        while self.frames.len() > MAX_NOISE_BUFFER_FRAMES {
            self.frames.pop_front();
        }

        let floor_updated = self.frames.len() >= MIN_NOISE_FRAMES && self.recompute(frame.len());

        NoiseUpdate {
            frame_was_quiet: true,
            floor_updated,
        }
    }

    /// Per-sample mean of |x| across buffered frames of `frame_len` samples.
    fn recompute(&mut self, frame_len: usize) -> bool {
        let mut floor = vec![0.0f32; frame_len];
        let mut count = 0usize;

        for buffered in self.frames.iter().filter(|f| f.len() == frame_len) {
            for (acc, &s) in floor.iter_mut().zip(buffered) {
                *acc += s.abs();
            }
            count += 1;
        }

        if count == 0 {
            return false;
        }

        let scale = 1.0 / count as f32;
        for acc in floor.iter_mut() {
            *acc *= scale;
        }

        self.floor_rms = rms(&floor);
        self.floor = Some(floor);
        true
    }

    /// Current per-sample noise floor, if one has been established
    pub fn floor(&self) -> Option<&[f32]> {
        self.floor.as_deref()
    }

    /// RMS of the noise floor (0.0 when none exists)
    pub fn floor_rms(&self) -> f32 {
        self.floor_rms
    }

    pub fn has_floor(&self) -> bool {
        self.floor.is_some()
    }

    /// Number of quiet frames currently buffered
    pub fn buffered_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn reset(&mut self) {
        self.frames.clear();
        self.floor = None;
        self.floor_rms = 0.0;
    }
}

/// Attenuate samples whose magnitude is close to the noise floor.
///
/// For each sample, `noise = floor[i] * strength`. Samples with
/// `|x| < 2·noise` are scaled by `max(0, 1 - noise/|x|)`; louder samples pass
/// untouched. A missing floor or one whose length differs from the frame makes
/// this the identity.
pub fn spectral_subtract(input: &[f32], floor: Option<&[f32]>, strength: f32) -> Vec<f32> {
    let floor = match floor {
        Some(floor) if floor.len() == input.len() => floor,
        _ => return input.to_vec(),
    };

    input
        .iter()
        .zip(floor)
        .map(|(&sample, &floor)| {
            let noise = floor * strength;
            let magnitude = sample.abs();
            if magnitude < 2.0 * noise {
                let gain = (1.0 - noise / (magnitude + ATTENUATION_EPSILON)).max(0.0);
                sample * gain
            } else {
                sample
            }
        })
        .collect()
}
