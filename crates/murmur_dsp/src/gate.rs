//! Noise Gate with Soft Knee
//!
//! Mutes frames whose level falls below a threshold. Gain is computed once
//! per frame and applied uniformly to every sample in it, which is coarse but
//! cheap for the block sizes a voice front end uses.
//!
//! # Gain curve
//!
//! ```text
//!   level >= threshold           -> 1.0
//!   threshold-10 <= level < thr  -> ratio²,  ratio = (level - (thr-10)) / 10
//!   level < threshold-10         -> 0.1  (counted as an activation)
//! ```
//!
//! The applied gain follows the target through a one-pole smoother: the
//! attack pole when rising, the release pole when falling. Gain never jumps.

use crate::level::{linear_to_db, rms, time_constant_to_coeff};

/// Width of the soft knee below the threshold (dB)
pub const KNEE_WIDTH_DB: f32 = 10.0;

/// Gain applied to frames below the knee
pub const FLOOR_GAIN: f32 = 0.1;

/// Soft-knee target gain for a frame level
#[inline]
pub fn target_gain(level_db: f32, threshold_db: f32) -> f32 {
    let knee_start = threshold_db - KNEE_WIDTH_DB;
    if level_db >= threshold_db {
        1.0
    } else if level_db >= knee_start {
        let ratio = (level_db - knee_start) / KNEE_WIDTH_DB;
        ratio * ratio
    } else {
        FLOOR_GAIN
    }
}

/// Frame-rate noise gate
#[derive(Debug, Clone)]
pub struct NoiseGate {
    threshold_db: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
    gain: f32,
    activations: u64,
}

/// Telemetry for one gated frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateFrame {
    /// Frame level before gating
    pub level_db: f32,
    /// Target gain from the soft-knee curve
    pub target: f32,
    /// Smoothed gain actually applied
    pub gain: f32,
    /// Frame fell below the knee
    pub activated: bool,
}

impl NoiseGate {
    /// Create a new noise gate
    ///
    /// # Arguments
    /// * `threshold_db` - Level above which the gate is fully open
    /// * `attack_ms` - Time constant for rising gain
    /// * `release_ms` - Time constant for falling gain
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(threshold_db: f32, attack_ms: f32, release_ms: f32, sample_rate: f32) -> Self {
        Self {
            threshold_db,
            attack_coeff: time_constant_to_coeff(attack_ms, sample_rate),
            release_coeff: time_constant_to_coeff(release_ms, sample_rate),
            sample_rate,
            gain: 1.0,
            activations: 0,
        }
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db;
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn set_attack_time(&mut self, attack_ms: f32) {
        self.attack_coeff = time_constant_to_coeff(attack_ms, self.sample_rate);
    }

    pub fn set_release_time(&mut self, release_ms: f32) {
        self.release_coeff = time_constant_to_coeff(release_ms, self.sample_rate);
    }

    pub fn attack_coeff(&self) -> f32 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }

    /// Current smoothed gain (0.0 to 1.0)
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Lifetime count of frames that fell below the knee
    pub fn activations(&self) -> u64 {
        self.activations
    }

    /// Gate one frame, returning the gated copy and its telemetry.
    pub fn process(&mut self, input: &[f32]) -> (Vec<f32>, GateFrame) {
        let level_db = linear_to_db(rms(input));
        let target = target_gain(level_db, self.threshold_db);
        let activated = level_db < self.threshold_db - KNEE_WIDTH_DB;
        if activated {
            self.activations += 1;
        }

        let coeff = if target > self.gain {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain = coeff * self.gain + (1.0 - coeff) * target;

        let gain = self.gain;
        let output = input.iter().map(|&s| s * gain).collect();

        (
            output,
            GateFrame {
                level_db,
                target,
                gain,
                activated,
            },
        )
    }

    /// Return to a fully open gate and clear the activation counter
    pub fn reset(&mut self) {
        self.gain = 1.0;
        self.activations = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 16000.0;

    #[test]
    fn test_target_gain_curve() {
        assert_eq!(target_gain(-10.0, -25.0), 1.0);
        assert_eq!(target_gain(-25.0, -25.0), 1.0);
        // Middle of the knee: ratio 0.5 -> 0.25
        assert!((target_gain(-30.0, -25.0) - 0.25).abs() < 1e-6);
        // Bottom edge of the knee
        assert!(target_gain(-35.0, -25.0).abs() < 1e-6);
        assert_eq!(target_gain(-35.1, -25.0), FLOOR_GAIN);
        assert_eq!(target_gain(-200.0, -25.0), FLOOR_GAIN);
    }

    #[test]
    fn test_loud_frame_stays_open() {
        let mut gate = NoiseGate::new(-25.0, 10.0, 100.0, FS);
        let loud = vec![0.5f32; 160];
        let (out, frame) = gate.process(&loud);
        assert_eq!(frame.target, 1.0);
        assert!((frame.gain - 1.0).abs() < 1e-6);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(!frame.activated);
        assert_eq!(gate.activations(), 0);
    }

    #[test]
    fn test_quiet_frames_converge_to_floor() {
        // 100 ms frames at 0.01 (-40 dB) sit below the knee of a -25 dB threshold
        let mut gate = NoiseGate::new(-25.0, 10.0, 100.0, FS);
        let quiet = vec![0.01f32; 1600];

        let mut previous = gate.gain();
        for _ in 0..6000 {
            let (_, frame) = gate.process(&quiet);
            assert!(frame.activated);
            assert!(frame.gain <= previous);
            assert!(frame.gain >= FLOOR_GAIN);
            previous = frame.gain;
        }

        assert!(gate.gain() < 0.15, "gain {} should approach 0.1", gate.gain());
        assert_eq!(gate.activations(), 6000);
    }

    #[test]
    fn test_gain_is_smoothed_per_frame() {
        let mut gate = NoiseGate::new(-25.0, 10.0, 100.0, FS);
        let release = gate.release_coeff();
        let attack = gate.attack_coeff();

        // Falling: one step is exactly a release-pole step
        let before = gate.gain();
        let (_, frame) = gate.process(&vec![0.0001f32; 160]);
        let expected = release * before + (1.0 - release) * FLOOR_GAIN;
        assert!((frame.gain - expected).abs() < 1e-6);

        // Rising: one step is exactly an attack-pole step
        let before = gate.gain();
        let (_, frame) = gate.process(&vec![0.5f32; 160]);
        let expected = attack * before + (1.0 - attack);
        assert!((frame.gain - expected).abs() < 1e-6);
    }

    #[test]
    fn test_zero_attack_release_jumps() {
        let mut gate = NoiseGate::new(-25.0, 0.0, 0.0, FS);
        assert_eq!(gate.attack_coeff(), 0.0);
        assert_eq!(gate.release_coeff(), 0.0);

        let (_, frame) = gate.process(&[0.0; 32]);
        assert!((frame.gain - FLOOR_GAIN).abs() < 1e-6);
        let (_, frame) = gate.process(&[0.5; 32]);
        assert!((frame.gain - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_applies_gain_uniformly() {
        let mut gate = NoiseGate::new(-25.0, 0.0, 0.0, FS);
        let input = vec![0.001, -0.002, 0.003];
        let (out, frame) = gate.process(&input);
        for (o, i) in out.iter().zip(&input) {
            assert!((o - i * frame.gain).abs() < 1e-9);
        }
    }

    #[test]
    fn test_reset() {
        let mut gate = NoiseGate::new(-25.0, 10.0, 10.0, FS);
        for _ in 0..10 {
            gate.process(&[0.0; 64]);
        }
        assert!(gate.gain() < 1.0);
        assert_eq!(gate.activations(), 10);

        gate.reset();
        assert_eq!(gate.gain(), 1.0);
        assert_eq!(gate.activations(), 0);
        // Threshold survives reset
        assert_eq!(gate.threshold_db(), -25.0);
    }
}
