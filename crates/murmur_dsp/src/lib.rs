//! Murmur DSP - Digital Signal Processing Module
//!
//! This crate provides the building blocks of the voice input conditioning
//! pipeline:
//! - Level utilities (RMS, dB conversions, smoothing poles)
//! - Single-pole high-pass to remove DC and rumble
//! - Rolling noise-floor estimator and spectral subtraction
//! - Soft-knee noise gate with attack/release smoothing
//! - Time-domain NLMS acoustic echo canceller
//! - Direct DFT spectrum analyzer with five speech bands
//!
//! # Architecture
//!
//! Stages take an immutable view of their input frame and return a freshly
//! allocated output. Only the deliberate carry state (filter history, gate gain,
//! noise buffer, NLMS weights) is mutated. Sequencing lives in `murmur_core`.

mod echo;
mod error;
mod gate;
mod high_pass;
mod level;
mod noise;
mod spectrum;

pub use echo::{EchoFrame, NlmsEchoCanceller, CONVERGENCE_THRESHOLD, ERROR_HISTORY_LEN};
pub use error::DspError;
pub use gate::{target_gain, GateFrame, NoiseGate, FLOOR_GAIN, KNEE_WIDTH_DB};
pub use high_pass::{high_pass_coefficient, HighPassFilter};
pub use level::{db_to_linear, linear_to_db, rms, time_constant_to_coeff, MIN_LINEAR};
pub use noise::{
    spectral_subtract, NoiseEstimator, NoiseUpdate, MAX_NOISE_BUFFER_FRAMES, MIN_NOISE_FRAMES,
};
pub use spectrum::{analyze, BandEnergies, Spectrum, MAX_FFT_SIZE};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _hp = HighPassFilter::new(80.0, 16000.0);
        let _gate = NoiseGate::new(-25.0, 10.0, 100.0, 16000.0);
        let _noise = NoiseEstimator::new();
        let _aec = NlmsEchoCanceller::new(128, 0.1).unwrap();
    }
}
