//! Processing and Processor Configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

use murmur_dsp::MAX_FFT_SIZE;

/// Sample rate of the reference design
pub const DEFAULT_SAMPLE_RATE: f32 = 16000.0;

/// Largest NLMS filter accepted by validation
pub const MAX_NLMS_FILTER_LENGTH: usize = 8192;

/// Out-of-range configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid sample rate: {0} (must be 8000-192000)")]
    SampleRate(f32),

    #[error("Invalid high-pass cutoff: {cutoff}Hz (must be in (0, {nyquist})Hz)")]
    HighPassCutoff { cutoff: f32, nyquist: f32 },

    #[error("Invalid noise reduction strength: {0} (must be >= 0)")]
    NoiseReductionStrength(f32),

    #[error("Invalid noise gate threshold: {0}dB")]
    NoiseGateThreshold(f32),

    #[error("Invalid noise gate {field} time: {value}ms (must be >= 0)")]
    NoiseGateTime { field: &'static str, value: f32 },

    #[error("Invalid NLMS filter length: {0} (must be 1-8192)")]
    NlmsFilterLength(usize),

    #[error("Invalid NLMS step size: {0} (must be in (0, 2))")]
    NlmsStepSize(f32),

    #[error("Invalid FFT size: {0} (must be even, 2-8192)")]
    FftSize(usize),
}

/// Per-call processing configuration
///
/// Field names on the wire follow the transport's camelCase convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioProcessingConfig {
    pub enable_high_pass: bool,
    /// Cutoff in Hz
    pub high_pass_cutoff: f32,

    pub enable_noise_reduction: bool,
    /// Multiplier applied to the noise floor before subtraction
    pub noise_reduction_strength: f32,

    pub enable_noise_gate: bool,
    /// Level (dB) above which the gate is fully open
    pub noise_gate_threshold: f32,
    /// Attack time in ms
    pub noise_gate_attack: f32,
    /// Release time in ms
    pub noise_gate_release: f32,

    pub enable_echo_cancellation: bool,
    /// Number of NLMS taps
    pub nlms_filter_length: usize,
    /// NLMS step size μ
    pub nlms_step_size: f32,

    /// Spectrum transform size
    pub fft_size: usize,
}

impl Default for AudioProcessingConfig {
    fn default() -> Self {
        Self {
            enable_high_pass: true,
            high_pass_cutoff: 80.0,
            enable_noise_reduction: true,
            noise_reduction_strength: 0.5,
            enable_noise_gate: true,
            noise_gate_threshold: -25.0,
            noise_gate_attack: 10.0,
            noise_gate_release: 100.0,
            enable_echo_cancellation: true,
            nlms_filter_length: 128,
            nlms_step_size: 0.1,
            fft_size: 512,
        }
    }
}

/// Partial update to an [`AudioProcessingConfig`]; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_high_pass: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_pass_cutoff: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_noise_reduction: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_reduction_strength: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_noise_gate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_gate_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_gate_attack: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_gate_release: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_echo_cancellation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlms_filter_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nlms_step_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fft_size: Option<usize>,
}

impl ConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AudioProcessingConfig {
    /// Return a copy with every field present in `patch` applied.
    pub fn merged(&self, patch: &ConfigPatch) -> Self {
        Self {
            enable_high_pass: patch.enable_high_pass.unwrap_or(self.enable_high_pass),
            high_pass_cutoff: patch.high_pass_cutoff.unwrap_or(self.high_pass_cutoff),
            enable_noise_reduction: patch
                .enable_noise_reduction
                .unwrap_or(self.enable_noise_reduction),
            noise_reduction_strength: patch
                .noise_reduction_strength
                .unwrap_or(self.noise_reduction_strength),
            enable_noise_gate: patch.enable_noise_gate.unwrap_or(self.enable_noise_gate),
            noise_gate_threshold: patch
                .noise_gate_threshold
                .unwrap_or(self.noise_gate_threshold),
            noise_gate_attack: patch.noise_gate_attack.unwrap_or(self.noise_gate_attack),
            noise_gate_release: patch.noise_gate_release.unwrap_or(self.noise_gate_release),
            enable_echo_cancellation: patch
                .enable_echo_cancellation
                .unwrap_or(self.enable_echo_cancellation),
            nlms_filter_length: patch.nlms_filter_length.unwrap_or(self.nlms_filter_length),
            nlms_step_size: patch.nlms_step_size.unwrap_or(self.nlms_step_size),
            fft_size: patch.fft_size.unwrap_or(self.fft_size),
        }
    }

    /// Validate against the processor's sample rate
    pub fn validate(&self, sample_rate: f32) -> Result<(), ConfigError> {
        let nyquist = sample_rate / 2.0;
        if !(self.high_pass_cutoff > 0.0 && self.high_pass_cutoff < nyquist) {
            return Err(ConfigError::HighPassCutoff {
                cutoff: self.high_pass_cutoff,
                nyquist,
            });
        }
        if !(self.noise_reduction_strength.is_finite() && self.noise_reduction_strength >= 0.0) {
            return Err(ConfigError::NoiseReductionStrength(self.noise_reduction_strength));
        }
        if !self.noise_gate_threshold.is_finite() {
            return Err(ConfigError::NoiseGateThreshold(self.noise_gate_threshold));
        }
        for (field, value) in [
            ("attack", self.noise_gate_attack),
            ("release", self.noise_gate_release),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::NoiseGateTime { field, value });
            }
        }
        if self.nlms_filter_length == 0 || self.nlms_filter_length > MAX_NLMS_FILTER_LENGTH {
            return Err(ConfigError::NlmsFilterLength(self.nlms_filter_length));
        }
        if !(self.nlms_step_size > 0.0 && self.nlms_step_size < 2.0) {
            return Err(ConfigError::NlmsStepSize(self.nlms_step_size));
        }
        if self.fft_size < 2 || self.fft_size > MAX_FFT_SIZE || self.fft_size % 2 != 0 {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        Ok(())
    }
}

/// Settings fixed for the lifetime of a processor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessorOptions {
    /// Sample rate in Hz; drives every time constant
    pub sample_rate: f32,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl ProcessorOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(8000.0..=192000.0).contains(&self.sample_rate) {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AudioProcessingConfig::default();
        assert!(config.validate(DEFAULT_SAMPLE_RATE).is_ok());
        assert!(ProcessorOptions::default().validate().is_ok());
    }

    #[test]
    fn test_merge_applies_only_present_fields() {
        let base = AudioProcessingConfig::default();
        let patch = ConfigPatch {
            noise_gate_threshold: Some(-40.0),
            enable_echo_cancellation: Some(false),
            ..Default::default()
        };

        let merged = base.merged(&patch);
        assert_eq!(merged.noise_gate_threshold, -40.0);
        assert!(!merged.enable_echo_cancellation);
        assert_eq!(merged.high_pass_cutoff, base.high_pass_cutoff);
        assert_eq!(merged.nlms_filter_length, base.nlms_filter_length);

        assert_eq!(base.merged(&ConfigPatch::default()), base);
        assert!(ConfigPatch::default().is_empty());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_validation() {
        let fs = DEFAULT_SAMPLE_RATE;
        let valid = AudioProcessingConfig::default();

        let cases = [
            AudioProcessingConfig { high_pass_cutoff: 0.0, ..valid.clone() },
            AudioProcessingConfig { high_pass_cutoff: -10.0, ..valid.clone() },
            AudioProcessingConfig { high_pass_cutoff: 8000.0, ..valid.clone() },
            AudioProcessingConfig { noise_reduction_strength: -1.0, ..valid.clone() },
            AudioProcessingConfig { noise_gate_threshold: f32::NAN, ..valid.clone() },
            AudioProcessingConfig { noise_gate_attack: -1.0, ..valid.clone() },
            AudioProcessingConfig { noise_gate_release: f32::INFINITY, ..valid.clone() },
            AudioProcessingConfig { nlms_filter_length: 0, ..valid.clone() },
            AudioProcessingConfig { nlms_step_size: 0.0, ..valid.clone() },
            AudioProcessingConfig { nlms_step_size: 2.5, ..valid.clone() },
            AudioProcessingConfig { fft_size: 511, ..valid.clone() },
            AudioProcessingConfig { fft_size: 0, ..valid.clone() },
        ];
        for config in &cases {
            assert!(config.validate(fs).is_err(), "{:?} should be rejected", config);
        }

        // Zero-length attack/release is allowed (immediate gain jumps)
        let immediate = AudioProcessingConfig {
            noise_gate_attack: 0.0,
            noise_gate_release: 0.0,
            ..valid
        };
        assert!(immediate.validate(fs).is_ok());
    }

    #[test]
    fn test_validation_error_names_field() {
        let config = AudioProcessingConfig {
            noise_gate_release: -3.0,
            ..Default::default()
        };
        let err = config.validate(DEFAULT_SAMPLE_RATE).unwrap_err();
        assert!(err.to_string().contains("release"));
    }

    #[test]
    fn test_sample_rate_validation() {
        let too_low = ProcessorOptions { sample_rate: 100.0 };
        assert!(too_low.validate().is_err());

        let broadcast = ProcessorOptions {
            sample_rate: 48000.0,
        };
        assert!(broadcast.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_uses_camel_case() {
        let config = AudioProcessingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"highPassCutoff\""));
        assert!(json.contains("\"nlmsFilterLength\""));

        let deserialized: AudioProcessingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_patch_deserializes_partial_json() {
        let patch: ConfigPatch =
            serde_json::from_str(r#"{"highPassCutoff": 120.0, "enableNoiseGate": false}"#).unwrap();
        assert_eq!(patch.high_pass_cutoff, Some(120.0));
        assert_eq!(patch.enable_noise_gate, Some(false));
        assert_eq!(patch.fft_size, None);

        // Missing fields fall back to defaults for a full config too
        let config: AudioProcessingConfig = serde_json::from_str(r#"{"fftSize": 256}"#).unwrap();
        assert_eq!(config.fft_size, 256);
        assert_eq!(config.high_pass_cutoff, 80.0);
    }
}
