//! Message Types for the Processor Boundary
//!
//! Requests arrive from the transport as a [`WireRequest`] (string operation
//! tag plus raw little-endian f32 payloads) and are decoded into a typed
//! [`Operation`]. Every request yields exactly one [`Response`] envelope.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigPatch;
use crate::error::{ProcessError, ProcessResult};
use murmur_dsp::{BandEnergies, Spectrum};

/// Operation tags understood by the processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    ProcessFrame,
    ApplyHighPass,
    ApplyNoiseGate,
    ApplyNoiseReduction,
    ApplyEchoCancellation,
    CalculateRms,
    CalculateSpectrum,
    UpdateNoiseEstimate,
    ResetFilters,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::ProcessFrame,
        OperationKind::ApplyHighPass,
        OperationKind::ApplyNoiseGate,
        OperationKind::ApplyNoiseReduction,
        OperationKind::ApplyEchoCancellation,
        OperationKind::CalculateRms,
        OperationKind::CalculateSpectrum,
        OperationKind::UpdateNoiseEstimate,
        OperationKind::ResetFilters,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ProcessFrame => "process-frame",
            OperationKind::ApplyHighPass => "apply-high-pass",
            OperationKind::ApplyNoiseGate => "apply-noise-gate",
            OperationKind::ApplyNoiseReduction => "apply-noise-reduction",
            OperationKind::ApplyEchoCancellation => "apply-echo-cancellation",
            OperationKind::CalculateRms => "calculate-rms",
            OperationKind::CalculateSpectrum => "calculate-spectrum",
            OperationKind::UpdateNoiseEstimate => "update-noise-estimate",
            OperationKind::ResetFilters => "reset-filters",
        }
    }

    /// Whether the operation needs a sample payload
    pub fn requires_samples(&self) -> bool {
        !matches!(self, OperationKind::ResetFilters)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ProcessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProcessError::UnknownOperation(s.to_string()))
    }
}

/// A decoded request with its strongly-typed payload
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Run the full pipeline on one frame
    ProcessFrame {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// High-pass only
    ApplyHighPass {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// Noise gate only
    ApplyNoiseGate {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// Update the noise estimate, then spectrally subtract it
    ApplyNoiseReduction {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// Echo cancellation only; a supplied reference is stamped with the call time
    ApplyEchoCancellation {
        samples: Vec<f32>,
        echo_reference: Option<Vec<f32>>,
        config: Option<ConfigPatch>,
    },

    /// RMS level of the samples
    CalculateRms { samples: Vec<f32> },

    /// Direct DFT of the samples
    CalculateSpectrum {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// Feed the noise estimator without producing audio
    UpdateNoiseEstimate {
        samples: Vec<f32>,
        config: Option<ConfigPatch>,
    },

    /// Rebuild all per-stage state, keeping the active configuration
    ResetFilters,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ProcessFrame { .. } => OperationKind::ProcessFrame,
            Operation::ApplyHighPass { .. } => OperationKind::ApplyHighPass,
            Operation::ApplyNoiseGate { .. } => OperationKind::ApplyNoiseGate,
            Operation::ApplyNoiseReduction { .. } => OperationKind::ApplyNoiseReduction,
            Operation::ApplyEchoCancellation { .. } => OperationKind::ApplyEchoCancellation,
            Operation::CalculateRms { .. } => OperationKind::CalculateRms,
            Operation::CalculateSpectrum { .. } => OperationKind::CalculateSpectrum,
            Operation::UpdateNoiseEstimate { .. } => OperationKind::UpdateNoiseEstimate,
            Operation::ResetFilters => OperationKind::ResetFilters,
        }
    }

    /// Sample payload, if the operation carries one
    pub fn samples(&self) -> Option<&[f32]> {
        match self {
            Operation::ProcessFrame { samples, .. }
            | Operation::ApplyHighPass { samples, .. }
            | Operation::ApplyNoiseGate { samples, .. }
            | Operation::ApplyNoiseReduction { samples, .. }
            | Operation::ApplyEchoCancellation { samples, .. }
            | Operation::CalculateRms { samples }
            | Operation::CalculateSpectrum { samples, .. }
            | Operation::UpdateNoiseEstimate { samples, .. } => Some(samples),
            Operation::ResetFilters => None,
        }
    }

    /// Configuration patch, if one was supplied
    pub fn config(&self) -> Option<&ConfigPatch> {
        match self {
            Operation::ProcessFrame { config, .. }
            | Operation::ApplyHighPass { config, .. }
            | Operation::ApplyNoiseGate { config, .. }
            | Operation::ApplyNoiseReduction { config, .. }
            | Operation::ApplyEchoCancellation { config, .. }
            | Operation::CalculateSpectrum { config, .. }
            | Operation::UpdateNoiseEstimate { config, .. } => config.as_ref(),
            Operation::CalculateRms { .. } | Operation::ResetFilters => None,
        }
    }

    /// Decode a transport message into a typed operation.
    pub fn from_wire(request: WireRequest) -> ProcessResult<Operation> {
        let kind: OperationKind = request.operation.parse()?;
        if !kind.requires_samples() {
            return Ok(Operation::ResetFilters);
        }

        let samples = match request.payload.as_deref() {
            Some(bytes) if !bytes.is_empty() => decode_samples(bytes)?,
            _ => {
                return Err(ProcessError::MissingInput {
                    operation: kind.as_str(),
                })
            }
        };
        let config = request.config;

        let operation = match kind {
            OperationKind::ProcessFrame => Operation::ProcessFrame { samples, config },
            OperationKind::ApplyHighPass => Operation::ApplyHighPass { samples, config },
            OperationKind::ApplyNoiseGate => Operation::ApplyNoiseGate { samples, config },
            OperationKind::ApplyNoiseReduction => {
                Operation::ApplyNoiseReduction { samples, config }
            }
            OperationKind::ApplyEchoCancellation => Operation::ApplyEchoCancellation {
                samples,
                echo_reference: request
                    .echo_reference
                    .as_deref()
                    .map(decode_samples)
                    .transpose()?,
                config,
            },
            OperationKind::CalculateRms => Operation::CalculateRms { samples },
            OperationKind::CalculateSpectrum => Operation::CalculateSpectrum { samples, config },
            OperationKind::UpdateNoiseEstimate => {
                Operation::UpdateNoiseEstimate { samples, config }
            }
            OperationKind::ResetFilters => Operation::ResetFilters,
        };
        Ok(operation)
    }
}

/// Interpret a byte buffer as little-endian f32 samples.
pub fn decode_samples(bytes: &[u8]) -> ProcessResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(ProcessError::InvalidPayload(format!(
            "{} bytes is not a whole number of f32 samples",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Serialize samples as little-endian f32 bytes.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Transport-level request: correlation id, operation tag and binary payloads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub id: String,
    pub operation: String,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub config: Option<ConfigPatch>,
    #[serde(default)]
    pub echo_reference: Option<Vec<u8>>,
}

impl WireRequest {
    pub fn new(id: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            operation: kind.as_str().to_string(),
            ..Default::default()
        }
    }

    pub fn with_samples(mut self, samples: &[f32]) -> Self {
        self.payload = Some(encode_samples(samples));
        self
    }

    pub fn with_config(mut self, config: ConfigPatch) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_echo_reference(mut self, reference: &[f32]) -> Self {
        self.echo_reference = Some(encode_samples(reference));
        self
    }
}

/// Per-frame flags and scalars returned by `process-frame`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetadata {
    /// Smoothed gate gain fell below 0.5
    pub gate_triggered: bool,
    pub gate_gain: f32,
    /// Echo canceller ran on this frame
    pub echo_active: bool,
    pub nlms_converged: bool,
    pub echo_reduction_db: f32,
    pub frames_processed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOutput {
    pub samples: Vec<f32>,
    pub rms: f32,
    pub noise_floor_rms: f32,
    pub metadata: FrameMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighPassOutput {
    pub samples: Vec<f32>,
    pub rms: f32,
    /// Filter α used for this call
    pub coefficient: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseGateOutput {
    pub samples: Vec<f32>,
    pub gain: f32,
    pub activations: u64,
    pub gate_triggered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseReductionOutput {
    pub samples: Vec<f32>,
    pub noise_floor_rms: f32,
    /// A matching noise floor existed and subtraction ran
    pub applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoCancellationOutput {
    pub samples: Vec<f32>,
    pub echo_active: bool,
    pub converged: bool,
    pub echo_reduction_db: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RmsOutput {
    pub rms: f32,
    pub db: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BandOutput {
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
}

impl From<BandEnergies> for BandOutput {
    fn from(bands: BandEnergies) -> Self {
        Self {
            bass: bands.bass,
            low_mid: bands.low_mid,
            mid: bands.mid,
            high_mid: bands.high_mid,
            treble: bands.treble,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectrumOutput {
    pub frequencies: Vec<f32>,
    pub magnitudes: Vec<f32>,
    pub bands: BandOutput,
}

impl From<Spectrum> for SpectrumOutput {
    fn from(spectrum: Spectrum) -> Self {
        Self {
            frequencies: spectrum.frequencies,
            magnitudes: spectrum.magnitudes,
            bands: spectrum.bands.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoiseEstimateOutput {
    pub buffered_frames: usize,
    pub has_noise_floor: bool,
    pub noise_floor_rms: f32,
}

/// Result payload for each operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum OperationOutput {
    Frame(FrameOutput),
    HighPass(HighPassOutput),
    NoiseGate(NoiseGateOutput),
    NoiseReduction(NoiseReductionOutput),
    EchoCancellation(EchoCancellationOutput),
    Rms(RmsOutput),
    Spectrum(SpectrumOutput),
    NoiseEstimate(NoiseEstimateOutput),
    Reset,
}

/// Envelope returned for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub success: bool,
    pub processing_time_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<OperationOutput>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: impl Into<String>, output: OperationOutput, elapsed: Duration) -> Self {
        Self {
            id: id.into(),
            success: true,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
            result: Some(output),
            error: None,
        }
    }

    /// Create an error response from any error type
    pub fn error<E: fmt::Display>(id: impl Into<String>, err: E, elapsed: Duration) -> Self {
        Self {
            id: id.into(),
            success: false,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
            result: None,
            error: Some(err.to_string()),
        }
    }
}
