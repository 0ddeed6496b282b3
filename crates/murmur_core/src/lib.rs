//! Murmur Core - Voice Processing Pipeline
//!
//! This crate wires the `murmur_dsp` stages into a stateful processor:
//! - Operation model and binary wire envelope
//! - Validated configuration with partial per-request overrides
//! - `ProcessorState` owning all carry-over state and dispatching operations
//! - A worker thread that serializes requests over channels
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Caller Thread                         │
//! │   WireRequest ──submit/call──▶ Worker ◀──Response──         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Worker Thread                         │
//! │   decode ──▶ validate/merge config ──▶ ProcessorState       │
//! │                                          │                  │
//! │   HPF ──▶ Noise Est/Sub ──▶ Gate ──▶ NLMS AEC ──▶ encode    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod message;
mod state;
mod worker;

pub use config::{
    AudioProcessingConfig, ConfigError, ConfigPatch, ProcessorOptions, DEFAULT_SAMPLE_RATE,
    MAX_NLMS_FILTER_LENGTH,
};
pub use error::{ProcessError, ProcessResult};
pub use message::{
    decode_samples, encode_samples, BandOutput, EchoCancellationOutput, FrameMetadata,
    FrameOutput, HighPassOutput, NoiseEstimateOutput, NoiseGateOutput, NoiseReductionOutput,
    Operation, OperationKind, OperationOutput, Response, RmsOutput, SpectrumOutput, WireRequest,
};
pub use state::{Diagnostics, ProcessorState, ECHO_REFERENCE_MAX_AGE, GATE_TRIGGER_GAIN};
pub use worker::{ProcessorWorker, REQUEST_QUEUE_DEPTH};

// Re-export DSP types for convenience
pub use murmur_dsp::{linear_to_db, rms, DspError, Spectrum};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify public API is accessible
        let _config = AudioProcessingConfig::default();
        let _state = ProcessorState::new(ProcessorOptions::default()).unwrap();
        let _request = WireRequest::new("id", OperationKind::ResetFilters);
    }
}
