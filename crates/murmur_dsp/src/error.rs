//! DSP Error Types

use thiserror::Error;

/// Errors that can occur while constructing DSP components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Invalid FFT size: {0} (must be even, 2-8192)")]
    InvalidFftSize(usize),

    #[error("Invalid NLMS filter length: {0} (must be 1-8192)")]
    InvalidFilterLength(usize),
}
