//! Processor Error Types

use thiserror::Error;

use crate::config::ConfigError;

/// Errors reported back to the caller in a response envelope
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    #[error("No samples provided for {operation}")]
    MissingInput { operation: &'static str },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Invalid sample payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("DSP error: {0}")]
    Dsp(#[from] murmur_dsp::DspError),

    #[error("Failed to spawn processor worker: {0}")]
    WorkerSpawn(String),

    #[error("Channel send error - worker stopped")]
    ChannelSend,

    #[error("Channel receive error - worker stopped")]
    ChannelRecv,

    #[error("Internal processing failure: {0}")]
    Internal(String),
}

/// Result type alias for processor operations
pub type ProcessResult<T> = Result<T, ProcessError>;
