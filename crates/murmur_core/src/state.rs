//! Processor State - Pipeline Orchestration
//!
//! `ProcessorState` owns every piece of carry-over state in the pipeline and
//! is the single entry point the transport calls into:
//!
//! ```text
//! samples ─▶ High-Pass ─▶ Noise Estimate ─▶ Spectral Subtract ─▶ Gate ─▶ NLMS AEC ─▶ out
//!                              │ (side channel)        ▲
//!                              └──── noise floor ──────┘
//! ```
//!
//! Frames must arrive in capture order: high-pass history, the noise buffer
//! and the NLMS weights all depend on the previous frame. There is no
//! internal locking; a state is owned by exactly one worker.

use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, warn};

use murmur_dsp::{
    analyze, linear_to_db, rms, spectral_subtract, EchoFrame, GateFrame, HighPassFilter,
    NlmsEchoCanceller, NoiseEstimator, NoiseGate, NoiseUpdate, Spectrum,
};

use crate::config::{AudioProcessingConfig, ConfigPatch, ProcessorOptions};
use crate::error::{ProcessError, ProcessResult};
use crate::message::{
    EchoCancellationOutput, FrameMetadata, FrameOutput, HighPassOutput, NoiseEstimateOutput,
    NoiseGateOutput, NoiseReductionOutput, Operation, OperationOutput, Response, RmsOutput,
    WireRequest,
};

/// An echo reference older than this is discarded
pub const ECHO_REFERENCE_MAX_AGE: Duration = Duration::from_millis(1000);

/// Gate gain below which a frame is reported as gated
pub const GATE_TRIGGER_GAIN: f32 = 0.5;

/// Loudspeaker signal captured alongside the microphone frames
#[derive(Debug, Clone)]
struct EchoReference {
    samples: Vec<f32>,
    captured_at: Instant,
}

/// Snapshot of lifetime counters
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub frames_processed: u64,
    pub total_processing_time: Duration,
    pub gate_activations: u64,
    pub noise_buffer_frames: usize,
    pub nlms_converged: bool,
}

/// All mutable pipeline state for one stream
#[derive(Debug, Clone)]
pub struct ProcessorState {
    options: ProcessorOptions,
    config: AudioProcessingConfig,
    high_pass: HighPassFilter,
    noise: NoiseEstimator,
    gate: NoiseGate,
    echo: NlmsEchoCanceller,
    echo_reference: Option<EchoReference>,
    frames_processed: u64,
    total_processing_time: Duration,
    #[cfg(test)]
    panic_on_next_request: bool,
}

impl ProcessorState {
    /// Create a processor with the default configuration
    pub fn new(options: ProcessorOptions) -> ProcessResult<Self> {
        Self::with_config(options, AudioProcessingConfig::default())
    }

    /// Create a processor with a custom configuration
    pub fn with_config(
        options: ProcessorOptions,
        config: AudioProcessingConfig,
    ) -> ProcessResult<Self> {
        options.validate()?;
        config.validate(options.sample_rate)?;

        let fs = options.sample_rate;
        Ok(Self {
            high_pass: HighPassFilter::new(config.high_pass_cutoff, fs),
            noise: NoiseEstimator::new(),
            gate: NoiseGate::new(
                config.noise_gate_threshold,
                config.noise_gate_attack,
                config.noise_gate_release,
                fs,
            ),
            echo: NlmsEchoCanceller::new(config.nlms_filter_length, config.nlms_step_size)?,
            echo_reference: None,
            frames_processed: 0,
            total_processing_time: Duration::ZERO,
            #[cfg(test)]
            panic_on_next_request: false,
            options,
            config,
        })
    }

    pub fn config(&self) -> &AudioProcessingConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.options.sample_rate
    }

    pub fn options(&self) -> ProcessorOptions {
        self.options
    }

    /// Current smoothed gate gain
    pub fn gate_gain(&self) -> f32 {
        self.gate.gain()
    }

    pub fn noise_floor(&self) -> Option<&[f32]> {
        self.noise.floor()
    }

    pub fn has_echo_reference(&self) -> bool {
        self.echo_reference.is_some()
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            frames_processed: self.frames_processed,
            total_processing_time: self.total_processing_time,
            gate_activations: self.gate.activations(),
            noise_buffer_frames: self.noise.buffered_frames(),
            nlms_converged: self.echo.is_converged(),
        }
    }

    /// Merge a configuration patch.
    ///
    /// The merged config is validated first; on error nothing changes.
    pub fn apply_config(&mut self, patch: &ConfigPatch) -> ProcessResult<()> {
        if patch.is_empty() {
            return Ok(());
        }

        let next = self.config.merged(patch);
        next.validate(self.options.sample_rate)?;

        // Build the fallible piece before touching anything
        let rebuilt_echo = if next.nlms_filter_length != self.config.nlms_filter_length {
            Some(NlmsEchoCanceller::new(next.nlms_filter_length, next.nlms_step_size)?)
        } else {
            None
        };

        if next.high_pass_cutoff != self.config.high_pass_cutoff {
            self.high_pass.set_cutoff(next.high_pass_cutoff);
            debug!(
                cutoff = next.high_pass_cutoff,
                alpha = self.high_pass.coefficient(),
                "High-pass coefficient recomputed"
            );
        }
        if next.noise_gate_threshold != self.config.noise_gate_threshold {
            self.gate.set_threshold(next.noise_gate_threshold);
        }
        if next.noise_gate_attack != self.config.noise_gate_attack {
            self.gate.set_attack_time(next.noise_gate_attack);
        }
        if next.noise_gate_release != self.config.noise_gate_release {
            self.gate.set_release_time(next.noise_gate_release);
        }
        match rebuilt_echo {
            Some(echo) => {
                debug!(taps = next.nlms_filter_length, "NLMS filter resized, weights cleared");
                self.echo = echo;
            }
            None => self.echo.set_step_size(next.nlms_step_size),
        }

        self.config = next;
        debug!(?patch, "Configuration merged");
        Ok(())
    }

    /// High-pass stage
    pub fn apply_high_pass(&mut self, samples: &[f32]) -> Vec<f32> {
        self.high_pass.process(samples)
    }

    /// Feed the noise estimator using the current gate threshold
    pub fn update_noise_estimate(&mut self, samples: &[f32]) -> NoiseUpdate {
        let had_floor = self.noise.has_floor();
        let update = self.noise.update(samples, self.config.noise_gate_threshold);
        if update.floor_updated && !had_floor {
            debug!(
                floor_rms = self.noise.floor_rms(),
                frames = self.noise.buffered_frames(),
                "Noise floor established"
            );
        }
        update
    }

    /// Spectral subtraction against the current noise floor
    pub fn apply_noise_reduction(&self, samples: &[f32]) -> Vec<f32> {
        spectral_subtract(
            samples,
            self.noise.floor(),
            self.config.noise_reduction_strength,
        )
    }

    /// Noise gate stage
    pub fn apply_noise_gate(&mut self, samples: &[f32]) -> (Vec<f32>, GateFrame) {
        self.gate.process(samples)
    }

    /// Store a new echo reference captured at `now`
    pub fn set_echo_reference(&mut self, samples: Vec<f32>, now: Instant) {
        if samples.is_empty() {
            self.echo_reference = None;
            return;
        }
        self.echo_reference = Some(EchoReference {
            samples,
            captured_at: now,
        });
    }

    /// Echo cancellation stage. Returns `None` (identity) without a fresh reference.
    pub fn apply_echo_cancellation(&mut self, samples: &[f32], now: Instant) -> Option<EchoFrame> {
        self.expire_echo_reference(now);
        let reference = self.echo_reference.as_ref()?;

        let was_converged = self.echo.is_converged();
        let frame = self.echo.process(samples, &reference.samples);
        if self.echo.is_converged() != was_converged {
            debug!(
                converged = self.echo.is_converged(),
                reduction_db = frame.reduction_db,
                "NLMS convergence changed"
            );
        }
        Some(frame)
    }

    fn expire_echo_reference(&mut self, now: Instant) {
        let stale = self
            .echo_reference
            .as_ref()
            .map(|r| now.saturating_duration_since(r.captured_at) > ECHO_REFERENCE_MAX_AGE)
            .unwrap_or(false);

        if stale {
            warn!("Echo reference older than {:?}, discarding", ECHO_REFERENCE_MAX_AGE);
            self.echo_reference = None;
        }
    }

    /// Spectrum of `samples` at the configured transform size
    pub fn spectrum(&self, samples: &[f32]) -> ProcessResult<Spectrum> {
        Ok(analyze(samples, self.config.fft_size, self.options.sample_rate)?)
    }

    /// Run the full pipeline on one frame.
    pub fn process_frame(&mut self, samples: &[f32], now: Instant) -> FrameOutput {
        let config = self.config.clone();

        let mut frame = if config.enable_high_pass {
            self.apply_high_pass(samples)
        } else {
            samples.to_vec()
        };

        if config.enable_noise_reduction {
            self.update_noise_estimate(&frame);
            if self.noise.has_floor() {
                frame = self.apply_noise_reduction(&frame);
            }
        }

        if config.enable_noise_gate {
            frame = self.apply_noise_gate(&frame).0;
        }

        let mut echo_active = false;
        if config.enable_echo_cancellation {
            if let Some(echo) = self.apply_echo_cancellation(&frame, now) {
                frame = echo.output;
                echo_active = true;
            }
        }

        self.frames_processed += 1;

        let gate_gain = self.gate.gain();
        FrameOutput {
            rms: rms(&frame),
            noise_floor_rms: self.noise.floor_rms(),
            metadata: FrameMetadata {
                gate_triggered: gate_gain < GATE_TRIGGER_GAIN,
                gate_gain,
                echo_active,
                nlms_converged: self.echo.is_converged(),
                echo_reduction_db: self.echo.reduction_db(),
                frames_processed: self.frames_processed,
            },
            samples: frame,
        }
    }

    /// Rebuild every stage from the active configuration.
    ///
    /// Counters, including the accumulated processing time, start again
    /// from zero. A reset sent through `handle_wire` is not itself timed.
    pub fn reset(&mut self) {
        let config = self.config.clone();
        let fs = self.options.sample_rate;

        self.high_pass = HighPassFilter::new(config.high_pass_cutoff, fs);
        self.noise.reset();
        self.gate = NoiseGate::new(
            config.noise_gate_threshold,
            config.noise_gate_attack,
            config.noise_gate_release,
            fs,
        );
        // Same length as the live filter, which was validated when it was built
        self.echo.reset();
        self.echo.set_step_size(config.nlms_step_size);
        self.echo_reference = None;
        self.frames_processed = 0;
        self.total_processing_time = Duration::ZERO;

        debug!("Processor state reset");
    }

    /// Execute one operation using the current wall clock
    pub fn handle(&mut self, operation: Operation) -> ProcessResult<OperationOutput> {
        self.handle_at(operation, Instant::now())
    }

    /// Execute one operation as of `now`.
    ///
    /// Inputs and the configuration patch are checked before any state is touched.
    pub fn handle_at(
        &mut self,
        operation: Operation,
        now: Instant,
    ) -> ProcessResult<OperationOutput> {
        let kind = operation.kind();
        if kind.requires_samples() && operation.samples().map_or(true, |s| s.is_empty()) {
            return Err(ProcessError::MissingInput {
                operation: kind.as_str(),
            });
        }
        // NaN or Inf would poison the filter history and NLMS weights for good
        if let Some(samples) = operation.samples() {
            ensure_finite(samples, "samples")?;
        }
        if let Operation::ApplyEchoCancellation {
            echo_reference: Some(reference),
            ..
        } = &operation
        {
            ensure_finite(reference, "echo reference")?;
        }
        if let Some(patch) = operation.config() {
            self.apply_config(patch)?;
        }

        #[cfg(test)]
        if std::mem::take(&mut self.panic_on_next_request) {
            panic!("injected stage failure");
        }

        let output = match operation {
            Operation::ProcessFrame { samples, .. } => {
                OperationOutput::Frame(self.process_frame(&samples, now))
            }

            Operation::ApplyHighPass { samples, .. } => {
                let coefficient = self.high_pass.coefficient();
                let filtered = self.apply_high_pass(&samples);
                OperationOutput::HighPass(HighPassOutput {
                    rms: rms(&filtered),
                    samples: filtered,
                    coefficient,
                })
            }

            Operation::ApplyNoiseGate { samples, .. } => {
                let (gated, frame) = self.apply_noise_gate(&samples);
                OperationOutput::NoiseGate(NoiseGateOutput {
                    samples: gated,
                    gain: frame.gain,
                    activations: self.gate.activations(),
                    gate_triggered: frame.gain < GATE_TRIGGER_GAIN,
                })
            }

            Operation::ApplyNoiseReduction { samples, .. } => {
                self.update_noise_estimate(&samples);
                let applied = self
                    .noise
                    .floor()
                    .map_or(false, |floor| floor.len() == samples.len());
                OperationOutput::NoiseReduction(NoiseReductionOutput {
                    samples: self.apply_noise_reduction(&samples),
                    noise_floor_rms: self.noise.floor_rms(),
                    applied,
                })
            }

            Operation::ApplyEchoCancellation {
                samples,
                echo_reference,
                ..
            } => {
                if let Some(reference) = echo_reference {
                    self.set_echo_reference(reference, now);
                }
                let output = match self.apply_echo_cancellation(&samples, now) {
                    Some(frame) => EchoCancellationOutput {
                        samples: frame.output,
                        echo_active: true,
                        converged: self.echo.is_converged(),
                        echo_reduction_db: frame.reduction_db,
                    },
                    None => EchoCancellationOutput {
                        samples,
                        echo_active: false,
                        converged: self.echo.is_converged(),
                        echo_reduction_db: self.echo.reduction_db(),
                    },
                };
                OperationOutput::EchoCancellation(output)
            }

            Operation::CalculateRms { samples } => {
                let level = rms(&samples);
                OperationOutput::Rms(RmsOutput {
                    rms: level,
                    db: linear_to_db(level),
                })
            }

            Operation::CalculateSpectrum { samples, .. } => {
                OperationOutput::Spectrum(self.spectrum(&samples)?.into())
            }

            Operation::UpdateNoiseEstimate { samples, .. } => {
                self.update_noise_estimate(&samples);
                OperationOutput::NoiseEstimate(NoiseEstimateOutput {
                    buffered_frames: self.noise.buffered_frames(),
                    has_noise_floor: self.noise.has_floor(),
                    noise_floor_rms: self.noise.floor_rms(),
                })
            }

            Operation::ResetFilters => {
                self.reset();
                OperationOutput::Reset
            }
        };

        Ok(output)
    }

    /// Decode, execute and time a transport request.
    ///
    /// Never fails: every problem, including a panic inside a stage, becomes
    /// an error response. After a panic the stages are rebuilt so no
    /// half-updated weights or buffers survive.
    pub fn handle_wire(&mut self, request: WireRequest) -> Response {
        let started = Instant::now();
        let id = request.id.clone();

        let result = Operation::from_wire(request).and_then(|operation| {
            panic::catch_unwind(AssertUnwindSafe(|| self.handle_at(operation, started)))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    error!(request = %id, "Processing panicked: {}", message);
                    self.reset();
                    Err(ProcessError::Internal(message))
                })
        });

        let elapsed = started.elapsed();
        if !matches!(result, Ok(OperationOutput::Reset)) {
            self.total_processing_time += elapsed;
        }

        match result {
            Ok(output) => Response::ok(id, output, elapsed),
            Err(err) => {
                warn!(request = %id, "Request failed: {}", err);
                Response::error(id, err, elapsed)
            }
        }
    }
}

fn ensure_finite(samples: &[f32], what: &str) -> ProcessResult<()> {
    match samples.iter().position(|s| !s.is_finite()) {
        Some(index) => Err(ProcessError::InvalidPayload(format!(
            "non-finite value in {what} at index {index}"
        ))),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
