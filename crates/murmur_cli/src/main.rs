//! Offline driver for the voice conditioning pipeline.
//!
//! Usage: murmur <input.wav> [output.wav] [config.json]
//!
//! Reads a WAV file, mixes it to mono, runs it through a processor worker in
//! 20 ms frames and prints a JSON summary. `config.json` holds a partial
//! configuration (camelCase keys) applied before the first frame.

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use murmur_core::{
    ConfigPatch, Diagnostics, FrameMetadata, OperationKind, OperationOutput, ProcessorOptions,
    ProcessorWorker, SpectrumOutput, WireRequest,
};

/// Frame length in milliseconds
const FRAME_MS: u32 = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    input: String,
    sample_rate: u32,
    frames: usize,
    failed_frames: usize,
    diagnostics: Diagnostics,
    last_frame: Option<FrameMetadata>,
    spectrum: Option<SpectrumOutput>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "murmur=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("Usage: murmur <input.wav> [output.wav] [config.json]");
    }
    let input_path = &args[1];
    let output_path = args.get(2);
    let config_path = args.get(3);

    let patch = match config_path {
        Some(path) => load_patch(path)?,
        None => ConfigPatch::default(),
    };

    let (samples, sample_rate) = read_mono(input_path)?;
    info!(
        path = %input_path,
        sample_rate,
        samples = samples.len(),
        "Loaded input"
    );

    let worker = ProcessorWorker::spawn(ProcessorOptions {
        sample_rate: sample_rate as f32,
    })
    .context("Failed to start processor")?;

    let frame_len = (sample_rate * FRAME_MS / 1000).max(1) as usize;
    let frames: Vec<&[f32]> = samples.chunks(frame_len).collect();

    // Requests are pipelined; responses come back in submission order
    for (index, frame) in frames.iter().enumerate() {
        let mut request = WireRequest::new(format!("frame-{index}"), OperationKind::ProcessFrame)
            .with_samples(frame);
        if index == 0 && !patch.is_empty() {
            request = request.with_config(patch.clone());
        }
        worker.submit(request)?;
    }

    let mut processed = Vec::with_capacity(samples.len());
    let mut last_frame = None;
    let mut last_samples = Vec::new();
    let mut failed_frames = 0;

    for frame in &frames {
        let response = worker.wait_response()?;
        match response.result {
            Some(OperationOutput::Frame(output)) => {
                processed.extend_from_slice(&output.samples);
                last_frame = Some(output.metadata);
                last_samples = output.samples;
            }
            _ => {
                warn!(
                    id = %response.id,
                    error = response.error.as_deref().unwrap_or("no result"),
                    "Frame failed, passing input through"
                );
                processed.extend_from_slice(frame);
                failed_frames += 1;
            }
        }
    }

    let spectrum = if last_samples.is_empty() {
        None
    } else {
        let request = WireRequest::new("spectrum", OperationKind::CalculateSpectrum)
            .with_samples(&last_samples);
        let response = worker.call(request)?;
        match response.result {
            Some(OperationOutput::Spectrum(spectrum)) => Some(spectrum),
            _ => None,
        }
    };

    let diagnostics = worker.diagnostics()?;
    worker.shutdown();

    if let Some(path) = output_path {
        write_mono(path, &processed, sample_rate)?;
        info!(path = %path, samples = processed.len(), "Wrote output");
    }

    let summary = Summary {
        input: input_path.clone(),
        sample_rate,
        frames: frames.len(),
        failed_frames,
        diagnostics,
        last_frame,
        spectrum,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn load_patch(path: &str) -> Result<ConfigPatch> {
    let json = fs::read_to_string(path).with_context(|| format!("Failed to read config {path}"))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid config {path}"))
}

/// Read a WAV file and average its channels into one f32 stream
fn read_mono(path: impl AsRef<Path>) -> Result<(Vec<f32>, u32)> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok((mono, spec.sample_rate))
}

fn write_mono(path: impl AsRef<Path>, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()?;
    Ok(())
}
