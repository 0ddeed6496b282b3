//! Level Utilities
//!
//! RMS measurement and linear/decibel conversions shared by every stage.
//! All functions are pure and never fail: degenerate inputs are floored
//! instead of producing `-inf` or `NaN`.

/// Smallest linear amplitude considered when converting to decibels.
/// 20·log10(1e-10) = -200 dB.
pub const MIN_LINEAR: f32 = 1e-10;

/// Root-mean-square level of a block of samples.
///
/// Returns 0.0 for an empty slice. Squares are accumulated in f64 so long
/// frames (one second at 16kHz) don't lose precision.
#[inline]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Convert linear amplitude to decibels, floored at [`MIN_LINEAR`].
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    20.0 * linear.max(MIN_LINEAR).log10()
}

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a time constant in milliseconds to a single-pole smoothing coefficient.
///
/// `coeff = exp(-1 / (tau * sample_rate))`. A time of zero (or less) means
/// "jump immediately" and yields 0.0 rather than dividing by zero.
#[inline]
pub fn time_constant_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let samples = (time_ms / 1000.0) * sample_rate;
    if !(samples > 0.0) {
        return 0.0;
    }
    (-1.0 / samples).exp()
}
