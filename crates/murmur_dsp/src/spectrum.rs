//! Spectrum Analyzer
//!
//! Direct discrete Fourier transform for telemetry. Each bin is computed by
//! correlating the input against a sine/cosine pair at `k·fs/N`, which is
//! O(N²) and meant for on-demand inspection rather than the hot path.
//!
//! Bins are then folded into five speech-oriented bands.

use crate::error::DspError;

/// Largest accepted transform size
pub const MAX_FFT_SIZE: usize = 8192;

/// Named band edges in Hz: `[low, high)`. Treble runs up to and including Nyquist.
pub const BASS_RANGE: (f32, f32) = (0.0, 200.0);
pub const LOW_MID_RANGE: (f32, f32) = (200.0, 500.0);
pub const MID_RANGE: (f32, f32) = (500.0, 2000.0);
pub const HIGH_MID_RANGE: (f32, f32) = (2000.0, 4000.0);
pub const TREBLE_START: f32 = 4000.0;

/// Mean bin magnitude per named band
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandEnergies {
    pub bass: f32,
    pub low_mid: f32,
    pub mid: f32,
    pub high_mid: f32,
    pub treble: f32,
}

impl BandEnergies {
    pub fn as_array(&self) -> [f32; 5] {
        [self.bass, self.low_mid, self.mid, self.high_mid, self.treble]
    }
}

/// Per-bin spectrum plus band summary
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    /// Bin center frequencies in Hz (`k·fs/N`)
    pub frequencies: Vec<f32>,
    /// Normalized magnitudes (`|X[k]| / N`)
    pub magnitudes: Vec<f32>,
    pub bands: BandEnergies,
}

/// Compute the magnitude spectrum of `samples`.
///
/// Produces `fft_size / 2` bins. The input is truncated to `fft_size`
/// samples; a shorter input is zero-padded.
pub fn analyze(samples: &[f32], fft_size: usize, sample_rate: f32) -> Result<Spectrum, DspError> {
    if fft_size < 2 || fft_size > MAX_FFT_SIZE || fft_size % 2 != 0 {
        return Err(DspError::InvalidFftSize(fft_size));
    }
    if !(sample_rate > 0.0) {
        return Err(DspError::InvalidSampleRate(sample_rate));
    }

    let num_bins = fft_size / 2;
    let window = &samples[..samples.len().min(fft_size)];
    let bin_hz = sample_rate / fft_size as f32;

    let mut frequencies = Vec::with_capacity(num_bins);
    let mut magnitudes = Vec::with_capacity(num_bins);

    for k in 0..num_bins {
        let omega = 2.0 * std::f64::consts::PI * k as f64 / fft_size as f64;
        let (mut re, mut im) = (0.0f64, 0.0f64);
        for (n, &x) in window.iter().enumerate() {
            let phase = omega * n as f64;
            re += x as f64 * phase.cos();
            im -= x as f64 * phase.sin();
        }

        frequencies.push(k as f32 * bin_hz);
        magnitudes.push(((re * re + im * im).sqrt() / fft_size as f64) as f32);
    }

    let nyquist = sample_rate / 2.0;
    let bands = BandEnergies {
        bass: band_mean(&frequencies, &magnitudes, BASS_RANGE.0, BASS_RANGE.1, false),
        low_mid: band_mean(&frequencies, &magnitudes, LOW_MID_RANGE.0, LOW_MID_RANGE.1, false),
        mid: band_mean(&frequencies, &magnitudes, MID_RANGE.0, MID_RANGE.1, false),
        high_mid: band_mean(&frequencies, &magnitudes, HIGH_MID_RANGE.0, HIGH_MID_RANGE.1, false),
        treble: band_mean(&frequencies, &magnitudes, TREBLE_START, nyquist, true),
    };

    Ok(Spectrum {
        frequencies,
        magnitudes,
        bands,
    })
}

/// Mean magnitude of bins in `[low, high)` (or `[low, high]`); 0.0 if none fall in range.
fn band_mean(frequencies: &[f32], magnitudes: &[f32], low: f32, high: f32, inclusive: bool) -> f32 {
    let (sum, count) = frequencies
        .iter()
        .zip(magnitudes)
        .filter(|&(&f, _)| f >= low && (f < high || (inclusive && f <= high)))
        .fold((0.0f32, 0usize), |(s, c), (_, &m)| (s + m, c + 1));

    if count > 0 {
        sum / count as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FS: f32 = 16000.0;

    #[test]
    fn test_rejects_bad_sizes() {
        assert!(matches!(analyze(&[0.0; 8], 0, FS), Err(DspError::InvalidFftSize(0))));
        assert!(analyze(&[0.0; 8], 7, FS).is_err());
        assert!(analyze(&[0.0; 8], MAX_FFT_SIZE * 2, FS).is_err());
        assert!(matches!(analyze(&[0.0; 8], 8, 0.0), Err(DspError::InvalidSampleRate(_))));
    }

    #[test]
    fn test_zero_input_is_all_zero() {
        let spectrum = analyze(&vec![0.0; 512], 512, FS).unwrap();
        assert_eq!(spectrum.magnitudes.len(), 256);
        assert!(spectrum.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(spectrum.bands, BandEnergies::default());
    }

    #[test]
    fn test_bin_frequencies() {
        let spectrum = analyze(&[0.0; 16], 16, FS).unwrap();
        assert_eq!(spectrum.frequencies.len(), 8);
        assert_eq!(spectrum.frequencies[0], 0.0);
        assert_eq!(spectrum.frequencies[1], 1000.0);
        assert_eq!(spectrum.frequencies[7], 7000.0);
    }

    #[test]
    fn test_tone_lands_in_its_bin() {
        // 1 kHz at N=512, fs=16k falls exactly on bin 32
        let n = 512;
        let tone: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / FS).sin())
            .collect();
        let spectrum = analyze(&tone, n, FS).unwrap();

        let (peak_bin, peak) = spectrum
            .magnitudes
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &m)| if m > best.1 { (i, m) } else { best });
        assert_eq!(peak_bin, 32);
        // A unit sine has |X[k]|/N = 0.5 at its bin
        assert!((peak - 0.5).abs() < 1e-3);

        // The tone belongs to the mid band
        let bands = spectrum.bands;
        assert!(bands.mid > bands.bass);
        assert!(bands.mid > bands.treble);
    }

    #[test]
    fn test_dc_shows_in_bass() {
        let spectrum = analyze(&vec![0.25; 256], 256, FS).unwrap();
        assert!((spectrum.magnitudes[0] - 0.25).abs() < 1e-5);
        assert!(spectrum.bands.bass > 0.0);
        assert!(spectrum.bands.treble.abs() < 1e-5);
    }

    #[test]
    fn test_bands_are_non_negative() {
        let noise: Vec<f32> = (0..256).map(|i| ((i * 7919) % 97) as f32 / 97.0 - 0.5).collect();
        let spectrum = analyze(&noise, 256, FS).unwrap();
        assert!(spectrum.magnitudes.iter().all(|&m| m >= 0.0));
        assert!(spectrum.bands.as_array().iter().all(|&b| b >= 0.0));
    }

    #[test]
    fn test_short_input_is_zero_padded() {
        let spectrum = analyze(&[1.0], 64, FS).unwrap();
        // Impulse: flat magnitude 1/N in every bin
        for m in &spectrum.magnitudes {
            assert!((m - 1.0 / 64.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_empty_band_reports_zero() {
        // N=4 at 16k: bins at 0 and 4000 Hz only; low-mid/mid/high-mid have no bins
        let spectrum = analyze(&[0.5, 0.5, 0.5, 0.5], 4, FS).unwrap();
        assert_eq!(spectrum.bands.low_mid, 0.0);
        assert_eq!(spectrum.bands.mid, 0.0);
        assert_eq!(spectrum.bands.high_mid, 0.0);
    }
}
