// Windowed spectral features for the acoustic channel

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Per-window feature pair used for calibration and detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Features {
    /// Share of spectral power above the cutoff frequency, in [0, 1]
    pub hf_ratio: f64,
    /// Sum of positive per-bin power increases since the previous window
    pub flux: f64,
}

/// Hamming window coefficients: 0.54 - 0.46 cos(2πi / (n - 1))
pub fn hamming(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / denom).cos())
        .collect()
}

/// Ratio of power in bins `cutoff_bin..` to total power; 0 for a silent window
pub fn high_frequency_ratio(power: &[f64], cutoff_bin: usize) -> f64 {
    let total: f64 = power.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let high: f64 = power.iter().skip(cutoff_bin).sum();
    high / total
}

/// Positive-only per-bin increase from `previous` to `current`
pub fn spectral_flux(current: &[f64], previous: &[f64]) -> f64 {
    current
        .iter()
        .zip(previous)
        .map(|(&cur, &prev)| (cur - prev).max(0.0))
        .sum()
}

/// First bin whose centre frequency lies strictly above `cutoff_hz`
pub fn cutoff_bin(window_size: usize, sample_rate: f64, cutoff_hz: f64) -> usize {
    let bin_width = sample_rate / window_size as f64;
    (cutoff_hz / bin_width).floor() as usize + 1
}

/// Hamming-windowed real FFT with memory of the previous power spectrum
pub struct SpectralAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    cutoff_bin: usize,
    buffer: Vec<Complex<f64>>,
    previous: Option<Vec<f64>>,
}

impl SpectralAnalyzer {
    pub fn new(window_size: usize, sample_rate: f64, cutoff_hz: f64) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_size);

        Self {
            fft,
            window: hamming(window_size),
            cutoff_bin: cutoff_bin(window_size, sample_rate, cutoff_hz),
            buffer: vec![Complex::new(0.0, 0.0); window_size],
            previous: None,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }

    pub fn cutoff_bin(&self) -> usize {
        self.cutoff_bin
    }

    /// Power of bins 0..=n/2 (the non-redundant half of a real-input FFT)
    pub fn power_spectrum(&mut self, samples: &[f64]) -> Vec<f64> {
        debug_assert_eq!(samples.len(), self.window.len());

        for ((slot, &x), &w) in self.buffer.iter_mut().zip(samples).zip(&self.window) {
            *slot = Complex::new(x * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        let half = self.window.len() / 2;
        self.buffer[..=half].iter().map(|c| c.norm_sqr()).collect()
    }

    /// Compute features for one window. Flux is 0 for the first window after
    /// construction or [`reset`](Self::reset).
    pub fn analyze(&mut self, samples: &[f64]) -> Features {
        let power = self.power_spectrum(samples);
        let hf_ratio = high_frequency_ratio(&power, self.cutoff_bin);
        let flux = self
            .previous
            .as_deref()
            .map(|prev| spectral_flux(&power, prev))
            .unwrap_or(0.0);
        self.previous = Some(power);

        Features { hf_ratio, flux }
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f64, sample_rate: f64, n: usize, amplitude: f64) -> Vec<f64> {
        (0..n)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_hamming_endpoints_and_peak() {
        let w = hamming(256);
        assert!((w[0] - 0.08).abs() < 1e-12);
        assert!((w[255] - 0.08).abs() < 1e-12);
        assert!(w.iter().all(|&c| c <= 1.0 + 1e-12));
    }

    #[test]
    fn test_cutoff_bin() {
        // 8000 Hz / 256 = 31.25 Hz per bin; 1000 Hz sits exactly on bin 32
        assert_eq!(cutoff_bin(256, 8000.0, 1000.0), 33);
        assert_eq!(cutoff_bin(256, 8000.0, 1010.0), 33);
    }

    #[test]
    fn test_silence_has_zero_ratio() {
        let mut analyzer = SpectralAnalyzer::new(256, 8000.0, 1000.0);
        let features = analyzer.analyze(&vec![0.0; 256]);
        assert_eq!(features.hf_ratio, 0.0);
        assert_eq!(features.flux, 0.0);
    }

    #[test]
    fn test_high_tone_dominates_ratio() {
        let mut analyzer = SpectralAnalyzer::new(256, 8000.0, 1000.0);
        let high = analyzer.analyze(&tone(3000.0, 8000.0, 256, 1.0));
        assert!(high.hf_ratio > 0.99, "ratio was {}", high.hf_ratio);

        analyzer.reset();
        let low = analyzer.analyze(&tone(200.0, 8000.0, 256, 1.0));
        assert!(low.hf_ratio < 0.01, "ratio was {}", low.hf_ratio);
    }

    #[test]
    fn test_flux_counts_only_increases() {
        assert_eq!(spectral_flux(&[1.0, 5.0, 2.0], &[3.0, 1.0, 2.0]), 4.0);
        assert_eq!(spectral_flux(&[0.0, 0.0], &[3.0, 1.0]), 0.0);
    }

    #[test]
    fn test_flux_tracks_previous_window() {
        let mut analyzer = SpectralAnalyzer::new(256, 8000.0, 1000.0);
        let quiet = tone(500.0, 8000.0, 256, 0.1);
        let loud = tone(500.0, 8000.0, 256, 1.0);

        assert_eq!(analyzer.analyze(&quiet).flux, 0.0);
        let rising = analyzer.analyze(&loud);
        assert!(rising.flux > 0.0);
        let falling = analyzer.analyze(&quiet);
        assert!(falling.flux < rising.flux * 1e-9);
    }
}
