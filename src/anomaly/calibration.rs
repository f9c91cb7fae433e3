// Baseline statistics for the two spectral features

use super::spectral::Features;
use serde::{Deserialize, Serialize};

/// Population mean and standard deviation of one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub mean: f64,
    pub std: f64,
}

impl FeatureStats {
    /// Variance is the mean of squared deviations. A zero deviation is stored
    /// as 1.0 so z-scores stay finite.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std: 1.0,
            };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        Self {
            mean,
            std: if std == 0.0 { 1.0 } else { std },
        }
    }

    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Immutable once built; one per detector activation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub hf_ratio: FeatureStats,
    pub flux: FeatureStats,
}

impl CalibrationProfile {
    pub fn from_features(features: &[Features]) -> Self {
        let hf: Vec<f64> = features.iter().map(|f| f.hf_ratio).collect();
        let flux: Vec<f64> = features.iter().map(|f| f.flux).collect();

        Self {
            hf_ratio: FeatureStats::from_values(&hf),
            flux: FeatureStats::from_values(&flux),
        }
    }

    /// (hf-ratio z, flux z)
    pub fn z_scores(&self, features: &Features) -> (f64, f64) {
        (
            self.hf_ratio.z_score(features.hf_ratio),
            self.flux.z_score(features.flux),
        )
    }

    /// A window is a candidate only if both features exceed the threshold
    pub fn is_candidate(&self, features: &Features, threshold: f64) -> bool {
        let (hf_z, flux_z) = self.z_scores(features);
        hf_z > threshold && flux_z > threshold
    }
}
