//! Response-time normalization onto the judgment intensity scale.

use serde::{Deserialize, Serialize};

/// Closed intensity range that normalized measurements are mapped onto.
///
/// The default matches the explicit 1..7 scale used for keyword weights so both
/// judgment sources feed the matrix builder on comparable terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityScale {
    pub min: f64,
    pub max: f64,
}

impl Default for IntensityScale {
    fn default() -> Self {
        Self { min: 1.0, max: 7.0 }
    }
}

impl IntensityScale {
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min > 0.0 && self.max >= self.min
    }
}

/// Normalize one group of measurements onto the default `[1, 7]` scale.
pub fn normalize_response_times(times: &[f64]) -> Vec<f64> {
    normalize_with_scale(times, IntensityScale::default())
}

/// Linear min-max map of `times` onto `scale`.
///
/// A group with no spread carries no discriminating signal, so every value maps
/// to `scale.min`.
pub fn normalize_with_scale(times: &[f64], scale: IntensityScale) -> Vec<f64> {
    if times.is_empty() {
        return Vec::new();
    }
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![scale.min; times.len()];
    }
    let range = max - min;
    times
        .iter()
        .map(|t| scale.min + scale.span() * (t - min) / range)
        .collect()
}
